//! The cleaning run: prepare, index, resolve unlinks, classify, split, merge
//! and prune, reporting progress and honouring cancellation between steps.

use std::collections::BTreeMap;

use log::{debug, info};
use rayon::prelude::*;

use crate::breakage::{BreakageResult, Classifier};
use crate::config::CleanerConfig;
use crate::diagnostics::{ErrorCollector, ErrorRecord, UnlinkReport};
use crate::error::{CleanError, Phase, guarded};
use crate::feature::{CleanEdge, FeatureId, FieldSchema, IdGenerator, SplitSegment};
use crate::geometry::to_wkt;
use crate::index::SpatialIndex;
use crate::input::{InputFeature, next_free_id, prepare};
use crate::line_merge::{CyclicChain, merge_chains};
use crate::progress::{CancellationToken, NoProgress, Progress, ProgressSink};
use crate::prune::prune_orphans;
use crate::split::{StubPoint, split_feature};
use crate::unlink::{ResolvedUnlinks, UnlinkMarker, resolve};

/// Counters describing one finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub input_features: usize,
    pub skipped: usize,
    pub exploded_parts: usize,
    pub line_features: usize,
    pub duplicates: usize,
    pub split_segments: usize,
    pub dropped_duplicate_segments: usize,
    pub merged_chains: usize,
    pub copied_edges: usize,
    pub pruned_orphans: usize,
    pub output_edges: usize,
}

#[derive(Debug)]
pub struct CleanReport {
    /// Field names of the edge attribute sets.
    pub schema: FieldSchema,
    pub edges: Vec<CleanEdge>,
    /// Split segment id to the input feature it was cut from.
    pub segment_sources: BTreeMap<FeatureId, FeatureId>,
    pub errors: Option<Vec<ErrorRecord>>,
    pub unlinks: Option<UnlinkReport>,
    pub stubs: Vec<StubPoint>,
    pub cyclic: Vec<CyclicChain>,
    pub stats: CleanStats,
}

impl CleanReport {
    /// Input feature ids that contributed to `edge`, ascending.
    pub fn sources(&self, edge: &CleanEdge) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = edge
            .origin
            .segments()
            .iter()
            .filter_map(|s| self.segment_sources.get(s).copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Finished(CleanReport),
    /// Stopped on request; nothing usable was produced.
    Cancelled,
}

impl RunOutcome {
    pub fn finished(self) -> Option<CleanReport> {
        match self {
            RunOutcome::Finished(report) => Some(report),
            RunOutcome::Cancelled => None,
        }
    }
}

pub struct NetworkCleaner<'a> {
    config: CleanerConfig,
    progress: &'a dyn ProgressSink,
    cancel: CancellationToken,
}

impl<'a> NetworkCleaner<'a> {
    pub fn new(config: CleanerConfig) -> Self {
        Self {
            config,
            progress: &NoProgress,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn clean(
        &self,
        schema: &FieldSchema,
        inputs: &[InputFeature],
        markers: &[UnlinkMarker],
    ) -> Result<RunOutcome, CleanError> {
        self.config.validate()?;
        let cfg = self.config;
        let mut progress = Progress::new(self.progress);
        let mut stats = CleanStats {
            input_features: inputs.len(),
            ..Default::default()
        };
        let first_free = guarded(Phase::Preprocess, || next_free_id(inputs))?;
        let mut ids = IdGenerator::starting_at(first_free);
        let mut errors = cfg.collect_errors.then(ErrorCollector::new);

        info!("preparing {} input features", inputs.len());
        let prepared = guarded(Phase::Preprocess, || prepare(inputs, cfg.precision, &mut ids))?;
        stats.skipped = prepared.skipped;
        stats.exploded_parts = prepared.exploded_parts;
        if let Some(collector) = errors.as_mut() {
            for input in inputs {
                let wkt = input.geometry.as_ref().map(to_wkt).unwrap_or_default();
                collector.register(input.id, wkt);
            }
            for (id, defect) in &prepared.defects {
                collector.add(*id, defect);
            }
        }
        let features = prepared.features;
        stats.line_features = features.len();
        progress.set(10.0);
        if self.cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let index = guarded(Phase::Index, || Ok(SpatialIndex::bulk_load(features.iter())))?;
        debug!("indexed {} lines", index.len());
        progress.set(15.0);

        let unlinks: Option<ResolvedUnlinks> = if cfg.resolve_unlinks {
            let resolved = guarded(Phase::Unlink, || {
                Ok(resolve(
                    markers,
                    &features,
                    &index,
                    cfg.precision,
                    cfg.unlink_tolerance,
                ))
            })?;
            info!(
                "{} unlink markers valid, {} invalid",
                resolved.valid_count(),
                resolved.invalid.len()
            );
            Some(resolved)
        } else {
            None
        };
        progress.set(20.0);
        if self.cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        info!("classifying {} lines", features.len());
        let mut classifier =
            Classifier::new(&features, &index, cfg.precision).with_stub_ratio(cfg.stub_ratio);
        if let Some(u) = unlinks.as_ref() {
            classifier = classifier.with_unlinks(u);
        }
        let lines = features.as_slice();
        let mut results: Vec<BreakageResult> = Vec::with_capacity(lines.len());
        for batch in lines.chunks(cfg.batch_size) {
            if self.cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            let batch_results = guarded(Phase::Classify, || {
                Ok(batch
                    .par_iter()
                    .map(|f| classifier.classify(f))
                    .collect::<Vec<_>>())
            })?;
            results.extend(batch_results);
            progress.within(20.0, 60.0, results.len(), lines.len());
        }

        let mut segments: Vec<SplitSegment> = Vec::new();
        let mut segment_sources = BTreeMap::new();
        let mut stubs: Vec<StubPoint> = Vec::new();
        let mut consumed = Vec::new();
        for (n, (feature, result)) in lines.iter().zip(&results).enumerate() {
            if n % cfg.batch_size == 0 && self.cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            if feature.id != result.feature {
                return Err(CleanError::internal(
                    Phase::Split,
                    format!("result for {} paired with line {}", result.feature, feature.id),
                ));
            }
            let original = feature.original_id();
            if let Some(collector) = errors.as_mut() {
                if !result.label.is_clean() {
                    collector.add(original, result.label);
                }
            }
            if result.is_duplicate() {
                stats.duplicates += 1;
            }
            consumed.extend(result.crossings.iter().filter(|c| c.consumed).cloned());

            let (pieces, trimmed) =
                guarded(Phase::Split, || Ok(split_feature(feature, result, &mut ids)))?;
            for p in &pieces {
                segment_sources.insert(p.id, original);
            }
            segments.extend(pieces);
            stubs.extend(trimmed);
            progress.within(60.0, 70.0, n + 1, lines.len());
        }
        stats.split_segments = segments.len();
        info!(
            "split {} lines into {} segments ({} duplicates, {} stubs)",
            lines.len(),
            segments.len(),
            stats.duplicates,
            stubs.len()
        );

        let Some(merged) = guarded(Phase::Merge, || merge_chains(&segments, &mut ids, &self.cancel))?
        else {
            return Ok(RunOutcome::Cancelled);
        };
        stats.dropped_duplicate_segments = merged.dropped_duplicates.len();
        stats.merged_chains = merged.edges.iter().filter(|e| e.is_merged()).count();
        stats.copied_edges = merged.edges.len() - stats.merged_chains;
        progress.set(90.0);
        if self.cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let (edges, pruned) = guarded(Phase::Prune, || Ok(prune_orphans(merged.edges)))?;
        stats.pruned_orphans = pruned.len();
        stats.output_edges = edges.len();
        progress.set(100.0);

        info!(
            "cleaned network has {} edges ({} merged, {} copied, {} pruned)",
            stats.output_edges, stats.merged_chains, stats.copied_edges, stats.pruned_orphans
        );

        Ok(RunOutcome::Finished(CleanReport {
            schema: schema.clone(),
            edges,
            segment_sources,
            errors: errors.map(ErrorCollector::finish),
            unlinks: unlinks.map(|u| UnlinkReport {
                consumed,
                invalid: u.invalid,
            }),
            stubs,
            cyclic: merged.cyclic,
            stats,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::AttrValue;
    use geo::{Geometry, line_string};
    use std::sync::Mutex;

    fn road(id: FeatureId, ls: geo::LineString<f64>, name: &str) -> InputFeature {
        InputFeature {
            id,
            geometry: Some(Geometry::LineString(ls)),
            has_z: false,
            attributes: vec![AttrValue::Text(name.to_string())],
        }
    }

    fn schema() -> FieldSchema {
        FieldSchema::new(vec!["name".to_string()])
    }

    #[test]
    fn t_junction_is_split_and_merged() {
        let inputs = vec![
            road(0, line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 10.0, y: 0.0)], "main"),
            road(1, line_string![(x: 5.0, y: 0.0), (x: 5.0, y: 5.0)], "side"),
            road(2, line_string![(x: 5.0, y: 5.0), (x: 5.0, y: 9.0)], "side"),
        ];
        let cfg = CleanerConfig {
            collect_errors: true,
            ..Default::default()
        };
        let report = NetworkCleaner::new(cfg)
            .clean(&schema(), &inputs, &[])
            .unwrap()
            .finished()
            .unwrap();

        assert_eq!(report.stats.split_segments, 4);
        assert_eq!(report.stats.merged_chains, 1);
        assert_eq!(report.edges.len(), 3);
        let merged = report.edges.iter().find(|e| e.is_merged()).unwrap();
        assert_eq!(report.sources(merged), vec![1, 2]);
        let errors = report.errors.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].feature, 0);
        assert_eq!(errors[0].labels, "breakage");
    }

    #[test]
    fn progress_is_monotonic_and_complete() {
        let seen = Mutex::new(Vec::new());
        let sink = |p: f32| seen.lock().unwrap().push(p);
        let inputs = vec![
            road(0, line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)], "a"),
            road(1, line_string![(x: 1.0, y: 0.0), (x: 2.0, y: 0.0)], "b"),
        ];
        let cfg = CleanerConfig {
            batch_size: 1,
            ..Default::default()
        };
        NetworkCleaner::new(cfg)
            .with_progress(&sink)
            .clean(&schema(), &inputs, &[])
            .unwrap();
        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last().copied(), Some(100.0));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = CleanerConfig {
            precision: 40,
            ..Default::default()
        };
        let err = NetworkCleaner::new(cfg).clean(&schema(), &[], &[]).unwrap_err();
        assert!(matches!(err, CleanError::InvalidConfig(_)));
    }
}
