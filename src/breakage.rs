//! Breakage classification.
//!
//! Every line is compared against the neighbours its bounding box overlaps.
//! The comparison yields a label describing the topological defect (if any)
//! and the vertex positions where the line has to be split so that every
//! connection in the network falls on a segment endpoint.

use std::collections::BTreeSet;
use std::fmt;

use ahash::AHashMap;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{BoundingRect, Coord, Intersects, Line, LineString};
use log::trace;

use crate::feature::{Arena, FeatureId, LineFeature};
use crate::geometry::{Vertex, same_path, vertices_length};
use crate::index::SpatialIndex;
use crate::unlink::{ResolvedUnlinks, UnlinkCandidate};

/// Relative slack when comparing an overlap run against the line length.
const LENGTH_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Clean,
    Duplicate,
    Orphan,
    ClosedPolyline,
    SelfIntersection,
    SelfIntersectionOverlap,
    Breakage,
    Overlap,
    BreakageOverlap,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Clean => "clean",
            Label::Duplicate => "duplicate",
            Label::Orphan => "orphan",
            Label::ClosedPolyline => "closed polyline",
            Label::SelfIntersection => "self intersection",
            Label::SelfIntersectionOverlap => "self intersection, overlap",
            Label::Breakage => "breakage",
            Label::Overlap => "overlap",
            Label::BreakageOverlap => "breakage, overlap",
        }
    }

    pub fn is_clean(&self) -> bool {
        *self == Label::Clean
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collinear stretch shared by two lines, oriented along the first one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapRun {
    pub start: Coord<f64>,
    pub end: Coord<f64>,
    pub length: f64,
}

/// Intersection geometry of two polylines: isolated points plus shared runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intersection {
    pub points: Vec<Coord<f64>>,
    pub runs: Vec<OverlapRun>,
}

impl Intersection {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.runs.is_empty()
    }

    pub fn shared_length(&self) -> f64 {
        self.runs.iter().map(|r| r.length).sum()
    }
}

fn dist2(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    dx * dx + dy * dy
}

/// Intersect `f` with `g` segment by segment.
///
/// Collinear pieces are ordered along `f` and chained into runs wherever one
/// piece ends exactly where the next begins. Points lying on a piece are not
/// reported separately.
pub fn intersect(f: &LineString<f64>, g: &LineString<f64>) -> Intersection {
    let mut points: Vec<Coord<f64>> = Vec::new();
    let mut pieces: Vec<(usize, f64, Line<f64>)> = Vec::new();

    for (i, fs) in f.lines().enumerate() {
        let fs_rect = fs.bounding_rect();
        for gs in g.lines() {
            if !fs_rect.intersects(&gs.bounding_rect()) {
                continue;
            }
            match line_intersection(fs, gs) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    points.push(intersection);
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    let (a, b) = (intersection.start, intersection.end);
                    if a == b {
                        points.push(a);
                        continue;
                    }
                    let (da, db) = (dist2(fs.start, a), dist2(fs.start, b));
                    let piece = if da <= db { Line::new(a, b) } else { Line::new(b, a) };
                    pieces.push((i, da.min(db), piece));
                }
                None => {}
            }
        }
    }

    pieces.sort_by(|x, y| x.0.cmp(&y.0).then(x.1.total_cmp(&y.1)));
    pieces.dedup_by(|x, y| x.2 == y.2);
    points.retain(|p| !pieces.iter().any(|(_, _, piece)| piece.intersects(p)));
    points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    points.dedup();

    let mut runs: Vec<OverlapRun> = Vec::new();
    for (_, _, piece) in &pieces {
        let length = piece.dx().hypot(piece.dy());
        if let Some(run) = runs.last_mut() {
            if run.end == piece.start {
                run.end = piece.end;
                run.length += length;
                continue;
            }
        }
        runs.push(OverlapRun {
            start: piece.start,
            end: piece.end,
            length,
        });
    }

    Intersection { points, runs }
}

/// Outcome of classifying one line.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakageResult {
    pub feature: FeatureId,
    pub label: Label,
    /// Sorted vertex indices to split at; always holds `0` and the last index
    /// unless the line is a duplicate.
    pub breaks: Vec<usize>,
    /// Crossings with lower-id lines, recorded when unlinks are resolved.
    pub crossings: Vec<UnlinkCandidate>,
    /// First piece is a dangling stub to drop.
    pub trim_start: bool,
    /// Last piece is a dangling stub to drop.
    pub trim_end: bool,
}

impl BreakageResult {
    fn duplicate(feature: FeatureId) -> Self {
        Self {
            feature,
            label: Label::Duplicate,
            breaks: Vec::new(),
            crossings: Vec::new(),
            trim_start: false,
            trim_end: false,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.label == Label::Duplicate
    }
}

/// Read-only view over the indexed lines; safe to share between threads.
pub struct Classifier<'a> {
    features: &'a Arena<LineFeature>,
    index: &'a SpatialIndex,
    unlinks: Option<&'a ResolvedUnlinks>,
    precision: u32,
    stub_ratio: Option<f64>,
}

impl<'a> Classifier<'a> {
    pub fn new(features: &'a Arena<LineFeature>, index: &'a SpatialIndex, precision: u32) -> Self {
        Self {
            features,
            index,
            unlinks: None,
            precision,
            stub_ratio: None,
        }
    }

    pub fn with_unlinks(mut self, unlinks: &'a ResolvedUnlinks) -> Self {
        self.unlinks = Some(unlinks);
        self
    }

    pub fn with_stub_ratio(mut self, ratio: Option<f64>) -> Self {
        self.stub_ratio = ratio;
        self
    }

    fn neighbours(&self, f: &LineFeature) -> Vec<&'a LineFeature> {
        let Some(bounds) = f.bounds() else {
            return Vec::new();
        };
        self.index
            .query(&bounds)
            .into_iter()
            .filter(|id| *id != f.id)
            .filter_map(|id| self.features.get(id))
            .collect()
    }

    pub fn classify(&self, f: &LineFeature) -> BreakageResult {
        let last = f.vertices.len() - 1;
        let mut positions: AHashMap<Vertex, Vec<usize>> = AHashMap::new();
        for (i, v) in f.vertices.iter().enumerate() {
            positions.entry(*v).or_default().push(i);
        }

        let mut breaks: BTreeSet<usize> = BTreeSet::from([0, last]);
        let mut self_intersecting = false;
        for idxs in positions.values() {
            if idxs.len() < 2 || (idxs.len() == 2 && idxs[0] == 0 && idxs[1] == last) {
                continue;
            }
            self_intersecting = true;
            breaks.extend(idxs.iter().copied());
        }

        let neighbours = self.neighbours(f);
        if let Some(g) = neighbours
            .iter()
            .find(|g| g.id < f.id && same_path(&f.vertices, &g.vertices))
        {
            trace!("feature {} duplicates {}", f.id, g.id);
            return BreakageResult::duplicate(f.id);
        }

        let mut orphan = true;
        let mut must_break = false;
        let mut has_overlaps = false;
        let mut touched: BTreeSet<usize> = BTreeSet::new();
        let mut crossings: Vec<UnlinkCandidate> = Vec::new();
        let f_length = f.length();

        for g in &neighbours {
            let inter = intersect(&f.line, &g.line);
            if inter.is_empty() {
                continue;
            }

            for p in &inter.points {
                let Ok(v) = Vertex::snap(*p, self.precision) else {
                    continue;
                };
                let suppressed = self.unlinks.is_some_and(|u| u.suppresses(f.id, g.id, &v));
                if self.unlinks.is_some() && g.id < f.id && is_crossing(&v, f, g) {
                    crossings.push(UnlinkCandidate {
                        point: v,
                        pair: (g.id, f.id),
                        consumed: suppressed,
                    });
                }
                if suppressed {
                    continue;
                }
                if let Some(idxs) = positions.get(&v) {
                    orphan = false;
                    touched.extend(idxs.iter().copied());
                    if idxs.iter().any(|&i| i != 0 && i != last) {
                        must_break = true;
                        breaks.extend(idxs.iter().copied());
                    }
                }
            }

            if let (Some(first), Some(final_run)) = (inter.runs.first(), inter.runs.last()) {
                if inter.shared_length() < f_length * (1.0 - LENGTH_EPSILON) {
                    has_overlaps = true;
                    orphan = false;
                    for c in [first.start, final_run.end] {
                        let Ok(v) = Vertex::snap(c, self.precision) else {
                            continue;
                        };
                        if let Some(idxs) = positions.get(&v) {
                            touched.extend(idxs.iter().copied());
                            breaks.extend(idxs.iter().copied());
                        }
                    }
                }
            }
        }

        let label = if orphan {
            if f.is_closed() {
                Label::ClosedPolyline
            } else {
                Label::Orphan
            }
        } else if self_intersecting {
            if has_overlaps {
                Label::SelfIntersectionOverlap
            } else {
                Label::SelfIntersection
            }
        } else {
            match (must_break, has_overlaps) {
                (true, true) => Label::BreakageOverlap,
                (true, false) => Label::Breakage,
                (false, true) => Label::Overlap,
                (false, false) => Label::Clean,
            }
        };

        let breaks: Vec<usize> = breaks.into_iter().collect();
        let (trim_start, trim_end) = match self.stub_ratio {
            Some(ratio) => stub_trims(f, &breaks, &touched, ratio),
            None => (false, false),
        };

        BreakageResult {
            feature: f.id,
            label,
            breaks,
            crossings,
            trim_start,
            trim_end,
        }
    }
}

/// A point where two lines cross rather than meet at an endpoint.
fn is_crossing(v: &Vertex, f: &LineFeature, g: &LineFeature) -> bool {
    [f.first(), f.last(), g.first(), g.last()]
        .into_iter()
        .all(|end| end != v)
}

/// Which end pieces of `f` are short dangling stubs.
fn stub_trims(f: &LineFeature, breaks: &[usize], touched: &BTreeSet<usize>, ratio: f64) -> (bool, bool) {
    if breaks.len() < 3 || f.is_closed() {
        return (false, false);
    }
    let last = f.vertices.len() - 1;
    let limit = ratio * f.length();
    let dangling = |i: usize| !touched.contains(&i);

    let head = &f.vertices[..=breaks[1]];
    let tail = &f.vertices[breaks[breaks.len() - 2]..];
    let head_len = vertices_length(head);
    let tail_len = vertices_length(tail);
    let mut trim_start = dangling(0) && head_len < limit;
    let mut trim_end = dangling(last) && tail_len < limit;
    if trim_start && trim_end && breaks.len() == 3 {
        // keep the longer piece
        if head_len <= tail_len {
            trim_end = false;
        } else {
            trim_start = false;
        }
    }
    (trim_start, trim_end)
}
