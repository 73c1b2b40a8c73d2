use std::collections::HashMap;
use std::path::PathBuf;

use geo::{Geometry, coord, line_string};
use netclean_cli::feature::{AttrValue, FieldSchema};
use netclean_cli::geometry::{Vertex, vertices_length};
use netclean_cli::input::InputFeature;
use netclean_cli::io;
use netclean_cli::unlink::{UnlinkMarker, UnlinkProblem};
use netclean_cli::{CancellationToken, CleanError, CleanReport, CleanerConfig, NetworkCleaner, RunOutcome};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn run(cfg: CleanerConfig, layer: &io::Layer, markers: &[UnlinkMarker]) -> CleanReport {
    NetworkCleaner::new(cfg)
        .clean(&layer.schema, &layer.features, markers)
        .unwrap()
        .finished()
        .expect("run was not cancelled")
}

fn config() -> CleanerConfig {
    CleanerConfig {
        precision: 3,
        collect_errors: true,
        ..Default::default()
    }
}

fn vertex(x: f64, y: f64) -> Vertex {
    Vertex::snap(coord! { x: x, y: y }, 3).unwrap()
}

fn assert_no_isolated_edges(report: &CleanReport) {
    let mut counts: HashMap<Vertex, usize> = HashMap::new();
    for e in &report.edges {
        *counts.entry(*e.first()).or_default() += 1;
        *counts.entry(*e.last()).or_default() += 1;
    }
    for e in &report.edges {
        assert!(
            !(counts[e.first()] == 1 && counts[e.last()] == 1),
            "edge {} is isolated",
            e.id
        );
    }
}

#[test]
fn crossing_roads_with_markers_and_stub() {
    let layer = io::layer_from_file(&fixture("network.geojson")).unwrap();
    let markers = io::markers_from_file(&fixture("unlinks.geojson")).unwrap();
    let cfg = CleanerConfig {
        resolve_unlinks: true,
        stub_ratio: Some(0.3),
        ..config()
    };
    let report = run(cfg, &layer, &markers);

    // both crossing roads are cut at (5, 0), giving four edges there
    let cut_at_crossing = report
        .edges
        .iter()
        .filter(|e| *e.first() == vertex(5.0, 0.0) || *e.last() == vertex(5.0, 0.0))
        .count();
    assert_eq!(cut_at_crossing, 4);

    let unlinks = report.unlinks.as_ref().unwrap();
    let problems: Vec<_> = unlinks.invalid.iter().map(|i| i.problem).collect();
    assert_eq!(problems, vec![UnlinkProblem::NoLines, UnlinkProblem::SingleLine]);
    assert!(unlinks.consumed.is_empty());

    assert_eq!(report.stubs.len(), 1);
    assert_eq!(report.stubs[0].feature, 2);
    assert_eq!(report.stubs[0].point, vertex(10.0, -1.0));

    assert_eq!(report.stats.split_segments, 5);
    assert_eq!(report.stats.merged_chains, 1);
    assert_eq!(report.edges.len(), 4);
    let merged = report.edges.iter().find(|e| e.is_merged()).unwrap();
    assert_eq!(report.sources(merged), vec![0, 2]);
    assert_eq!(*merged.last(), vertex(10.0, 6.0));
    let lanes_field = report.schema.fields().iter().position(|f| f == "lanes").unwrap();
    let lanes = &merged.attributes[lanes_field];
    assert_eq!(
        lanes.iter().cloned().collect::<Vec<_>>(),
        vec![AttrValue::Int(1), AttrValue::Int(2)]
    );

    let errors = report.errors.as_ref().unwrap();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|r| r.labels == "breakage"));
    assert!(errors[0].geometry.starts_with("LINESTRING(0 0"));
    assert_no_isolated_edges(&report);
}

#[test]
fn merged_lengths_match_input() {
    let layer = io::layer_from_file(&fixture("network.geojson")).unwrap();
    let report = run(config(), &layer, &[]);
    assert_eq!(report.edges.len(), 6);
    assert_eq!(report.stats.pruned_orphans, 0);
    let total: f64 = report.edges.iter().map(|e| vertices_length(&e.vertices)).sum();
    assert!((total - 27.0).abs() < 1e-9);
}

#[test]
fn valid_marker_keeps_crossing_apart() {
    let layer = io::layer_from_file(&fixture("network.geojson")).unwrap();
    let markers = [UnlinkMarker {
        id: 0,
        point: coord! { x: 5.0, y: 0.0 },
    }];
    let cfg = CleanerConfig {
        resolve_unlinks: true,
        ..config()
    };
    let report = run(cfg, &layer, &markers);

    let unlinks = report.unlinks.as_ref().unwrap();
    assert!(unlinks.invalid.is_empty());
    assert_eq!(unlinks.consumed.len(), 1);
    assert_eq!(unlinks.consumed[0].pair, (0, 1));
    assert_eq!(unlinks.consumed[0].point, vertex(5.0, 0.0));

    // the crossing road no longer connects to anything and is pruned
    assert_eq!(report.stats.pruned_orphans, 1);
    assert!(report.edges.iter().all(|e| !report.sources(e).contains(&1)));
    let errors = report.errors.as_ref().unwrap();
    let bridge = errors.iter().find(|r| r.feature == 1).unwrap();
    assert_eq!(bridge.labels, "orphan");
    assert!(errors.iter().all(|r| r.feature != 0));
}

#[test]
fn marker_on_junction_is_reported_and_ignored() {
    let schema = FieldSchema::new(vec!["name".to_string()]);
    let road = |id, ls| InputFeature {
        id,
        geometry: Some(Geometry::LineString(ls)),
        has_z: false,
        attributes: vec![AttrValue::Text(format!("road {id}"))],
    };
    let inputs = vec![
        road(0, line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 10.0, y: 0.0)]),
        road(1, line_string![(x: 5.0, y: 0.0), (x: 5.0, y: 5.0)]),
        road(2, line_string![(x: 5.0, y: 5.0), (x: 9.0, y: 5.0)]),
    ];
    let markers = [UnlinkMarker {
        id: 0,
        point: coord! { x: 5.0, y: 0.0 },
    }];
    let cfg = CleanerConfig {
        resolve_unlinks: true,
        ..config()
    };
    let report = NetworkCleaner::new(cfg)
        .clean(&schema, &inputs, &markers)
        .unwrap()
        .finished()
        .unwrap();

    let unlinks = report.unlinks.as_ref().unwrap();
    assert!(unlinks.consumed.is_empty());
    assert_eq!(unlinks.invalid.len(), 1);
    assert_eq!(unlinks.invalid[0].problem, UnlinkProblem::EndpointContact);

    // the junction still connects all three roads
    assert_eq!(report.stats.pruned_orphans, 0);
    assert_eq!(report.stats.merged_chains, 1);
    assert_eq!(report.edges.len(), 3);
    assert_no_isolated_edges(&report);
}

#[test]
fn duplicate_copy_contributes_nothing() {
    let layer = io::layer_from_file(&fixture("duplicates.geojson")).unwrap();
    let report = run(config(), &layer, &[]);
    assert_eq!(report.stats.duplicates, 1);
    assert_eq!(report.edges.len(), 3);
    assert!(report.edges.iter().all(|e| !report.sources(e).contains(&1)));
    assert!(report.segment_sources.values().all(|s| *s != 1));
    let errors = report.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].feature, 1);
    assert_eq!(errors[0].labels, "duplicate");
}

#[test]
fn isolated_line_is_pruned() {
    let schema = FieldSchema::new(vec!["name".to_string()]);
    let inputs = vec![InputFeature {
        id: 0,
        geometry: Some(Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 3.0, y: 4.0)])),
        has_z: false,
        attributes: vec![AttrValue::Text("Lonely Lane".into())],
    }];
    let report = NetworkCleaner::new(config())
        .clean(&schema, &inputs, &[])
        .unwrap()
        .finished()
        .unwrap();
    assert_eq!(report.stats.copied_edges, 1);
    assert_eq!(report.stats.pruned_orphans, 1);
    assert!(report.edges.is_empty());
    assert_eq!(report.errors.unwrap()[0].labels, "orphan");
}

#[test]
fn cancelled_before_start() {
    let layer = io::layer_from_file(&fixture("network.geojson")).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let outcome = NetworkCleaner::new(config())
        .with_cancellation(token)
        .clean(&layer.schema, &layer.features, &[])
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled));
}

#[test]
fn cancelled_from_progress_callback() {
    let layer = io::layer_from_file(&fixture("network.geojson")).unwrap();
    let token = CancellationToken::new();
    let trigger = token.clone();
    let sink = move |p: f32| {
        if p >= 15.0 {
            trigger.cancel();
        }
    };
    let outcome = NetworkCleaner::new(config())
        .with_progress(&sink)
        .with_cancellation(token)
        .clean(&layer.schema, &layer.features, &[])
        .unwrap();
    assert!(outcome.finished().is_none());
}

#[test]
fn repeated_input_id_is_rejected() {
    let mut layer = io::layer_from_file(&fixture("network.geojson")).unwrap();
    layer.features[2].id = 0;
    let err = NetworkCleaner::new(config())
        .clean(&layer.schema, &layer.features, &[])
        .unwrap_err();
    assert!(matches!(err, CleanError::InvalidInput(_)));
    assert!(err.to_string().contains("feature id 0"));
}

#[test]
fn nothing_usable_is_fatal() {
    let layer = io::layer_from_file(&fixture("points_only.geojson")).unwrap();
    let err = NetworkCleaner::new(config())
        .clean(&layer.schema, &layer.features, &[])
        .unwrap_err();
    assert!(matches!(err, CleanError::NoUsableInput { skipped: 2 }));
}
