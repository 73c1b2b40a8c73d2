use crate::breakage::BreakageResult;
use crate::feature::{FeatureId, IdGenerator, LineFeature, SplitSegment};
use crate::geometry::{Vertex, vertices_length};

/// Dangling end piece dropped by stub removal.
#[derive(Debug, Clone, PartialEq)]
pub struct StubPoint {
    pub feature: FeatureId,
    pub point: Vertex,
    pub length: f64,
}

/// Cut `feature` at its break positions.
///
/// Each consecutive pair of breaks yields one segment sharing the pair's
/// vertices; trimmed stubs are reported instead of emitted.
pub fn split_feature(
    feature: &LineFeature,
    result: &BreakageResult,
    ids: &mut IdGenerator,
) -> (Vec<SplitSegment>, Vec<StubPoint>) {
    let mut segments = Vec::new();
    let mut stubs = Vec::new();
    if result.is_duplicate() {
        return (segments, stubs);
    }

    let pieces = result.breaks.len().saturating_sub(1);
    for (n, w) in result.breaks.windows(2).enumerate() {
        let range = &feature.vertices[w[0]..=w[1]];
        if (n == 0 && result.trim_start) || (n + 1 == pieces && result.trim_end) {
            let point = if n == 0 { range[0] } else { range[range.len() - 1] };
            stubs.push(StubPoint {
                feature: feature.id,
                point,
                length: vertices_length(range),
            });
            continue;
        }
        segments.push(SplitSegment {
            id: ids.next_id(),
            source: feature.id,
            vertices: range.to_vec(),
            attributes: feature.attributes.clone(),
        });
    }
    (segments, stubs)
}
