use ahash::AHashMap;
use log::debug;

use crate::feature::{CleanEdge, FeatureId};
use crate::geometry::Vertex;

/// Drop edges whose both endpoints touch no other edge.
///
/// A closed edge counts its shared endpoint twice and is never pruned.
pub fn prune_orphans(edges: Vec<CleanEdge>) -> (Vec<CleanEdge>, Vec<FeatureId>) {
    let mut occurrences: AHashMap<Vertex, usize> = AHashMap::new();
    for e in &edges {
        *occurrences.entry(*e.first()).or_default() += 1;
        *occurrences.entry(*e.last()).or_default() += 1;
    }
    let count = |v: &Vertex| occurrences.get(v).copied().unwrap_or(0);

    let (kept, pruned): (Vec<_>, Vec<_>) = edges
        .into_iter()
        .partition(|e| !(count(e.first()) == 1 && count(e.last()) == 1));
    let pruned: Vec<FeatureId> = pruned.iter().map(|e| e.id).collect();
    if !pruned.is_empty() {
        debug!("pruned {} isolated edges", pruned.len());
    }
    (kept, pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::EdgeOrigin;
    use crate::geometry::snap_coords;
    use geo::coord;

    fn edge(id: FeatureId, pts: &[(f64, f64)]) -> CleanEdge {
        let coords: Vec<_> = pts.iter().map(|&(x, y)| coord! { x: x, y: y }).collect();
        CleanEdge {
            id,
            vertices: snap_coords(&coords, 2).unwrap(),
            attributes: Vec::new(),
            origin: EdgeOrigin::Copied { segment: id },
        }
    }

    #[test]
    fn isolated_edge_is_removed() {
        let edges = vec![
            edge(1, &[(0.0, 0.0), (1.0, 0.0)]),
            edge(2, &[(1.0, 0.0), (1.0, 1.0)]),
            edge(3, &[(5.0, 5.0), (6.0, 6.0)]),
        ];
        let (kept, pruned) = prune_orphans(edges);
        assert_eq!(pruned, vec![3]);
        assert_eq!(kept.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn closed_edge_survives() {
        let edges = vec![edge(1, &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)])];
        let (kept, pruned) = prune_orphans(edges);
        assert_eq!(kept.len(), 1);
        assert!(pruned.is_empty());
    }
}
