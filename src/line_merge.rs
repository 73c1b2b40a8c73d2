use std::collections::BTreeSet;

use ahash::AHashMap;
use log::{debug, warn};

use crate::error::{CleanError, Phase};
use crate::feature::{AttributeSet, CleanEdge, EdgeOrigin, FeatureId, IdGenerator, SplitSegment};
use crate::geometry::{Vertex, same_path};
use crate::progress::CancellationToken;

/// Chain walk that ran into a segment already consumed by another chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicChain {
    /// First segment of the truncated chain.
    pub start: FeatureId,
    /// Segment the walk refused to re-enter.
    pub revisited: FeatureId,
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub edges: Vec<CleanEdge>,
    /// Segments dropped as exact copies of a lower-id segment.
    pub dropped_duplicates: Vec<FeatureId>,
    pub cyclic: Vec<CyclicChain>,
}

fn endpoint_key(s: &SplitSegment) -> (Vertex, Vertex) {
    let (a, b) = (*s.first(), *s.last());
    if a <= b { (a, b) } else { (b, a) }
}

/// Remove segments that repeat a lower-id segment between the same endpoints.
fn remove_duplicate_edges(segments: &[SplitSegment]) -> (Vec<&SplitSegment>, Vec<FeatureId>) {
    let mut groups: AHashMap<(Vertex, Vertex), Vec<&SplitSegment>> = AHashMap::new();
    let mut kept = Vec::with_capacity(segments.len());
    let mut dropped = Vec::new();

    let mut ordered: Vec<&SplitSegment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.id);
    for seg in ordered {
        let group = groups.entry(endpoint_key(seg)).or_default();
        if group.iter().any(|k| same_path(&k.vertices, &seg.vertices)) {
            dropped.push(seg.id);
            continue;
        }
        group.push(seg);
        kept.push(seg);
    }
    (kept, dropped)
}

struct Walker<'a> {
    segments: Vec<&'a SplitSegment>,
    /// Endpoint vertex to the positions of the segments touching it.
    degree: AHashMap<Vertex, Vec<usize>>,
    visited: Vec<bool>,
}

impl<'a> Walker<'a> {
    fn new(segments: Vec<&'a SplitSegment>) -> Self {
        let mut degree: AHashMap<Vertex, Vec<usize>> = AHashMap::new();
        for (i, s) in segments.iter().enumerate() {
            degree.entry(*s.first()).or_default().push(i);
            degree.entry(*s.last()).or_default().push(i);
        }
        let visited = vec![false; segments.len()];
        Self {
            segments,
            degree,
            visited,
        }
    }

    fn degree_of(&self, v: &Vertex) -> usize {
        self.degree.get(v).map_or(0, |s| s.len())
    }

    fn is_pass_through(&self, v: &Vertex) -> bool {
        self.degree_of(v) == 2
    }

    /// Follow degree-2 vertices from segment `start`, entering it at `from`.
    ///
    /// Returns `(position, reversed)` pairs in traversal order and the
    /// segment the walk refused to revisit, if any.
    fn walk(&mut self, start: usize, from: Vertex) -> (Vec<(usize, bool)>, Option<usize>) {
        let mut chain = Vec::new();
        let mut current = start;
        let mut at = from;
        loop {
            self.visited[current] = true;
            let seg = self.segments[current];
            let reversed = *seg.first() != at;
            let far = if reversed { *seg.first() } else { *seg.last() };
            chain.push((current, reversed));

            let Some(touching) = self.degree.get(&far) else {
                break;
            };
            if touching.len() != 2 {
                break;
            }
            let next = if touching[0] == current {
                touching[1]
            } else {
                touching[0]
            };
            if next == current {
                break;
            }
            if self.visited[next] {
                if next != start {
                    return (chain, Some(next));
                }
                break;
            }
            at = far;
            current = next;
        }
        (chain, None)
    }
}

fn union_attributes(parts: &[&SplitSegment]) -> AttributeSet {
    let fields = parts.first().map_or(0, |p| p.attributes.len());
    (0..fields)
        .map(|i| {
            parts
                .iter()
                .filter_map(|p| p.attributes.get(i).cloned())
                .collect::<BTreeSet<_>>()
        })
        .collect()
}

fn chain_vertices(parts: &[(&SplitSegment, bool)]) -> Vec<Vertex> {
    let mut out: Vec<Vertex> = Vec::new();
    for (seg, reversed) in parts {
        let mut vs = seg.vertices.clone();
        if *reversed {
            vs.reverse();
        }
        if out.is_empty() {
            out = vs;
        } else {
            out.extend_from_slice(&vs[1..]);
        }
    }
    out
}

fn copied(seg: &SplitSegment, ids: &mut IdGenerator) -> CleanEdge {
    CleanEdge {
        id: ids.next_id(),
        vertices: seg.vertices.clone(),
        attributes: union_attributes(&[seg]),
        origin: EdgeOrigin::Copied { segment: seg.id },
    }
}

/// Collapse pass-through vertices by joining degree-2 chains into single edges.
///
/// Returns `Ok(None)` when cancelled between chains.
pub fn merge_chains(
    segments: &[SplitSegment],
    ids: &mut IdGenerator,
    cancel: &CancellationToken,
) -> Result<Option<MergeOutcome>, CleanError> {
    let (kept, dropped_duplicates) = remove_duplicate_edges(segments);
    if !dropped_duplicates.is_empty() {
        debug!("dropped {} duplicate segments", dropped_duplicates.len());
    }
    let mut walker = Walker::new(kept);
    let mut outcome = MergeOutcome {
        dropped_duplicates,
        ..Default::default()
    };

    let total = walker.segments.len();
    // Pass 1 starts at segments with a junction or dangling end; pass 2 picks
    // up rings made only of pass-through vertices.
    for ring_pass in [false, true] {
        for i in 0..total {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if walker.visited[i] {
                continue;
            }
            let seg = walker.segments[i];
            let (a, b) = (*seg.first(), *seg.last());
            let (a_through, b_through) = (walker.is_pass_through(&a), walker.is_pass_through(&b));

            let from = match (a_through, b_through) {
                (false, false) => {
                    walker.visited[i] = true;
                    outcome.edges.push(copied(seg, ids));
                    continue;
                }
                (false, true) => a,
                (true, false) => b,
                (true, true) if ring_pass => a,
                (true, true) => continue,
            };

            let (chain, revisited) = walker.walk(i, from);
            if let Some(r) = revisited {
                let cycle = CyclicChain {
                    start: seg.id,
                    revisited: walker.segments[r].id,
                };
                warn!(
                    "chain from segment {} re-entered segment {}; truncated",
                    cycle.start, cycle.revisited
                );
                outcome.cyclic.push(cycle);
            }

            let parts: Vec<(&SplitSegment, bool)> = chain
                .iter()
                .map(|&(p, rev)| (walker.segments[p], rev))
                .collect();
            if parts.len() == 1 {
                outcome.edges.push(copied(parts[0].0, ids));
                continue;
            }
            let members: Vec<&SplitSegment> = parts.iter().map(|(s, _)| *s).collect();
            let vertices = chain_vertices(&parts);
            if vertices.len() < 2 {
                return Err(CleanError::internal(
                    Phase::Merge,
                    format!("chain from segment {} produced no geometry", seg.id),
                ));
            }
            outcome.edges.push(CleanEdge {
                id: ids.next_id(),
                vertices,
                attributes: union_attributes(&members),
                origin: EdgeOrigin::Merged {
                    segments: members.iter().map(|s| s.id).collect(),
                },
            });
        }
    }

    Ok(Some(outcome))
}
