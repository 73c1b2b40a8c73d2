use std::fmt;

use ahash::AHashMap;
#[allow(deprecated)]
use geo::EuclideanDistance;
use geo::{Coord, Intersects, Point};
use log::{debug, warn};

use crate::breakage::intersect;
use crate::feature::{Arena, FeatureId, LineFeature};
use crate::geometry::{Bounds, Vertex};
use crate::index::SpatialIndex;

/// User supplied point marking a crossing that is not a real connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnlinkMarker {
    pub id: FeatureId,
    pub point: Coord<f64>,
}

/// Point where a lower-id line crosses a higher-id one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlinkCandidate {
    pub point: Vertex,
    /// `(lower id, higher id)`
    pub pair: (FeatureId, FeatureId),
    /// Suppressed by a valid marker.
    pub consumed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkProblem {
    NoLines,
    SingleLine,
    TooManyLines(usize),
    NoCrossing,
    /// The lines touch at an end of one of them, which is a junction.
    EndpointContact,
    Unsnappable,
}

impl fmt::Display for UnlinkProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLines => write!(f, "no lines"),
            Self::SingleLine => write!(f, "single line"),
            Self::TooManyLines(n) => write!(f, "{n} lines"),
            Self::NoCrossing => write!(f, "lines do not cross"),
            Self::EndpointContact => write!(f, "lines meet at an endpoint"),
            Self::Unsnappable => write!(f, "invalid coordinates"),
        }
    }
}

/// Marker that does not isolate exactly two crossing lines.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidUnlink {
    pub marker: FeatureId,
    pub point: Coord<f64>,
    pub problem: UnlinkProblem,
}

/// Valid markers keyed by the line pair they separate.
#[derive(Debug, Clone, Default)]
pub struct ResolvedUnlinks {
    by_pair: AHashMap<(FeatureId, FeatureId), Vec<Vertex>>,
    pub invalid: Vec<InvalidUnlink>,
}

fn ordered(a: FeatureId, b: FeatureId) -> (FeatureId, FeatureId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl ResolvedUnlinks {
    /// Whether the connection of `a` and `b` at `point` is suppressed.
    pub fn suppresses(&self, a: FeatureId, b: FeatureId, point: &Vertex) -> bool {
        self.by_pair
            .get(&ordered(a, b))
            .is_some_and(|pts| pts.contains(point))
    }

    pub fn valid_count(&self) -> usize {
        self.by_pair.values().map(|v| v.len()).sum()
    }
}

#[allow(deprecated)]
fn touches(f: &LineFeature, p: Coord<f64>, tolerance: f64) -> bool {
    let pt = Point::from(p);
    if tolerance == 0.0 {
        f.line.intersects(&pt)
    } else {
        pt.euclidean_distance(&f.line) <= tolerance
    }
}

/// Validate markers against the indexed lines.
pub fn resolve(
    markers: &[UnlinkMarker],
    features: &Arena<LineFeature>,
    index: &SpatialIndex,
    precision: u32,
    tolerance: f64,
) -> ResolvedUnlinks {
    let mut resolved = ResolvedUnlinks::default();

    for m in markers {
        let invalid = |problem| InvalidUnlink {
            marker: m.id,
            point: m.point,
            problem,
        };
        let Ok(snapped) = Vertex::snap(m.point, precision) else {
            resolved.invalid.push(invalid(UnlinkProblem::Unsnappable));
            continue;
        };
        let at = snapped.coord();
        let search = Bounds::around(at).expanded(tolerance);
        let touched: Vec<&LineFeature> = index
            .query(&search)
            .into_iter()
            .filter_map(|id| features.get(id))
            .filter(|f| touches(f, at, tolerance))
            .collect();

        let (a, b) = match touched.as_slice() {
            [] => {
                resolved.invalid.push(invalid(UnlinkProblem::NoLines));
                continue;
            }
            [_] => {
                resolved.invalid.push(invalid(UnlinkProblem::SingleLine));
                continue;
            }
            [a, b] => (*a, *b),
            many => {
                resolved.invalid.push(invalid(UnlinkProblem::TooManyLines(many.len())));
                continue;
            }
        };

        let crossing = intersect(&a.line, &b.line)
            .points
            .into_iter()
            .filter_map(|p| Vertex::snap(p, precision).ok())
            .filter(|v| {
                if tolerance == 0.0 {
                    *v == snapped
                } else {
                    let c = v.coord();
                    (c.x - at.x).hypot(c.y - at.y) <= tolerance
                }
            })
            .min_by(|x, y| {
                let (cx, cy) = (x.coord(), y.coord());
                let dx = (cx.x - at.x).hypot(cx.y - at.y);
                let dy = (cy.x - at.x).hypot(cy.y - at.y);
                dx.total_cmp(&dy)
            });

        match crossing {
            Some(v) if [a.first(), a.last(), b.first(), b.last()].contains(&&v) => {
                resolved.invalid.push(invalid(UnlinkProblem::EndpointContact));
            }
            Some(v) => {
                debug!("unlink {} separates {} and {} at {}", m.id, a.id, b.id, v);
                resolved.by_pair.entry(ordered(a.id, b.id)).or_default().push(v);
            }
            None => resolved.invalid.push(invalid(UnlinkProblem::NoCrossing)),
        }
    }

    if !resolved.invalid.is_empty() {
        warn!("{} of {} unlink markers are invalid", resolved.invalid.len(), markers.len());
    }
    resolved
}
