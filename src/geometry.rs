use std::fmt;
use std::str::FromStr;

use geo::{BoundingRect, Coord, LineString};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::CleanError;

/// Largest precision accepted for snapping.
pub const MAX_PRECISION: u32 = 12;

/// A vertex snapped to a fixed number of decimal places.
///
/// Equality, ordering and hashing are exact decimal comparisons, so two
/// vertices are the same node iff their snapped text matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vertex {
    pub x: Decimal,
    pub y: Decimal,
}

impl Vertex {
    pub fn snap(coord: Coord<f64>, precision: u32) -> Result<Self, CleanError> {
        Ok(Self {
            x: snap_value(coord.x, precision)?,
            y: snap_value(coord.y, precision)?,
        })
    }

    /// Nearest float to the snapped value, so that snapping it again gives
    /// back this vertex.
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: to_f64(&self.x),
            y: to_f64(&self.y),
        }
    }
}

// Decimal's own float conversion is not correctly rounded; the std parser is.
fn to_f64(d: &Decimal) -> f64 {
    d.to_string().parse().unwrap_or(f64::NAN)
}

fn significant_digits(d: &Decimal) -> u32 {
    d.normalize()
        .mantissa()
        .unsigned_abs()
        .checked_ilog10()
        .map_or(0, |l| l + 1)
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.x, self.y)
    }
}

/// Truncate `value` to exactly `precision` decimal digits.
///
/// The float is first rendered with its shortest round-trip text so that
/// `0.3` snaps to `0.3` rather than to the binary neighbour below it.
/// Results with more than [`f64::DIGITS`] significant digits are rejected:
/// neighbouring grid values would share a float and no longer stay apart.
pub fn snap_value(value: f64, precision: u32) -> Result<Decimal, CleanError> {
    let unsnappable = || CleanError::Unsnappable { value, precision };
    if !value.is_finite() {
        return Err(unsnappable());
    }
    let mut d = Decimal::from_str(&value.to_string()).map_err(|_| unsnappable())?;
    d = d.round_dp_with_strategy(precision, RoundingStrategy::ToZero);
    d.rescale(precision);
    if significant_digits(&d) > f64::DIGITS {
        return Err(unsnappable());
    }
    Ok(d)
}

pub fn snap_coords(coords: &[Coord<f64>], precision: u32) -> Result<Vec<Vertex>, CleanError> {
    coords.iter().map(|c| Vertex::snap(*c, precision)).collect()
}

pub fn to_linestring(vertices: &[Vertex]) -> LineString<f64> {
    vertices.iter().map(|v| v.coord()).collect::<Vec<_>>().into()
}

/// Axis aligned bounding box of a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn expanded(&self, by: f64) -> Self {
        Self {
            min_x: self.min_x - by,
            min_y: self.min_y - by,
            max_x: self.max_x + by,
            max_y: self.max_y + by,
        }
    }

    pub fn around(c: Coord<f64>) -> Self {
        Self {
            min_x: c.x,
            min_y: c.y,
            max_x: c.x,
            max_y: c.y,
        }
    }
}

/// Bounds of a polyline, `None` when it has no coordinates.
pub fn line_bounds(ls: &LineString<f64>) -> Option<Bounds> {
    let rect = ls.bounding_rect()?;
    Some(Bounds {
        min_x: rect.min().x,
        min_y: rect.min().y,
        max_x: rect.max().x,
        max_y: rect.max().y,
    })
}

pub fn polyline_length(ls: &LineString<f64>) -> f64 {
    ls.lines().map(|l| l.dx().hypot(l.dy())).sum()
}

pub fn vertices_length(vertices: &[Vertex]) -> f64 {
    vertices
        .windows(2)
        .map(|w| {
            let (a, b) = (w[0].coord(), w[1].coord());
            (b.x - a.x).hypot(b.y - a.y)
        })
        .sum()
}

/// Same polyline in either direction.
pub fn same_path(a: &[Vertex], b: &[Vertex]) -> bool {
    a == b || (a.len() == b.len() && a.iter().eq(b.iter().rev()))
}

/// Drop vertices equal to their predecessor.
pub fn collapse_repeats(vertices: &mut Vec<Vertex>) {
    vertices.dedup();
}

fn coord_text(c: &Coord<f64>) -> String {
    format!("{} {}", c.x, c.y)
}

fn coords_text(coords: &[Coord<f64>]) -> String {
    coords.iter().map(coord_text).collect::<Vec<_>>().join(", ")
}

/// Well-known text of an input geometry, used in error records.
pub fn to_wkt(geom: &geo::Geometry<f64>) -> String {
    use geo::Geometry;
    match geom {
        Geometry::Point(p) => format!("POINT({})", coord_text(&p.0)),
        Geometry::MultiPoint(mp) => {
            let pts: Vec<Coord<f64>> = mp.iter().map(|p| p.0).collect();
            format!("MULTIPOINT({})", coords_text(&pts))
        }
        Geometry::Line(l) => format!("LINESTRING({})", coords_text(&[l.start, l.end])),
        Geometry::LineString(ls) => format!("LINESTRING({})", coords_text(&ls.0)),
        Geometry::MultiLineString(mls) => {
            let parts: Vec<String> = mls
                .iter()
                .map(|ls| format!("({})", coords_text(&ls.0)))
                .collect();
            format!("MULTILINESTRING({})", parts.join(", "))
        }
        Geometry::Polygon(p) => format!("POLYGON(({}))", coords_text(&p.exterior().0)),
        _ => "GEOMETRY EMPTY".to_string(),
    }
}
