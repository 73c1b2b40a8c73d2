use std::fmt;

use ahash::AHashSet;
use geo::{Geometry, LineString};
use log::debug;

use crate::error::CleanError;
use crate::feature::{Arena, Attributes, FeatureId, IdGenerator, LineFeature};
use crate::geometry::{Vertex, collapse_repeats, snap_coords};

/// One record of the input feed.
#[derive(Debug, Clone)]
pub struct InputFeature {
    pub id: FeatureId,
    pub geometry: Option<Geometry<f64>>,
    /// The source carried a third coordinate that was dropped on read.
    pub has_z: bool,
    pub attributes: Attributes,
}

/// Geometry problem found while preparing an input feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defect {
    NullGeometry,
    Point,
    InvalidGeometry,
    ThreeD,
    MultiPart,
}

impl Defect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Defect::NullGeometry => "null geometry",
            Defect::Point => "point",
            Defect::InvalidGeometry => "invalid geometry",
            Defect::ThreeD => "3d",
            Defect::MultiPart => "multi-part",
        }
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct Prepared {
    pub features: Arena<LineFeature>,
    /// `(input id, defect)` in input order.
    pub defects: Vec<(FeatureId, Defect)>,
    pub skipped: usize,
    pub exploded_parts: usize,
}

fn snapped_line(
    ls: &LineString<f64>,
    precision: u32,
) -> Option<Vec<Vertex>> {
    let mut vertices = snap_coords(&ls.0, precision).ok()?;
    collapse_repeats(&mut vertices);
    (vertices.len() >= 2).then_some(vertices)
}

/// First id after the largest input id, once every input id is known unique.
pub fn next_free_id(inputs: &[InputFeature]) -> Result<FeatureId, CleanError> {
    let mut seen = AHashSet::with_capacity(inputs.len());
    for input in inputs {
        if !seen.insert(input.id) {
            return Err(CleanError::InvalidInput(format!(
                "feature id {} is used more than once",
                input.id
            )));
        }
    }
    match inputs.iter().map(|f| f.id).max() {
        None => Ok(0),
        Some(max) => max.checked_add(1).ok_or_else(|| {
            CleanError::InvalidInput(format!("feature id {max} leaves no room for new ids"))
        }),
    }
}

/// Turn raw input into snapped single-part lines.
///
/// Exploded parts take fresh ids from `ids` and remember their input id as
/// parent. Fails only when nothing usable is left.
pub fn prepare(
    inputs: &[InputFeature],
    precision: u32,
    ids: &mut IdGenerator,
) -> Result<Prepared, CleanError> {
    let mut out = Prepared::default();
    let mut lines = Vec::with_capacity(inputs.len());

    for input in inputs {
        let reject = |out: &mut Prepared, defect: Defect| {
            debug!("skipping feature {}: {}", input.id, defect);
            out.defects.push((input.id, defect));
            out.skipped += 1;
        };
        let parts: Vec<&LineString<f64>> = match &input.geometry {
            None => {
                reject(&mut out, Defect::NullGeometry);
                continue;
            }
            Some(Geometry::Point(_) | Geometry::MultiPoint(_)) => {
                reject(&mut out, Defect::Point);
                continue;
            }
            Some(Geometry::LineString(ls)) => vec![ls],
            Some(Geometry::MultiLineString(mls)) => mls.0.iter().collect(),
            Some(_) => {
                reject(&mut out, Defect::InvalidGeometry);
                continue;
            }
        };

        let mut usable: Vec<_> = parts
            .into_iter()
            .filter_map(|p| snapped_line(p, precision))
            .collect();
        if usable.is_empty() {
            reject(&mut out, Defect::InvalidGeometry);
            continue;
        }
        if input.has_z {
            out.defects.push((input.id, Defect::ThreeD));
        }

        if usable.len() == 1 {
            if let Some(vertices) = usable.pop() {
                lines.push(LineFeature::new(input.id, vertices, input.attributes.clone(), None));
            }
            continue;
        }
        out.defects.push((input.id, Defect::MultiPart));
        for vertices in usable {
            out.exploded_parts += 1;
            lines.push(LineFeature::new(
                ids.next_id(),
                vertices,
                input.attributes.clone(),
                Some(input.id),
            ));
        }
    }

    if lines.is_empty() {
        return Err(CleanError::NoUsableInput {
            skipped: out.skipped,
        });
    }
    out.features = lines.into_iter().collect();
    Ok(out)
}
