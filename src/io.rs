//! GeoJSON reading and writing for the command line front end.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, bail};
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, Point, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, Value};
use log::warn;
use serde_json::json;

use crate::diagnostics::{ErrorRecord, UnlinkReport};
use crate::feature::{FeatureId, FieldSchema};
use crate::geometry::Vertex;
use crate::input::InputFeature;
use crate::pipeline::CleanReport;
use crate::split::StubPoint;
use crate::unlink::UnlinkMarker;

/// Line layer as read from disk.
#[derive(Debug, Default)]
pub struct Layer {
    pub schema: FieldSchema,
    pub features: Vec<InputFeature>,
}

fn position(p: &[f64], has_z: &mut bool) -> anyhow::Result<Coord<f64>> {
    match p {
        [x, y] => Ok(Coord { x: *x, y: *y }),
        [x, y, ..] => {
            *has_z = true;
            Ok(Coord { x: *x, y: *y })
        }
        _ => bail!("position with {} ordinates", p.len()),
    }
}

fn positions(ps: &[Vec<f64>], has_z: &mut bool) -> anyhow::Result<Vec<Coord<f64>>> {
    ps.iter().map(|p| position(p, has_z)).collect()
}

fn polygon(rings: &[Vec<Vec<f64>>], has_z: &mut bool) -> anyhow::Result<Polygon<f64>> {
    let mut rings = rings
        .iter()
        .map(|r| positions(r, has_z).map(LineString::from))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if rings.is_empty() {
        return Ok(Polygon::new(LineString::new(Vec::new()), Vec::new()));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

/// Convert a GeoJSON geometry, noting whether any position carried Z.
fn convert(value: &Value, has_z: &mut bool) -> anyhow::Result<Geometry<f64>> {
    Ok(match value {
        Value::Point(p) => Geometry::Point(Point::from(position(p, has_z)?)),
        Value::MultiPoint(ps) => {
            Geometry::MultiPoint(MultiPoint::new(positions(ps, has_z)?.into_iter().map(Point::from).collect()))
        }
        Value::LineString(ps) => Geometry::LineString(positions(ps, has_z)?.into()),
        Value::MultiLineString(lines) => Geometry::MultiLineString(MultiLineString::new(
            lines
                .iter()
                .map(|l| positions(l, has_z).map(LineString::from))
                .collect::<anyhow::Result<_>>()?,
        )),
        Value::Polygon(rings) => Geometry::Polygon(polygon(rings, has_z)?),
        Value::MultiPolygon(polys) => Geometry::MultiPolygon(geo_types::MultiPolygon(
            polys
                .iter()
                .map(|p| polygon(p, has_z))
                .collect::<anyhow::Result<_>>()?,
        )),
        Value::GeometryCollection(parts) => Geometry::GeometryCollection(geo_types::GeometryCollection(
            parts
                .iter()
                .map(|g| convert(&g.value, has_z))
                .collect::<anyhow::Result<_>>()?,
        )),
    })
}

fn features_of(data: &str) -> anyhow::Result<Vec<Feature>> {
    Ok(match GeoJson::from_str(data)? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![Feature {
            bbox: None,
            geometry: Some(g),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    })
}

pub fn layer_from_file(path: &Path) -> anyhow::Result<Layer> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    layer_from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Parse a line layer. Feature ids are positions in the collection.
pub fn layer_from_str(data: &str) -> anyhow::Result<Layer> {
    let raw = features_of(data)?;
    let empty = JsonObject::new();
    let mut schema = FieldSchema::default();
    for f in &raw {
        schema.extend_from(f.properties.as_ref().unwrap_or(&empty));
    }

    let mut features = Vec::with_capacity(raw.len());
    for (i, f) in raw.iter().enumerate() {
        let mut has_z = false;
        let geometry = f
            .geometry
            .as_ref()
            .map(|g| convert(&g.value, &mut has_z))
            .transpose()
            .with_context(|| format!("feature {}", i))?;
        features.push(InputFeature {
            id: i as FeatureId,
            geometry,
            has_z,
            attributes: schema.record(f.properties.as_ref().unwrap_or(&empty)),
        });
    }
    Ok(Layer { schema, features })
}

pub fn markers_from_file(path: &Path) -> anyhow::Result<Vec<UnlinkMarker>> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    markers_from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Point markers; anything that is not a point is ignored.
pub fn markers_from_str(data: &str) -> anyhow::Result<Vec<UnlinkMarker>> {
    let mut markers = Vec::new();
    for (i, f) in features_of(data)?.iter().enumerate() {
        let mut has_z = false;
        match f.geometry.as_ref().map(|g| &g.value) {
            Some(Value::Point(p)) => markers.push(UnlinkMarker {
                id: i as FeatureId,
                point: position(p, &mut has_z)?,
            }),
            _ => warn!("unlink feature {} is not a point, ignored", i),
        }
    }
    Ok(markers)
}

fn position_of(v: &Vertex) -> Vec<f64> {
    let c = v.coord();
    vec![c.x, c.y]
}

fn point_feature(at: Vec<f64>, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(Value::Point(at))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> GeoJson {
    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn object(value: serde_json::Value) -> JsonObject {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

/// Cleaned edges with every field written as the array of its values.
pub fn network_to_geojson(report: &CleanReport) -> GeoJson {
    let features = report
        .edges
        .iter()
        .map(|edge| {
            let mut properties = JsonObject::new();
            for (name, values) in report.schema.fields().iter().zip(&edge.attributes) {
                properties.insert(
                    name.clone(),
                    serde_json::Value::Array(values.iter().map(|v| v.to_json()).collect()),
                );
            }
            properties.insert("_segments".to_string(), json!(edge.origin.segments()));
            properties.insert("_sources".to_string(), json!(report.sources(edge)));
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(Value::LineString(
                    edge.vertices.iter().map(position_of).collect(),
                ))),
                id: Some(geojson::feature::Id::Number(edge.id.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    collection(features)
}

/// Error records; the geometry is kept as WKT text.
pub fn errors_to_geojson(records: &[ErrorRecord]) -> GeoJson {
    let features = records
        .iter()
        .map(|r| Feature {
            bbox: None,
            geometry: None,
            id: Some(geojson::feature::Id::Number(r.feature.into())),
            properties: Some(object(json!({
                "feature": r.feature,
                "errors": r.labels,
                "wkt": r.geometry,
            }))),
            foreign_members: None,
        })
        .collect();
    collection(features)
}

pub fn unlinks_to_geojson(report: &UnlinkReport) -> GeoJson {
    let consumed = report.consumed.iter().map(|c| {
        point_feature(
            position_of(&c.point),
            object(json!({ "status": "consumed", "lines": [c.pair.0, c.pair.1] })),
        )
    });
    let invalid = report.invalid.iter().map(|i| {
        point_feature(
            vec![i.point.x, i.point.y],
            object(json!({
                "status": "invalid",
                "marker": i.marker,
                "reason": i.problem.to_string(),
            })),
        )
    });
    collection(consumed.chain(invalid).collect())
}

pub fn stubs_to_geojson(stubs: &[StubPoint]) -> GeoJson {
    let features = stubs
        .iter()
        .map(|s| {
            point_feature(
                position_of(&s.point),
                object(json!({ "feature": s.feature, "length": s.length })),
            )
        })
        .collect();
    collection(features)
}

pub fn write_geojson(path: &Path, geojson: &GeoJson) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), geojson)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::AttrValue;

    const LAYER: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "High St"},
             "geometry": {"type": "LineString", "coordinates": [[0, 0, 4], [1, 0, 5]]}},
            {"type": "Feature", "properties": {"lanes": 2}, "geometry": null},
            {"type": "Feature", "properties": {"name": "Mill Ln", "lanes": 1},
             "geometry": {"type": "MultiLineString", "coordinates": [[[0, 1], [1, 1]], [[2, 1], [3, 1]]]}}
        ]
    }"#;

    #[test]
    fn layer_reads_schema_and_geometry() {
        let layer = layer_from_str(LAYER).unwrap();
        assert_eq!(layer.schema.fields(), ["name", "lanes"]);
        assert_eq!(layer.features.len(), 3);
        assert!(layer.features[0].has_z);
        assert!(matches!(layer.features[0].geometry, Some(Geometry::LineString(_))));
        assert!(layer.features[1].geometry.is_none());
        assert_eq!(layer.features[1].attributes, vec![AttrValue::Null, AttrValue::Int(2)]);
        assert!(matches!(layer.features[2].geometry, Some(Geometry::MultiLineString(_))));
        assert_eq!(layer.features[2].id, 2);
    }

    #[test]
    fn markers_skip_non_points() {
        let data = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [5, 0]}},
            {"type": "Feature", "properties": {}, "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}}
        ]}"#;
        let markers = markers_from_str(data).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].point, Coord { x: 5.0, y: 0.0 });
    }

    #[test]
    fn bad_position_is_an_error() {
        let data = r#"{"type": "Feature", "properties": {}, "geometry": {"type": "LineString", "coordinates": [[0], [1, 1]]}}"#;
        assert!(layer_from_str(data).is_err());
    }
}
