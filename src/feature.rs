use std::collections::BTreeSet;

use geo::LineString;
use ordered_float::OrderedFloat;
use serde_json::{Map, Value};

use crate::geometry::{Bounds, Vertex, line_bounds, polyline_length, to_linestring};

pub type FeatureId = u64;

/// Single attribute value, hashable and ordered so it can live in a set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
}

impl AttrValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(b) => AttrValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttrValue::Int(i),
                None => AttrValue::Float(OrderedFloat(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => AttrValue::Text(s.clone()),
            other => AttrValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Null => Value::Null,
            AttrValue::Bool(b) => Value::Bool(*b),
            AttrValue::Int(i) => Value::from(*i),
            AttrValue::Float(f) => serde_json::Number::from_f64(f.0)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AttrValue::Text(s) => Value::String(s.clone()),
        }
    }
}

/// Attribute record, one value per schema field.
pub type Attributes = Vec<AttrValue>;

/// Attribute record of a cleaned edge: every distinct value seen per field.
pub type AttributeSet = Vec<BTreeSet<AttrValue>>;

/// Ordered field names shared by every record of a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<String>,
}

impl FieldSchema {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Add any field of `properties` not yet in the schema, keeping order.
    pub fn extend_from(&mut self, properties: &Map<String, Value>) {
        for key in properties.keys() {
            if !self.fields.iter().any(|f| f == key) {
                self.fields.push(key.clone());
            }
        }
    }

    pub fn record(&self, properties: &Map<String, Value>) -> Attributes {
        self.fields
            .iter()
            .map(|f| properties.get(f).map(AttrValue::from_json).unwrap_or(AttrValue::Null))
            .collect()
    }
}

/// A snapped, single-part input line.
#[derive(Debug, Clone)]
pub struct LineFeature {
    pub id: FeatureId,
    pub vertices: Vec<Vertex>,
    /// Float geometry of `vertices`, cached for intersection tests.
    pub line: LineString<f64>,
    pub attributes: Attributes,
    /// Set when the feature is one part of an exploded multi-part input.
    pub parent: Option<FeatureId>,
}

impl LineFeature {
    pub fn new(
        id: FeatureId,
        vertices: Vec<Vertex>,
        attributes: Attributes,
        parent: Option<FeatureId>,
    ) -> Self {
        let line = to_linestring(&vertices);
        Self {
            id,
            vertices,
            line,
            attributes,
            parent,
        }
    }

    /// Id of the input feature this line came from.
    pub fn original_id(&self) -> FeatureId {
        self.parent.unwrap_or(self.id)
    }

    pub fn first(&self) -> &Vertex {
        &self.vertices[0]
    }

    pub fn last(&self) -> &Vertex {
        &self.vertices[self.vertices.len() - 1]
    }

    pub fn is_closed(&self) -> bool {
        self.first() == self.last()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        line_bounds(&self.line)
    }

    pub fn length(&self) -> f64 {
        polyline_length(&self.line)
    }
}

/// Piece of a [`LineFeature`] between two consecutive break vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitSegment {
    pub id: FeatureId,
    pub source: FeatureId,
    pub vertices: Vec<Vertex>,
    pub attributes: Attributes,
}

impl SplitSegment {
    pub fn first(&self) -> &Vertex {
        &self.vertices[0]
    }

    pub fn last(&self) -> &Vertex {
        &self.vertices[self.vertices.len() - 1]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeOrigin {
    /// Chain of two or more segments joined through degree-2 vertices.
    Merged { segments: Vec<FeatureId> },
    /// Segment passed through unchanged.
    Copied { segment: FeatureId },
}

impl EdgeOrigin {
    pub fn segments(&self) -> Vec<FeatureId> {
        match self {
            EdgeOrigin::Merged { segments } => segments.clone(),
            EdgeOrigin::Copied { segment } => vec![*segment],
        }
    }
}

/// Edge of the cleaned network.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanEdge {
    pub id: FeatureId,
    pub vertices: Vec<Vertex>,
    pub attributes: AttributeSet,
    pub origin: EdgeOrigin,
}

impl CleanEdge {
    pub fn first(&self) -> &Vertex {
        &self.vertices[0]
    }

    pub fn last(&self) -> &Vertex {
        &self.vertices[self.vertices.len() - 1]
    }

    pub fn is_merged(&self) -> bool {
        matches!(self.origin, EdgeOrigin::Merged { .. })
    }
}

pub trait Keyed {
    fn key(&self) -> FeatureId;
}

impl Keyed for LineFeature {
    fn key(&self) -> FeatureId {
        self.id
    }
}

impl Keyed for SplitSegment {
    fn key(&self) -> FeatureId {
        self.id
    }
}

impl Keyed for CleanEdge {
    fn key(&self) -> FeatureId {
        self.id
    }
}

/// Records kept sorted by id; lookups are binary searches.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Keyed> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids come from an [`IdGenerator`] so this is normally an append.
    pub fn insert(&mut self, item: T) {
        let key = item.key();
        match self.items.last() {
            Some(last) if last.key() >= key => {
                let pos = self.items.partition_point(|i| i.key() < key);
                self.items.insert(pos, item);
            }
            _ => self.items.push(item),
        }
    }

    pub fn get(&self, id: FeatureId) -> Option<&T> {
        self.items
            .binary_search_by_key(&id, |i| i.key())
            .ok()
            .map(|pos| &self.items[pos])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Keyed> FromIterator<T> for Arena<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut items: Vec<T> = iter.into_iter().collect();
        items.sort_by_key(|i| i.key());
        Self { items }
    }
}

/// Hands out increasing ids for one cleaning run.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: FeatureId,
}

impl IdGenerator {
    pub fn starting_at(next: FeatureId) -> Self {
        Self { next }
    }

    pub fn next_id(&mut self) -> FeatureId {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn peek(&self) -> FeatureId {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seg(id: FeatureId) -> SplitSegment {
        SplitSegment {
            id,
            source: 0,
            vertices: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn arena_lookup_and_out_of_order_insert() {
        let mut arena = Arena::new();
        arena.insert(seg(4));
        arena.insert(seg(9));
        arena.insert(seg(6));
        let ids: Vec<_> = arena.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![4, 6, 9]);
        assert!(arena.get(6).is_some());
        assert!(arena.get(5).is_none());
    }

    #[test]
    fn ids_are_monotonic() {
        let mut ids = IdGenerator::starting_at(10);
        assert_eq!(ids.next_id(), 10);
        assert_eq!(ids.next_id(), 11);
        assert_eq!(ids.peek(), 12);
    }

    #[test]
    fn schema_fills_missing_fields() {
        let mut schema = FieldSchema::default();
        let a = json!({"name": "High St", "lanes": 2});
        let b = json!({"lanes": 2.5, "oneway": true});
        schema.extend_from(a.as_object().unwrap());
        schema.extend_from(b.as_object().unwrap());
        let mut names = schema.fields().to_vec();
        names.sort();
        assert_eq!(names, ["lanes", "name", "oneway"]);
        let rec = schema.record(b.as_object().unwrap());
        let at = |name: &str| {
            let i = schema.fields().iter().position(|f| f == name).unwrap();
            rec[i].clone()
        };
        assert_eq!(at("lanes"), AttrValue::Float(OrderedFloat(2.5)));
        assert_eq!(at("name"), AttrValue::Null);
        assert_eq!(at("oneway"), AttrValue::Bool(true));
    }

    #[test]
    fn attr_value_json_round() {
        let v = AttrValue::from_json(&json!([1, 2]));
        assert_eq!(v, AttrValue::Text("[1,2]".to_string()));
        assert_eq!(AttrValue::Int(3).to_json(), json!(3));
    }
}
