use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

use crate::feature::{FeatureId, LineFeature};
use crate::geometry::Bounds;

type Entry = GeomWithData<Rectangle<[f64; 2]>, FeatureId>;

fn entry(feature: &LineFeature) -> Option<Entry> {
    let b = feature.bounds()?;
    let rect = Rectangle::from_corners([b.min_x, b.min_y], [b.max_x, b.max_y]);
    Some(GeomWithData::new(rect, feature.id))
}

/// Bounding box index over line features.
///
/// Queries only promise box overlap; callers test real intersection.
#[derive(Default)]
pub struct SpatialIndex {
    tree: RTree<Entry>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bulk_load<'a>(features: impl IntoIterator<Item = &'a LineFeature>) -> Self {
        let items: Vec<Entry> = features.into_iter().filter_map(entry).collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    pub fn insert(&mut self, feature: &LineFeature) {
        if let Some(e) = entry(feature) {
            self.tree.insert(e);
        }
    }

    /// Ids whose boxes overlap `bounds`, ascending.
    pub fn query(&self, bounds: &Bounds) -> Vec<FeatureId> {
        let envelope = AABB::from_corners([bounds.min_x, bounds.min_y], [bounds.max_x, bounds.max_y]);
        let mut ids: Vec<FeatureId> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|e| e.data)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
