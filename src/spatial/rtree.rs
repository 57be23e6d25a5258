//! R-tree based spatial index using the rstar crate.
//!
//! Rebuilt from node positions whenever a neighbourhood query is needed:
//! - Neighbour counts for density adaptation
//! - Nearest node for hit testing

use rstar::{AABB, PointDistance, RTree, RTreeObject};

/// A node position in the spatial index, keyed by node slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodePoint {
    pub slot: usize,
    pub x: f32,
    pub y: f32,
}

impl NodePoint {
    pub fn new(slot: usize, x: f32, y: f32) -> Self {
        Self { slot, x, y }
    }
}

impl RTreeObject for NodePoint {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for NodePoint {
    fn distance_2(&self, point: &[f32; 2]) -> f32 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

/// Spatial index over physics node positions.
pub struct SpatialIndex {
    tree: RTree<NodePoint>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Bulk load from `(slot, x, y)` tuples.
    pub fn from_points(points: impl IntoIterator<Item = (usize, f32, f32)>) -> Self {
        let mut index = Self::new();
        index.rebuild(points);
        index
    }

    /// Rebuild the index. Bulk loading beats incremental inserts for a full refresh.
    pub fn rebuild(&mut self, points: impl IntoIterator<Item = (usize, f32, f32)>) {
        let node_points: Vec<_> = points
            .into_iter()
            .map(|(slot, x, y)| NodePoint::new(slot, x, y))
            .collect();
        self.tree = RTree::bulk_load(node_points);
    }

    /// Find the nearest node within a maximum distance.
    pub fn nearest_within(&self, x: f32, y: f32, max_distance: f32) -> Option<usize> {
        let max_distance_sq = max_distance * max_distance;
        self.tree
            .nearest_neighbor(&[x, y])
            .filter(|point| point.distance_2(&[x, y]) <= max_distance_sq)
            .map(|point| point.slot)
    }

    /// All nodes within `radius` of a point (including a node at the point).
    pub fn in_radius(&self, x: f32, y: f32, radius: f32) -> Vec<NodePoint> {
        self.tree
            .locate_within_distance([x, y], radius * radius)
            .copied()
            .collect()
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_within() {
        let index = SpatialIndex::from_points([(0, 0.0, 0.0), (1, 10.0, 10.0)]);

        assert_eq!(index.nearest_within(0.0, 0.0, 5.0), Some(0));
        assert_eq!(index.nearest_within(5.0, 5.0, 1.0), None);
        // node 0 is ~7.07 from (5, 5)
        assert_eq!(index.nearest_within(5.0, 5.0, 8.0), Some(0));
    }

    #[test]
    fn test_in_radius() {
        let index = SpatialIndex::from_points([(0, 0.0, 0.0), (1, 3.0, 0.0), (2, 10.0, 0.0)]);

        let found: Vec<usize> = index.in_radius(0.0, 0.0, 5.0).iter().map(|p| p.slot).collect();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&0));
        assert!(found.contains(&1));
    }

    #[test]
    fn test_rebuild_and_clear() {
        let mut index = SpatialIndex::from_points([(0, 0.0, 0.0)]);
        index.rebuild([(1, 1.0, 1.0), (2, 2.0, 2.0), (3, 3.0, 3.0)]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.nearest_within(0.0, 0.0, 10.0), Some(1));

        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.nearest_within(0.0, 0.0, 10.0), None);
    }
}
