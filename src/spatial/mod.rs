//! Spatial indexing for neighbourhood queries.
//!
//! This module provides an R-tree based spatial index used for density
//! adaptation and hit testing on physics nodes.

mod rtree;

pub use rtree::{NodePoint, SpatialIndex};
