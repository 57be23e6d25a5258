//! Link type for the physics simulation.
//!
//! One link exists per dependency relation. Each link has:
//! - Source (the dependency) and target (the dependent task) node IDs
//! - Node slot indices for O(1) access during force calculation
//! - Nominal and effective spring strength

use std::fmt;

use super::node::NodeId;

/// A dependency spring between two physics nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsLink {
    pub source: NodeId,
    pub target: NodeId,
    /// Slot of `source` in the node list.
    pub source_index: usize,
    /// Slot of `target` in the node list.
    pub target_index: usize,
    /// Strength before focus weighting.
    pub base_strength: f32,
    /// Strength used by the link force.
    pub strength: f32,
}

impl PhysicsLink {
    pub fn new(
        source: NodeId,
        target: NodeId,
        source_index: usize,
        target_index: usize,
        strength: f32,
    ) -> Self {
        Self {
            source,
            target,
            source_index,
            target_index,
            base_strength: strength,
            strength,
        }
    }

    /// Whether `id` is one of the endpoints.
    #[inline]
    pub fn touches(&self, id: NodeId) -> bool {
        self.source == id || self.target == id
    }

    /// Reset the effective strength to nominal.
    #[inline]
    pub fn reset_strength(&mut self) {
        self.strength = self.base_strength;
    }
}

impl fmt::Display for PhysicsLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}
