//! Layout strategies for task graphs.
//!
//! The static strategies compute positions in a single pass; the force
//! strategy hands nodes to the [`simulation`](crate::simulation). Whatever
//! the strategy, the dispatcher resolves nodes once into a [`LayoutNode`]
//! so downstream code reads positions through one contract.

pub mod dependency;
pub mod estimate;
pub mod grid;

use serde::{Deserialize, Serialize};

pub use dependency::{DependencyLayout, GraphNode, compute_dependency_layout};
pub use estimate::estimate_node_height;
pub use grid::{GridNode, compute_grid_layout};

use crate::graph::{NodeId, PhysicsNode};

/// Selectable layout strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    Grid,
    DependencyGraph,
    #[default]
    Force,
}

impl LayoutMode {
    /// Whether the mode runs the physics simulation.
    pub fn is_simulated(self) -> bool {
        matches!(self, Self::Force)
    }
}

/// A node resolved for the active layout mode.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutNode {
    Grid(GridNode),
    Graph(GraphNode),
    Force(PhysicsNode),
}

impl LayoutNode {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Grid(n) => n.id,
            Self::Graph(n) => n.id,
            Self::Force(n) => n.id,
        }
    }

    /// Position of the node centre, `None` for a force node not yet placed.
    pub fn position(&self) -> Option<(f32, f32)> {
        match self {
            Self::Grid(n) => Some((n.x, n.y)),
            Self::Graph(n) => Some((n.x, n.y)),
            Self::Force(n) => n.position(),
        }
    }

    pub fn mode(&self) -> LayoutMode {
        match self {
            Self::Grid(_) => LayoutMode::Grid,
            Self::Graph(_) => LayoutMode::DependencyGraph,
            Self::Force(_) => LayoutMode::Force,
        }
    }
}
