//! Graph data structures and operations.
//!
//! This module provides the dependency topology of a task set using
//! petgraph's StableGraph, plus the physics node and link records the
//! simulation operates on.

mod edge;
mod node;
mod topology;

pub use edge::PhysicsLink;
pub use node::{NodeId, NodeState, PhysicsNode};
pub use topology::{LevelAssignment, TaskGraph};
