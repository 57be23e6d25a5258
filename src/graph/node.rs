//! Node type and related structures.
//!
//! Each task entering the engine becomes one physics node with:
//! - A stable identifier derived from the task id (`task-<id>`)
//! - Position (x, y), undefined until first placed
//! - Velocity (vx, vy) for force simulation
//! - Optional fixed position (fx, fy) for dragged or focused nodes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stable node identifier.
///
/// Wraps the owning task id; rendered as `task-<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    const PREFIX: &'static str = "task-";

    /// Create a new NodeId from a task id.
    #[inline]
    pub fn new(task_id: u32) -> Self {
        Self(task_id)
    }

    /// Get the owning task id.
    #[inline]
    pub fn task_id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for NodeId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(Self::PREFIX)
            .and_then(|rest| rest.parse().ok())
            .map(NodeId)
            .ok_or_else(|| crate::error::Error::UnknownNode(s.to_string()))
    }
}

impl From<u32> for NodeId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Node state flags packed into a single byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeState {
    flags: u8,
}

impl NodeState {
    const PINNED: u8 = 0b0000_0001;
    const FOCUSED: u8 = 0b0000_0010;
    const ACTIVE: u8 = 0b0000_0100;

    #[inline]
    pub fn new() -> Self {
        Self { flags: 0 }
    }

    #[inline]
    fn set(&mut self, mask: u8, on: bool) {
        if on {
            self.flags |= mask;
        } else {
            self.flags &= !mask;
        }
    }

    /// Pinned by the caller (dragged or restored from the position cache).
    #[inline]
    pub fn is_pinned(self) -> bool {
        self.flags & Self::PINNED != 0
    }

    #[inline]
    pub fn set_pinned(&mut self, pinned: bool) {
        self.set(Self::PINNED, pinned);
    }

    /// Pinned at the viewport centre by the active-focus subsystem.
    #[inline]
    pub fn is_focused(self) -> bool {
        self.flags & Self::FOCUSED != 0
    }

    #[inline]
    pub fn set_focused(&mut self, focused: bool) {
        self.set(Self::FOCUSED, focused);
    }

    /// The task (or one of its subtasks) is in progress.
    #[inline]
    pub fn is_active(self) -> bool {
        self.flags & Self::ACTIVE != 0
    }

    #[inline]
    pub fn set_active(&mut self, active: bool) {
        self.set(Self::ACTIVE, active);
    }
}

/// A participant in the physics simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsNode {
    pub id: NodeId,
    /// Index of the owning task in the current task set.
    pub task_index: usize,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub fx: Option<f32>,
    pub fy: Option<f32>,
    /// Collision radius, refreshed whenever spacing parameters change.
    pub radius: f32,
    pub state: NodeState,
    placed: bool,
}

impl PhysicsNode {
    pub fn new(id: NodeId, task_index: usize) -> Self {
        Self {
            id,
            task_index,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            fx: None,
            fy: None,
            radius: 0.0,
            state: NodeState::new(),
            placed: false,
        }
    }

    /// Current position, or `None` before the node was first placed.
    pub fn position(&self) -> Option<(f32, f32)> {
        self.placed.then_some((self.x, self.y))
    }

    pub fn is_placed(&self) -> bool {
        self.placed
    }

    pub fn place(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
        self.placed = true;
    }

    pub fn is_fixed(&self) -> bool {
        self.fx.is_some() || self.fy.is_some()
    }

    /// Fix the node at `(x, y)`; it stops moving but still repels others.
    pub fn fix_at(&mut self, x: f32, y: f32) {
        self.fx = Some(x);
        self.fy = Some(y);
        self.place(x, y);
        self.vx = 0.0;
        self.vy = 0.0;
    }

    pub fn unfix(&mut self) {
        self.fx = None;
        self.fy = None;
    }
}
