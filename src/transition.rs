//! Position smoothing for emitted snapshots.
//!
//! Two layers sit between physics and the renderer. Neither touches the
//! physics state:
//!
//! 1. [`JitterFilter`] blends large single-frame moves with the previously
//!    emitted position.
//! 2. [`PositionTransition`] animates from a captured snapshot to the live
//!    positions after a material configuration change, eased with
//!    [`ease_out_cubic`] over wall-clock time.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::graph::NodeId;

/// Ease-out cubic: fast start, gentle landing. `t` is clamped to `[0, 1]`.
#[inline]
pub fn ease_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// One emitted node position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodePosition {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
}

/// Positions emitted to observers after one tick or frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    pub tick: u64,
    pub alpha: f32,
    pub positions: Vec<NodePosition>,
}

impl PositionSnapshot {
    pub fn get(&self, id: NodeId) -> Option<(f32, f32)> {
        self.positions.iter().find(|p| p.id == id).map(|p| (p.x, p.y))
    }

    /// `[x0, y0, x1, y1, ...]` in snapshot order.
    pub fn interleaved(&self) -> Vec<f32> {
        self.positions.iter().flat_map(|p| [p.x, p.y]).collect()
    }
}

/// Damps large frame-to-frame moves.
#[derive(Debug, Clone, Default)]
pub struct JitterFilter {
    previous: HashMap<NodeId, (f32, f32)>,
}

impl JitterFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filtered position for `id`. Moves longer than `threshold` keep only
    /// `factor` of the step.
    pub fn smooth(&mut self, id: NodeId, x: f32, y: f32, threshold: f32, factor: f32) -> (f32, f32) {
        let out = match self.previous.get(&id) {
            Some(&(px, py)) => {
                let (dx, dy) = (x - px, y - py);
                if (dx * dx + dy * dy).sqrt() > threshold {
                    (px + dx * factor, py + dy * factor)
                } else {
                    (x, y)
                }
            }
            None => (x, y),
        };
        self.previous.insert(id, out);
        out
    }

    /// Record an emitted position without filtering.
    pub fn remember(&mut self, id: NodeId, x: f32, y: f32) {
        self.previous.insert(id, (x, y));
    }

    pub fn previous(&self, id: NodeId) -> Option<(f32, f32)> {
        self.previous.get(&id).copied()
    }

    /// Forget nodes that are gone.
    pub fn retain(&mut self, live: &HashSet<NodeId>) {
        self.previous.retain(|id, _| live.contains(id));
    }

    pub fn clear(&mut self) {
        self.previous.clear();
    }

    pub fn len(&self) -> usize {
        self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }
}

/// An eased move from captured positions to live ones.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionTransition {
    from: HashMap<NodeId, (f32, f32)>,
    started_at_ms: f64,
    duration_ms: f64,
}

impl PositionTransition {
    pub fn new(from: HashMap<NodeId, (f32, f32)>, started_at_ms: f64, duration_ms: f64) -> Self {
        Self {
            from,
            started_at_ms,
            duration_ms,
        }
    }

    /// Eased progress in `[0, 1]`.
    pub fn progress(&self, now_ms: f64) -> f32 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        let t = ((now_ms - self.started_at_ms) / self.duration_ms) as f32;
        ease_out_cubic(t)
    }

    pub fn is_complete(&self, now_ms: f64) -> bool {
        now_ms - self.started_at_ms >= self.duration_ms
    }

    /// Interpolated position of `id` heading for `(x, y)`. Nodes without a
    /// captured start go straight to their target.
    pub fn position(&self, id: NodeId, x: f32, y: f32, now_ms: f64) -> (f32, f32) {
        match self.from.get(&id) {
            Some(&(fx, fy)) => {
                let p = self.progress(now_ms);
                (fx + (x - fx) * p, fy + (y - fy) * p)
            }
            None => (x, y),
        }
    }
}

/// Snapshot renderer: transition if one is running, jitter damping otherwise.
#[derive(Debug, Clone, Default)]
pub struct Interpolator {
    jitter: JitterFilter,
    transition: Option<PositionTransition>,
}

impl Interpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transition from the positions emitted last.
    pub fn begin_transition(&mut self, now_ms: f64, duration_ms: f64) {
        if duration_ms <= 0.0 || self.jitter.is_empty() {
            self.transition = None;
            return;
        }
        let from = self.jitter.previous.clone();
        self.transition = Some(PositionTransition::new(from, now_ms, duration_ms));
    }

    pub fn is_transitioning(&self, now_ms: f64) -> bool {
        self.transition.as_ref().is_some_and(|t| !t.is_complete(now_ms))
    }

    /// Produce display positions for `(id, x, y)` physics positions.
    pub fn render(
        &mut self,
        positions: impl IntoIterator<Item = (NodeId, f32, f32)>,
        now_ms: f64,
        threshold: f32,
        factor: f32,
    ) -> Vec<NodePosition> {
        if self.transition.as_ref().is_some_and(|t| t.is_complete(now_ms)) {
            self.transition = None;
        }
        positions
            .into_iter()
            .map(|(id, x, y)| {
                let (x, y) = match &self.transition {
                    Some(transition) => {
                        let (tx, ty) = transition.position(id, x, y, now_ms);
                        self.jitter.remember(id, tx, ty);
                        (tx, ty)
                    }
                    None => self.jitter.smooth(id, x, y, threshold, factor),
                };
                NodePosition { id, x, y }
            })
            .collect()
    }

    /// Like [`render`](Self::render) but without jitter damping: outside a
    /// transition the given positions are emitted as they are. Used for one-off
    /// layouts that no later frame would correct.
    pub fn render_exact(
        &mut self,
        positions: impl IntoIterator<Item = (NodeId, f32, f32)>,
        now_ms: f64,
    ) -> Vec<NodePosition> {
        if self.transition.as_ref().is_some_and(|t| t.is_complete(now_ms)) {
            self.transition = None;
        }
        positions
            .into_iter()
            .map(|(id, x, y)| {
                let (x, y) = match &self.transition {
                    Some(transition) => transition.position(id, x, y, now_ms),
                    None => (x, y),
                };
                self.jitter.remember(id, x, y);
                NodePosition { id, x, y }
            })
            .collect()
    }

    /// A transition exists, possibly finished but not yet rendered at its end.
    pub fn has_transition(&self) -> bool {
        self.transition.is_some()
    }

    /// Abandon the running transition where it is.
    pub fn cancel_transition(&mut self) {
        self.transition = None;
    }

    /// Drop state for nodes that no longer exist.
    pub fn retain(&mut self, live: &HashSet<NodeId>) {
        self.jitter.retain(live);
        if let Some(transition) = &mut self.transition {
            transition.from.retain(|id, _| live.contains(id));
        }
    }

    /// Memory optimisation: forget finished transitions and stale entries.
    pub fn compact(&mut self, live: &HashSet<NodeId>, now_ms: f64) {
        if !self.is_transitioning(now_ms) {
            self.transition = None;
        }
        self.retain(live);
        self.jitter.previous.shrink_to_fit();
    }

    pub fn clear(&mut self) {
        self.jitter.clear();
        self.transition = None;
    }
}
