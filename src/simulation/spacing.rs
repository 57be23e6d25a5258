//! Smart spacing: adaptive radii, overlap sweeps, hard separation and
//! density adaptation.
//!
//! The sweep and the separation floor are positional projections rather than
//! forces. They move nodes directly, Gauss-Seidel style, one pair at a time.

use super::forces::jiggle;
use crate::config::LayoutConfig;
use crate::graph::PhysicsNode;
use crate::spatial::SpatialIndex;
use crate::task::Task;

/// Extra distance added when projecting pairs apart, so a pair that was just
/// resolved is not flagged again because of float rounding.
const PROJECTION_SLACK: f32 = 0.5;

/// Collision radius of a task under smart spacing.
pub fn node_radius(task: &Task, connections: usize, config: &LayoutConfig) -> f32 {
    let priority = config.priority_multipliers.get(task.priority);
    let status = if task.is_active() {
        config.active_multiplier
    } else {
        1.0
    };
    let connectivity = 1.0 + config.connectivity_step * connections as f32;
    (config.base_radius * priority * status * connectivity).max(config.min_viable_radius)
}

/// Outcome of a projection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub passes: u32,
    /// Pair corrections applied across all passes.
    pub corrections: usize,
    /// Pairs still violating the check distance afterwards.
    pub remaining: usize,
}

/// Push apart every pair closer than `required(i, j)` until no pair is
/// closer than `check(i, j)`, or `max_passes` is reached.
fn project_pairs(
    nodes: &mut [PhysicsNode],
    max_passes: u32,
    required: impl Fn(&PhysicsNode, &PhysicsNode) -> f32,
    check: impl Fn(&PhysicsNode, &PhysicsNode) -> f32,
) -> SweepReport {
    let n = nodes.len();
    let mut report = SweepReport::default();

    loop {
        let remaining = count_violations(nodes, &check);
        report.remaining = remaining;
        if remaining == 0 || report.passes >= max_passes {
            return report;
        }
        report.passes += 1;

        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (&nodes[i], &nodes[j]);
                let fixed_a = a.is_fixed();
                let fixed_b = b.is_fixed();
                if fixed_a && fixed_b {
                    continue;
                }
                let target = required(a, b);
                let mut dx = b.x - a.x;
                let mut dy = b.y - a.y;
                let dist_2 = dx * dx + dy * dy;
                if dist_2 >= target * target {
                    continue;
                }
                if dist_2 == 0.0 {
                    (dx, dy) = jiggle(i * n + j);
                }
                let dist = (dx * dx + dy * dy).sqrt();
                let push = target + PROJECTION_SLACK - dist;
                let (ux, uy) = (dx / dist, dy / dist);

                let (share_a, share_b) = match (fixed_a, fixed_b) {
                    (true, _) => (0.0, 1.0),
                    (_, true) => (1.0, 0.0),
                    _ => (0.5, 0.5),
                };
                let (ax, ay) = (a.x - ux * push * share_a, a.y - uy * push * share_a);
                let (bx, by) = (b.x + ux * push * share_b, b.y + uy * push * share_b);
                nodes[i].place(ax, ay);
                nodes[j].place(bx, by);
                report.corrections += 1;
            }
        }
    }
}

fn count_violations(
    nodes: &[PhysicsNode],
    check: impl Fn(&PhysicsNode, &PhysicsNode) -> f32,
) -> usize {
    let mut count = 0;
    for (i, a) in nodes.iter().enumerate() {
        for b in &nodes[i + 1..] {
            if a.is_fixed() && b.is_fixed() {
                continue;
            }
            let limit = check(a, b);
            let dx = b.x - a.x;
            let dy = b.y - a.y;
            if dx * dx + dy * dy < limit * limit {
                count += 1;
            }
        }
    }
    count
}

/// Resolve radius overlaps.
///
/// Pairs closer than `rA + rB + margin` are separated; passes repeat until
/// no pair is closer than `rA + rB`.
pub fn overlap_sweep(nodes: &mut [PhysicsNode], margin: f32, max_passes: u32) -> SweepReport {
    project_pairs(
        nodes,
        max_passes,
        |a, b| a.radius + b.radius + margin,
        |a, b| a.radius + b.radius,
    )
}

/// Number of pairs whose radii overlap. Pairs of two fixed nodes are ignored.
pub fn count_overlaps(nodes: &[PhysicsNode]) -> usize {
    count_violations(nodes, |a, b| a.radius + b.radius)
}

/// Enforce the hard centre-to-centre floor for up to `passes` passes.
pub fn enforce_min_separation(nodes: &mut [PhysicsNode], min_separation: f32, passes: u32) -> SweepReport {
    project_pairs(nodes, passes, |_, _| min_separation, |_, _| min_separation)
}

/// Extra repulsion for nodes with more than `threshold` neighbours inside
/// `radius`.
pub fn apply_density_force(
    nodes: &mut [PhysicsNode],
    index: &SpatialIndex,
    radius: f32,
    threshold: usize,
    strength: f32,
    alpha: f32,
) {
    if radius <= 0.0 {
        return;
    }
    for slot in 0..nodes.len() {
        let (x, y) = (nodes[slot].x, nodes[slot].y);
        let neighbours: Vec<_> = index
            .in_radius(x, y, radius)
            .into_iter()
            .filter(|p| p.slot != slot)
            .collect();
        if neighbours.len() <= threshold {
            continue;
        }
        let excess = (neighbours.len() - threshold) as f32;
        let k = strength * excess * alpha;

        let node = &mut nodes[slot];
        for other in neighbours {
            let mut dx = x - other.x;
            let mut dy = y - other.y;
            if dx == 0.0 && dy == 0.0 {
                (dx, dy) = jiggle(slot + other.slot);
            }
            let dist = (dx * dx + dy * dy).sqrt();
            let falloff = 1.0 - (dist / radius).min(1.0);
            node.vx += dx / dist * k * falloff;
            node.vy += dy / dist * k * falloff;
        }
    }
}
