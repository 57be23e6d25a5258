//! Core forces of the simulation.
//!
//! Every force adds to node velocities and is scaled by the current alpha;
//! positions only change during integration. Semantics follow the classic
//! velocity-Verlet style used by d3-force:
//!
//! - **Link**: spring towards a rest length, split between endpoints by degree
//! - **Charge**: pairwise inverse-square repulsion (negative strength repels)
//! - **Center**: weak pull of every node towards the viewport centre
//! - **Collision**: separation of overlapping radii, weighted by radius

use crate::graph::{PhysicsLink, PhysicsNode};

/// Squared distance below which charge is clamped to avoid singularities.
const CHARGE_DISTANCE_MIN_2: f32 = 1.0;

/// Upper bound on speed in px/tick; keeps pathological settings integrable.
pub const MAX_SPEED: f32 = 200.0;

/// Deterministic, tiny, non-zero displacement for coincident points.
#[inline]
pub fn jiggle(seed: usize) -> (f32, f32) {
    // golden angle spreads consecutive seeds around the circle
    let angle = seed as f32 * 2.399_963;
    (angle.cos() * 1e-3, angle.sin() * 1e-3)
}

/// Spring force along every link.
///
/// `degrees` holds the number of links per node slot; the lighter endpoint
/// moves more.
pub fn apply_link_force(
    nodes: &mut [PhysicsNode],
    links: &[PhysicsLink],
    degrees: &[u32],
    distance: f32,
    alpha: f32,
    scale: f32,
) {
    for (i, link) in links.iter().enumerate() {
        let (s, t) = (link.source_index, link.target_index);
        if s == t {
            continue;
        }
        let source = &nodes[s];
        let target = &nodes[t];

        let mut dx = target.x + target.vx - source.x - source.vx;
        let mut dy = target.y + target.vy - source.y - source.vy;
        if dx == 0.0 && dy == 0.0 {
            (dx, dy) = jiggle(i);
        }
        let len = (dx * dx + dy * dy).sqrt();
        let k = (len - distance) / len * alpha * link.strength * scale;
        dx *= k;
        dy *= k;

        let ds = degrees[s] as f32;
        let dt = degrees[t] as f32;
        let bias = if ds + dt > 0.0 { ds / (ds + dt) } else { 0.5 };

        nodes[t].vx -= dx * bias;
        nodes[t].vy -= dy * bias;
        nodes[s].vx += dx * (1.0 - bias);
        nodes[s].vy += dy * (1.0 - bias);
    }
}

/// Pairwise charge velocity deltas for `positions`.
///
/// Pure so it can run on the worker thread as well as inline.
pub fn compute_charge_deltas(
    positions: &[[f32; 2]],
    strength: f32,
    distance_max: f32,
    alpha: f32,
) -> Vec<[f32; 2]> {
    let n = positions.len();
    let mut deltas = vec![[0.0f32; 2]; n];
    let max_2 = distance_max * distance_max;

    for i in 0..n {
        for j in (i + 1)..n {
            let mut dx = positions[j][0] - positions[i][0];
            let mut dy = positions[j][1] - positions[i][1];
            if dx == 0.0 && dy == 0.0 {
                (dx, dy) = jiggle(i * n + j);
            }
            let mut l2 = dx * dx + dy * dy;
            if l2 >= max_2 {
                continue;
            }
            if l2 < CHARGE_DISTANCE_MIN_2 {
                l2 = (CHARGE_DISTANCE_MIN_2 * l2).sqrt();
            }
            let w = strength * alpha / l2;
            // i moves along +d scaled by w (away from j when w < 0), j mirrors
            deltas[i][0] += dx * w;
            deltas[i][1] += dy * w;
            deltas[j][0] -= dx * w;
            deltas[j][1] -= dy * w;
        }
    }
    deltas
}

/// Apply charge deltas (from inline computation or the worker) to velocities.
pub fn apply_velocity_deltas(nodes: &mut [PhysicsNode], deltas: &[[f32; 2]], factor: f32) {
    for (node, delta) in nodes.iter_mut().zip(deltas) {
        node.vx += delta[0] * factor;
        node.vy += delta[1] * factor;
    }
}

/// Positions of all nodes in slot order.
pub fn positions(nodes: &[PhysicsNode]) -> Vec<[f32; 2]> {
    nodes.iter().map(|n| [n.x, n.y]).collect()
}

/// Pull towards `(cx, cy)`.
pub fn apply_center_force(nodes: &mut [PhysicsNode], cx: f32, cy: f32, strength: f32, alpha: f32) {
    let k = strength * alpha;
    for node in nodes.iter_mut() {
        node.vx += (cx - node.x) * k;
        node.vy += (cy - node.y) * k;
    }
}

/// Radius-based separation on predicted positions.
pub fn apply_collision_force(nodes: &mut [PhysicsNode], strength: f32) {
    let n = nodes.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (&nodes[i], &nodes[j]);
            let r = a.radius + b.radius;
            let mut dx = a.x + a.vx - b.x - b.vx;
            let mut dy = a.y + a.vy - b.y - b.vy;
            let mut l2 = dx * dx + dy * dy;
            if l2 >= r * r {
                continue;
            }
            if l2 == 0.0 {
                (dx, dy) = jiggle(i * n + j);
                l2 = dx * dx + dy * dy;
            }
            let l = l2.sqrt();
            let k = (r - l) / l * strength;
            dx *= k;
            dy *= k;

            let ra2 = a.radius * a.radius;
            let rb2 = b.radius * b.radius;
            let share = if ra2 + rb2 > 0.0 { rb2 / (ra2 + rb2) } else { 0.5 };

            nodes[i].vx += dx * share;
            nodes[i].vy += dy * share;
            nodes[j].vx -= dx * (1.0 - share);
            nodes[j].vy -= dy * (1.0 - share);
        }
    }
}

/// Decay velocities and move free nodes; snap fixed nodes to their pins.
pub fn integrate(nodes: &mut [PhysicsNode], velocity_decay: f32) {
    let keep = 1.0 - velocity_decay;
    for node in nodes.iter_mut() {
        if node.is_fixed() {
            let x = node.fx.unwrap_or(node.x);
            let y = node.fy.unwrap_or(node.y);
            node.place(x, y);
            node.vx = 0.0;
            node.vy = 0.0;
            continue;
        }

        node.vx *= keep;
        node.vy *= keep;
        let speed = (node.vx * node.vx + node.vy * node.vy).sqrt();
        if speed > MAX_SPEED {
            let s = MAX_SPEED / speed;
            node.vx *= s;
            node.vy *= s;
        }
        let (x, y) = (node.x + node.vx, node.y + node.vy);
        node.place(x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;

    fn node(i: u32, x: f32, y: f32) -> PhysicsNode {
        let mut n = PhysicsNode::new(NodeId(i), i as usize);
        n.place(x, y);
        n.radius = 10.0;
        n
    }

    #[test]
    fn test_charge_repels() {
        let deltas = compute_charge_deltas(&[[0.0, 0.0], [10.0, 0.0]], -100.0, 1000.0, 1.0);
        assert!(deltas[0][0] < 0.0);
        assert!(deltas[1][0] > 0.0);
        assert!((deltas[0][0] + deltas[1][0]).abs() < 1e-6);
    }

    #[test]
    fn test_charge_respects_distance_max() {
        let deltas = compute_charge_deltas(&[[0.0, 0.0], [500.0, 0.0]], -100.0, 100.0, 1.0);
        assert_eq!(deltas, vec![[0.0, 0.0], [0.0, 0.0]]);
    }

    #[test]
    fn test_charge_coincident_is_finite() {
        let deltas = compute_charge_deltas(&[[5.0, 5.0], [5.0, 5.0]], -100.0, 1000.0, 1.0);
        assert!(deltas.iter().all(|d| d[0].is_finite() && d[1].is_finite()));
        assert!(deltas[0] != [0.0, 0.0]);
    }

    #[test]
    fn test_link_pulls_stretched_nodes_together() {
        let mut nodes = vec![node(1, 0.0, 0.0), node(2, 300.0, 0.0)];
        let links = vec![PhysicsLink::new(NodeId(1), NodeId(2), 0, 1, 0.5)];
        apply_link_force(&mut nodes, &links, &[1, 1], 100.0, 1.0, 1.0);
        assert!(nodes[0].vx > 0.0);
        assert!(nodes[1].vx < 0.0);
    }

    #[test]
    fn test_link_pushes_compressed_nodes_apart() {
        let mut nodes = vec![node(1, 0.0, 0.0), node(2, 20.0, 0.0)];
        let links = vec![PhysicsLink::new(NodeId(1), NodeId(2), 0, 1, 0.5)];
        apply_link_force(&mut nodes, &links, &[1, 1], 100.0, 1.0, 1.0);
        assert!(nodes[0].vx < 0.0);
        assert!(nodes[1].vx > 0.0);
    }

    #[test]
    fn test_center_pulls_inward() {
        let mut nodes = vec![node(1, 0.0, 0.0), node(2, 200.0, 200.0)];
        apply_center_force(&mut nodes, 100.0, 100.0, 0.1, 1.0);
        assert!(nodes[0].vx > 0.0 && nodes[0].vy > 0.0);
        assert!(nodes[1].vx < 0.0 && nodes[1].vy < 0.0);
    }

    #[test]
    fn test_collision_separates_overlap() {
        let mut nodes = vec![node(1, 0.0, 0.0), node(2, 5.0, 0.0)];
        apply_collision_force(&mut nodes, 1.0);
        assert!(nodes[0].vx < 0.0);
        assert!(nodes[1].vx > 0.0);
    }

    #[test]
    fn test_integrate_fixed_node_stays() {
        let mut nodes = vec![node(1, 0.0, 0.0), node(2, 50.0, 0.0)];
        nodes[0].fix_at(10.0, 10.0);
        nodes[0].vx = 30.0;
        nodes[1].vx = 10.0;
        integrate(&mut nodes, 0.4);
        assert_eq!(nodes[0].position(), Some((10.0, 10.0)));
        assert_eq!(nodes[0].vx, 0.0);
        assert!((nodes[1].x - 56.0).abs() < 1e-4);
    }

    #[test]
    fn test_integrate_caps_speed() {
        let mut nodes = vec![node(1, 0.0, 0.0)];
        nodes[0].vx = 1.0e6;
        integrate(&mut nodes, 0.0);
        assert!((nodes[0].x - MAX_SPEED).abs() < 1e-2);
    }
}
