//! Force-directed simulation.
//!
//! A discrete-time integrator over [`PhysicsNode`]s. Each [`Simulation::step`]:
//!
//! 1. cools `alpha` towards `alpha_target`
//! 2. accumulates velocities from link, charge, center and collision forces
//!    (plus density and cluster forces under smart spacing)
//! 3. integrates positions
//! 4. projects pairs apart (separation floor, periodic overlap sweep)
//!
//! Once alpha reaches `alpha_min` the simulation ends with a settle pass.

pub mod cluster;
pub mod focus;
pub mod forces;
pub mod spacing;

use std::collections::HashMap;
use std::f32::consts::PI;

use tracing::{debug, trace};

pub use cluster::{Cluster, ClusterKey, build_clusters};
pub use focus::FocusReport;
pub use spacing::{SweepReport, count_overlaps};

use crate::config::LayoutConfig;
use crate::graph::{NodeId, PhysicsLink, PhysicsNode, TaskGraph};
use crate::spatial::SpatialIndex;

/// Golden angle, used for phyllotaxis seeding.
const SEED_ANGLE: f32 = PI * 0.763_932; // π(3 − √5)

/// Degradation knobs set by the performance governor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quality {
    /// Multiplier applied to every force.
    pub force_scale: f32,
    pub smart_spacing: bool,
}

impl Quality {
    pub fn full(config: &LayoutConfig) -> Self {
        Self {
            force_scale: 1.0,
            smart_spacing: config.smart_spacing,
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub alpha: f32,
    pub ended: bool,
    /// Present on ticks that ran the overlap sweep.
    pub sweep: Option<SweepReport>,
}

/// Simulation state for one task set.
pub struct Simulation {
    nodes: Vec<PhysicsNode>,
    links: Vec<PhysicsLink>,
    /// Link count per slot, for link bias.
    degrees: Vec<u32>,
    clusters: Vec<Cluster>,
    index: SpatialIndex,
    alpha: f32,
    ticks: u64,
    ended: bool,
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            links: Vec::new(),
            degrees: Vec::new(),
            clusters: Vec::new(),
            index: SpatialIndex::new(),
            alpha: 1.0,
            ticks: 0,
            ended: false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[PhysicsNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[PhysicsLink] {
        &self.links
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Current positions in slot order.
    pub fn positions(&self) -> Vec<[f32; 2]> {
        forces::positions(&self.nodes)
    }

    /// Rebuild nodes and links for `graph`.
    ///
    /// Nodes whose id survives keep position and velocity; new nodes are
    /// seeded next to a surviving neighbour or on a spiral around the centre.
    /// Returns the number of new nodes.
    pub fn sync(
        &mut self,
        graph: &TaskGraph,
        pins: &HashMap<NodeId, (f32, f32)>,
        config: &LayoutConfig,
        quality: Quality,
    ) -> usize {
        let mut previous: HashMap<NodeId, PhysicsNode> =
            self.nodes.drain(..).map(|node| (node.id, node)).collect();

        let mut nodes = Vec::with_capacity(graph.len());
        let mut fresh = Vec::new();
        for slot in 0..graph.len() {
            let id = graph.node_id(slot);
            let node = match previous.remove(&id) {
                Some(mut node) => {
                    node.task_index = slot;
                    node.state.set_focused(false);
                    node.state.set_pinned(false);
                    node.unfix();
                    node
                }
                None => {
                    fresh.push(slot);
                    PhysicsNode::new(id, slot)
                }
            };
            nodes.push(node);
        }
        self.nodes = nodes;

        let unit = seed_unit(config);
        let (cx, cy) = config.center();
        for &slot in &fresh {
            let anchor = graph
                .neighbors(slot)
                .into_iter()
                .filter_map(|n| self.nodes[n].position())
                .next();
            let angle = slot as f32 * SEED_ANGLE;
            let (x, y) = match anchor {
                Some((ax, ay)) => (ax + unit * angle.cos(), ay + unit * angle.sin()),
                None => {
                    let r = unit * (0.5 + slot as f32).sqrt();
                    (cx + r * angle.cos(), cy + r * angle.sin())
                }
            };
            self.nodes[slot].place(x, y);
        }

        for (slot, node) in self.nodes.iter_mut().enumerate() {
            node.state.set_active(graph.task(slot).is_active());
            if let Some(&(x, y)) = pins.get(&node.id) {
                node.fix_at(x, y);
                node.state.set_pinned(true);
            }
        }

        self.links = graph
            .relations()
            .iter()
            .map(|&(s, t)| PhysicsLink::new(graph.node_id(s), graph.node_id(t), s, t, config.link_strength))
            .collect();
        self.degrees = graph.degrees();
        self.clusters = build_clusters(graph);
        self.refresh_radii(graph, config, quality.smart_spacing);

        debug!(
            nodes = self.nodes.len(),
            links = self.links.len(),
            fresh = fresh.len(),
            clusters = self.clusters.len(),
            "simulation synced"
        );
        fresh.len()
    }

    /// Recompute collision radii from the task set.
    pub fn refresh_radii(&mut self, graph: &TaskGraph, config: &LayoutConfig, smart_spacing: bool) {
        for (slot, node) in self.nodes.iter_mut().enumerate() {
            node.radius = if smart_spacing {
                spacing::node_radius(graph.task(slot), graph.connection_count(slot), config)
            } else {
                config.collision_radius
            };
        }
    }

    /// Change the nominal strength of every link.
    pub fn set_link_strength(&mut self, strength: f32) {
        for link in &mut self.links {
            link.base_strength = strength;
            link.reset_strength();
        }
    }

    pub fn apply_focus(
        &mut self,
        graph: &TaskGraph,
        pins: &HashMap<NodeId, (f32, f32)>,
        active: Option<u32>,
        config: &LayoutConfig,
    ) -> FocusReport {
        focus::apply_focus(&mut self.nodes, &mut self.links, graph, pins, active, config)
    }

    /// Fix a node at a caller-chosen position. A focused node stays focused
    /// and keeps its centre pin.
    pub fn pin(&mut self, slot: usize, x: f32, y: f32) {
        let node = &mut self.nodes[slot];
        node.state.set_pinned(true);
        if !node.state.is_focused() {
            node.fix_at(x, y);
        }
    }

    pub fn release(&mut self, slot: usize) {
        let node = &mut self.nodes[slot];
        node.state.set_pinned(false);
        if !node.state.is_focused() {
            node.unfix();
        }
    }

    /// Move nodes to externally computed positions (static layouts).
    pub fn place_all(&mut self, positions: impl IntoIterator<Item = (usize, f32, f32)>) {
        for (slot, x, y) in positions {
            let node = &mut self.nodes[slot];
            if !node.is_fixed() {
                node.place(x, y);
                node.vx = 0.0;
                node.vy = 0.0;
            }
        }
    }

    /// Raise alpha to at least `alpha` and resume.
    pub fn reheat(&mut self, alpha: f32) {
        self.alpha = self.alpha.max(alpha);
        self.ended = false;
    }

    pub fn restart(&mut self) {
        self.alpha = 1.0;
        self.ended = false;
    }

    /// Advance one tick.
    ///
    /// `charge` carries precomputed, already damped charge deltas (from the
    /// worker); when absent or stale the charge force is computed inline.
    pub fn step(&mut self, config: &LayoutConfig, quality: Quality, charge: Option<&[[f32; 2]]>) -> TickReport {
        self.ticks += 1;
        self.alpha += (config.alpha_target - self.alpha) * config.alpha_decay;
        let alpha = self.alpha;
        let scale = quality.force_scale;
        let n = self.nodes.len();

        forces::apply_link_force(
            &mut self.nodes,
            &self.links,
            &self.degrees,
            config.link_distance,
            alpha,
            scale,
        );

        match charge {
            Some(deltas) if deltas.len() == n => forces::apply_velocity_deltas(&mut self.nodes, deltas, 1.0),
            _ => {
                let deltas = forces::compute_charge_deltas(
                    &self.positions(),
                    config.charge_strength * scale,
                    config.charge_distance_max,
                    alpha,
                );
                forces::apply_velocity_deltas(&mut self.nodes, &deltas, 1.0);
            }
        }

        let (cx, cy) = config.center();
        forces::apply_center_force(&mut self.nodes, cx, cy, config.center_strength * scale, alpha);
        forces::apply_collision_force(&mut self.nodes, config.collision_strength * scale);

        if quality.smart_spacing {
            self.index
                .rebuild(self.nodes.iter().enumerate().map(|(slot, n)| (slot, n.x, n.y)));
            spacing::apply_density_force(
                &mut self.nodes,
                &self.index,
                config.density_radius,
                config.density_threshold,
                config.density_strength * scale,
                alpha,
            );
            if config.clustering {
                cluster::apply_cluster_force(
                    &mut self.nodes,
                    &self.clusters,
                    (cx, cy),
                    config.cluster_spread,
                    config.cluster_strength * scale,
                    alpha,
                );
            }
        }

        forces::integrate(&mut self.nodes, config.velocity_decay);

        if quality.smart_spacing {
            spacing::enforce_min_separation(&mut self.nodes, config.min_node_separation, 1);
        }

        let interval = if n > config.sweep_node_threshold {
            u64::from(config.sweep_interval.max(1))
        } else {
            1
        };
        let sweep = (self.ticks % interval == 0).then(|| self.resolve_overlaps(config));

        if alpha <= config.alpha_min {
            self.ended = true;
            self.settle(config, quality);
            debug!(ticks = self.ticks, "simulation cooled down");
        }

        trace!(tick = self.ticks, alpha, "tick");
        TickReport {
            tick: self.ticks,
            alpha,
            ended: self.ended,
            sweep,
        }
    }

    /// Run the overlap sweep now.
    pub fn resolve_overlaps(&mut self, config: &LayoutConfig) -> SweepReport {
        let report = spacing::overlap_sweep(&mut self.nodes, config.detection_margin, config.max_sweep_passes);
        if report.remaining > 0 {
            debug!(remaining = report.remaining, passes = report.passes, "overlap sweep hit its pass limit");
        }
        report
    }

    /// Final cleanup when the simulation ends: overlap sweep, then the
    /// separation floor with the full settle budget.
    pub fn settle(&mut self, config: &LayoutConfig, quality: Quality) {
        self.resolve_overlaps(config);
        if quality.smart_spacing {
            let report = spacing::enforce_min_separation(
                &mut self.nodes,
                config.min_node_separation,
                config.separation_settle_passes,
            );
            debug!(passes = report.passes, remaining = report.remaining, "separation settled");
        }
    }

    /// Drop scratch buffers (memory optimisation).
    pub fn shrink(&mut self) {
        self.index.clear();
        self.nodes.shrink_to_fit();
        self.links.shrink_to_fit();
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

/// Spiral spacing for seeding, tied to the spacing the layout will enforce.
fn seed_unit(config: &LayoutConfig) -> f32 {
    (config.min_node_separation / 2.0)
        .max(config.collision_radius)
        .max(10.0)
}
