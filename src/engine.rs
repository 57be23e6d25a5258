//! LayoutEngine - the layout dispatcher.
//!
//! Owns everything one rendered task graph needs: the task topology, the
//! simulation, the static layouts, the performance governor and the snapshot
//! interpolator. The host drives it with [`LayoutEngine::frame`] once per
//! animation frame and receives positions through tick observers.
//!
//! Time is supplied by the caller (`now_ms`), so the engine never reads a
//! clock and behaves the same natively, under wasm and in tests.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{LayoutConfig, LayoutConfigUpdate, ValidationReport};
use crate::edges::{EdgeDescriptor, build_edges};
use crate::error::{Error, Result};
use crate::governor::{MonitorOutcome, PerformanceGovernor, PerformanceMetrics};
use crate::graph::{LevelAssignment, NodeId, PhysicsLink, PhysicsNode, TaskGraph};
use crate::layout::{LayoutMode, LayoutNode, compute_dependency_layout, compute_grid_layout};
use crate::simulation::{FocusReport, Simulation, SweepReport, TickReport};
use crate::spatial::SpatialIndex;
use crate::task::Task;
use crate::transition::{Interpolator, NodePosition, PositionSnapshot};

pub type SubscriptionId = u32;
pub type TickObserver = Box<dyn FnMut(&PositionSnapshot)>;
pub type EndObserver = Box<dyn FnMut(&SimulationSummary)>;

/// Passed to end observers when the simulation cools down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub ticks: u64,
    pub alpha: f32,
    pub node_count: usize,
}

/// What a call to [`LayoutEngine::frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing running, nothing animating.
    Idle,
    /// The next tick is not due yet.
    Deferred,
    /// One tick ran and a snapshot was emitted.
    Ticked,
    /// No tick, but a transition frame was emitted.
    Animated,
    /// The last tick cooled the simulation down.
    Ended,
}

pub struct LayoutEngine {
    config: LayoutConfig,
    mode: LayoutMode,
    graph: TaskGraph,
    /// Caller pins, kept across data updates while the node exists.
    pins: HashMap<NodeId, (f32, f32)>,
    /// Resolved nodes of the static modes, in slot order.
    static_nodes: Vec<LayoutNode>,
    levels: Option<LevelAssignment>,
    simulation: Simulation,
    governor: PerformanceGovernor,
    interpolator: Interpolator,
    edges: Vec<EdgeDescriptor>,
    focus: FocusReport,

    tick_observers: Vec<(SubscriptionId, TickObserver)>,
    end_observers: Vec<(SubscriptionId, EndObserver)>,
    next_subscription: SubscriptionId,

    running: bool,
    next_tick_at: Option<f64>,
    last_now: f64,
    last_snapshot: PositionSnapshot,
    disposed: bool,
}

impl LayoutEngine {
    /// Create an engine; fails if `config` does not validate.
    pub fn new(config: LayoutConfig) -> Result<Self> {
        let report = config.validate()?;
        log_warnings(&report);

        Ok(Self {
            governor: PerformanceGovernor::new(&config),
            config,
            mode: LayoutMode::default(),
            graph: TaskGraph::from_tasks(&[]),
            pins: HashMap::new(),
            static_nodes: Vec::new(),
            levels: None,
            simulation: Simulation::new(),
            interpolator: Interpolator::new(),
            edges: Vec::new(),
            focus: FocusReport::default(),
            tick_observers: Vec::new(),
            end_observers: Vec::new(),
            next_subscription: 0,
            running: false,
            next_tick_at: None,
            last_now: 0.0,
            last_snapshot: PositionSnapshot::default(),
            disposed: false,
        })
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Data and mode
    // =========================================================================

    /// Replace the task set.
    ///
    /// `pinned` carries positions the host wants fixed (for example restored
    /// from a previous session). Nodes surviving the update keep their
    /// simulation state.
    pub fn set_data(&mut self, tasks: &[Task], pinned: HashMap<NodeId, (f32, f32)>) -> Result<()> {
        self.ensure_live()?;
        let first_load = self.simulation.is_empty();
        let graph = TaskGraph::from_tasks(tasks);

        let mut pins: HashMap<NodeId, (f32, f32)> = self
            .pins
            .drain()
            .filter(|(id, _)| graph.slot_of(*id).is_some())
            .collect();
        for (id, position) in pinned {
            if graph.slot_of(id).is_some() {
                pins.insert(id, position);
            } else {
                debug!(node = %id, "ignoring pin for unknown node");
            }
        }
        self.pins = pins;
        self.graph = graph;

        self.governor.evaluate_node_count(self.graph.len(), &self.config);
        let quality = self.governor.quality(&self.config);
        let fresh = self
            .simulation
            .sync(&self.graph, &self.pins, &self.config, quality);
        self.focus = self
            .simulation
            .apply_focus(&self.graph, &self.pins, self.config.active_task_id, &self.config);
        self.edges = build_edges(&self.graph);

        let live = self.live_ids();
        self.interpolator.retain(&live);

        info!(
            tasks = self.graph.len(),
            relations = self.graph.relations().len(),
            dropped = self.graph.dropped_relations(),
            "task data loaded"
        );

        if self.mode.is_simulated() {
            if first_load || fresh > 0 {
                self.simulation.restart();
            } else {
                self.simulation.reheat(self.config.reheat_alpha);
            }
            self.running = true;
        } else {
            self.resolve_static();
            self.emit_snapshot(self.last_now);
        }
        Ok(())
    }

    /// Switch layout strategy.
    pub fn set_mode(&mut self, mode: LayoutMode) -> Result<()> {
        self.ensure_live()?;
        if mode == self.mode {
            return Ok(());
        }
        info!(from = ?self.mode, to = ?mode, "layout mode changed");
        if !mode.is_simulated() {
            self.halt();
        }
        self.interpolator
            .begin_transition(self.last_now, self.config.transition_duration_ms);
        self.mode = mode;

        if mode.is_simulated() {
            self.static_nodes.clear();
            self.levels = None;
            let quality = self.governor.quality(&self.config);
            self.simulation
                .sync(&self.graph, &self.pins, &self.config, quality);
            self.focus = self
                .simulation
                .apply_focus(&self.graph, &self.pins, self.config.active_task_id, &self.config);
            self.simulation.restart();
            self.running = true;
            self.next_tick_at = None;
        } else {
            self.resolve_static();
            self.emit_snapshot(self.last_now);
        }
        Ok(())
    }

    fn resolve_static(&mut self) {
        match self.mode {
            LayoutMode::Grid => {
                let nodes = compute_grid_layout(&self.graph, &self.pins, &self.config);
                self.simulation
                    .place_all(nodes.iter().enumerate().map(|(slot, n)| (slot, n.x, n.y)));
                self.static_nodes = nodes.into_iter().map(LayoutNode::Grid).collect();
                self.levels = None;
            }
            LayoutMode::DependencyGraph => {
                let layout = compute_dependency_layout(&self.graph, &self.pins, &self.config);
                self.simulation
                    .place_all(layout.nodes.iter().enumerate().map(|(slot, n)| (slot, n.x, n.y)));
                self.static_nodes = layout.nodes.into_iter().map(LayoutNode::Graph).collect();
                self.levels = Some(layout.levels);
            }
            LayoutMode::Force => {}
        }
    }

    // =========================================================================
    // Loop control
    // =========================================================================

    /// Resume ticking. A cooled-down simulation is reheated first.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_live()?;
        if !self.mode.is_simulated() {
            debug!(mode = ?self.mode, "start ignored for static layout");
            return Ok(());
        }
        if self.simulation.is_ended() {
            self.simulation.reheat(self.config.reheat_alpha);
        }
        self.running = true;
        Ok(())
    }

    /// Halt ticking, cancel the pending tick and release the worker.
    pub fn stop(&mut self) {
        self.halt();
    }

    /// Restart the simulation from full heat.
    pub fn restart(&mut self) -> Result<()> {
        self.ensure_live()?;
        if !self.mode.is_simulated() {
            return Ok(());
        }
        self.simulation.restart();
        self.running = true;
        self.next_tick_at = None;
        Ok(())
    }

    fn halt(&mut self) {
        self.running = false;
        self.next_tick_at = None;
        self.interpolator.cancel_transition();
        self.governor.shutdown();
    }

    /// Drive the engine for one animation frame at `now_ms`.
    ///
    /// Runs at most one tick, and only once the throttled tick interval has
    /// elapsed since the previous tick.
    pub fn frame(&mut self, now_ms: f64) -> FrameOutcome {
        if self.disposed {
            return FrameOutcome::Idle;
        }
        self.last_now = now_ms;
        let animating = self.interpolator.is_transitioning(now_ms);
        // a finished transition still owes the frame that lands it
        if !self.running && !self.interpolator.has_transition() {
            return FrameOutcome::Idle;
        }

        self.governor.record_frame(now_ms);
        if let Some(outcome) = self
            .governor
            .poll(now_ms, self.graph.len(), &self.config)
        {
            self.handle_monitor(outcome, now_ms);
        }

        if !self.running {
            self.emit_snapshot(now_ms);
            return FrameOutcome::Animated;
        }

        if let Some(due) = self.next_tick_at
            && now_ms < due
        {
            if animating {
                self.emit_snapshot(now_ms);
                return FrameOutcome::Animated;
            }
            return FrameOutcome::Deferred;
        }

        let report = self.advance();
        self.next_tick_at = Some(now_ms + self.governor.effective_tick_interval(&self.config));
        self.emit_snapshot(now_ms);
        if report.ended {
            self.finish();
            FrameOutcome::Ended
        } else {
            FrameOutcome::Ticked
        }
    }

    /// Step the simulation once, ignoring the throttle. Returns `None` for
    /// static layouts or once the simulation has cooled down.
    pub fn tick_once(&mut self) -> Result<Option<TickReport>> {
        self.ensure_live()?;
        if !self.mode.is_simulated() || self.simulation.is_ended() {
            return Ok(None);
        }
        let report = self.advance();
        self.emit_snapshot(self.last_now);
        if report.ended {
            self.finish();
        }
        Ok(Some(report))
    }

    /// Tick until the simulation cools down or `max_ticks` ran. Returns the
    /// number of ticks.
    pub fn run_to_completion(&mut self, max_ticks: usize) -> Result<usize> {
        let mut ticks = 0;
        while ticks < max_ticks {
            match self.tick_once()? {
                Some(report) => {
                    ticks += 1;
                    if report.ended {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(ticks)
    }

    fn advance(&mut self) -> TickReport {
        let n = self.simulation.len();
        let quality = self.governor.quality(&self.config);
        let charge = self.governor.take_worker_deltas(n, &self.config);
        let report = self
            .simulation
            .step(&self.config, quality, charge.as_deref());

        if self.governor.worker_active() {
            self.governor.submit_worker(
                self.simulation.positions(),
                self.config.charge_strength * quality.force_scale,
                self.config.charge_distance_max,
                self.simulation.alpha(),
            );
        }
        report
    }

    fn finish(&mut self) {
        self.running = false;
        self.next_tick_at = None;
        self.governor.stop_worker();

        let summary = SimulationSummary {
            ticks: self.simulation.ticks(),
            alpha: self.simulation.alpha(),
            node_count: self.simulation.len(),
        };
        info!(ticks = summary.ticks, nodes = summary.node_count, "simulation ended");
        for (_, observer) in &mut self.end_observers {
            observer(&summary);
        }
    }

    fn handle_monitor(&mut self, outcome: MonitorOutcome, now_ms: f64) {
        if outcome.emergency_entered || outcome.emergency_exited {
            let quality = self.governor.quality(&self.config);
            self.simulation
                .refresh_radii(&self.graph, &self.config, quality.smart_spacing);
        }
        if outcome.memory_optimization {
            let live = self.live_ids();
            self.interpolator.compact(&live, now_ms);
            self.simulation.shrink();
            self.edges.shrink_to_fit();
        }
    }

    // =========================================================================
    // Observers
    // =========================================================================

    fn next_id(&mut self) -> SubscriptionId {
        self.next_subscription += 1;
        self.next_subscription
    }

    /// Receive a snapshot after every tick (and every transition frame).
    pub fn subscribe_tick(&mut self, observer: impl FnMut(&PositionSnapshot) + 'static) -> Result<SubscriptionId> {
        self.ensure_live()?;
        let id = self.next_id();
        self.tick_observers.push((id, Box::new(observer)));
        Ok(id)
    }

    /// Receive a summary when the simulation cools down.
    pub fn subscribe_end(&mut self, observer: impl FnMut(&SimulationSummary) + 'static) -> Result<SubscriptionId> {
        self.ensure_live()?;
        let id = self.next_id();
        self.end_observers.push((id, Box::new(observer)));
        Ok(id)
    }

    /// Remove an observer. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.tick_observers.len() + self.end_observers.len();
        self.tick_observers.retain(|(sid, _)| *sid != id);
        self.end_observers.retain(|(sid, _)| *sid != id);
        before != self.tick_observers.len() + self.end_observers.len()
    }

    /// Emit the current positions. Jitter damping only applies while ticks
    /// keep coming; static layouts and the final tick are emitted exactly.
    fn emit_snapshot(&mut self, now_ms: f64) {
        let raw = self.raw_positions().into_iter().map(|p| (p.id, p.x, p.y));
        let settled = !self.mode.is_simulated() || !self.running || self.simulation.is_ended();
        let positions = if settled {
            self.interpolator.render_exact(raw, now_ms)
        } else {
            self.interpolator.render(
                raw,
                now_ms,
                self.config.jitter_threshold,
                self.config.smoothing_factor,
            )
        };
        let snapshot = PositionSnapshot {
            tick: self.simulation.ticks(),
            alpha: self.simulation.alpha(),
            positions,
        };
        for (_, observer) in &mut self.tick_observers {
            observer(&snapshot);
        }
        self.last_snapshot = snapshot;
    }

    // =========================================================================
    // Configuration and interaction
    // =========================================================================

    /// Apply a partial configuration change.
    ///
    /// The merged configuration is validated first; on error nothing changes.
    /// Material changes start a position transition and reheat the simulation.
    pub fn update_config(&mut self, update: &LayoutConfigUpdate) -> Result<ValidationReport> {
        self.ensure_live()?;
        let next = update.apply_to(&self.config);
        let report = match next.validate() {
            Ok(report) => report,
            Err(error) => {
                warn!(%error, "rejected configuration update");
                return Err(error);
            }
        };
        log_warnings(&report);

        let material = self.config.is_material_change(&next);
        let link_strength_changed = next.link_strength != self.config.link_strength;
        if material {
            self.interpolator
                .begin_transition(self.last_now, next.transition_duration_ms);
        }
        self.config = next;

        if link_strength_changed {
            self.simulation.set_link_strength(self.config.link_strength);
        }
        let quality = self.governor.quality(&self.config);
        self.simulation
            .refresh_radii(&self.graph, &self.config, quality.smart_spacing);
        self.focus = self
            .simulation
            .apply_focus(&self.graph, &self.pins, self.config.active_task_id, &self.config);

        if !self.mode.is_simulated() {
            self.resolve_static();
            self.emit_snapshot(self.last_now);
        } else if material {
            self.simulation.reheat(self.config.reheat_alpha);
            self.running = true;
        }
        debug!(material, "configuration updated");
        Ok(report)
    }

    fn slot(&self, id: NodeId) -> Result<usize> {
        self.graph
            .slot_of(id)
            .ok_or_else(|| Error::UnknownNode(id.to_string()))
    }

    fn nudge(&mut self) {
        if self.mode.is_simulated() {
            self.simulation.reheat(self.config.reheat_alpha);
            self.running = true;
        } else {
            self.resolve_static();
            self.emit_snapshot(self.last_now);
        }
    }

    /// Fix a node at `(x, y)`, e.g. while it is dragged.
    pub fn pin_node(&mut self, id: NodeId, x: f32, y: f32) -> Result<()> {
        self.ensure_live()?;
        let slot = self.slot(id)?;
        self.pins.insert(id, (x, y));
        self.simulation.pin(slot, x, y);
        self.nudge();
        Ok(())
    }

    /// Let a pinned node move freely again.
    pub fn release_node(&mut self, id: NodeId) -> Result<()> {
        self.ensure_live()?;
        let slot = self.slot(id)?;
        self.pins.remove(&id);
        self.simulation.release(slot);
        self.nudge();
        Ok(())
    }

    pub fn pins(&self) -> &HashMap<NodeId, (f32, f32)> {
        &self.pins
    }

    /// Focus a task (or clear focus with `None`).
    pub fn set_active_task(&mut self, task_id: Option<u32>) -> Result<FocusReport> {
        self.ensure_live()?;
        if let Some(id) = task_id
            && self.graph.slot_of(NodeId::new(id)).is_none()
        {
            return Err(Error::UnknownTask(id));
        }
        self.config.active_task_id = task_id;
        self.refocus()
    }

    /// Re-apply focus for the current active task.
    pub fn refocus(&mut self) -> Result<FocusReport> {
        self.ensure_live()?;
        self.focus = self
            .simulation
            .apply_focus(&self.graph, &self.pins, self.config.active_task_id, &self.config);
        if self.mode.is_simulated() {
            self.simulation.reheat(self.config.reheat_alpha);
            self.running = true;
        }
        Ok(self.focus.clone())
    }

    /// Heap usage reported by the host, checked at the next monitoring interval.
    pub fn record_memory_usage(&mut self, mb: f64) {
        self.governor.record_memory(mb);
    }

    /// Leave emergency mode and restore smart spacing.
    pub fn clear_emergency_mode(&mut self) -> bool {
        if !self.governor.clear_emergency() {
            return false;
        }
        let quality = self.governor.quality(&self.config);
        self.simulation
            .refresh_radii(&self.graph, &self.config, quality.smart_spacing);
        if self.mode.is_simulated() && !self.disposed {
            self.simulation.reheat(self.config.reheat_alpha);
            self.running = true;
        }
        true
    }

    /// Run the overlap sweep immediately.
    pub fn resolve_overlaps(&mut self) -> SweepReport {
        self.simulation.resolve_overlaps(&self.config)
    }

    /// Stop everything and drop every observer. The engine rejects further
    /// mutation.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.halt();
        self.tick_observers.clear();
        self.end_observers.clear();
        self.interpolator.clear();
        self.disposed = true;
        debug!("layout engine disposed");
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn alpha(&self) -> f32 {
        self.simulation.alpha()
    }

    pub fn is_emergency(&self) -> bool {
        self.governor.is_emergency()
    }

    pub fn smart_spacing_active(&self) -> bool {
        self.governor.quality(&self.config).smart_spacing
    }

    pub fn effective_tick_interval_ms(&self) -> f64 {
        self.governor.effective_tick_interval(&self.config)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tick_observers.len() + self.end_observers.len()
    }

    /// Nodes resolved for the current mode, in slot order.
    pub fn nodes(&self) -> Vec<LayoutNode> {
        if self.mode.is_simulated() {
            self.simulation
                .nodes()
                .iter()
                .cloned()
                .map(LayoutNode::Force)
                .collect()
        } else {
            self.static_nodes.clone()
        }
    }

    pub fn physics_nodes(&self) -> &[PhysicsNode] {
        self.simulation.nodes()
    }

    pub fn links(&self) -> &[PhysicsLink] {
        self.simulation.links()
    }

    pub fn edges(&self) -> &[EdgeDescriptor] {
        &self.edges
    }

    pub fn focus(&self) -> &FocusReport {
        &self.focus
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.governor.metrics(&self.config)
    }

    /// Last snapshot emitted to observers.
    pub fn snapshot(&self) -> &PositionSnapshot {
        &self.last_snapshot
    }

    /// Current positions without interpolation.
    pub fn raw_positions(&self) -> Vec<NodePosition> {
        if self.mode.is_simulated() {
            self.simulation
                .nodes()
                .iter()
                .filter_map(|n| n.position().map(|(x, y)| NodePosition { id: n.id, x, y }))
                .collect()
        } else {
            self.static_nodes
                .iter()
                .filter_map(|n| n.position().map(|(x, y)| NodePosition { id: n.id(), x, y }))
                .collect()
        }
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` of current positions.
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let positions = self.raw_positions();
        if positions.is_empty() {
            return None;
        }

        let mut min_x = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for p in &positions {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        Some((min_x, min_y, max_x, max_y))
    }

    /// Node nearest to `(x, y)` within `max_distance`.
    pub fn node_at(&self, x: f32, y: f32, max_distance: f32) -> Option<NodeId> {
        let positions = self.raw_positions();
        let index = SpatialIndex::from_points(positions.iter().enumerate().map(|(i, p)| (i, p.x, p.y)));
        index.nearest_within(x, y, max_distance).map(|i| positions[i].id)
    }

    /// Dependency levels of the current task set.
    pub fn levels(&self) -> LevelAssignment {
        self.levels.clone().unwrap_or_else(|| self.graph.levels())
    }

    fn live_ids(&self) -> HashSet<NodeId> {
        (0..self.graph.len()).map(|slot| self.graph.node_id(slot)).collect()
    }
}

fn log_warnings(report: &ValidationReport) {
    for issue in &report.warnings {
        warn!(field = issue.field, message = %issue.message, "configuration warning");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tasks(n: u32) -> Vec<Task> {
        (1..=n)
            .map(|i| {
                let task = Task::new(i, format!("Task {i}"));
                if i > 1 { task.with_dependencies([i / 2]) } else { task }
            })
            .collect()
    }

    fn engine_with(n: u32) -> LayoutEngine {
        let mut engine = LayoutEngine::new(LayoutConfig::default()).unwrap();
        engine.set_data(&tasks(n), HashMap::new()).unwrap();
        engine
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LayoutConfig {
            velocity_decay: 2.0,
            ..LayoutConfig::default()
        };
        assert!(matches!(LayoutEngine::new(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_frame_respects_tick_interval() {
        let mut engine = engine_with(5);
        assert_eq!(engine.frame(0.0), FrameOutcome::Ticked);
        assert_eq!(engine.frame(5.0), FrameOutcome::Deferred);
        assert_eq!(engine.frame(15.9), FrameOutcome::Deferred);
        assert_eq!(engine.frame(16.0), FrameOutcome::Ticked);
        assert_eq!(engine.simulation.ticks(), 2);
    }

    #[test]
    fn test_observers_receive_snapshots_until_unsubscribed() {
        let mut engine = engine_with(4);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = engine
            .subscribe_tick(move |s| sink.borrow_mut().push(s.positions.len()))
            .unwrap();

        engine.frame(0.0);
        engine.frame(20.0);
        assert_eq!(*seen.borrow(), vec![4, 4]);

        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));
        engine.frame(40.0);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_end_observer_fires_once() {
        let mut engine = engine_with(6);
        let ends = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&ends);
        engine
            .subscribe_end(move |summary| {
                assert_eq!(summary.node_count, 6);
                *sink.borrow_mut() += 1;
            })
            .unwrap();

        let ticks = engine.run_to_completion(10_000).unwrap();
        assert!(ticks > 0);
        assert!(!engine.is_running());
        assert_eq!(*ends.borrow(), 1);
        assert!(engine.tick_once().unwrap().is_none());
        assert_eq!(*ends.borrow(), 1);
    }

    #[test]
    fn test_stop_halts_and_start_resumes() {
        let mut engine = engine_with(5);
        engine.frame(0.0);
        engine.stop();
        assert_eq!(engine.frame(100.0), FrameOutcome::Idle);
        engine.start().unwrap();
        assert_eq!(engine.frame(200.0), FrameOutcome::Ticked);
    }

    #[test]
    fn test_dispose_silences_observers() {
        let mut engine = engine_with(5);
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        engine.subscribe_tick(move |_| *sink.borrow_mut() += 1).unwrap();
        engine.frame(0.0);
        engine.dispose();

        assert_eq!(engine.subscriber_count(), 0);
        assert_eq!(engine.frame(100.0), FrameOutcome::Idle);
        assert_eq!(*count.borrow(), 1);
        assert!(matches!(engine.set_data(&tasks(2), HashMap::new()), Err(Error::Disposed)));
        assert!(matches!(engine.start(), Err(Error::Disposed)));
    }

    #[test]
    fn test_rejected_update_leaves_config_untouched() {
        let mut engine = engine_with(3);
        let update = LayoutConfigUpdate {
            link_distance: Some(-10.0),
            ..LayoutConfigUpdate::default()
        };
        assert!(engine.update_config(&update).is_err());
        assert_eq!(engine.config().link_distance, 200.0);
    }

    #[test]
    fn test_material_update_transitions_snapshot() {
        let mut engine = engine_with(8);
        engine.frame(0.0);
        let update = LayoutConfigUpdate {
            link_distance: Some(400.0),
            ..LayoutConfigUpdate::default()
        };
        engine.update_config(&update).unwrap();
        assert_eq!(engine.config().link_distance, 400.0);
        assert!(engine.interpolator.is_transitioning(100.0));
        assert!(!engine.interpolator.is_transitioning(600.0));
    }

    #[test]
    fn test_link_strength_update_keeps_focus_weighting() {
        let mut engine = engine_with(7);
        engine.set_active_task(Some(1)).unwrap();
        let update = LayoutConfigUpdate {
            link_strength: Some(0.5),
            ..LayoutConfigUpdate::default()
        };
        engine.update_config(&update).unwrap();
        let active = NodeId(1);
        for link in engine.links() {
            assert_eq!(link.base_strength, 0.5);
            if link.touches(active) {
                assert!((link.strength - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_pin_and_release() {
        let mut engine = engine_with(5);
        engine.pin_node(NodeId(3), 10.0, 20.0).unwrap();
        engine.run_to_completion(50).unwrap();
        let node = &engine.physics_nodes()[2];
        assert_eq!(node.position(), Some((10.0, 20.0)));

        engine.release_node(NodeId(3)).unwrap();
        assert!(!engine.physics_nodes()[2].is_fixed());
        assert!(engine.pins().is_empty());

        assert!(matches!(engine.pin_node(NodeId(99), 0.0, 0.0), Err(Error::UnknownNode(_))));
    }

    #[test]
    fn test_pins_survive_data_updates() {
        let mut engine = engine_with(3);
        engine.pin_node(NodeId(2), 1.0, 2.0).unwrap();
        engine.set_data(&tasks(5), HashMap::new()).unwrap();
        assert_eq!(engine.pins().get(&NodeId(2)), Some(&(1.0, 2.0)));

        engine.set_data(&tasks(1), HashMap::new()).unwrap();
        assert!(engine.pins().is_empty());
    }

    #[test]
    fn test_unknown_active_task() {
        let mut engine = engine_with(3);
        assert!(matches!(engine.set_active_task(Some(42)), Err(Error::UnknownTask(42))));
        assert_eq!(engine.config().active_task_id, None);

        let report = engine.set_active_task(Some(2)).unwrap();
        assert_eq!(report.active, Some(NodeId(2)));
        let cleared = engine.set_active_task(None).unwrap();
        assert_eq!(cleared.active, None);
    }

    #[test]
    fn test_static_mode_emits_once_and_idles() {
        let mut engine = LayoutEngine::new(LayoutConfig::default()).unwrap();
        engine.set_mode(LayoutMode::Grid).unwrap();
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        engine.subscribe_tick(move |_| *sink.borrow_mut() += 1).unwrap();

        engine.set_data(&tasks(6), HashMap::new()).unwrap();
        assert_eq!(*count.borrow(), 1);
        assert!(!engine.is_running());
        assert!(engine.tick_once().unwrap().is_none());
        assert!(engine.nodes().iter().all(|n| matches!(n, LayoutNode::Grid(_))));
    }

    #[test]
    fn test_mode_switch_resolves_union() {
        let mut engine = engine_with(4);
        engine.set_mode(LayoutMode::DependencyGraph).unwrap();
        assert!(engine.nodes().iter().all(|n| n.mode() == LayoutMode::DependencyGraph));
        assert!(!engine.is_running());

        engine.set_mode(LayoutMode::Force).unwrap();
        assert!(engine.is_running());
        assert!(engine.nodes().iter().all(|n| n.mode() == LayoutMode::Force));
    }

    #[test]
    fn test_bounds_and_hit_testing() {
        let mut engine = LayoutEngine::new(LayoutConfig::default()).unwrap();
        assert_eq!(engine.bounds(), None);
        engine.set_mode(LayoutMode::Grid).unwrap();
        engine.set_data(&tasks(4), HashMap::new()).unwrap();

        let (min_x, _, max_x, _) = engine.bounds().unwrap();
        assert!(max_x > min_x);

        let first = engine.raw_positions()[0];
        assert_eq!(engine.node_at(first.x + 1.0, first.y, 10.0), Some(first.id));
        assert_eq!(engine.node_at(-10_000.0, -10_000.0, 10.0), None);
    }

    #[test]
    fn test_static_snapshot_matches_layout() {
        for mode in [LayoutMode::Grid, LayoutMode::DependencyGraph] {
            let mut engine = LayoutEngine::new(LayoutConfig::default()).unwrap();
            engine.set_mode(mode).unwrap();
            engine.set_data(&tasks(8), HashMap::new()).unwrap();
            assert_eq!(engine.snapshot().positions, engine.raw_positions(), "{mode:?} data");

            engine.pin_node(NodeId(1), 1000.0, 700.0).unwrap();
            assert_eq!(engine.snapshot().get(NodeId(1)), Some((1000.0, 700.0)));
            assert_eq!(engine.snapshot().positions, engine.raw_positions(), "{mode:?} pin");
            assert_eq!(engine.frame(100.0), FrameOutcome::Idle);
            assert_eq!(engine.frame(5000.0), FrameOutcome::Idle);
            assert_eq!(engine.snapshot().get(NodeId(1)), Some((1000.0, 700.0)));

            let update = LayoutConfigUpdate {
                node_gap: Some(200.0),
                ..LayoutConfigUpdate::default()
            };
            engine.update_config(&update).unwrap();
            assert_eq!(engine.snapshot().positions, engine.raw_positions(), "{mode:?} config");
        }
    }

    #[test]
    fn test_mode_switch_transition_lands_on_layout() {
        let mut engine = engine_with(6);
        engine.frame(0.0);
        engine.set_mode(LayoutMode::Grid).unwrap();

        assert_eq!(engine.frame(250.0), FrameOutcome::Animated);
        assert_ne!(engine.snapshot().positions, engine.raw_positions());
        assert_eq!(engine.frame(600.0), FrameOutcome::Animated);
        assert_eq!(engine.snapshot().positions, engine.raw_positions());
        assert_eq!(engine.frame(700.0), FrameOutcome::Idle);
    }

    #[test]
    fn test_final_tick_snapshot_is_exact() {
        let mut engine = engine_with(12);
        engine.run_to_completion(10_000).unwrap();
        assert!(!engine.is_running());
        assert_eq!(engine.snapshot().positions, engine.raw_positions());
    }

    #[test]
    fn test_stop_cancels_running_transition() {
        let mut engine = engine_with(5);
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        engine.subscribe_tick(move |_| *sink.borrow_mut() += 1).unwrap();

        engine.frame(0.0);
        let update = LayoutConfigUpdate {
            link_distance: Some(400.0),
            ..LayoutConfigUpdate::default()
        };
        engine.update_config(&update).unwrap();
        engine.stop();

        assert_eq!(engine.frame(100.0), FrameOutcome::Idle);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_emergency_mode_is_sticky() {
        let mut engine = engine_with(499);
        assert!(!engine.is_emergency());
        let normal = engine.effective_tick_interval_ms();

        engine.set_data(&tasks(501), HashMap::new()).unwrap();
        assert!(engine.is_emergency());
        assert!(!engine.smart_spacing_active());
        assert!(engine.effective_tick_interval_ms() >= 50.0);
        assert!(engine.effective_tick_interval_ms() > normal);

        // shrinking the graph does not leave emergency mode
        engine.set_data(&tasks(10), HashMap::new()).unwrap();
        assert!(engine.is_emergency());
        assert!(!engine.smart_spacing_active());

        assert!(engine.clear_emergency_mode());
        assert!(!engine.clear_emergency_mode());
        assert!(engine.smart_spacing_active());
        assert_eq!(engine.effective_tick_interval_ms(), normal);
        let radius = engine.physics_nodes()[0].radius;
        assert_ne!(radius, engine.config().collision_radius);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_large_graph_offloads_charge() {
        let mut engine = engine_with(320);
        engine.tick_once().unwrap();
        assert!(engine.metrics().flags.worker_offload);
        engine.tick_once().unwrap();

        engine.stop();
        assert!(!engine.metrics().flags.worker_offload);
    }

    #[test]
    fn test_memory_pressure_compacts_state() {
        let mut engine = engine_with(5);
        engine.record_memory_usage(500.0);
        let mut t = 0.0;
        while t <= 1100.0 {
            engine.frame(t);
            t += 16.0;
        }
        assert!(engine.metrics().memory_optimizations >= 1);
    }
}
