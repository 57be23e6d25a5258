//! Performance governor.
//!
//! Watches frame times and node counts and degrades the simulation when the
//! host falls behind:
//!
//! - **Throttle**: the tick interval grows while the frame rate is below 80 %
//!   of target and relaxes back towards the floor above 120 %.
//! - **Memory**: above the reported heap limit, history and scratch state are
//!   trimmed.
//! - **Emergency mode**: at the node threshold, ticks slow down, forces
//!   weaken and smart spacing turns off. Sticky until cleared.
//! - **Worker offload**: charge forces move to a background thread above the
//!   worker threshold.
//!
//! Every decision is idempotent and re-evaluated each monitoring interval.

pub mod metrics;
pub mod worker;

use tracing::{info, warn};

pub use metrics::{FRAME_HISTORY, FrameHistory, OptimizationFlags, PerformanceMetrics};
pub use worker::{ForceWorker, SCHEMA_VERSION, WorkerRequest, WorkerResponse};

use crate::config::LayoutConfig;
use crate::simulation::Quality;

const ESCALATE_FACTOR: f64 = 1.5;
const RELAX_FACTOR: f64 = 0.8;
const LOW_FPS_RATIO: f64 = 0.8;
const HIGH_FPS_RATIO: f64 = 1.2;

enum WorkerSlot {
    Untested,
    Running(ForceWorker),
    /// Available but shut down; respawned on demand.
    Stopped,
    Unavailable,
}

/// Decisions taken during one monitoring interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonitorOutcome {
    /// New throttle value when it changed.
    pub throttle: Option<f64>,
    pub memory_optimization: bool,
    pub emergency_entered: bool,
    pub emergency_exited: bool,
}

pub struct PerformanceGovernor {
    history: FrameHistory,
    last_monitor_at: Option<f64>,
    tick_interval_ms: f64,
    emergency: bool,
    healthy_intervals: u32,
    memory_mb: Option<f64>,
    memory_optimizations: u32,
    node_count: usize,
    worker: WorkerSlot,
}

impl PerformanceGovernor {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            history: FrameHistory::new(),
            last_monitor_at: None,
            tick_interval_ms: config.min_tick_interval_ms,
            emergency: false,
            healthy_intervals: 0,
            memory_mb: None,
            memory_optimizations: 0,
            node_count: 0,
            worker: WorkerSlot::Untested,
        }
    }

    pub fn record_frame(&mut self, now_ms: f64) {
        self.history.record(now_ms);
    }

    /// Heap usage reported by the host.
    pub fn record_memory(&mut self, mb: f64) {
        self.memory_mb = Some(mb);
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    /// Throttled tick interval, before emergency adjustments.
    pub fn throttle_ms(&self) -> f64 {
        self.tick_interval_ms
    }

    /// Minimum time between two ticks.
    pub fn effective_tick_interval(&self, config: &LayoutConfig) -> f64 {
        if self.emergency {
            self.tick_interval_ms.max(config.emergency_tick_interval_ms)
        } else {
            self.tick_interval_ms
        }
    }

    pub fn quality(&self, config: &LayoutConfig) -> Quality {
        if self.emergency {
            Quality {
                force_scale: config.emergency_force_scale,
                smart_spacing: false,
            }
        } else {
            Quality::full(config)
        }
    }

    /// Run the monitor if an interval has elapsed since the last run.
    pub fn poll(&mut self, now_ms: f64, node_count: usize, config: &LayoutConfig) -> Option<MonitorOutcome> {
        if !config.performance_monitoring {
            return None;
        }
        match self.last_monitor_at {
            None => {
                self.last_monitor_at = Some(now_ms);
                None
            }
            Some(last) if now_ms - last >= config.monitoring_interval_ms => {
                self.last_monitor_at = Some(now_ms);
                Some(self.monitor(node_count, config))
            }
            Some(_) => None,
        }
    }

    /// Evaluate every degradation once.
    pub fn monitor(&mut self, node_count: usize, config: &LayoutConfig) -> MonitorOutcome {
        let mut outcome = MonitorOutcome::default();
        let target = f64::from(config.target_fps);
        let fps = self.history.fps();

        if let Some(fps) = fps {
            let current = self.tick_interval_ms;
            let next = if fps < target * LOW_FPS_RATIO {
                (current * ESCALATE_FACTOR).min(config.max_tick_interval_ms)
            } else if fps > target * HIGH_FPS_RATIO && current > config.min_tick_interval_ms {
                (current * RELAX_FACTOR).max(config.min_tick_interval_ms)
            } else {
                current
            };
            if next != current {
                info!(fps, from = current, to = next, "tick interval adjusted");
                self.tick_interval_ms = next;
                outcome.throttle = Some(next);
            }
        }

        if let Some(mb) = self.memory_mb
            && mb > config.memory_limit_mb
        {
            warn!(usage_mb = mb, limit_mb = config.memory_limit_mb, "memory above limit, optimising");
            self.history.trim(FRAME_HISTORY / 4);
            self.memory_optimizations += 1;
            outcome.memory_optimization = true;
        }

        if self.evaluate_node_count(node_count, config) {
            outcome.emergency_entered = true;
        } else if self.emergency
            && let Some(required) = config.emergency_recovery_intervals
        {
            let healthy = node_count < config.emergency_node_threshold
                && fps.is_none_or(|fps| fps >= target * LOW_FPS_RATIO);
            self.healthy_intervals = if healthy { self.healthy_intervals + 1 } else { 0 };
            if self.healthy_intervals >= required {
                info!(intervals = self.healthy_intervals, "emergency mode recovered");
                self.emergency = false;
                self.healthy_intervals = 0;
                outcome.emergency_exited = true;
            }
        }

        outcome
    }

    /// Enter emergency mode when `node_count` reaches the threshold. Returns
    /// `true` only on entry.
    pub fn evaluate_node_count(&mut self, node_count: usize, config: &LayoutConfig) -> bool {
        self.node_count = node_count;
        if self.emergency || node_count < config.emergency_node_threshold {
            return false;
        }
        warn!(
            nodes = node_count,
            threshold = config.emergency_node_threshold,
            "entering emergency mode"
        );
        self.emergency = true;
        self.healthy_intervals = 0;
        true
    }

    /// Leave emergency mode. Returns whether it was active.
    pub fn clear_emergency(&mut self) -> bool {
        let was = self.emergency;
        if was {
            info!("emergency mode cleared");
        }
        self.emergency = false;
        self.healthy_intervals = 0;
        was
    }

    fn offload_wanted(node_count: usize, config: &LayoutConfig) -> bool {
        config.worker_offload && node_count > config.worker_node_threshold
    }

    pub fn worker_active(&self) -> bool {
        matches!(self.worker, WorkerSlot::Running(_))
    }

    /// Start or stop the worker to match the node count.
    fn ensure_worker(&mut self, node_count: usize, config: &LayoutConfig) {
        let wanted = Self::offload_wanted(node_count, config);
        match (&self.worker, wanted) {
            (WorkerSlot::Untested | WorkerSlot::Stopped, true) => {
                self.worker = match ForceWorker::spawn() {
                    Ok(worker) => WorkerSlot::Running(worker),
                    Err(error) => {
                        info!(%error, "worker threads unavailable, computing forces on the main thread");
                        WorkerSlot::Unavailable
                    }
                };
            }
            (WorkerSlot::Running(_), false) => self.stop_worker(),
            _ => {}
        }
    }

    /// Damped charge deltas from the worker, if a fresh result is ready.
    pub fn take_worker_deltas(&mut self, node_count: usize, config: &LayoutConfig) -> Option<Vec<[f32; 2]>> {
        self.ensure_worker(node_count, config);
        let WorkerSlot::Running(worker) = &mut self.worker else {
            return None;
        };
        let mut deltas = worker.poll(node_count)?;
        for delta in &mut deltas {
            delta[0] *= config.worker_damping;
            delta[1] *= config.worker_damping;
        }
        Some(deltas)
    }

    /// Hand the next charge computation to the worker when it is idle.
    pub fn submit_worker(&mut self, positions: Vec<[f32; 2]>, strength: f32, distance_max: f32, alpha: f32) -> bool {
        match &mut self.worker {
            WorkerSlot::Running(worker) if !worker.is_busy() => {
                worker.submit(positions, strength, distance_max, alpha)
            }
            _ => false,
        }
    }

    #[cfg(test)]
    fn wait_worker(&mut self, node_count: usize) -> Option<Vec<[f32; 2]>> {
        match &mut self.worker {
            WorkerSlot::Running(worker) => worker.wait(node_count),
            _ => None,
        }
    }

    pub fn stop_worker(&mut self) {
        if let WorkerSlot::Running(worker) = &mut self.worker {
            worker.shutdown();
            self.worker = WorkerSlot::Stopped;
        }
    }

    /// Drop frame history and the monitoring schedule (the loop stopped).
    pub fn reset_monitoring(&mut self) {
        self.history.clear();
        self.last_monitor_at = None;
    }

    /// Release everything; used on teardown.
    pub fn shutdown(&mut self) {
        self.stop_worker();
        self.reset_monitoring();
    }

    pub fn metrics(&self, config: &LayoutConfig) -> PerformanceMetrics {
        let target = f64::from(config.target_fps);
        PerformanceMetrics {
            fps: self.history.fps().unwrap_or(0.0),
            average_frame_time_ms: self.history.average_ms().unwrap_or(0.0),
            cpu_load: self.history.cpu_load(target),
            memory_usage_mb: self.memory_mb,
            tick_interval_ms: self.effective_tick_interval(config),
            node_count: self.node_count,
            memory_optimizations: self.memory_optimizations,
            flags: OptimizationFlags {
                throttled: self.effective_tick_interval(config) > config.min_tick_interval_ms,
                emergency_mode: self.emergency,
                worker_offload: self.worker_active(),
                smart_spacing_disabled: config.smart_spacing && self.emergency,
            },
        }
    }
}
