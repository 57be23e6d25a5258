//! Frame-time history and derived performance metrics.

use std::collections::VecDeque;

use serde::Serialize;

/// Samples kept in the rolling frame-time window.
pub const FRAME_HISTORY: usize = 60;

/// Rolling window of frame durations in milliseconds.
#[derive(Debug, Clone, Default)]
pub struct FrameHistory {
    samples: VecDeque<f64>,
    last_frame_at: Option<f64>,
}

impl FrameHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(FRAME_HISTORY),
            last_frame_at: None,
        }
    }

    /// Record a frame timestamp. The first call only sets the reference point.
    pub fn record(&mut self, now_ms: f64) {
        if let Some(prev) = self.last_frame_at {
            let dt = now_ms - prev;
            if dt > 0.0 {
                if self.samples.len() == FRAME_HISTORY {
                    self.samples.pop_front();
                }
                self.samples.push_back(dt);
            }
        }
        self.last_frame_at = Some(now_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn fps(&self) -> Option<f64> {
        self.average_ms().filter(|&avg| avg > 0.0).map(|avg| 1000.0 / avg)
    }

    /// Rough CPU load estimate in percent.
    ///
    /// Frames that take as long as the budget read as fully loaded; jittery
    /// frame times push the estimate up further.
    pub fn cpu_load(&self, target_fps: f64) -> f64 {
        let Some(avg) = self.average_ms() else {
            return 0.0;
        };
        let budget = 1000.0 / target_fps.max(1.0);
        let variance = self
            .samples
            .iter()
            .map(|s| (s - avg) * (s - avg))
            .sum::<f64>()
            / self.samples.len() as f64;
        let jitter = variance.sqrt() / budget;
        ((avg / budget) * 50.0 + jitter * 50.0).clamp(0.0, 100.0)
    }

    /// Keep only the newest `keep` samples and release spare capacity.
    pub fn trim(&mut self, keep: usize) {
        while self.samples.len() > keep {
            self.samples.pop_front();
        }
        self.samples.shrink_to_fit();
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.last_frame_at = None;
    }
}

/// Which degradations are currently active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationFlags {
    /// Tick interval raised above the floor.
    pub throttled: bool,
    pub emergency_mode: bool,
    pub worker_offload: bool,
    pub smart_spacing_disabled: bool,
}

/// Snapshot of the governor's view of performance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub fps: f64,
    pub average_frame_time_ms: f64,
    pub cpu_load: f64,
    /// Last heap usage reported by the host, if any.
    pub memory_usage_mb: Option<f64>,
    pub tick_interval_ms: f64,
    pub node_count: usize,
    pub memory_optimizations: u32,
    pub flags: OptimizationFlags,
}
