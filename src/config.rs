//! Layout configuration.
//!
//! A `LayoutConfig` is owned by exactly one engine. It only changes through
//! [`LayoutEngine::update_config`](crate::engine::LayoutEngine::update_config),
//! which validates a [`LayoutConfigUpdate`] against a copy and applies it only
//! when no errors were found.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigIssue, Error, Result};
use crate::task::Priority;

/// Collision radius multipliers per task priority.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PriorityMultipliers {
    pub high: f32,
    pub medium: f32,
    pub low: f32,
}

impl PriorityMultipliers {
    pub fn get(&self, priority: Priority) -> f32 {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

impl Default for PriorityMultipliers {
    fn default() -> Self {
        Self {
            high: 1.3,
            medium: 1.1,
            low: 0.9,
        }
    }
}

/// All tunable constants of one layout engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    // --- viewport ---
    pub width: f32,
    pub height: f32,

    // --- simulation core ---
    /// Simulation stops once alpha drops below this value.
    pub alpha_min: f32,
    /// Fraction of the distance to `alpha_target` covered per tick.
    pub alpha_decay: f32,
    pub alpha_target: f32,
    /// Alpha a running simulation is reheated to after data/config changes.
    pub reheat_alpha: f32,
    /// Fraction of velocity lost per tick.
    pub velocity_decay: f32,
    pub link_distance: f32,
    pub link_strength: f32,
    /// Negative values repel.
    pub charge_strength: f32,
    pub charge_distance_max: f32,
    pub center_strength: f32,
    /// Fixed collision radius used when smart spacing is off.
    pub collision_radius: f32,
    pub collision_strength: f32,

    // --- active focus ---
    pub active_task_id: Option<u32>,
    pub focus_strength: f32,
    pub neighbor_focus_strength: f32,

    // --- smart spacing ---
    pub smart_spacing: bool,
    pub base_radius: f32,
    pub min_viable_radius: f32,
    pub priority_multipliers: PriorityMultipliers,
    pub active_multiplier: f32,
    /// Radius growth per dependency or dependent.
    pub connectivity_step: f32,
    pub min_node_separation: f32,
    pub detection_margin: f32,
    /// Sweep cadence in ticks once the node count exceeds `sweep_node_threshold`.
    pub sweep_interval: u32,
    pub sweep_node_threshold: usize,
    pub max_sweep_passes: u32,
    pub separation_settle_passes: u32,
    pub density_radius: f32,
    pub density_threshold: usize,
    pub density_strength: f32,
    pub clustering: bool,
    pub cluster_strength: f32,
    pub cluster_spread: f32,

    // --- performance governor ---
    pub target_fps: f32,
    pub performance_monitoring: bool,
    pub monitoring_interval_ms: f64,
    /// Throttle floor (60fps).
    pub min_tick_interval_ms: f64,
    pub max_tick_interval_ms: f64,
    pub memory_limit_mb: f64,
    pub emergency_node_threshold: usize,
    pub emergency_tick_interval_ms: f64,
    /// Multiplier applied to every force while in emergency mode.
    pub emergency_force_scale: f32,
    /// Consecutive healthy intervals after which emergency mode clears itself.
    /// `None` keeps emergency mode until it is cleared explicitly.
    pub emergency_recovery_intervals: Option<u32>,
    pub worker_offload: bool,
    pub worker_node_threshold: usize,
    /// Damping applied to worker force deltas before they touch velocities.
    pub worker_damping: f32,

    // --- interpolation ---
    pub jitter_threshold: f32,
    pub smoothing_factor: f32,
    pub transition_duration_ms: f64,

    // --- static layouts ---
    pub node_width: f32,
    pub node_gap: f32,
    pub margin: f32,
    pub level_spacing: f32,
    pub row_spacing: f32,
    pub overlap_shift: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 1400.0,
            height: 800.0,

            alpha_min: 0.001,
            alpha_decay: 0.0228,
            alpha_target: 0.0,
            reheat_alpha: 0.3,
            velocity_decay: 0.4,
            link_distance: 200.0,
            link_strength: 0.3,
            charge_strength: -800.0,
            charge_distance_max: 1200.0,
            center_strength: 0.05,
            collision_radius: 80.0,
            collision_strength: 0.8,

            active_task_id: None,
            focus_strength: 2.0,
            neighbor_focus_strength: 1.5,

            smart_spacing: true,
            base_radius: 70.0,
            min_viable_radius: 40.0,
            priority_multipliers: PriorityMultipliers::default(),
            active_multiplier: 1.3,
            connectivity_step: 0.1,
            min_node_separation: 180.0,
            detection_margin: 10.0,
            sweep_interval: 10,
            sweep_node_threshold: 50,
            max_sweep_passes: 200,
            separation_settle_passes: 300,
            density_radius: 150.0,
            density_threshold: 5,
            density_strength: 0.5,
            clustering: true,
            cluster_strength: 0.05,
            cluster_spread: 150.0,

            target_fps: 60.0,
            performance_monitoring: true,
            monitoring_interval_ms: 1000.0,
            min_tick_interval_ms: 16.0,
            max_tick_interval_ms: 100.0,
            memory_limit_mb: 150.0,
            emergency_node_threshold: 500,
            emergency_tick_interval_ms: 50.0,
            emergency_force_scale: 0.5,
            emergency_recovery_intervals: None,
            worker_offload: true,
            worker_node_threshold: 300,
            worker_damping: 0.8,

            jitter_threshold: 10.0,
            smoothing_factor: 0.3,
            transition_duration_ms: 500.0,

            node_width: 280.0,
            node_gap: 40.0,
            margin: 40.0,
            level_spacing: 350.0,
            row_spacing: 160.0,
            overlap_shift: 20.0,
        }
    }
}

/// Warnings produced by a successful validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub warnings: Vec<ConfigIssue>,
}

impl LayoutConfig {
    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Check every field. Errors make the configuration unusable; warnings
    /// are returned alongside a usable configuration.
    pub fn validate(&self) -> Result<ValidationReport> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let finite = [
            ("width", self.width),
            ("height", self.height),
            ("alpha_min", self.alpha_min),
            ("alpha_decay", self.alpha_decay),
            ("alpha_target", self.alpha_target),
            ("reheat_alpha", self.reheat_alpha),
            ("velocity_decay", self.velocity_decay),
            ("link_distance", self.link_distance),
            ("link_strength", self.link_strength),
            ("charge_strength", self.charge_strength),
            ("charge_distance_max", self.charge_distance_max),
            ("center_strength", self.center_strength),
            ("collision_radius", self.collision_radius),
            ("collision_strength", self.collision_strength),
            ("focus_strength", self.focus_strength),
            ("neighbor_focus_strength", self.neighbor_focus_strength),
            ("base_radius", self.base_radius),
            ("min_viable_radius", self.min_viable_radius),
            ("min_node_separation", self.min_node_separation),
            ("density_strength", self.density_strength),
            ("cluster_strength", self.cluster_strength),
            ("jitter_threshold", self.jitter_threshold),
            ("smoothing_factor", self.smoothing_factor),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                errors.push(ConfigIssue::new(field, "must be a finite number"));
            }
        }

        if self.width <= 0.0 {
            errors.push(ConfigIssue::new("width", "must be positive"));
        }
        if self.height <= 0.0 {
            errors.push(ConfigIssue::new("height", "must be positive"));
        }
        if !(self.alpha_decay > 0.0 && self.alpha_decay <= 1.0) {
            errors.push(ConfigIssue::new("alpha_decay", "must be in (0, 1]"));
        }
        if !(self.alpha_min > 0.0 && self.alpha_min < 1.0) {
            errors.push(ConfigIssue::new("alpha_min", "must be in (0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.alpha_target) {
            errors.push(ConfigIssue::new("alpha_target", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.reheat_alpha) {
            errors.push(ConfigIssue::new("reheat_alpha", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.velocity_decay) {
            errors.push(ConfigIssue::new("velocity_decay", "must be in [0, 1]"));
        }

        let non_negative = [
            ("link_distance", self.link_distance),
            ("link_strength", self.link_strength),
            ("charge_distance_max", self.charge_distance_max),
            ("center_strength", self.center_strength),
            ("collision_radius", self.collision_radius),
            ("collision_strength", self.collision_strength),
            ("min_viable_radius", self.min_viable_radius),
            ("min_node_separation", self.min_node_separation),
            ("detection_margin", self.detection_margin),
            ("density_radius", self.density_radius),
            ("density_strength", self.density_strength),
            ("cluster_strength", self.cluster_strength),
            ("cluster_spread", self.cluster_spread),
            ("jitter_threshold", self.jitter_threshold),
            ("node_gap", self.node_gap),
            ("margin", self.margin),
            ("overlap_shift", self.overlap_shift),
        ];
        for (field, value) in non_negative {
            if value < 0.0 {
                errors.push(ConfigIssue::new(field, "must not be negative"));
            }
        }

        let positive = [
            ("base_radius", self.base_radius),
            ("focus_strength", self.focus_strength),
            ("neighbor_focus_strength", self.neighbor_focus_strength),
            ("active_multiplier", self.active_multiplier),
            ("priority_multipliers.high", self.priority_multipliers.high),
            ("priority_multipliers.medium", self.priority_multipliers.medium),
            ("priority_multipliers.low", self.priority_multipliers.low),
            ("target_fps", self.target_fps),
            ("node_width", self.node_width),
            ("level_spacing", self.level_spacing),
            ("row_spacing", self.row_spacing),
        ];
        for (field, value) in positive {
            if value <= 0.0 {
                errors.push(ConfigIssue::new(field, "must be positive"));
            }
        }

        if self.connectivity_step < 0.0 {
            errors.push(ConfigIssue::new("connectivity_step", "must not be negative"));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            errors.push(ConfigIssue::new("smoothing_factor", "must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.worker_damping) {
            errors.push(ConfigIssue::new("worker_damping", "must be in [0, 1]"));
        }
        if !(self.emergency_force_scale > 0.0 && self.emergency_force_scale <= 1.0) {
            errors.push(ConfigIssue::new("emergency_force_scale", "must be in (0, 1]"));
        }
        if self.monitoring_interval_ms <= 0.0 {
            errors.push(ConfigIssue::new("monitoring_interval_ms", "must be positive"));
        }
        if self.min_tick_interval_ms < 0.0 {
            errors.push(ConfigIssue::new("min_tick_interval_ms", "must not be negative"));
        }
        if self.max_tick_interval_ms < self.min_tick_interval_ms {
            errors.push(ConfigIssue::new(
                "max_tick_interval_ms",
                "must not be below min_tick_interval_ms",
            ));
        }
        if self.emergency_tick_interval_ms < 0.0 {
            errors.push(ConfigIssue::new("emergency_tick_interval_ms", "must not be negative"));
        }
        if self.memory_limit_mb <= 0.0 {
            errors.push(ConfigIssue::new("memory_limit_mb", "must be positive"));
        }
        if self.transition_duration_ms < 0.0 {
            errors.push(ConfigIssue::new("transition_duration_ms", "must not be negative"));
        }
        if self.sweep_interval == 0 {
            errors.push(ConfigIssue::new("sweep_interval", "must be at least 1"));
        }
        if self.max_sweep_passes == 0 {
            errors.push(ConfigIssue::new("max_sweep_passes", "must be at least 1"));
        }
        if self.emergency_node_threshold == 0 {
            errors.push(ConfigIssue::new("emergency_node_threshold", "must be at least 1"));
        }

        if self.charge_strength > 0.0 {
            warnings.push(ConfigIssue::new(
                "charge_strength",
                "positive charge attracts nodes towards each other",
            ));
        }
        if self.link_strength > 1.0 {
            warnings.push(ConfigIssue::new("link_strength", "values above 1 may oscillate"));
        }
        if self.center_strength > 1.0 {
            warnings.push(ConfigIssue::new("center_strength", "values above 1 may oscillate"));
        }
        if self.density_threshold == 0 {
            warnings.push(ConfigIssue::new(
                "density_threshold",
                "zero applies density repulsion to every node",
            ));
        }
        if self.min_node_separation > self.width.min(self.height) {
            warnings.push(ConfigIssue::new(
                "min_node_separation",
                "larger than the viewport; nodes will spill outside it",
            ));
        }
        if self.transition_duration_ms == 0.0 {
            warnings.push(ConfigIssue::new(
                "transition_duration_ms",
                "zero disables configuration transitions",
            ));
        }
        if self.min_tick_interval_ms > 1000.0 / f64::from(self.target_fps.max(1.0)) {
            warnings.push(ConfigIssue::new(
                "min_tick_interval_ms",
                "throttle floor is slower than the target frame rate",
            ));
        }

        if errors.is_empty() {
            Ok(ValidationReport { warnings })
        } else {
            Err(Error::InvalidConfig(errors))
        }
    }

    /// Whether switching from `self` to `other` changes simulation output
    /// enough to warrant a visual transition.
    pub fn is_material_change(&self, other: &LayoutConfig) -> bool {
        const EPS: f32 = 1e-4;
        let pairs = [
            (self.width, other.width),
            (self.height, other.height),
            (self.link_distance, other.link_distance),
            (self.link_strength, other.link_strength),
            (self.charge_strength, other.charge_strength),
            (self.center_strength, other.center_strength),
            (self.collision_radius, other.collision_radius),
            (self.base_radius, other.base_radius),
            (self.min_node_separation, other.min_node_separation),
            (self.cluster_spread, other.cluster_spread),
            (self.node_width, other.node_width),
            (self.level_spacing, other.level_spacing),
            (self.row_spacing, other.row_spacing),
        ];
        pairs.iter().any(|(a, b)| (a - b).abs() > EPS)
            || self.smart_spacing != other.smart_spacing
            || self.clustering != other.clustering
            || self.priority_multipliers != other.priority_multipliers
    }
}

/// Decodes a present field as `Some`, so an explicit `null` becomes
/// `Some(None)` instead of collapsing into "field absent".
fn present_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

macro_rules! config_update {
    ($($(#[$attr:meta])* $field:ident: $ty:ty),* $(,)?) => {
        /// A partial configuration change. `None` fields are left untouched.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default, rename_all = "camelCase")]
        pub struct LayoutConfigUpdate {
            $($(#[$attr])* pub $field: Option<$ty>,)*
        }

        impl LayoutConfigUpdate {
            /// Return a copy of `base` with every present field replaced.
            pub fn apply_to(&self, base: &LayoutConfig) -> LayoutConfig {
                let mut next = base.clone();
                $(
                    if let Some(value) = &self.$field {
                        next.$field = value.clone();
                    }
                )*
                next
            }

            pub fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())*
            }
        }
    };
}

config_update! {
    width: f32,
    height: f32,
    alpha_min: f32,
    alpha_decay: f32,
    alpha_target: f32,
    reheat_alpha: f32,
    velocity_decay: f32,
    link_distance: f32,
    link_strength: f32,
    charge_strength: f32,
    charge_distance_max: f32,
    center_strength: f32,
    collision_radius: f32,
    collision_strength: f32,
    focus_strength: f32,
    neighbor_focus_strength: f32,
    smart_spacing: bool,
    base_radius: f32,
    min_viable_radius: f32,
    priority_multipliers: PriorityMultipliers,
    active_multiplier: f32,
    connectivity_step: f32,
    min_node_separation: f32,
    detection_margin: f32,
    sweep_interval: u32,
    sweep_node_threshold: usize,
    max_sweep_passes: u32,
    separation_settle_passes: u32,
    density_radius: f32,
    density_threshold: usize,
    density_strength: f32,
    clustering: bool,
    cluster_strength: f32,
    cluster_spread: f32,
    target_fps: f32,
    performance_monitoring: bool,
    monitoring_interval_ms: f64,
    min_tick_interval_ms: f64,
    max_tick_interval_ms: f64,
    memory_limit_mb: f64,
    emergency_node_threshold: usize,
    emergency_tick_interval_ms: f64,
    emergency_force_scale: f32,
    /// `null` switches automatic recovery off again.
    #[serde(deserialize_with = "present_option")]
    emergency_recovery_intervals: Option<u32>,
    worker_offload: bool,
    worker_node_threshold: usize,
    worker_damping: f32,
    jitter_threshold: f32,
    smoothing_factor: f32,
    transition_duration_ms: f64,
    node_width: f32,
    node_gap: f32,
    margin: f32,
    level_spacing: f32,
    row_spacing: f32,
    overlap_shift: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let report = LayoutConfig::default().validate().unwrap();
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_decay_out_of_range_rejected() {
        let config = LayoutConfig {
            alpha_decay: 0.0,
            ..LayoutConfig::default()
        };
        match config.validate() {
            Err(Error::InvalidConfig(issues)) => {
                assert!(issues.iter().any(|i| i.field == "alpha_decay"));
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }

        let config = LayoutConfig {
            alpha_decay: 1.5,
            ..LayoutConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_distance_rejected() {
        let config = LayoutConfig {
            link_distance: -1.0,
            min_node_separation: -5.0,
            ..LayoutConfig::default()
        };
        let Err(Error::InvalidConfig(issues)) = config.validate() else {
            panic!("expected errors");
        };
        assert!(issues.iter().any(|i| i.field == "link_distance"));
        assert!(issues.iter().any(|i| i.field == "min_node_separation"));
    }

    #[test]
    fn test_nan_rejected() {
        let config = LayoutConfig {
            charge_strength: f32::NAN,
            ..LayoutConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_positive_charge_warns() {
        let config = LayoutConfig {
            charge_strength: 50.0,
            ..LayoutConfig::default()
        };
        let report = config.validate().unwrap();
        assert!(report.warnings.iter().any(|w| w.field == "charge_strength"));
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let base = LayoutConfig::default();
        let update = LayoutConfigUpdate {
            link_distance: Some(320.0),
            smart_spacing: Some(false),
            ..LayoutConfigUpdate::default()
        };
        assert!(!update.is_empty());
        let next = update.apply_to(&base);
        assert_eq!(next.link_distance, 320.0);
        assert!(!next.smart_spacing);
        assert_eq!(next.charge_strength, base.charge_strength);
        assert!(base.is_material_change(&next));
    }

    #[test]
    fn test_zero_sweep_passes_rejected() {
        let config = LayoutConfig {
            max_sweep_passes: 0,
            ..LayoutConfig::default()
        };
        let Err(Error::InvalidConfig(issues)) = config.validate() else {
            panic!("expected errors");
        };
        assert!(issues.iter().any(|i| i.field == "max_sweep_passes"));
    }

    #[test]
    fn test_null_recovery_intervals_turns_recovery_off() {
        use serde::de::value::{Error as ValueError, MapDeserializer};

        let base = LayoutConfig {
            emergency_recovery_intervals: Some(3),
            ..LayoutConfig::default()
        };

        let null = MapDeserializer::<_, ValueError>::new(vec![("emergencyRecoveryIntervals", ())].into_iter());
        let update = LayoutConfigUpdate::deserialize(null).unwrap();
        assert_eq!(update.emergency_recovery_intervals, Some(None));
        assert_eq!(update.apply_to(&base).emergency_recovery_intervals, None);

        let absent = MapDeserializer::<_, ValueError>::new(Vec::<(&str, ())>::new().into_iter());
        let update = LayoutConfigUpdate::deserialize(absent).unwrap();
        assert!(update.is_empty());
        assert_eq!(update.apply_to(&base).emergency_recovery_intervals, Some(3));
    }

    #[test]
    fn test_cosmetic_change_is_not_material() {
        let base = LayoutConfig::default();
        let next = LayoutConfigUpdate {
            monitoring_interval_ms: Some(500.0),
            ..LayoutConfigUpdate::default()
        }
        .apply_to(&base);
        assert!(!base.is_material_change(&next));
    }
}
