//! Synchronization engine configuration
//!
//! Policy values for substepping, sleeping and outgoing update throttling.
//! Can be loaded from a TOML file; missing keys fall back to the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{invalid_config, ConfigErrorContext, SyncResult};
use crate::physics::{
    ANGULAR_SLEEPING_THRESHOLD, DEACTIVATION_TIME, FIXED_SUBSTEP, LINEAR_SLEEPING_THRESHOLD,
    MAX_SUBSTEPS,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Duration of one simulation substep in seconds
    pub fixed_substep: f32,
    /// Upper bound on substeps per tick
    pub max_substeps: u32,
    /// Minimum frames between two updates for the same entity
    pub min_send_interval_frames: u32,
    /// Active objects are re-sent at least this often, in seconds
    pub max_update_period: f32,
    /// Spacing between the repeated updates of a resting object, in seconds
    pub non_moving_update_period: f32,
    /// How many updates a resting object sends before going quiet
    pub max_non_moving_updates: u32,
    /// Squared position error (m²) that triggers an update
    pub max_position_error_squared: f32,
    /// Rotation agreement below which an update is sent
    pub min_rotation_dot: f32,
    pub linear_sleeping_threshold: f32,
    pub angular_sleeping_threshold: f32,
    /// Seconds below the sleeping thresholds before a body sleeps
    pub deactivation_time: f32,
    /// World position of the simulation origin
    pub origin_offset: [f32; 3],
    /// Optional floor plane height, in simulation coordinates
    pub floor_height: Option<f32>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fixed_substep: FIXED_SUBSTEP,
            max_substeps: MAX_SUBSTEPS,
            min_send_interval_frames: 1,
            max_update_period: 10.0,
            non_moving_update_period: 1.0,
            max_non_moving_updates: 5,
            max_position_error_squared: 0.001, // ~3 cm
            min_rotation_dot: 0.99,            // ~16 degrees
            linear_sleeping_threshold: LINEAR_SLEEPING_THRESHOLD,
            angular_sleeping_threshold: ANGULAR_SLEEPING_THRESHOLD,
            deactivation_time: DEACTIVATION_TIME,
            origin_offset: [0.0; 3],
            floor_height: None,
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(source: &str) -> SyncResult<Self> {
        let config = toml::from_str::<SyncConfig>(source).config_context("<inline>")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let source = std::fs::read_to_string(path).config_context(&display)?;
        let config = toml::from_str::<SyncConfig>(&source).config_context(&display)?;
        config.validate()?;
        log::info!("Loaded sync config from {}", display);
        Ok(config)
    }

    /// Longest time a single tick may simulate
    pub fn max_timestep(&self) -> f32 {
        self.max_substeps as f32 * self.fixed_substep
    }

    pub fn validate(&self) -> SyncResult<()> {
        if !(self.fixed_substep.is_finite() && self.fixed_substep > 0.0) {
            return Err(invalid_config("fixed_substep", "must be a positive number of seconds"));
        }
        if self.max_substeps == 0 {
            return Err(invalid_config("max_substeps", "must be at least 1"));
        }
        if !(self.min_rotation_dot > 0.0 && self.min_rotation_dot <= 1.0) {
            return Err(invalid_config("min_rotation_dot", "must be in (0, 1]"));
        }

        let finite = [
            ("max_update_period", self.max_update_period),
            ("non_moving_update_period", self.non_moving_update_period),
            ("max_position_error_squared", self.max_position_error_squared),
            ("linear_sleeping_threshold", self.linear_sleeping_threshold),
            ("angular_sleeping_threshold", self.angular_sleeping_threshold),
            ("deactivation_time", self.deactivation_time),
        ];
        for (field, value) in finite {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid_config(field, "must be a finite, non-negative number"));
            }
        }

        if self.origin_offset.iter().any(|v| !v.is_finite()) {
            return Err(invalid_config("origin_offset", "must be finite"));
        }
        if let Some(floor) = self.floor_height {
            if !floor.is_finite() {
                return Err(invalid_config("floor_height", "must be finite"));
            }
        }
        Ok(())
    }
}
