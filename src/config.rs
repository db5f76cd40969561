// src/config.rs
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the takeoff/landing hysteresis band is sized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JumpThresholdPolicy {
    /// Constant pixel offsets above the ground level.
    Fixed { jump: f32, land: f32 },
    /// Offsets proportional to the body height (ankle midpoint to nose),
    /// never smaller than the given floors.
    Dynamic {
        jump_ratio: f32,
        land_ratio: f32,
        jump_floor: f32,
        land_floor: f32,
    },
}

impl JumpThresholdPolicy {
    /// Returns `(jump_threshold, land_threshold)` for the given body height.
    pub fn thresholds(&self, body_height: f32) -> (f32, f32) {
        match *self {
            Self::Fixed { jump, land } => (jump, land),
            Self::Dynamic {
                jump_ratio,
                land_ratio,
                jump_floor,
                land_floor,
            } => (
                jump_floor.max(body_height * jump_ratio),
                land_floor.max(body_height * land_ratio),
            ),
        }
    }
}

impl Default for JumpThresholdPolicy {
    fn default() -> Self {
        Self::Dynamic {
            jump_ratio: 0.08,
            land_ratio: 0.04,
            jump_floor: 15.0,
            land_floor: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum keypoint score for a landmark to be used at all.
    pub confidence_threshold: f32,
    /// Weight kept by the old ground level on each grounded frame.
    pub ground_smoothing_alpha: f32,
    pub jump_threshold_policy: JumpThresholdPolicy,

    pub left_base_pitch: u8,
    pub right_base_pitch: u8,
    pub takeoff_pitch: u8,
    pub landing_pitch: u8,
    pub jump_velocity: u8,

    /// Per-frame displacement (px) below which a limb counts as stationary.
    pub dead_zone_px: f32,
    /// Speed (px/frame) at or below which the status reads "Stationary".
    pub stationary_speed_px: f32,
    /// Landing offsets within this many px on both axes read as vertical.
    pub landing_noise_floor_px: f32,

    pub hand_dwell_ms: f64,
    pub jump_dwell_ms: f64,
    /// How long the landing readout stays up before "On Ground" resumes.
    pub landing_display_ms: f64,
    pub marker_fade_ms: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::relaxed()
    }
}

impl EngineConfig {
    /// Low confidence bar, quicker ground adaptation, body-relative thresholds.
    pub fn relaxed() -> Self {
        Self {
            confidence_threshold: 0.3,
            ground_smoothing_alpha: 0.9,
            jump_threshold_policy: JumpThresholdPolicy::default(),
            left_base_pitch: 60,
            right_base_pitch: 72,
            takeoff_pitch: 48,
            landing_pitch: 36,
            jump_velocity: 127,
            dead_zone_px: 2.0,
            stationary_speed_px: 1.0,
            landing_noise_floor_px: 5.0,
            hand_dwell_ms: 1000.0,
            jump_dwell_ms: 2000.0,
            landing_display_ms: 2500.0,
            marker_fade_ms: 3000.0,
        }
    }

    /// Higher confidence bar, steadier floor, fixed 30/15 px thresholds.
    pub fn strict() -> Self {
        Self {
            confidence_threshold: 0.5,
            ground_smoothing_alpha: 0.95,
            jump_threshold_policy: JumpThresholdPolicy::Fixed {
                jump: 30.0,
                land: 15.0,
            },
            ..Self::relaxed()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid("confidence_threshold", "must be within [0, 1]"));
        }
        if !(0.0..1.0).contains(&self.ground_smoothing_alpha) {
            return Err(invalid("ground_smoothing_alpha", "must be within [0, 1)"));
        }
        match self.jump_threshold_policy {
            JumpThresholdPolicy::Fixed { jump, land } => {
                if jump <= 0.0 || land <= 0.0 {
                    return Err(invalid("jump_threshold_policy", "thresholds must be positive"));
                }
            }
            JumpThresholdPolicy::Dynamic {
                jump_ratio,
                land_ratio,
                jump_floor,
                land_floor,
            } => {
                if jump_ratio <= 0.0 || land_ratio <= 0.0 || jump_floor < 0.0 || land_floor < 0.0 {
                    return Err(invalid(
                        "jump_threshold_policy",
                        "ratios must be positive and floors non-negative",
                    ));
                }
            }
        }
        for (field, pitch) in [
            ("left_base_pitch", self.left_base_pitch),
            ("right_base_pitch", self.right_base_pitch),
            ("takeoff_pitch", self.takeoff_pitch),
            ("landing_pitch", self.landing_pitch),
        ] {
            if pitch > 127 {
                return Err(invalid(field, "midi pitch must be 0-127"));
            }
        }
        if self.jump_velocity == 0 || self.jump_velocity > 127 {
            return Err(invalid("jump_velocity", "midi velocity must be 1-127"));
        }
        for (field, ms) in [
            ("hand_dwell_ms", self.hand_dwell_ms),
            ("jump_dwell_ms", self.jump_dwell_ms),
            ("landing_display_ms", self.landing_display_ms),
            ("marker_fade_ms", self.marker_fade_ms),
        ] {
            if ms.is_nan() || ms <= 0.0 {
                return Err(invalid(field, "duration must be positive"));
            }
        }
        for (field, px) in [
            ("dead_zone_px", self.dead_zone_px),
            ("stationary_speed_px", self.stationary_speed_px),
            ("landing_noise_floor_px", self.landing_noise_floor_px),
        ] {
            if px.is_nan() || px < 0.0 {
                return Err(invalid(field, "pixel tolerance must be non-negative"));
            }
        }
        Ok(())
    }
}
