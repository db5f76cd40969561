// src/jump.rs
//! Jump detection from ankle and nose keypoints.
//!
//! [`GroundCalibrator`] tracks where the ankles rest when the performer is
//! standing. [`JumpDetector`] runs a two-state hysteresis machine against that
//! floor: the ankles must rise a full `jump` threshold above it to take off,
//! and only need to come back within the smaller `land` threshold to land.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EngineConfig, JumpThresholdPolicy};
use crate::keypoints::{KeypointFrame, Landmark, Position};

/// Adaptive estimate of the resting ankle height.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundCalibrator {
    alpha: f32,
    level: Option<f32>,
}

impl GroundCalibrator {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, level: None }
    }

    pub fn level(&self) -> Option<f32> {
        self.level
    }

    pub fn is_calibrated(&self) -> bool {
        self.level.is_some()
    }

    /// Fold one averaged ankle reading into the estimate. The level is frozen
    /// while airborne so the floor cannot follow the performer upward.
    pub fn observe(&mut self, ankle_y: f32, is_airborne: bool) -> f32 {
        let level = match self.level {
            None => {
                debug!("ground level seeded at {:.1}", ankle_y);
                ankle_y
            }
            Some(level) if is_airborne => level,
            Some(level) => level * self.alpha + ankle_y * (1.0 - self.alpha),
        };
        self.level = Some(level);
        level
    }

    pub fn reset(&mut self) {
        self.level = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JumpState {
    #[default]
    Grounded,
    Airborne,
}

/// Where the landing was relative to the takeoff point.
///
/// Any offset where the vertical axis dominates reads as a vertical jump, so
/// only sideways drift gets a direction of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandingDirection {
    Vertical,
    Left,
    Right,
}

impl LandingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// `delta` is landing minus takeoff. Vertical when `|dy|` dominates and
    /// clears the noise floor, or when both offsets sit inside it.
    pub fn classify(delta: Position, noise_floor_px: f32) -> Self {
        let (dx, dy) = (delta.x.abs(), delta.y.abs());
        let in_place = dx <= noise_floor_px && dy <= noise_floor_px;
        if in_place || (dy >= dx && dy > noise_floor_px) {
            Self::Vertical
        } else if delta.x > 0.0 {
            Self::Right
        } else {
            Self::Left
        }
    }
}

impl fmt::Display for LandingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics computed once per Airborne→Grounded transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landing {
    pub takeoff_position: Position,
    pub position: Position,
    pub distance: f32,
    pub direction: LandingDirection,
}

impl Landing {
    pub fn between(takeoff_position: Position, position: Position, noise_floor_px: f32) -> Self {
        let delta = position - takeoff_position;
        Self {
            takeoff_position,
            position,
            distance: delta.norm(),
            direction: LandingDirection::classify(delta, noise_floor_px),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JumpTransition {
    Takeoff { position: Position, nose_y: f32 },
    Landed(Landing),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Takeoff {
    nose_y: f32,
    position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JumpDetector {
    confidence_threshold: f32,
    policy: JumpThresholdPolicy,
    noise_floor_px: f32,
    calibrator: GroundCalibrator,
    state: JumpState,
    takeoff: Option<Takeoff>,
    last_landing: Option<Landing>,
}

impl JumpDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            policy: config.jump_threshold_policy,
            noise_floor_px: config.landing_noise_floor_px,
            calibrator: GroundCalibrator::new(config.ground_smoothing_alpha),
            state: JumpState::Grounded,
            takeoff: None,
            last_landing: None,
        }
    }

    pub fn state(&self) -> JumpState {
        self.state
    }

    pub fn ground_level(&self) -> Option<f32> {
        self.calibrator.level()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrator.is_calibrated()
    }

    pub fn takeoff_nose_y(&self) -> Option<f32> {
        self.takeoff.map(|t| t.nose_y)
    }

    pub fn last_landing(&self) -> Option<&Landing> {
        self.last_landing.as_ref()
    }

    pub fn reset(&mut self) {
        self.calibrator.reset();
        self.state = JumpState::Grounded;
        self.takeoff = None;
        self.last_landing = None;
    }

    /// Evaluate one frame. Frames missing a usable nose or either ankle are
    /// ignored outright: no calibration, no transition.
    pub fn update(&mut self, frame: &KeypointFrame) -> Option<JumpTransition> {
        let min = self.confidence_threshold;
        let left = frame.usable(Landmark::LeftAnkle, min)?;
        let right = frame.usable(Landmark::RightAnkle, min)?;
        let nose = frame.usable(Landmark::Nose, min)?;

        let midpoint = (left.position() + right.position()) / 2.0;
        let ankle_y = midpoint.y;

        let was_calibrated = self.calibrator.is_calibrated();
        let ground = self
            .calibrator
            .observe(ankle_y, self.state == JumpState::Airborne);
        if !was_calibrated {
            return None;
        }

        let body_height = (ankle_y - nose.y).abs();
        let (jump_threshold, land_threshold) = self.policy.thresholds(body_height);

        match self.state {
            JumpState::Grounded if ankle_y < ground - jump_threshold => {
                self.state = JumpState::Airborne;
                self.takeoff = Some(Takeoff {
                    nose_y: nose.y,
                    position: midpoint,
                });
                info!(
                    "takeoff: ankles {:.1} above ground {:.1} (threshold {:.1})",
                    ground - ankle_y,
                    ground,
                    jump_threshold
                );
                Some(JumpTransition::Takeoff {
                    position: midpoint,
                    nose_y: nose.y,
                })
            }
            JumpState::Airborne if ankle_y > ground - land_threshold => {
                self.state = JumpState::Grounded;
                let takeoff_position = self.takeoff.map_or(midpoint, |t| t.position);
                let landing = Landing::between(takeoff_position, midpoint, self.noise_floor_px);
                self.last_landing = Some(landing);
                info!(
                    "landed {:.1} px {} from takeoff",
                    landing.distance, landing.direction
                );
                Some(JumpTransition::Landed(landing))
            }
            JumpState::Grounded | JumpState::Airborne => None,
        }
    }
}
