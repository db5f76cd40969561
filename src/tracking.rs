// src/tracking.rs
//! Per-limb movement classification.
//!
//! Each tracked limb owns one [`MovementTracker`]. Successive positions are
//! turned into a direction, a speed in px/frame, and an occasional
//! [`LimbMovement`] trigger when the limb starts moving in a new direction.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::events::EventKind;
use crate::keypoints::{Landmark, Position};
use crate::status::StatusChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limb {
    LeftHand,
    RightHand,
}

impl Limb {
    pub const ALL: [Limb; 2] = [Limb::LeftHand, Limb::RightHand];

    /// Landmark that stands in for the limb.
    pub fn landmark(&self) -> Landmark {
        match self {
            Self::LeftHand => Landmark::LeftWrist,
            Self::RightHand => Landmark::RightWrist,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeftHand => "left_hand",
            Self::RightHand => "right_hand",
        }
    }

    pub fn status_channel(&self) -> StatusChannel {
        match self {
            Self::LeftHand => StatusChannel::LeftHand,
            Self::RightHand => StatusChannel::RightHand,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    #[default]
    Stationary,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Stationary => "Stationary",
        };
        f.write_str(s)
    }
}

/// Classify a per-frame displacement. Image y grows downward, so a positive
/// `dy` is `Down`.
pub fn classify_direction(delta: Position, dead_zone_px: f32) -> Direction {
    if delta.norm() <= dead_zone_px {
        return Direction::Stationary;
    }
    if delta.x.abs() > delta.y.abs() {
        if delta.x > 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else if delta.y > 0.0 {
        Direction::Down
    } else {
        Direction::Up
    }
}

/// Mutable state for one tracked limb.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimbMovementState {
    /// `None` until the first usable sample arrives.
    pub last_position: Option<Position>,
    pub direction: Direction,
    /// px/frame, rounded to one decimal.
    pub speed: f32,
    pub direction_change_count: u32,
}

/// A limb started moving in a new (non-stationary) direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimbMovement {
    pub limb: Limb,
    pub direction: Direction,
    pub speed: f32,
    pub pitch: u8,
    pub velocity: u8,
}

impl LimbMovement {
    pub fn event_kind(&self) -> EventKind {
        EventKind::LimbDirection {
            limb: self.limb,
            direction: self.direction,
        }
    }
}

pub struct MovementTracker {
    limb: Limb,
    base_pitch: u8,
    dead_zone_px: f32,
    stationary_speed_px: f32,
    state: LimbMovementState,
}

impl MovementTracker {
    pub fn new(limb: Limb, config: &EngineConfig) -> Self {
        let base_pitch = match limb {
            Limb::LeftHand => config.left_base_pitch,
            Limb::RightHand => config.right_base_pitch,
        };
        Self {
            limb,
            base_pitch,
            dead_zone_px: config.dead_zone_px,
            stationary_speed_px: config.stationary_speed_px,
            state: LimbMovementState::default(),
        }
    }

    pub fn limb(&self) -> Limb {
        self.limb
    }

    pub fn state(&self) -> &LimbMovementState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = LimbMovementState::default();
    }

    /// Feed one usable sample. Callers must skip low-confidence samples
    /// entirely; this method assumes `position` is trustworthy.
    pub fn update(&mut self, position: Position) -> (String, Option<LimbMovement>) {
        let last = match self.state.last_position {
            Some(p) => p,
            None => {
                self.state.last_position = Some(position);
                return (Direction::Stationary.to_string(), None);
            }
        };

        let delta = position - last;
        let speed = (delta.norm() * 10.0).round() / 10.0;
        let direction = classify_direction(delta, self.dead_zone_px);

        let movement = if direction != self.state.direction && direction != Direction::Stationary {
            self.state.direction_change_count += 1;
            let movement = LimbMovement {
                limb: self.limb,
                direction,
                speed,
                pitch: self.pitch_for(self.state.direction_change_count),
                velocity: velocity_for_speed(speed),
            };
            debug!(
                "{} moved {} at {:.1} px/frame (change #{})",
                self.limb.as_str(),
                direction,
                speed,
                self.state.direction_change_count
            );
            Some(movement)
        } else {
            None
        };

        self.state.last_position = Some(position);
        self.state.direction = direction;
        self.state.speed = speed;

        (self.status_text(), movement)
    }

    /// Human-readable status for the current state.
    pub fn status_text(&self) -> String {
        if self.state.speed <= self.stationary_speed_px {
            Direction::Stationary.to_string()
        } else {
            format!("{} ({:.1} px/frame)", self.state.direction, self.state.speed)
        }
    }

    fn pitch_for(&self, change_count: u32) -> u8 {
        let pitch = u32::from(self.base_pitch) + change_count % 12;
        pitch.min(127) as u8
    }
}

/// `min(127, round(speed * 10))`, never below 1 so the note is audible.
fn velocity_for_speed(speed: f32) -> u8 {
    (speed * 10.0).round().clamp(1.0, 127.0) as u8
}
