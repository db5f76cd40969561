//! Pose-to-gesture classification for movement-driven MIDI control.
//!
//! Feed one [`KeypointFrame`] per video frame into a [`GestureEngine`]; it
//! reports limb direction changes, jump takeoffs and landings as
//! [`GestureEvent`]s plus three debounced status strings for display.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod events;
pub mod jump;
pub mod keypoints;
pub mod replay;
pub mod status;
pub mod tracking;

pub use config::{EngineConfig, JumpThresholdPolicy};
pub use engine::{GestureEngine, JumpMarker, LandingReadout, TickOutput};
pub use events::{EventKind, EventSink, GestureEvent};
pub use keypoints::{Keypoint, KeypointFrame, Landmark};
