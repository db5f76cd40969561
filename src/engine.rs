// src/engine.rs
//! Per-frame orchestration.
//!
//! [`GestureEngine`] owns every piece of classifier state for one session:
//! the limb trackers, the jump detector, the status channels and the fading
//! landing markers. The host calls [`GestureEngine::tick`] once per video
//! frame and gets back the events to dispatch and the text to display.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::events::{EventKind, EventSink, GestureEvent};
use crate::jump::{JumpDetector, JumpState, JumpTransition, Landing, LandingDirection};
use crate::keypoints::KeypointFrame;
use crate::status::{StatusChannel, StatusPersistence};
use crate::tracking::{Limb, LimbMovementState, MovementTracker};

pub const JUMPING_STATUS: &str = "Jumping!";
pub const GROUNDED_STATUS: &str = "On Ground";

/// Visual record of a landing; fades out after `marker_fade_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JumpMarker {
    pub x: f32,
    pub y: f32,
    /// Session-relative time of the landing.
    pub timestamp_ms: f64,
}

/// Distance/direction of the most recent landing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LandingReadout {
    pub distance: f32,
    pub direction: LandingDirection,
}

impl From<&Landing> for LandingReadout {
    fn from(landing: &Landing) -> Self {
        Self {
            distance: landing.distance,
            direction: landing.direction,
        }
    }
}

impl fmt::Display for LandingReadout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Landed {:.0} px {}", self.distance, self.direction)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Displays {
    pub left_hand: String,
    pub right_hand: String,
    pub jump: String,
}

/// Everything one tick hands back to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickOutput {
    /// Session-relative time of this tick.
    pub timestamp_ms: f64,
    pub events: Vec<GestureEvent>,
    pub displays: Displays,
    pub landing: Option<LandingReadout>,
    pub markers: Vec<JumpMarker>,
}

pub struct GestureEngine {
    config: EngineConfig,
    left_hand: MovementTracker,
    right_hand: MovementTracker,
    jump: JumpDetector,
    status: StatusPersistence,
    markers: VecDeque<JumpMarker>,
    landing: Option<LandingReadout>,
    /// The landing readout occupies the jump channel until this time.
    landing_display_until: Option<f64>,
    session_start_ms: Option<f64>,
    frames: u64,
}

impl GestureEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            left_hand: MovementTracker::new(Limb::LeftHand, &config),
            right_hand: MovementTracker::new(Limb::RightHand, &config),
            jump: JumpDetector::new(&config),
            status: StatusPersistence::new(),
            markers: VecDeque::new(),
            landing: None,
            landing_display_until: None,
            session_start_ms: None,
            frames: 0,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracker(&self, limb: Limb) -> &MovementTracker {
        match limb {
            Limb::LeftHand => &self.left_hand,
            Limb::RightHand => &self.right_hand,
        }
    }

    fn tracker_mut(&mut self, limb: Limb) -> &mut MovementTracker {
        match limb {
            Limb::LeftHand => &mut self.left_hand,
            Limb::RightHand => &mut self.right_hand,
        }
    }

    pub fn limb_state(&self, limb: Limb) -> &LimbMovementState {
        self.tracker(limb).state()
    }

    pub fn jump_detector(&self) -> &JumpDetector {
        &self.jump
    }

    pub fn jump_state(&self) -> JumpState {
        self.jump.state()
    }

    pub fn ground_level(&self) -> Option<f32> {
        self.jump.ground_level()
    }

    pub fn markers(&self) -> impl Iterator<Item = &JumpMarker> {
        self.markers.iter()
    }

    pub fn status(&self) -> &StatusPersistence {
        &self.status
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Process one pose estimate. `now_ms` is any monotonic clock; event and
    /// marker timestamps are reported relative to the first tick.
    pub fn tick(&mut self, frame: &KeypointFrame, now_ms: f64) -> TickOutput {
        let start = *self.session_start_ms.get_or_insert(now_ms);
        let t = now_ms - start;
        self.frames += 1;

        let mut events = Vec::new();
        let threshold = self.config.confidence_threshold;
        let hand_dwell = self.config.hand_dwell_ms;

        // 1. Limbs.
        for limb in Limb::ALL {
            let Some(keypoint) = frame.usable(limb.landmark(), threshold) else {
                continue;
            };
            let (text, movement) = self.tracker_mut(limb).update(keypoint.position());
            if let Some(movement) = movement {
                events.push(GestureEvent::new(
                    movement.event_kind(),
                    movement.pitch,
                    movement.velocity,
                    t,
                ));
            }
            self.status.update(limb.status_channel(), &text, t, hand_dwell);
        }

        // 2. Jump.
        let mut new_marker = None;
        match self.jump.update(frame) {
            Some(JumpTransition::Takeoff { .. }) => {
                events.push(GestureEvent::new(
                    EventKind::Takeoff,
                    self.config.takeoff_pitch,
                    self.config.jump_velocity,
                    t,
                ));
                self.landing = None;
                self.landing_display_until = None;
                self.status
                    .force(StatusChannel::Jump, JUMPING_STATUS, t, self.config.jump_dwell_ms);
            }
            Some(JumpTransition::Landed(landing)) => {
                events.push(GestureEvent::new(
                    EventKind::Landing,
                    self.config.landing_pitch,
                    self.config.jump_velocity,
                    t,
                ));
                new_marker = Some(JumpMarker {
                    x: landing.position.x,
                    y: landing.position.y,
                    timestamp_ms: t,
                });
                let readout = LandingReadout::from(&landing);
                self.landing = Some(readout);
                self.landing_display_until = Some(t + self.config.landing_display_ms);
                self.status.force(
                    StatusChannel::Jump,
                    &readout.to_string(),
                    t,
                    self.config.jump_dwell_ms,
                );
            }
            None => {
                let text = self.jump_status_text(t);
                self.status
                    .update(StatusChannel::Jump, &text, t, self.config.jump_dwell_ms);
            }
        }

        // 3. Markers.
        if let Some(marker) = new_marker {
            self.markers.push_back(marker);
        }
        self.prune_markers(t);

        TickOutput {
            timestamp_ms: t,
            events,
            ..self.snapshot(t)
        }
    }

    /// Tick with the raw outcome of the pose model. A failed detection is
    /// logged and leaves the engine exactly as it was.
    pub fn tick_detection<E: fmt::Display>(
        &mut self,
        detection: Result<&KeypointFrame, E>,
        now_ms: f64,
    ) -> TickOutput {
        match detection {
            Ok(frame) => self.tick(frame, now_ms),
            Err(err) => {
                warn!("skipping frame: {}", err);
                let t = self.session_start_ms.map_or(0.0, |start| now_ms - start);
                self.snapshot(t)
            }
        }
    }

    /// Tick and hand the resulting events to `sink`. Delivery failures are
    /// logged; they never affect engine state.
    pub fn tick_into(
        &mut self,
        frame: &KeypointFrame,
        now_ms: f64,
        sink: &mut dyn EventSink,
    ) -> TickOutput {
        let output = self.tick(frame, now_ms);
        for event in &output.events {
            if let Err(err) = sink.send(event) {
                warn!("event sink rejected {}: {}", event.kind.label(), err);
            }
        }
        output
    }

    /// Forget everything learned about the current source. Call when the
    /// video or pose stream changes.
    pub fn reset(&mut self) {
        self.left_hand.reset();
        self.right_hand.reset();
        self.jump.reset();
        self.status.reset();
        self.markers.clear();
        self.landing = None;
        self.landing_display_until = None;
        self.session_start_ms = None;
        self.frames = 0;
        info!("tracking state reset");
    }

    fn jump_status_text(&mut self, t: f64) -> String {
        if !self.jump.is_calibrated() {
            return crate::status::INITIAL_JUMP_STATUS.to_string();
        }
        if self.jump.state() == JumpState::Airborne {
            return JUMPING_STATUS.to_string();
        }
        match (self.landing_display_until, self.landing) {
            (Some(until), Some(readout)) if t < until => readout.to_string(),
            _ => {
                self.landing_display_until = None;
                GROUNDED_STATUS.to_string()
            }
        }
    }

    fn prune_markers(&mut self, t: f64) {
        let fade = self.config.marker_fade_ms;
        self.markers.retain(|m| t - m.timestamp_ms < fade);
    }

    fn snapshot(&self, t: f64) -> TickOutput {
        TickOutput {
            timestamp_ms: t,
            events: Vec::new(),
            displays: Displays {
                left_hand: self.status.text(StatusChannel::LeftHand).to_string(),
                right_hand: self.status.text(StatusChannel::RightHand).to_string(),
                jump: self.status.text(StatusChannel::Jump).to_string(),
            },
            landing: self.landing,
            markers: self.markers.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::error::{DetectionError, SinkError};
    use crate::keypoints::Landmark;
    use crate::tracking::Direction;

    const FRAME_MS: f64 = 33.0;

    fn body(ankle_x: f32, ankle_y: f32, body_height: f32) -> KeypointFrame {
        KeypointFrame::default()
            .with(Landmark::LeftAnkle, ankle_x - 20.0, ankle_y, 0.9)
            .with(Landmark::RightAnkle, ankle_x + 20.0, ankle_y, 0.9)
            .with(Landmark::Nose, ankle_x, ankle_y - body_height, 0.9)
    }

    fn with_wrists(
        frame: KeypointFrame,
        left: (f32, f32),
        right: (f32, f32),
        score: f32,
    ) -> KeypointFrame {
        frame
            .with(Landmark::LeftWrist, left.0, left.1, score)
            .with(Landmark::RightWrist, right.0, right.1, score)
    }

    /// Ten standing frames at ankle y = 300; returns the next timestamp.
    fn stand(engine: &mut GestureEngine) -> f64 {
        let mut now = 0.0;
        for _ in 0..10 {
            let out = engine.tick(&body(320.0, 300.0, 400.0), now);
            assert!(out.events.is_empty());
            now += FRAME_MS;
        }
        now
    }

    #[test]
    fn test_jump_scenario() {
        let mut engine = GestureEngine::new(EngineConfig::relaxed());
        let now = stand(&mut engine);
        assert!((engine.ground_level().unwrap() - 300.0).abs() < 1e-3);
        assert_eq!(engine.status().text(StatusChannel::Jump), GROUNDED_STATUS);

        let out = engine.tick(&body(320.0, 260.0, 400.0), now);
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].kind, EventKind::Takeoff);
        assert_eq!(out.events[0].pitch, 48);
        assert_eq!(out.events[0].velocity, 127);
        assert_eq!(engine.jump_state(), JumpState::Airborne);
        assert_eq!(out.displays.jump, JUMPING_STATUS);

        let out = engine.tick(&body(320.0, 295.0, 400.0), now + FRAME_MS);
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].kind, EventKind::Landing);
        assert_eq!(out.events[0].pitch, 36);
        assert_eq!(engine.jump_state(), JumpState::Grounded);
        assert_eq!(out.markers.len(), 1);
        assert_eq!(out.markers[0].x, 320.0);
        assert_eq!(out.markers[0].y, 295.0);
        let landing = out.landing.unwrap();
        // Takeoff frame midpoint (320, 260) to landing (320, 295).
        assert!((landing.distance - 35.0).abs() < 1e-3);
        assert_eq!(landing.direction, LandingDirection::Vertical);
        assert_eq!(out.displays.jump, "Landed 35 px vertical");
    }

    #[test]
    fn test_no_takeoff_before_calibration() {
        let mut engine = GestureEngine::new(EngineConfig::relaxed());
        // Frames without a usable nose never calibrate, however high the ankles.
        for i in 0..5 {
            let frame = KeypointFrame::default()
                .with(Landmark::LeftAnkle, 300.0, 300.0 - 50.0 * i as f32, 0.9)
                .with(Landmark::RightAnkle, 340.0, 300.0 - 50.0 * i as f32, 0.9);
            let out = engine.tick(&frame, i as f64 * FRAME_MS);
            assert!(out.events.is_empty());
            assert_eq!(out.displays.jump, crate::status::INITIAL_JUMP_STATUS);
        }
        assert!(engine.ground_level().is_none());
        assert_eq!(engine.jump_state(), JumpState::Grounded);
    }

    #[test]
    fn test_landing_readout_lingers_then_clears() {
        let config = EngineConfig::relaxed();
        let mut engine = GestureEngine::new(config.clone());
        let mut now = stand(&mut engine);
        engine.tick(&body(320.0, 250.0, 400.0), now);
        now += FRAME_MS;
        let out = engine.tick(&body(400.0, 300.0, 400.0), now);
        let readout = out.landing.unwrap().to_string();
        assert_eq!(out.displays.jump, readout);
        assert_eq!(out.landing.unwrap().direction, LandingDirection::Right);

        let landed_at = now;
        now += 1000.0;
        assert_eq!(engine.tick(&body(400.0, 300.0, 400.0), now).displays.jump, readout);

        now = landed_at + config.landing_display_ms;
        let out = engine.tick(&body(400.0, 300.0, 400.0), now);
        assert_eq!(out.displays.jump, GROUNDED_STATUS);
        // The numbers stay available until the next takeoff.
        assert!(out.landing.is_some());
    }

    #[test]
    fn test_takeoff_cancels_landing_readout() {
        let mut engine = GestureEngine::new(EngineConfig::relaxed());
        let mut now = stand(&mut engine);
        engine.tick(&body(320.0, 250.0, 400.0), now);
        now += FRAME_MS;
        engine.tick(&body(320.0, 300.0, 400.0), now);
        now += FRAME_MS;
        engine.tick(&body(320.0, 300.0, 400.0), now);
        now += FRAME_MS;
        let out = engine.tick(&body(320.0, 240.0, 400.0), now);
        assert_eq!(out.events[0].kind, EventKind::Takeoff);
        assert_eq!(out.displays.jump, JUMPING_STATUS);
        assert!(out.landing.is_none());
    }

    #[test]
    fn test_markers_fade_after_three_seconds() {
        let mut engine = GestureEngine::new(EngineConfig::relaxed());
        let mut now = stand(&mut engine);
        engine.tick(&body(320.0, 250.0, 400.0), now);
        now += FRAME_MS;
        let out = engine.tick(&body(320.0, 300.0, 400.0), now);
        assert_eq!(out.markers.len(), 1);
        let landed_at = out.markers[0].timestamp_ms;

        let still = body(320.0, 300.0, 400.0);
        let out = engine.tick(&still, now + 2999.0);
        assert_eq!(out.markers.len(), 1);

        let out = engine.tick(&still, now + 3000.0);
        assert!(out.markers.is_empty());
        assert_eq!(engine.markers().count(), 0);
        assert!(landed_at > 0.0);

        // Pruning an already-empty list is a no-op.
        let out = engine.tick(&still, now + 5000.0);
        assert!(out.markers.is_empty());
    }

    #[test]
    fn test_each_jump_adds_one_marker() {
        let mut engine = GestureEngine::new(EngineConfig::relaxed());
        let mut now = stand(&mut engine);
        for _ in 0..3 {
            engine.tick(&body(320.0, 250.0, 400.0), now);
            now += FRAME_MS;
            engine.tick(&body(320.0, 252.0, 400.0), now);
            now += FRAME_MS;
            engine.tick(&body(320.0, 300.0, 400.0), now);
            now += FRAME_MS;
        }
        assert_eq!(engine.markers().count(), 3);
    }

    #[test]
    fn test_limb_events_and_status() {
        let config = EngineConfig::relaxed();
        let mut engine = GestureEngine::new(config.clone());
        let frame = with_wrists(KeypointFrame::default(), (100.0, 100.0), (500.0, 100.0), 0.9);
        let out = engine.tick(&frame, 0.0);
        assert!(out.events.is_empty());
        assert_eq!(out.displays.left_hand, "Stationary");

        let frame = with_wrists(KeypointFrame::default(), (160.0, 100.0), (500.0, 100.0), 0.9);
        let out = engine.tick(&frame, FRAME_MS);
        assert_eq!(out.events.len(), 1);
        let event = out.events[0];
        assert_eq!(
            event.kind,
            EventKind::LimbDirection {
                limb: Limb::LeftHand,
                direction: Direction::Right
            }
        );
        assert_eq!(event.pitch, config.left_base_pitch + 1);
        assert_eq!(event.timestamp_ms, FRAME_MS);
        assert_eq!(out.displays.left_hand, "Right (60.0 px/frame)");
        assert_eq!(out.displays.right_hand, "Stationary");
    }

    #[test]
    fn test_low_confidence_limb_is_untouched() {
        let mut engine = GestureEngine::new(EngineConfig::strict());
        engine.tick(
            &with_wrists(KeypointFrame::default(), (100.0, 100.0), (200.0, 100.0), 0.9),
            0.0,
        );
        let left_before = engine.limb_state(Limb::LeftHand).clone();
        let right_before = engine.limb_state(Limb::RightHand).clone();
        let display_before = engine.status().text(StatusChannel::LeftHand).to_string();

        let weak = with_wrists(KeypointFrame::default(), (300.0, 300.0), (400.0, 400.0), 0.45);
        let out = engine.tick(&weak, FRAME_MS);

        assert!(out.events.is_empty());
        assert_eq!(engine.limb_state(Limb::LeftHand), &left_before);
        assert_eq!(engine.limb_state(Limb::RightHand), &right_before);
        assert_eq!(out.displays.left_hand, display_before);
    }

    #[test]
    fn test_failed_detection_is_a_no_op() {
        let mut engine = GestureEngine::new(EngineConfig::relaxed());
        let mut now = stand(&mut engine);
        engine.tick(&body(320.0, 250.0, 400.0), now);
        now += FRAME_MS;
        engine.tick(&body(320.0, 300.0, 400.0), now);

        let ground = engine.ground_level();
        let markers: Vec<_> = engine.markers().copied().collect();
        let frames = engine.frames_processed();

        // Well past the fade window: a real tick would prune the marker.
        let err: Result<&KeypointFrame, _> = Err(DetectionError("model threw".into()));
        let out = engine.tick_detection(err, now + 10_000.0);

        assert!(out.events.is_empty());
        assert_eq!(out.markers, markers);
        assert_eq!(engine.ground_level(), ground);
        assert_eq!(engine.frames_processed(), frames);
        assert_eq!(engine.markers().count(), 1);
    }

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn send(&mut self, _event: &GestureEvent) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }
    }

    #[test]
    fn test_tick_into_dispatches_and_survives_sink_errors() {
        let mut engine = GestureEngine::new(EngineConfig::relaxed());
        let mut now = stand(&mut engine);

        let mut sink = RecordingSink::default();
        engine.tick_into(&body(320.0, 250.0, 400.0), now, &mut sink);
        assert_eq!(sink.events.len(), 1);

        now += FRAME_MS;
        let out = engine.tick_into(&body(320.0, 300.0, 400.0), now, &mut BrokenSink);
        assert_eq!(out.events.len(), 1);
        assert_eq!(engine.jump_state(), JumpState::Grounded);
    }

    #[test]
    fn test_reset_clears_session() {
        let mut engine = GestureEngine::new(EngineConfig::relaxed());
        let mut now = stand(&mut engine);
        engine.tick(
            &with_wrists(body(320.0, 250.0, 400.0), (10.0, 10.0), (20.0, 20.0), 0.9),
            now,
        );
        now += FRAME_MS;
        engine.tick(&body(320.0, 300.0, 400.0), now);
        assert_eq!(engine.markers().count(), 1);

        engine.reset();
        assert!(engine.ground_level().is_none());
        assert_eq!(engine.jump_state(), JumpState::Grounded);
        assert_eq!(engine.markers().count(), 0);
        assert_eq!(engine.limb_state(Limb::LeftHand), &LimbMovementState::default());
        assert_eq!(engine.frames_processed(), 0);
        assert_eq!(
            engine.status().text(StatusChannel::Jump),
            crate::status::INITIAL_JUMP_STATUS
        );

        // The next tick starts a fresh session clock.
        let out = engine.tick(&body(320.0, 300.0, 400.0), 50_000.0);
        assert_eq!(out.timestamp_ms, 0.0);
    }
}
