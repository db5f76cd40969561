// src/status.rs
//! Minimum-dwell smoothing for the human-readable status channels.
//!
//! Classifier output can flip every frame. Each channel shows new text as
//! soon as it changes, then dwells: until the dwell lapses, a request to go
//! straight back to the text it just replaced is ignored. That is what keeps
//! an oscillating classifier ("Left", "Right", "Left", ...) from flickering.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChannel {
    LeftHand,
    RightHand,
    Jump,
}

/// Per-channel timer state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Dwell {
    #[default]
    Idle,
    /// Locked against reassertion until this timestamp (ms).
    Until(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayStatus {
    text: String,
    previous: Option<String>,
    dwell: Dwell,
    assigned: bool,
}

impl DisplayStatus {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            text: initial.into(),
            previous: None,
            dwell: Dwell::Idle,
            assigned: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn dwell(&self) -> Dwell {
        self.dwell
    }

    pub fn is_dwelling(&self, now_ms: f64) -> bool {
        matches!(self.dwell, Dwell::Until(until) if now_ms < until)
    }

    fn expire(&mut self, now_ms: f64) {
        if let Dwell::Until(until) = self.dwell {
            if now_ms >= until {
                self.dwell = Dwell::Idle;
            }
        }
    }

    /// Offer new classifier output; returns what is displayed afterwards.
    pub fn update(&mut self, new_text: &str, now_ms: f64, min_dwell_ms: f64) -> &str {
        self.expire(now_ms);

        if !self.assigned {
            self.text = new_text.to_string();
            self.assigned = true;
            return &self.text;
        }
        if new_text == self.text {
            return &self.text;
        }
        if self.is_dwelling(now_ms) && self.previous.as_deref() == Some(new_text) {
            return &self.text;
        }

        self.show(new_text, now_ms, min_dwell_ms)
    }

    /// Display `text` regardless of the dwell lock and restart the dwell.
    pub fn force(&mut self, text: &str, now_ms: f64, min_dwell_ms: f64) -> &str {
        self.expire(now_ms);
        self.assigned = true;
        if text == self.text {
            self.dwell = Dwell::Until(now_ms + min_dwell_ms);
            return &self.text;
        }
        self.show(text, now_ms, min_dwell_ms)
    }

    fn show(&mut self, text: &str, now_ms: f64, min_dwell_ms: f64) -> &str {
        let replaced = std::mem::replace(&mut self.text, text.to_string());
        self.previous = Some(replaced);
        self.dwell = Dwell::Until(now_ms + min_dwell_ms);
        &self.text
    }
}

/// The three display channels owned by one engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPersistence {
    left_hand: DisplayStatus,
    right_hand: DisplayStatus,
    jump: DisplayStatus,
}

pub const INITIAL_HAND_STATUS: &str = "Not detected";
pub const INITIAL_JUMP_STATUS: &str = "Calibrating...";

impl Default for StatusPersistence {
    fn default() -> Self {
        Self {
            left_hand: DisplayStatus::new(INITIAL_HAND_STATUS),
            right_hand: DisplayStatus::new(INITIAL_HAND_STATUS),
            jump: DisplayStatus::new(INITIAL_JUMP_STATUS),
        }
    }
}

impl StatusPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, channel: StatusChannel) -> &DisplayStatus {
        match channel {
            StatusChannel::LeftHand => &self.left_hand,
            StatusChannel::RightHand => &self.right_hand,
            StatusChannel::Jump => &self.jump,
        }
    }

    fn channel_mut(&mut self, channel: StatusChannel) -> &mut DisplayStatus {
        match channel {
            StatusChannel::LeftHand => &mut self.left_hand,
            StatusChannel::RightHand => &mut self.right_hand,
            StatusChannel::Jump => &mut self.jump,
        }
    }

    pub fn text(&self, channel: StatusChannel) -> &str {
        self.channel(channel).text()
    }

    pub fn update(
        &mut self,
        channel: StatusChannel,
        new_text: &str,
        now_ms: f64,
        min_dwell_ms: f64,
    ) -> &str {
        self.channel_mut(channel).update(new_text, now_ms, min_dwell_ms)
    }

    pub fn force(
        &mut self,
        channel: StatusChannel,
        text: &str,
        now_ms: f64,
        min_dwell_ms: f64,
    ) -> &str {
        self.channel_mut(channel).force(text, now_ms, min_dwell_ms)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
