// src/events.rs
//! Discrete gesture triggers and the sinks that consume them.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SinkError;
use crate::tracking::{Direction, Limb};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Takeoff,
    Landing,
    LimbDirection { limb: Limb, direction: Direction },
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Takeoff => "takeoff",
            Self::Landing => "landing",
            Self::LimbDirection { .. } => "limb_direction",
        }
    }
}

/// One MIDI-like trigger produced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub kind: EventKind,
    /// 0-127.
    pub pitch: u8,
    /// 1-127.
    pub velocity: u8,
    /// Milliseconds since the session's first tick.
    pub timestamp_ms: f64,
}

impl GestureEvent {
    pub fn new(kind: EventKind, pitch: u8, velocity: u8, timestamp_ms: f64) -> Self {
        Self {
            kind,
            pitch: pitch.min(127),
            velocity: velocity.clamp(1, 127),
            timestamp_ms,
        }
    }
}

impl fmt::Display for GestureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::LimbDirection { limb, direction } => write!(
                f,
                "[{:>8.0} ms] {} {} note {} vel {}",
                self.timestamp_ms,
                limb.as_str(),
                direction,
                self.pitch,
                self.velocity
            ),
            kind => write!(
                f,
                "[{:>8.0} ms] {} note {} vel {}",
                self.timestamp_ms,
                kind.label(),
                self.pitch,
                self.velocity
            ),
        }
    }
}

/// Consumer of gesture events (usually a MIDI transport).
pub trait EventSink {
    fn send(&mut self, event: &GestureEvent) -> Result<(), SinkError>;
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn send(&mut self, _event: &GestureEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<GestureEvent>,
}

impl EventSink for RecordingSink {
    fn send(&mut self, event: &GestureEvent) -> Result<(), SinkError> {
        self.events.push(*event);
        Ok(())
    }
}

// ── MIDI wire output ──────────────────────────────────────

pub trait MidiOut {
    fn send_message(&mut self, message: &[u8]) -> Result<(), SinkError>;

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), SinkError> {
        self.send_message(&[0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F])
    }

    fn note_off(&mut self, channel: u8, note: u8) -> Result<(), SinkError> {
        self.send_message(&[0x80 | (channel & 0x0F), note & 0x7F, 0])
    }
}

/// Used when no MIDI port is available.
#[derive(Debug, Default)]
pub struct NullOut;

impl MidiOut for NullOut {
    fn send_message(&mut self, _message: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Captures raw messages, e.g. for tests or writing out later.
#[derive(Debug, Default)]
pub struct BufferOut {
    pub messages: Vec<Vec<u8>>,
}

impl MidiOut for BufferOut {
    fn send_message(&mut self, message: &[u8]) -> Result<(), SinkError> {
        self.messages.push(message.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingOff {
    note: u8,
    due_ms: f64,
}

/// Turns gesture events into note-on messages and releases each note after a
/// fixed gate time. Call [`MidiSink::flush`] once per frame to send the
/// note-offs that have come due.
pub struct MidiSink<O: MidiOut> {
    out: O,
    channel: u8,
    gate_ms: f64,
    pending: Vec<PendingOff>,
}

impl<O: MidiOut> MidiSink<O> {
    pub fn new(out: O, channel: u8, gate_ms: f64) -> Self {
        Self {
            out,
            channel: channel & 0x0F,
            gate_ms,
            pending: Vec::new(),
        }
    }

    pub fn output(&self) -> &O {
        &self.out
    }

    pub fn pending_notes(&self) -> usize {
        self.pending.len()
    }

    /// Send note-offs whose gate has elapsed by `now_ms` (session-relative).
    pub fn flush(&mut self, now_ms: f64) -> Result<(), SinkError> {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due_ms <= now_ms);
        self.pending = waiting;
        for off in due {
            self.out.note_off(self.channel, off.note)?;
        }
        Ok(())
    }

    /// Release everything immediately (e.g. when playback stops).
    pub fn all_notes_off(&mut self) -> Result<(), SinkError> {
        for off in std::mem::take(&mut self.pending) {
            self.out.note_off(self.channel, off.note)?;
        }
        Ok(())
    }
}

impl<O: MidiOut> EventSink for MidiSink<O> {
    fn send(&mut self, event: &GestureEvent) -> Result<(), SinkError> {
        // Retriggering a sounding note: end it first so on/off stay paired.
        if let Some(idx) = self.pending.iter().position(|p| p.note == event.pitch) {
            self.pending.remove(idx);
            self.out.note_off(self.channel, event.pitch)?;
        }
        self.out.note_on(self.channel, event.pitch, event.velocity)?;
        self.pending.push(PendingOff {
            note: event.pitch,
            due_ms: event.timestamp_ms + self.gate_ms,
        });
        debug!("midi note on {} vel {}", event.pitch, event.velocity);
        Ok(())
    }
}
