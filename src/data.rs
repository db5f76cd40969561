// src/data.rs
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use csv::Writer;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::TickOutput;
use crate::events::{EventKind, GestureEvent};

#[derive(Debug, Serialize)]
struct StatusRecord {
    frame: usize,
    timestamp_ms: f64,
    detection_failed: bool,
    left_hand: String,
    right_hand: String,
    jump: String,
    landing_distance: Option<f32>,
    landing_direction: Option<String>,
    active_markers: usize,
    events: usize,
}

#[derive(Debug, Serialize)]
struct EventRecord {
    frame: usize,
    timestamp_ms: f64,
    kind: String,
    limb: Option<String>,
    direction: Option<String>,
    pitch: u8,
    velocity: u8,
}

/// Aggregate numbers for one recorded session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub session_name: String,
    pub total_frames: usize,
    pub failed_frames: usize,
    pub takeoffs: usize,
    pub landings: usize,
    pub mean_landing_distance: Option<f32>,
    pub max_landing_distance: Option<f32>,
    pub events_by_kind: BTreeMap<String, usize>,
}

/// Collects tick results for one session and writes them out afterwards.
pub struct SessionRecorder {
    output_dir: PathBuf,
    session_name: String,
    session_id: Uuid,
    ticks: Vec<(TickOutput, bool)>,
}

impl SessionRecorder {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Self {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });

        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_name,
            session_id: Uuid::new_v4(),
            ticks: Vec::new(),
        }
    }

    /// `<Documents>/pose_gestures`, falling back to the working directory.
    pub fn default_output_dir() -> PathBuf {
        directories::UserDirs::new()
            .and_then(|dirs| dirs.document_dir().map(|d| d.join("pose_gestures")))
            .unwrap_or_else(|| PathBuf::from("pose_gestures_sessions"))
    }

    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(&self.session_name)
    }

    pub fn add_tick(&mut self, output: TickOutput) {
        self.ticks.push((output, false));
    }

    /// Record a frame the pose model failed on.
    pub fn add_failed_tick(&mut self, output: TickOutput) {
        self.ticks.push((output, true));
    }

    pub fn frame_count(&self) -> usize {
        self.ticks.len()
    }

    pub fn events(&self) -> impl Iterator<Item = &GestureEvent> {
        self.ticks.iter().flat_map(|(tick, _)| tick.events.iter())
    }

    /// Writes `status_log.csv` and `events.csv` into the session directory.
    pub fn export_csv(&self) -> Result<(PathBuf, PathBuf)> {
        let dir = self.session_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let status_path = dir.join("status_log.csv");
        let mut writer = Writer::from_writer(
            File::create(&status_path)
                .with_context(|| format!("failed to create {}", status_path.display()))?,
        );
        for (frame, (tick, failed)) in self.ticks.iter().enumerate() {
            writer.serialize(StatusRecord {
                frame,
                timestamp_ms: tick.timestamp_ms,
                detection_failed: *failed,
                left_hand: tick.displays.left_hand.clone(),
                right_hand: tick.displays.right_hand.clone(),
                jump: tick.displays.jump.clone(),
                landing_distance: tick.landing.map(|l| l.distance),
                landing_direction: tick.landing.map(|l| l.direction.to_string()),
                active_markers: tick.markers.len(),
                events: tick.events.len(),
            })?;
        }
        writer.flush()?;

        let events_path = dir.join("events.csv");
        let mut writer = Writer::from_writer(
            File::create(&events_path)
                .with_context(|| format!("failed to create {}", events_path.display()))?,
        );
        for (frame, (tick, _)) in self.ticks.iter().enumerate() {
            for event in &tick.events {
                let (limb, direction) = match event.kind {
                    EventKind::LimbDirection { limb, direction } => {
                        (Some(limb.as_str().to_string()), Some(direction.to_string()))
                    }
                    _ => (None, None),
                };
                writer.serialize(EventRecord {
                    frame,
                    timestamp_ms: event.timestamp_ms,
                    kind: event.kind.label().to_string(),
                    limb,
                    direction,
                    pitch: event.pitch,
                    velocity: event.velocity,
                })?;
            }
        }
        writer.flush()?;

        Ok((status_path, events_path))
    }

    pub fn summary(&self) -> SessionSummary {
        let mut events_by_kind = BTreeMap::new();
        for event in self.events() {
            *events_by_kind.entry(event.kind.label().to_string()).or_insert(0) += 1;
        }

        // A landing readout shows up on the tick that produced the landing event.
        let distances: Vec<f32> = self
            .ticks
            .iter()
            .filter(|(tick, _)| tick.events.iter().any(|e| e.kind == EventKind::Landing))
            .filter_map(|(tick, _)| tick.landing.map(|l| l.distance))
            .collect();

        let mean_landing_distance = if distances.is_empty() {
            None
        } else {
            Some(distances.iter().sum::<f32>() / distances.len() as f32)
        };
        let max_landing_distance = distances.iter().copied().reduce(f32::max);

        SessionSummary {
            session_id: self.session_id.to_string(),
            session_name: self.session_name.clone(),
            total_frames: self.ticks.len(),
            failed_frames: self.ticks.iter().filter(|(_, failed)| *failed).count(),
            takeoffs: events_by_kind.get("takeoff").copied().unwrap_or(0),
            landings: events_by_kind.get("landing").copied().unwrap_or(0),
            mean_landing_distance,
            max_landing_distance,
            events_by_kind,
        }
    }

    pub fn write_summary(&self) -> Result<PathBuf> {
        let path = self.session_dir().join("summary.json");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.summary())?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Displays, LandingReadout};
    use crate::jump::LandingDirection;
    use crate::tracking::{Direction, Limb};

    fn tick(t: f64, events: Vec<GestureEvent>, landing: Option<LandingReadout>) -> TickOutput {
        TickOutput {
            timestamp_ms: t,
            events,
            displays: Displays {
                left_hand: "Stationary".into(),
                right_hand: "Up (4.0 px/frame)".into(),
                jump: "On Ground".into(),
            },
            landing,
            markers: Vec::new(),
        }
    }

    fn recorder() -> SessionRecorder {
        let mut rec = SessionRecorder::new(
            std::env::temp_dir().join(format!("pose_gestures_test_{}", Uuid::new_v4())),
            Some("unit".into()),
        );
        rec.add_tick(tick(0.0, vec![], None));
        rec.add_tick(tick(
            33.0,
            vec![
                GestureEvent::new(EventKind::Takeoff, 48, 127, 33.0),
                GestureEvent::new(
                    EventKind::LimbDirection {
                        limb: Limb::RightHand,
                        direction: Direction::Up,
                    },
                    73,
                    40,
                    33.0,
                ),
            ],
            None,
        ));
        let landing = LandingReadout {
            distance: 40.0,
            direction: LandingDirection::Left,
        };
        rec.add_tick(tick(
            66.0,
            vec![GestureEvent::new(EventKind::Landing, 36, 127, 66.0)],
            Some(landing),
        ));
        // Readout lingers on later ticks; it must not be double counted.
        rec.add_tick(tick(99.0, vec![], Some(landing)));
        rec.add_failed_tick(tick(132.0, vec![], Some(landing)));
        rec
    }

    #[test]
    fn test_summary_counts() {
        let summary = recorder().summary();
        assert_eq!(summary.session_name, "unit");
        assert_eq!(summary.total_frames, 5);
        assert_eq!(summary.failed_frames, 1);
        assert_eq!(summary.takeoffs, 1);
        assert_eq!(summary.landings, 1);
        assert_eq!(summary.mean_landing_distance, Some(40.0));
        assert_eq!(summary.max_landing_distance, Some(40.0));
        assert_eq!(summary.events_by_kind.get("limb_direction"), Some(&1));
    }

    #[test]
    fn test_export_writes_files() {
        let rec = recorder();
        let (status_path, events_path) = rec.export_csv().unwrap();

        let status = std::fs::read_to_string(&status_path).unwrap();
        assert_eq!(status.lines().count(), 6);
        assert!(status.lines().next().unwrap().starts_with("frame,timestamp_ms"));

        let events = std::fs::read_to_string(&events_path).unwrap();
        assert_eq!(events.lines().count(), 4);
        assert!(events.contains("limb_direction,right_hand,Up,73,40"));

        let summary_path = rec.write_summary().unwrap();
        let json = std::fs::read_to_string(summary_path).unwrap();
        assert!(json.contains("\"landings\": 1"));

        let _ = std::fs::remove_dir_all(rec.output_dir);
    }
}
