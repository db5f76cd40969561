// src/replay.rs
//! Recorded pose-model output, played back frame by frame.
//!
//! A dump is JSON lines, one estimation pass per line:
//!
//! ```text
//! {"timestamp_ms": 0.0, "keypoints": [{"name": "nose", "x": 320, "y": 80, "score": 0.9}, ...]}
//! {"timestamp_ms": 33.3, "error": "model timed out"}
//! ```
//!
//! Lines with an `error` field stand for frames where detection failed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::error::{DetectionError, ReplayError};
use crate::keypoints::KeypointFrame;

pub const DEFAULT_FRAME_MS: f64 = 1000.0 / 30.0;

#[derive(Debug, Deserialize)]
struct FrameRecord {
    #[serde(default)]
    timestamp_ms: Option<f64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    frame: KeypointFrame,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub timestamp_ms: f64,
    pub detection: Result<KeypointFrame, DetectionError>,
}

pub struct FrameReplay {
    pub path: PathBuf,
    frames: Vec<RecordedFrame>,
    current_frame: usize,
}

impl FrameReplay {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| ReplayError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_reader(path, BufReader::new(file))
    }

    pub fn from_reader(path: PathBuf, reader: impl BufRead) -> Result<Self, ReplayError> {
        let mut frames = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| ReplayError::Io {
                path: path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FrameRecord = serde_json::from_str(&line)
                .map_err(|source| ReplayError::Malformed { line: idx + 1, source })?;

            let timestamp_ms = record
                .timestamp_ms
                .unwrap_or(frames.len() as f64 * DEFAULT_FRAME_MS);
            let detection = match record.error {
                Some(message) => Err(DetectionError(message)),
                None => Ok(record.frame),
            };
            frames.push(RecordedFrame {
                timestamp_ms,
                detection,
            });
        }

        if frames.is_empty() {
            return Err(ReplayError::Empty(path));
        }
        info!("loaded {} frames from {}", frames.len(), path.display());

        Ok(Self {
            path,
            frames,
            current_frame: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    pub fn next_frame(&mut self) -> Option<&RecordedFrame> {
        let frame = self.frames.get(self.current_frame)?;
        self.current_frame += 1;
        Some(frame)
    }

    pub fn seek(&mut self, frame_index: usize) {
        self.current_frame = frame_index.min(self.frames.len());
    }

    pub fn get_progress(&self) -> f32 {
        if self.frames.is_empty() {
            0.0
        } else {
            self.current_frame as f32 / self.frames.len() as f32
        }
    }

    /// Average frame rate implied by the recorded timestamps.
    pub fn fps(&self) -> f64 {
        let span = match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => 0.0,
        };
        if span <= 0.0 {
            return 1000.0 / DEFAULT_FRAME_MS;
        }
        (self.frames.len() - 1) as f64 * 1000.0 / span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoints::Landmark;

    fn replay(text: &str) -> Result<FrameReplay, ReplayError> {
        FrameReplay::from_reader(PathBuf::from("test.jsonl"), text.as_bytes())
    }

    #[test]
    fn test_parses_frames_and_failures() {
        let text = r#"{"timestamp_ms": 0.0, "keypoints": [{"name": "nose", "x": 1.0, "y": 2.0, "score": 0.8}]}

{"timestamp_ms": 40.0, "error": "model threw"}
{"timestamp_ms": 80.0, "keypoints": []}
"#;
        let mut replay = replay(text).unwrap();
        assert_eq!(replay.len(), 3);

        let first = replay.next_frame().unwrap();
        let frame = first.detection.as_ref().unwrap();
        assert!(frame.usable(Landmark::Nose, 0.5).is_some());

        let second = replay.next_frame().unwrap();
        assert_eq!(second.detection, Err(DetectionError("model threw".into())));
        assert_eq!(second.timestamp_ms, 40.0);

        assert!((replay.fps() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_timestamps_use_default_rate() {
        let text = "{\"keypoints\": []}\n{\"keypoints\": []}\n";
        let replay = replay(text).unwrap();
        assert_eq!(replay.frames()[1].timestamp_ms, DEFAULT_FRAME_MS);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let text = "{\"keypoints\": []}\nnot json\n";
        match replay(text) {
            Err(ReplayError::Malformed { line, .. }) => assert_eq!(line, 2),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected malformed error"),
        }
    }

    #[test]
    fn test_empty_dump_is_an_error() {
        assert!(matches!(replay("\n\n"), Err(ReplayError::Empty(_))));
    }

    #[test]
    fn test_seek_and_progress() {
        let text = "{\"keypoints\": []}\n".repeat(4);
        let mut replay = replay(&text).unwrap();
        replay.seek(2);
        assert_eq!(replay.get_progress(), 0.5);
        assert!(replay.next_frame().is_some());
        assert!(replay.next_frame().is_some());
        assert!(replay.next_frame().is_none());
        replay.seek(100);
        assert_eq!(replay.get_progress(), 1.0);
    }
}
