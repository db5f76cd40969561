// src/keypoints.rs
//! Per-frame pose estimation input.
//!
//! A [`KeypointFrame`] is whatever the external pose model produced for one
//! video frame: a handful of named 2D landmarks in the video's pixel space,
//! each with a confidence score. Landmarks the model could not place may be
//! missing entirely or present with a low score.

use std::collections::HashMap;

use nalgebra::Vector2;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// 2D pixel position (y grows downward, as in image space).
pub type Position = Vector2<f32>;

/// COCO-17 body landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Landmark {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Landmark {
    pub const ALL: [Landmark; 17] = [
        Landmark::Nose,
        Landmark::LeftEye,
        Landmark::RightEye,
        Landmark::LeftEar,
        Landmark::RightEar,
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftElbow,
        Landmark::RightElbow,
        Landmark::LeftWrist,
        Landmark::RightWrist,
        Landmark::LeftHip,
        Landmark::RightHip,
        Landmark::LeftKnee,
        Landmark::RightKnee,
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    /// Look up a landmark by its snake_case name. Unknown names (extra
    /// points some models emit, e.g. foot or face meshes) return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        static BY_NAME: Lazy<HashMap<&'static str, Landmark>> =
            Lazy::new(|| Landmark::ALL.iter().map(|l| (l.name(), *l)).collect());
        BY_NAME.get(name).copied()
    }
}

/// One estimated landmark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub name: Landmark,
    pub x: f32,
    pub y: f32,
    /// Detection confidence in [0, 1].
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(name: Landmark, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            name,
            x,
            y,
            confidence,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn is_usable(&self, min_confidence: f32) -> bool {
        self.confidence >= min_confidence
    }
}

/// Wire shape of a keypoint as dumped by the pose model.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawKeypoint {
    name: String,
    x: f32,
    y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
}

impl From<&Keypoint> for RawKeypoint {
    fn from(kp: &Keypoint) -> Self {
        Self {
            name: kp.name.name().to_string(),
            x: kp.x,
            y: kp.y,
            score: Some(kp.confidence),
        }
    }
}

/// All landmarks produced by one estimation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFrame", into = "RawFrame")]
pub struct KeypointFrame {
    keypoints: Vec<Keypoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawFrame {
    #[serde(default)]
    keypoints: Vec<RawKeypoint>,
}

impl From<RawFrame> for KeypointFrame {
    fn from(raw: RawFrame) -> Self {
        let keypoints = raw
            .keypoints
            .into_iter()
            .filter_map(|kp| {
                let name = Landmark::from_name(&kp.name)?;
                // A missing score means the model gave no confidence at all.
                let confidence = kp.score.unwrap_or(0.0).clamp(0.0, 1.0);
                Some(Keypoint::new(name, kp.x, kp.y, confidence))
            })
            .collect();
        Self { keypoints }
    }
}

impl From<KeypointFrame> for RawFrame {
    fn from(frame: KeypointFrame) -> Self {
        Self {
            keypoints: frame.keypoints.iter().map(RawKeypoint::from).collect(),
        }
    }
}

impl KeypointFrame {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    /// Builder-style helper, mostly for tests and simulation.
    pub fn with(mut self, name: Landmark, x: f32, y: f32, confidence: f32) -> Self {
        self.keypoints.push(Keypoint::new(name, x, y, confidence));
        self
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// First keypoint with the given name, regardless of confidence.
    pub fn get(&self, name: Landmark) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.name == name)
    }

    /// The keypoint only if its confidence reaches `min_confidence`.
    pub fn usable(&self, name: Landmark, min_confidence: f32) -> Option<&Keypoint> {
        self.get(name).filter(|kp| kp.is_usable(min_confidence))
    }
}
