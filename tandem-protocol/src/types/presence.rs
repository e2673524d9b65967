//! Presence types: participant identity, transforms, gestures

use serde::{Deserialize, Serialize};

/// RGB color assigned to a participant at join time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Position in meters, right-handed coordinate system
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Orientation quaternion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One snapshot of head and hand transforms at a sync tick
///
/// Ephemeral: each sample fully replaces the previous one; no history is
/// retained anywhere.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TransformSample {
    pub head_pos: Vec3,
    pub head_rot: Quat,
    pub left_hand_pos: Vec3,
    pub left_hand_rot: Quat,
    pub right_hand_pos: Vec3,
    pub right_hand_rot: Quat,
}

/// Symbolic hand gesture supplied by the external classifier
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HandGesture {
    #[default]
    None,
    Open,
    Fist,
    Point,
    Pinch,
    ThumbsUp,
}

/// Swipe direction detected alongside hand gestures
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SwipeDirection {
    #[default]
    None,
    Left,
    Right,
    Up,
    Down,
}

/// Already-classified gesture state for both hands
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GestureSample {
    pub left_hand: HandGesture,
    pub right_hand: HandGesture,
    pub swipe: SwipeDirection,
}

/// Roster entry describing one room member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub user_id: String,
    pub color: Color,
    /// Unix timestamp (seconds) of the successful join
    pub joined_at: u64,
}
