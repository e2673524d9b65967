//! Domain types carried on the wire

pub mod board;
pub mod presence;

pub use board::{Comment, TaskColumn, TaskPriority, TaskRecord, TaskUpdate};
pub use presence::{
    Color, GestureSample, HandGesture, ParticipantInfo, Quat, SwipeDirection, TransformSample,
    Vec3,
};
