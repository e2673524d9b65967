//! tandem-protocol: shared wire definitions for client-server communication
//!
//! This crate defines all message types and data structures exchanged
//! between the tandem client and relay server over framed Unix/TCP sockets.

pub mod codec;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{ClientCodec, CodecError, ServerCodec};
pub use messages::{ClientMessage, ErrorCode, ServerMessage};
pub use types::{
    Color, Comment, GestureSample, HandGesture, ParticipantInfo, Quat, SwipeDirection, TaskColumn,
    TaskPriority, TaskRecord, TaskUpdate, TransformSample, Vec3,
};

/// Hard upper bound on participants in a single room
pub const ROOM_CAPACITY: usize = 4;
