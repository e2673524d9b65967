//! Client-server message types

use serde::{Deserialize, Serialize};

use crate::types::*;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMessage {
    /// Join a room; must be the first message on a connection
    JoinRoom {
        room_id: String,
        user_id: String,
        color: Color,
    },

    /// Latest head/hand transform snapshot (high-frequency, best-effort)
    UpdateTransform { transform: TransformSample },

    /// Latest classified gesture state (sent every client tick)
    UpdateGesture { gesture: GestureSample },

    /// Mutation of a shared task card
    TaskUpdate { update: TaskUpdate },

    /// Voice-derived comment on a task
    VoiceComment {
        task_id: String,
        text: String,
        timestamp: u64,
    },

    /// Leave the current room (connection stays open)
    LeaveRoom,

    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerMessage {
    /// Join accepted; carries the roster of other current members
    RoomJoined { users: Vec<ParticipantInfo> },

    /// Join rejected: the room is at capacity
    RoomFull { room_id: String },

    /// A peer joined the room
    UserJoined { user_id: String, color: Color },

    /// A peer left the room or disconnected
    UserLeft { user_id: String },

    /// Relayed transform snapshot from a peer
    RemoteTransform {
        user_id: String,
        transform: TransformSample,
    },

    /// Relayed gesture state from a peer
    RemoteGesture {
        user_id: String,
        gesture: GestureSample,
    },

    /// Relayed task mutation (payload passed through unmodified)
    TaskChanged { update: TaskUpdate },

    /// Relayed comment with sender attribution
    NewComment {
        user_id: String,
        task_id: String,
        text: String,
        timestamp: u64,
    },

    /// Error response
    Error { code: ErrorCode, message: String },

    /// Pong response to ping
    Pong,
}

/// Error codes for protocol errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    AlreadyJoined,
    UserIdTaken,
    InvalidOperation,
    InternalError,
}
