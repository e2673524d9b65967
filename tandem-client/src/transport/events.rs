//! Typed events pushed to transport subscribers

use serde::Serialize;

use tandem_protocol::{Color, GestureSample, ServerMessage, TaskUpdate, TransformSample};

/// Event delivered to every transport subscriber
///
/// Each consumer (presence replica, task board replica, UI) holds its own
/// broadcast receiver, so consumers never interfere with each other.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum SessionEvent {
    UserJoined {
        user_id: String,
        color: Color,
    },
    UserLeft {
        user_id: String,
    },
    RemoteTransform {
        user_id: String,
        transform: TransformSample,
    },
    RemoteGesture {
        user_id: String,
        gesture: GestureSample,
    },
    TaskChanged {
        update: TaskUpdate,
    },
    NewComment {
        user_id: String,
        task_id: String,
        text: String,
        timestamp: u64,
    },
    /// The server closed the connection or the stream failed. The transport
    /// does not reconnect on its own; the caller must connect() again.
    ConnectionLost,
}

impl SessionEvent {
    /// Map a relayed server message to its client-side event, if any
    pub(crate) fn from_server_message(msg: ServerMessage) -> Option<Self> {
        match msg {
            ServerMessage::UserJoined { user_id, color } => {
                Some(Self::UserJoined { user_id, color })
            }
            ServerMessage::UserLeft { user_id } => Some(Self::UserLeft { user_id }),
            ServerMessage::RemoteTransform { user_id, transform } => {
                Some(Self::RemoteTransform { user_id, transform })
            }
            ServerMessage::RemoteGesture { user_id, gesture } => {
                Some(Self::RemoteGesture { user_id, gesture })
            }
            ServerMessage::TaskChanged { update } => Some(Self::TaskChanged { update }),
            ServerMessage::NewComment {
                user_id,
                task_id,
                text,
                timestamp,
            } => Some(Self::NewComment {
                user_id,
                task_id,
                text,
                timestamp,
            }),
            // Keepalive and join-phase messages never reach subscribers
            ServerMessage::Pong
            | ServerMessage::RoomJoined { .. }
            | ServerMessage::RoomFull { .. }
            | ServerMessage::Error { .. } => None,
        }
    }
}
