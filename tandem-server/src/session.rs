//! Per-connection message routing
//!
//! One `SessionHandler` is bound to each socket connection. It gates every
//! inbound message on join state and turns client messages into targeted
//! room broadcasts.

use std::sync::Arc;

use tracing::{debug, info, warn};

use tandem_protocol::{ClientMessage, Color, ErrorCode, ServerMessage};

use crate::registry::{JoinError, RoomRegistry, SessionId};

/// Membership remembered after a successful join
#[derive(Debug, Clone)]
struct Membership {
    room_id: String,
    user_id: String,
}

/// Routes inbound messages for a single connection
pub struct SessionHandler {
    session_id: SessionId,
    registry: Arc<RoomRegistry>,
    membership: Option<Membership>,
}

impl SessionHandler {
    pub fn new(registry: Arc<RoomRegistry>, session_id: SessionId) -> Self {
        Self {
            session_id,
            registry,
            membership: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn is_joined(&self) -> bool {
        self.membership.is_some()
    }

    /// Route one inbound message
    ///
    /// Messages arriving before a successful join (other than the join
    /// itself and keepalive pings) are dropped, not answered.
    pub fn handle_message(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinRoom {
                room_id,
                user_id,
                color,
            } => self.handle_join(room_id, user_id, color),
            ClientMessage::Ping => {
                self.registry.send_to(self.session_id, ServerMessage::Pong);
            }
            ClientMessage::LeaveRoom => self.handle_leave(),
            other => self.handle_room_message(other),
        }
    }

    /// Socket closed: leave the room and drop all session state
    pub fn on_disconnect(&mut self) {
        self.membership = None;
        self.registry.unregister_session(self.session_id);
    }

    fn handle_join(&mut self, room_id: String, user_id: String, color: Color) {
        if self.membership.is_some() {
            self.registry.send_to(
                self.session_id,
                ServerMessage::Error {
                    code: ErrorCode::AlreadyJoined,
                    message: "session already joined a room".to_string(),
                },
            );
            return;
        }

        match self.registry.join(self.session_id, &room_id, &user_id, color) {
            Ok(users) => {
                info!(
                    "{} joined room {} as {} ({} peers)",
                    self.session_id,
                    room_id,
                    user_id,
                    users.len()
                );
                self.registry
                    .send_to(self.session_id, ServerMessage::RoomJoined { users });
                self.registry.broadcast(
                    &room_id,
                    self.session_id,
                    ServerMessage::UserJoined {
                        user_id: user_id.clone(),
                        color,
                    },
                );
                self.membership = Some(Membership { room_id, user_id });
            }
            Err(JoinError::RoomFull) => {
                info!("{} refused: room {} is full", self.session_id, room_id);
                self.registry
                    .send_to(self.session_id, ServerMessage::RoomFull { room_id });
            }
            Err(JoinError::UserIdTaken) => {
                info!(
                    "{} refused: user id {} taken in room {}",
                    self.session_id, user_id, room_id
                );
                self.registry.send_to(
                    self.session_id,
                    ServerMessage::Error {
                        code: ErrorCode::UserIdTaken,
                        message: format!("user id {} already taken in room {}", user_id, room_id),
                    },
                );
            }
            Err(e) => {
                warn!("{} join failed: {}", self.session_id, e);
                self.registry.send_to(
                    self.session_id,
                    ServerMessage::Error {
                        code: ErrorCode::InternalError,
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    fn handle_leave(&mut self) {
        if self.membership.take().is_some() {
            self.registry.leave(self.session_id);
        }
    }

    fn handle_room_message(&mut self, msg: ClientMessage) {
        let Some(membership) = &self.membership else {
            debug!(
                "{} dropped {:?} before join",
                self.session_id,
                std::mem::discriminant(&msg)
            );
            return;
        };

        let relay = match msg {
            ClientMessage::UpdateTransform { transform } => ServerMessage::RemoteTransform {
                user_id: membership.user_id.clone(),
                transform,
            },
            ClientMessage::UpdateGesture { gesture } => ServerMessage::RemoteGesture {
                user_id: membership.user_id.clone(),
                gesture,
            },
            // Task payload is passed through unmodified; attribution stays implicit
            ClientMessage::TaskUpdate { update } => ServerMessage::TaskChanged { update },
            ClientMessage::VoiceComment {
                task_id,
                text,
                timestamp,
            } => ServerMessage::NewComment {
                user_id: membership.user_id.clone(),
                task_id,
                text,
                timestamp,
            },
            // Join, ping, and leave were handled before dispatch
            _ => return,
        };

        self.registry
            .broadcast(&membership.room_id, self.session_id, relay);
    }
}
