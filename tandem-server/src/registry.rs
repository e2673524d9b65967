//! Room and session registry
//!
//! Tracks connected sessions and room membership, enforces the per-room
//! capacity invariant, and fans relay messages out to room members.
//! All mutation of one room happens under that room's map entry, so joins
//! and leaves on the same room never interleave.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tandem_protocol::{Color, ParticipantInfo, ServerMessage, ROOM_CAPACITY};

/// Unique identifier for one connected session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a SessionId from a raw value (mainly for testing)
    #[cfg(test)]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

/// One participant inside a room
#[derive(Debug, Clone)]
pub struct Participant {
    pub session_id: SessionId,
    pub user_id: String,
    pub color: Color,
    /// Unix timestamp (seconds) of the join
    pub joined_at: u64,
}

impl Participant {
    fn to_info(&self) -> ParticipantInfo {
        ParticipantInfo {
            user_id: self.user_id.clone(),
            color: self.color,
            joined_at: self.joined_at,
        }
    }
}

/// Why a join was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("room is at capacity")]
    RoomFull,

    #[error("user id already taken in this room")]
    UserIdTaken,

    #[error("session already joined a room")]
    AlreadyJoined,

    #[error("unknown session")]
    UnknownSession,
}

/// Entry for a connected session
struct SessionEntry {
    /// Channel for sending messages to this session's connection task
    sender: mpsc::Sender<ServerMessage>,
    /// Room this session has joined (if any)
    room_id: Option<String>,
}

struct Room {
    members: HashMap<SessionId, Participant>,
}

/// Registry tracking all connected sessions and active rooms
///
/// Thread-safe for concurrent access from per-connection tasks.
pub struct RoomRegistry {
    /// Session ID -> session entry
    sessions: DashMap<SessionId, SessionEntry>,
    /// Room ID -> room membership
    rooms: DashMap<String, Room>,
    /// Counter for generating unique session IDs
    next_session_id: AtomicU64,
    /// Maximum participants per room
    capacity: usize,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(ROOM_CAPACITY)
    }
}

impl RoomRegistry {
    /// Create a registry with the given per-room capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            next_session_id: AtomicU64::new(1),
            capacity,
        }
    }

    // ==================== Session Management ====================

    /// Register a new connection
    ///
    /// Returns the assigned SessionId for this connection.
    pub fn register_session(&self, sender: mpsc::Sender<ServerMessage>) -> SessionId {
        let id = SessionId(self.next_session_id.fetch_add(1, Ordering::SeqCst));

        self.sessions.insert(
            id,
            SessionEntry {
                sender,
                room_id: None,
            },
        );
        debug!("Registered {}", id);

        id
    }

    /// Unregister a connection
    ///
    /// Leaves the session's room first (broadcasting `user-left` to the
    /// remaining members), then discards the session entry.
    pub fn unregister_session(&self, session_id: SessionId) -> Option<(String, String)> {
        let left = self.leave(session_id);
        if self.sessions.remove(&session_id).is_some() {
            debug!("Unregistered {}", session_id);
        }
        left
    }

    /// Get the number of connected sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // ==================== Room Membership ====================

    /// Join a room
    ///
    /// Atomic per room: the capacity check and the insert happen under one
    /// map entry, so concurrent joins to the same room serialize. Returns
    /// the roster of the *other* current members on success.
    pub fn join(
        &self,
        session_id: SessionId,
        room_id: &str,
        user_id: &str,
        color: Color,
    ) -> Result<Vec<ParticipantInfo>, JoinError> {
        {
            let entry = self
                .sessions
                .get(&session_id)
                .ok_or(JoinError::UnknownSession)?;
            if entry.room_id.is_some() {
                return Err(JoinError::AlreadyJoined);
            }
        }

        let roster = {
            let mut room = self
                .rooms
                .entry(room_id.to_string())
                .or_insert_with(|| Room {
                    members: HashMap::new(),
                });

            if room.members.len() >= self.capacity {
                return Err(JoinError::RoomFull);
            }
            if room.members.values().any(|p| p.user_id == user_id) {
                return Err(JoinError::UserIdTaken);
            }

            room.members.insert(
                session_id,
                Participant {
                    session_id,
                    user_id: user_id.to_string(),
                    color,
                    joined_at: unix_now(),
                },
            );

            room.members
                .values()
                .filter(|p| p.session_id != session_id)
                .map(Participant::to_info)
                .collect()
        };

        if let Some(mut entry) = self.sessions.get_mut(&session_id) {
            entry.room_id = Some(room_id.to_string());
        }

        debug!("{} joined room {} as {}", session_id, room_id, user_id);
        Ok(roster)
    }

    /// Leave the current room
    ///
    /// Removes the participant, broadcasts `user-left` to the remaining
    /// members, and deletes the room immediately if it is now empty (no
    /// idle-room grace period). Returns `(room_id, user_id)` if the session
    /// was in a room.
    pub fn leave(&self, session_id: SessionId) -> Option<(String, String)> {
        let room_id = {
            let mut entry = self.sessions.get_mut(&session_id)?;
            entry.room_id.take()?
        };

        let (user_id, remaining, now_empty) = {
            let mut room = self.rooms.get_mut(&room_id)?;
            let participant = room.members.remove(&session_id)?;
            let remaining: Vec<SessionId> = room.members.keys().copied().collect();
            let now_empty = room.members.is_empty();
            (participant.user_id, remaining, now_empty)
        };

        // user-left goes out before the room record disappears
        for sid in remaining {
            self.try_send(
                sid,
                ServerMessage::UserLeft {
                    user_id: user_id.clone(),
                },
            );
        }

        if now_empty
            && self
                .rooms
                .remove_if(&room_id, |_, room| room.members.is_empty())
                .is_some()
        {
            debug!("Room {} empty, deleted", room_id);
        }

        debug!("{} left room {} ({})", session_id, room_id, user_id);
        Some((room_id, user_id))
    }

    /// Get the room a session has joined
    pub fn session_room(&self, session_id: SessionId) -> Option<String> {
        self.sessions.get(&session_id)?.room_id.clone()
    }

    /// Get the number of active rooms
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Get the number of members in a room
    pub fn room_size(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|room| room.members.len())
            .unwrap_or(0)
    }

    /// Get the roster of a room
    pub fn room_members(&self, room_id: &str) -> Vec<ParticipantInfo> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.values().map(Participant::to_info).collect())
            .unwrap_or_default()
    }

    // ==================== Message Delivery ====================

    /// Send a message to one session (non-blocking)
    ///
    /// Best-effort: returns `false` if the session is gone, its channel is
    /// closed, or its channel is full. A closed channel gets the session
    /// unregistered.
    pub fn send_to(&self, session_id: SessionId, message: ServerMessage) -> bool {
        self.try_send(session_id, message)
    }

    /// Broadcast a message to every member of a room except one
    ///
    /// Best-effort, no delivery confirmation, no retry. Returns the number
    /// of members the message was queued for.
    pub fn broadcast(&self, room_id: &str, exclude: SessionId, message: ServerMessage) -> usize {
        let targets: Vec<SessionId> = match self.rooms.get(room_id) {
            Some(room) => room
                .members
                .keys()
                .copied()
                .filter(|&sid| sid != exclude)
                .collect(),
            None => return 0,
        };

        if targets.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        for sid in targets {
            if self.try_send(sid, message.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    fn try_send(&self, session_id: SessionId, message: ServerMessage) -> bool {
        let sender = match self.sessions.get(&session_id) {
            Some(entry) => entry.sender.clone(),
            None => return false,
        };

        match sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("{} channel closed, removing from registry", session_id);
                self.unregister_session(session_id);
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("{} channel full, message dropped", session_id);
                false
            }
        }
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("session_count", &self.sessions.len())
            .field("room_count", &self.rooms.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
