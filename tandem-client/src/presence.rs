//! Remote participant mirror and presence derivation

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use tandem_protocol::{Color, GestureSample, ParticipantInfo, TransformSample};

use crate::transport::SessionEvent;

/// A participant is Active under 30s of silence, Idle under 120s
pub const ACTIVE_WINDOW: Duration = Duration::from_secs(30);
pub const IDLE_WINDOW: Duration = Duration::from_secs(120);

/// Derived activity classification
///
/// Never stored authoritatively; recomputed from update recency each tick.
/// Status flips the moment a threshold is crossed, with no debounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Active,
    Idle,
    Away,
}

/// Mirrored state for one remote participant
#[derive(Debug, Clone)]
pub struct RemoteParticipant {
    pub user_id: String,
    pub color: Color,
    /// Latest transform snapshot, if any has arrived
    pub transform: Option<TransformSample>,
    /// Latest gesture state, if any has arrived
    pub gesture: Option<GestureSample>,
    last_update: Instant,
}

impl RemoteParticipant {
    fn new(user_id: String, color: Color) -> Self {
        Self {
            user_id,
            color,
            transform: None,
            gesture: None,
            last_update: Instant::now(),
        }
    }

    /// Derive status against the current time
    pub fn status(&self) -> PresenceStatus {
        self.status_at(Instant::now())
    }

    /// Derive status against an explicit clock reading
    pub fn status_at(&self, now: Instant) -> PresenceStatus {
        let silence = now.saturating_duration_since(self.last_update);
        if silence < ACTIVE_WINDOW {
            PresenceStatus::Active
        } else if silence < IDLE_WINDOW {
            PresenceStatus::Idle
        } else {
            PresenceStatus::Away
        }
    }
}

/// Client-side mirror of the other participants in the room
///
/// Owned by the client tick; entries are created by the join roster and
/// `UserJoined` events only. Samples for users we have never seen are
/// dropped.
#[derive(Debug, Default)]
pub struct PresenceReplica {
    participants: HashMap<String, RemoteParticipant>,
}

impl PresenceReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed entries from the join ack roster
    pub fn seed_roster(&mut self, users: &[ParticipantInfo]) {
        for user in users {
            self.participants.insert(
                user.user_id.clone(),
                RemoteParticipant::new(user.user_id.clone(), user.color),
            );
        }
    }

    /// Apply one transport event; non-presence events are ignored
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::UserJoined { user_id, color } => {
                self.participants.insert(
                    user_id.clone(),
                    RemoteParticipant::new(user_id.clone(), *color),
                );
            }
            SessionEvent::UserLeft { user_id } => {
                self.participants.remove(user_id);
            }
            SessionEvent::RemoteTransform { user_id, transform } => {
                match self.participants.get_mut(user_id) {
                    Some(participant) => {
                        participant.transform = Some(*transform);
                        participant.last_update = Instant::now();
                    }
                    None => debug!("Transform for unknown user {} dropped", user_id),
                }
            }
            SessionEvent::RemoteGesture { user_id, gesture } => {
                match self.participants.get_mut(user_id) {
                    Some(participant) => {
                        participant.gesture = Some(*gesture);
                        participant.last_update = Instant::now();
                    }
                    None => debug!("Gesture for unknown user {} dropped", user_id),
                }
            }
            _ => {}
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&RemoteParticipant> {
        self.participants.get(user_id)
    }

    pub fn status_of(&self, user_id: &str) -> Option<PresenceStatus> {
        self.participants.get(user_id).map(RemoteParticipant::status)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteParticipant> {
        self.participants.values()
    }
}
