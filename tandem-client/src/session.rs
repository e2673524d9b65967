//! Tick-driven session facade

use tokio::sync::broadcast;
use tracing::warn;

use tandem_protocol::{Color, GestureSample, ParticipantInfo, TaskUpdate, TransformSample};
use tandem_utils::Result;

use crate::board::TaskBoardReplica;
use crate::presence::PresenceReplica;
use crate::transport::{SessionEvent, SyncTransport, TransportConfig};

/// Owns the transport plus both replicas and pumps events once per tick
///
/// The replica maps are owned by the caller's tick: no event is applied
/// outside `pump()`, so consumers can read `presence` and `board` between
/// ticks without any synchronization.
pub struct CollabSession {
    transport: SyncTransport,
    events: broadcast::Receiver<SessionEvent>,
    pub presence: PresenceReplica,
    pub board: TaskBoardReplica,
}

impl CollabSession {
    pub fn new(config: TransportConfig) -> Self {
        let transport = SyncTransport::new(config);
        let events = transport.subscribe();
        Self {
            transport,
            events,
            presence: PresenceReplica::new(),
            board: TaskBoardReplica::new(),
        }
    }

    /// Connect and join; seeds the presence replica from the roster
    pub async fn connect(
        &mut self,
        room_id: &str,
        user_id: &str,
        color: Color,
    ) -> Result<Vec<ParticipantInfo>> {
        let users = self.transport.connect(room_id, user_id, color).await?;
        self.presence.seed_roster(&users);
        Ok(users)
    }

    /// Drain pending events into the replicas; call once per client tick
    ///
    /// Returns the drained batch so the UI layer can react to the same
    /// events without a second subscription.
    pub fn pump(&mut self) -> Vec<SessionEvent> {
        let mut drained = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.presence.apply(&event);
                    self.board.apply(&event);
                    drained.push(event);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Event consumer lagged, {} events dropped", n);
                }
                Err(_) => break,
            }
        }
        drained
    }

    // ==================== Transport passthrough ====================

    pub fn send_transform(&mut self, transform: TransformSample) {
        self.transport.send_transform(transform);
    }

    pub fn send_gesture(&self, gesture: GestureSample) {
        self.transport.send_gesture(gesture);
    }

    pub fn send_task_update(&self, update: TaskUpdate) {
        self.transport.send_task_update(update);
    }

    pub fn send_comment(&self, task_id: &str, text: &str, timestamp: u64) {
        self.transport.send_comment(task_id, text, timestamp);
    }

    pub fn leave(&self) {
        self.transport.leave();
    }

    pub async fn disconnect(&mut self) {
        self.transport.disconnect().await;
    }

    pub fn transport(&self) -> &SyncTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut SyncTransport {
        &mut self.transport
    }
}
