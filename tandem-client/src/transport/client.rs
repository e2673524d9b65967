//! Sync transport: connection lifecycle, join handshake, typed sends

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use url::Url;

use tandem_protocol::{
    ClientCodec, ClientMessage, Color, ErrorCode, GestureSample, ParticipantInfo, ServerMessage,
    TaskUpdate, TransformSample,
};
use tandem_utils::{socket_path, Result, TandemError};

use super::events::SessionEvent;
use super::throttle::EmitThrottle;

/// Trait alias for streams that can be used with Framed
pub trait StreamTrait: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamTrait for T {}

type FramedStream = Framed<Box<dyn StreamTrait>, ClientCodec>;

/// Transport lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingJoinAck,
    Connected,
    Reconnecting,
}

/// Tunables for the sync transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connection address (unix://path or tcp://host:port)
    pub connect_addr: String,
    /// Attempt budget for one connect() call
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
    /// Minimum spacing between transform emissions
    pub transform_interval: Duration,
    /// Event broadcast channel capacity
    pub event_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_addr: format!("unix://{}", socket_path().to_string_lossy()),
            max_attempts: 5,
            retry_delay: Duration::from_secs(1),
            transform_interval: Duration::from_millis(50),
            event_capacity: 256,
        }
    }
}

impl TransportConfig {
    /// Config pointing at a custom address
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self {
            connect_addr: addr.into(),
            ..Self::default()
        }
    }
}

/// What the join handshake resolved to
enum JoinOutcome {
    Joined {
        users: Vec<ParticipantInfo>,
        framed: FramedStream,
    },
    Full {
        room_id: String,
    },
    Rejected {
        code: ErrorCode,
        message: String,
    },
}

/// Client connection to the tandem relay
///
/// Steady-state sends are fire-and-forget and silently no-op while not
/// connected; only `connect()` suspends the caller. Incoming relay traffic
/// is pushed to broadcast subscribers as [`SessionEvent`]s.
pub struct SyncTransport {
    config: TransportConfig,
    state: ConnectionState,
    /// Channel into the I/O task (present while connected)
    outgoing: Option<mpsc::Sender<ClientMessage>>,
    events: broadcast::Sender<SessionEvent>,
    io_task: Option<JoinHandle<()>>,
    transform_gate: EmitThrottle,
    /// Cancellation flag checked between retry attempts
    cancel: Arc<AtomicBool>,
    attempts_made: u32,
}

impl SyncTransport {
    pub fn new(config: TransportConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let transform_gate = EmitThrottle::new(config.transform_interval);

        Self {
            config,
            state: ConnectionState::Disconnected,
            outgoing: None,
            events,
            io_task: None,
            transform_gate,
            cancel: Arc::new(AtomicBool::new(false)),
            attempts_made: 0,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Register a new event consumer
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Attempts consumed by the most recent connect() call
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Connect to the relay and join a room
    ///
    /// Resolves with the roster of other current members once the server
    /// acks the join. Transport-level failures are retried with a fixed
    /// delay up to the configured attempt budget; `RoomFull` and join
    /// rejections fail immediately without retrying.
    pub async fn connect(
        &mut self,
        room_id: &str,
        user_id: &str,
        color: Color,
    ) -> Result<Vec<ParticipantInfo>> {
        if self.state == ConnectionState::Connected {
            return Err(TandemError::connection("transport already connected"));
        }

        self.cancel.store(false, Ordering::SeqCst);
        self.attempts_made = 0;

        for attempt in 1..=self.config.max_attempts {
            if self.cancel.load(Ordering::SeqCst) {
                self.state = ConnectionState::Disconnected;
                return Err(TandemError::connection("connect cancelled"));
            }

            self.state = if attempt == 1 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            };
            self.attempts_made = attempt;

            match self.attempt_join(room_id, user_id, color).await {
                Ok(JoinOutcome::Joined { users, framed }) => {
                    self.spawn_io(framed);
                    self.state = ConnectionState::Connected;
                    info!(
                        "Joined room {} as {} ({} peers)",
                        room_id,
                        user_id,
                        users.len()
                    );
                    return Ok(users);
                }
                Ok(JoinOutcome::Full { room_id }) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(TandemError::RoomFull { room_id });
                }
                Ok(JoinOutcome::Rejected { code, message }) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(TandemError::protocol(format!(
                        "join rejected ({:?}): {}",
                        code, message
                    )));
                }
                Err(e) => {
                    warn!(
                        "Connect attempt {}/{} failed: {}",
                        attempt, self.config.max_attempts, e
                    );
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        Err(TandemError::RetriesExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Tear down the transport; idempotent
    pub async fn disconnect(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = self.io_task.take() {
            handle.abort();
        }
        self.outgoing = None;
        self.state = ConnectionState::Disconnected;
    }

    // ==================== Fire-and-forget sends ====================

    /// Send a transform snapshot
    ///
    /// Throttled to the configured interval regardless of how often the
    /// caller ticks; silently no-ops while not connected. Nothing is queued
    /// for later: a dropped sample is replaced by the next tick's sample.
    pub fn send_transform(&mut self, transform: TransformSample) {
        if self.state != ConnectionState::Connected {
            return;
        }
        if !self.transform_gate.allow() {
            return;
        }
        self.try_send(ClientMessage::UpdateTransform { transform });
    }

    /// Send the current gesture state (unthrottled, every tick)
    pub fn send_gesture(&self, gesture: GestureSample) {
        if self.state != ConnectionState::Connected {
            return;
        }
        self.try_send(ClientMessage::UpdateGesture { gesture });
    }

    /// Send a task mutation
    pub fn send_task_update(&self, update: TaskUpdate) {
        if self.state != ConnectionState::Connected {
            return;
        }
        self.try_send(ClientMessage::TaskUpdate { update });
    }

    /// Send a voice comment on a task
    pub fn send_comment(&self, task_id: &str, text: &str, timestamp: u64) {
        if self.state != ConnectionState::Connected {
            return;
        }
        self.try_send(ClientMessage::VoiceComment {
            task_id: task_id.to_string(),
            text: text.to_string(),
            timestamp,
        });
    }

    /// Leave the room without closing the connection
    pub fn leave(&self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        self.try_send(ClientMessage::LeaveRoom);
    }

    fn try_send(&self, msg: ClientMessage) {
        if let Some(tx) = &self.outgoing {
            let _ = tx.try_send(msg);
        }
    }

    // ==================== Connection internals ====================

    async fn attempt_join(
        &mut self,
        room_id: &str,
        user_id: &str,
        color: Color,
    ) -> Result<JoinOutcome> {
        let stream = dial(&self.config.connect_addr).await?;
        let mut framed = Framed::new(stream, ClientCodec::new());

        framed
            .send(ClientMessage::JoinRoom {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                color,
            })
            .await
            .map_err(|e| TandemError::connection(format!("join send failed: {}", e)))?;

        self.state = ConnectionState::AwaitingJoinAck;

        loop {
            match framed.next().await {
                Some(Ok(ServerMessage::RoomJoined { users })) => {
                    return Ok(JoinOutcome::Joined { users, framed });
                }
                Some(Ok(ServerMessage::RoomFull { room_id })) => {
                    return Ok(JoinOutcome::Full { room_id });
                }
                Some(Ok(ServerMessage::Error { code, message })) => {
                    return Ok(JoinOutcome::Rejected { code, message });
                }
                Some(Ok(other)) => {
                    debug!(
                        "Ignoring pre-join message {:?}",
                        std::mem::discriminant(&other)
                    );
                }
                Some(Err(e)) => {
                    return Err(TandemError::protocol(format!(
                        "handshake decode failed: {}",
                        e
                    )));
                }
                None => return Err(TandemError::ConnectionClosed),
            }
        }
    }

    fn spawn_io(&mut self, framed: FramedStream) {
        let (tx, rx) = mpsc::channel(64);
        self.outgoing = Some(tx);
        let events = self.events.clone();
        self.io_task = Some(tokio::spawn(io_task(framed, rx, events)));
    }
}

/// Background task that owns the socket after the join handshake
async fn io_task(
    mut framed: FramedStream,
    mut outgoing: mpsc::Receiver<ClientMessage>,
    events: broadcast::Sender<SessionEvent>,
) {
    loop {
        tokio::select! {
            Some(msg) = outgoing.recv() => {
                if let Err(e) = framed.send(msg).await {
                    warn!("Failed to send message: {}", e);
                    break;
                }
            }

            inbound = framed.next() => {
                match inbound {
                    Some(Ok(msg)) => {
                        if let Some(event) = SessionEvent::from_server_message(msg) {
                            // No receivers is fine; events are best-effort
                            let _ = events.send(event);
                        }
                    }
                    Some(Err(e)) if e.is_frame_local() => {
                        debug!("Dropped malformed frame: {}", e);
                    }
                    Some(Err(e)) => {
                        warn!("Stream error: {}", e);
                        break;
                    }
                    None => {
                        info!("Server closed connection");
                        break;
                    }
                }
            }
        }
    }

    let _ = events.send(SessionEvent::ConnectionLost);
}

/// Open a stream to `unix://path`, `tcp://host:port`, or a bare socket path
async fn dial(connect_addr: &str) -> Result<Box<dyn StreamTrait>> {
    if connect_addr.starts_with("tcp://") {
        let url = Url::parse(connect_addr).map_err(|e| {
            TandemError::connection(format!("Invalid TCP URL '{}': {}", connect_addr, e))
        })?;

        let host = url
            .host_str()
            .ok_or_else(|| TandemError::connection("Missing host in TCP URL"))?;
        let port = url
            .port()
            .ok_or_else(|| TandemError::connection("Missing port in TCP URL"))?;

        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            TandemError::connection(format!("Failed to connect to {}: {}", addr, e))
        })?;

        Ok(Box::new(stream))
    } else {
        // Assume Unix socket (either unix:// prefix or raw path)
        let path_str = if connect_addr.starts_with("unix://") {
            let url = Url::parse(connect_addr)
                .map_err(|e| TandemError::connection(format!("Invalid Unix URL: {}", e)))?;
            url.path().to_string()
        } else {
            connect_addr.to_string()
        };

        let path = PathBuf::from(path_str);

        if !path.exists() {
            return Err(TandemError::ServerNotRunning { path });
        }

        let stream = UnixStream::connect(&path).await.map_err(|e| {
            TandemError::connection(format!("Failed to connect to {}: {}", path.display(), e))
        })?;

        Ok(Box::new(stream))
    }
}

#[cfg(test)]
impl SyncTransport {
    /// Push an event as if it arrived from the server (test support)
    pub(crate) fn inject_event(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tandem_protocol::ServerCodec;
    use tempfile::tempdir;
    use tokio::net::UnixListener;

    fn test_config(addr: String) -> TransportConfig {
        TransportConfig {
            connect_addr: addr,
            max_attempts: 5,
            retry_delay: Duration::from_millis(1),
            transform_interval: Duration::from_millis(50),
            event_capacity: 64,
        }
    }

    fn color() -> Color {
        Color::new(50, 60, 70)
    }

    /// Mock server that accepts one connection and acks the join
    async fn mock_join_server(
        listener: UnixListener,
        reply: ServerMessage,
    ) -> tokio::task::JoinHandle<Framed<UnixStream, ServerCodec>> {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, ServerCodec::new());
            match framed.next().await.unwrap().unwrap() {
                ClientMessage::JoinRoom { .. } => {}
                other => panic!("expected JoinRoom, got {:?}", other),
            }
            framed.send(reply).await.unwrap();
            framed
        })
    }

    #[tokio::test]
    async fn test_initial_state_disconnected() {
        let transport = SyncTransport::new(TransportConfig::default());
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.attempts_made(), 0);
    }

    #[tokio::test]
    async fn test_connect_no_server_exhausts_retries() {
        let mut transport =
            SyncTransport::new(test_config("unix:///nonexistent/tandem.sock".to_string()));

        let result = transport.connect("r1", "u1", color()).await;

        match result {
            Err(TandemError::RetriesExhausted { attempts }) => assert_eq!(attempts, 5),
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.attempts_made(), 5);
    }

    #[tokio::test]
    async fn test_no_sixth_attempt_after_five_failures() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        // Server that accepts and immediately hangs up, counting accepts
        let accepts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&accepts);
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });

        let mut transport =
            SyncTransport::new(test_config(format!("unix://{}", path.to_string_lossy())));
        let result = transport.connect("r1", "u1", color()).await;

        assert!(matches!(
            result,
            Err(TandemError::RetriesExhausted { attempts: 5 })
        ));

        // Give any stray attempt time to land, then confirm there were
        // exactly five
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(accepts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_connect_joins_room() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let roster = vec![ParticipantInfo {
            user_id: "host".to_string(),
            color: Color::new(1, 2, 3),
            joined_at: 0,
        }];
        let server = mock_join_server(
            listener,
            ServerMessage::RoomJoined {
                users: roster.clone(),
            },
        )
        .await;

        let mut transport =
            SyncTransport::new(test_config(format!("unix://{}", path.to_string_lossy())));
        let users = transport.connect("r1", "u1", color()).await.unwrap();

        assert_eq!(users, roster);
        assert_eq!(transport.state(), ConnectionState::Connected);
        assert_eq!(transport.attempts_made(), 1);

        transport.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_room_full_fails_without_retry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = mock_join_server(
            listener,
            ServerMessage::RoomFull {
                room_id: "r1".to_string(),
            },
        )
        .await;

        let mut transport =
            SyncTransport::new(test_config(format!("unix://{}", path.to_string_lossy())));
        let result = transport.connect("r1", "u1", color()).await;

        match result {
            Err(TandemError::RoomFull { room_id }) => assert_eq!(room_id, "r1"),
            other => panic!("expected RoomFull, got {:?}", other),
        }
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.attempts_made(), 1);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_join_rejection_fails_without_retry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = mock_join_server(
            listener,
            ServerMessage::Error {
                code: ErrorCode::UserIdTaken,
                message: "user id u1 already taken in room r1".to_string(),
            },
        )
        .await;

        let mut transport =
            SyncTransport::new(test_config(format!("unix://{}", path.to_string_lossy())));
        let result = transport.connect("r1", "u1", color()).await;

        assert!(matches!(result, Err(TandemError::Protocol(_))));
        assert_eq!(transport.attempts_made(), 1);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_sends_are_noops_when_disconnected() {
        let mut transport = SyncTransport::new(TransportConfig::default());

        // None of these panic or error while disconnected
        transport.send_transform(TransformSample::default());
        transport.send_gesture(GestureSample::default());
        transport.send_task_update(TaskUpdate::movement("t1", tandem_protocol::TaskColumn::Done, 0));
        transport.send_comment("t1", "hello", 0);
        transport.leave();
    }

    #[tokio::test]
    async fn test_events_fan_out_to_multiple_subscribers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server =
            mock_join_server(listener, ServerMessage::RoomJoined { users: vec![] }).await;

        let mut transport =
            SyncTransport::new(test_config(format!("unix://{}", path.to_string_lossy())));
        let mut sub_a = transport.subscribe();
        let mut sub_b = transport.subscribe();

        transport.connect("r1", "u1", color()).await.unwrap();

        let mut server_framed = server.await.unwrap();
        server_framed
            .send(ServerMessage::UserJoined {
                user_id: "u2".to_string(),
                color: Color::new(9, 9, 9),
            })
            .await
            .unwrap();

        let expected = SessionEvent::UserJoined {
            user_id: "u2".to_string(),
            color: Color::new(9, 9, 9),
        };
        assert_eq!(sub_a.recv().await.unwrap(), expected);
        assert_eq!(sub_b.recv().await.unwrap(), expected);

        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_transform_throttled_gesture_not() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server =
            mock_join_server(listener, ServerMessage::RoomJoined { users: vec![] }).await;

        // Huge interval so only the first transform passes the gate
        let mut config = test_config(format!("unix://{}", path.to_string_lossy()));
        config.transform_interval = Duration::from_secs(3600);
        let mut transport = SyncTransport::new(config);
        transport.connect("r1", "u1", color()).await.unwrap();

        transport.send_transform(TransformSample::default());
        transport.send_transform(TransformSample::default());
        transport.send_transform(TransformSample::default());
        transport.send_gesture(GestureSample::default());

        let mut server_framed = server.await.unwrap();
        // Exactly one transform arrives, then the gesture
        assert!(matches!(
            server_framed.next().await.unwrap().unwrap(),
            ClientMessage::UpdateTransform { .. }
        ));
        assert!(matches!(
            server_framed.next().await.unwrap().unwrap(),
            ClientMessage::UpdateGesture { .. }
        ));

        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_connection_lost_event_on_server_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server =
            mock_join_server(listener, ServerMessage::RoomJoined { users: vec![] }).await;

        let mut transport =
            SyncTransport::new(test_config(format!("unix://{}", path.to_string_lossy())));
        let mut events = transport.subscribe();
        transport.connect("r1", "u1", color()).await.unwrap();

        // Server hangs up
        let server_framed = server.await.unwrap();
        drop(server_framed);

        assert_eq!(events.recv().await.unwrap(), SessionEvent::ConnectionLost);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut transport = SyncTransport::new(TransportConfig::default());
        transport.disconnect().await;
        transport.disconnect().await;
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_while_connected_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server =
            mock_join_server(listener, ServerMessage::RoomJoined { users: vec![] }).await;

        let mut transport =
            SyncTransport::new(test_config(format!("unix://{}", path.to_string_lossy())));
        transport.connect("r1", "u1", color()).await.unwrap();

        let result = transport.connect("r1", "u1", color()).await;
        assert!(matches!(result, Err(TandemError::Connection(_))));

        transport.disconnect().await;
        server.await.unwrap();
    }
}
