//! Socket accept loops and per-connection I/O
//!
//! Each accepted connection gets its own task: a framed codec over the
//! stream, an outbound message queue registered with the RoomRegistry, and
//! a select loop that drains both until the peer goes away.

use std::path::PathBuf;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use tandem_protocol::{ServerCodec, ServerMessage};

use crate::registry::RoomRegistry;
use crate::session::SessionHandler;

/// Run the Unix socket accept loop
pub async fn run_unix_accept_loop(
    path: PathBuf,
    registry: Arc<RoomRegistry>,
    mut shutdown_rx: broadcast::Receiver<()>,
    outbound_buffer: usize,
) {
    let listener = match UnixListener::bind(&path) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind unix listener at {}: {}", path.display(), e);
            return;
        }
    };

    info!("Listening on {}", path.display());

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        debug!("New unix connection");
                        let registry = Arc::clone(&registry);
                        tokio::spawn(async move {
                            handle_client(stream, registry, outbound_buffer).await;
                        });
                    }
                    Err(e) => {
                        error!("Unix accept error: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping unix accept loop");
                break;
            }
        }
    }
}

/// Run the TCP accept loop
pub async fn run_tcp_accept_loop(
    addr: String,
    registry: Arc<RoomRegistry>,
    mut shutdown_rx: broadcast::Receiver<()>,
    outbound_buffer: usize,
) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind TCP listener to {}: {}", addr, e);
            return;
        }
    };

    info!("TCP listener bound to {}", addr);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("New TCP connection from {}", peer_addr);
                        let registry = Arc::clone(&registry);
                        tokio::spawn(async move {
                            handle_client(stream, registry, outbound_buffer).await;
                        });
                    }
                    Err(e) => {
                        error!("TCP accept error: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping TCP accept loop");
                break;
            }
        }
    }
}

/// Drive one connection to completion
pub(crate) async fn handle_client<S>(stream: S, registry: Arc<RoomRegistry>, outbound_buffer: usize)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, ServerCodec::new());
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(outbound_buffer);
    let session_id = registry.register_session(tx);
    let mut handler = SessionHandler::new(Arc::clone(&registry), session_id);

    debug!("{} connected", session_id);

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if let Err(e) = framed.send(msg).await {
                    warn!("{} send failed: {}", session_id, e);
                    break;
                }
            }

            inbound = framed.next() => {
                match inbound {
                    Some(Ok(msg)) => handler.handle_message(msg),
                    Some(Err(e)) if e.is_frame_local() => {
                        // The bad frame was consumed; the stream stays aligned
                        debug!("{} dropped malformed frame: {}", session_id, e);
                    }
                    Some(Err(e)) => {
                        warn!("{} stream error: {}", session_id, e);
                        break;
                    }
                    None => {
                        debug!("{} closed connection", session_id);
                        break;
                    }
                }
            }
        }
    }

    handler.on_disconnect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_protocol::{
        ClientCodec, ClientMessage, Color, TaskColumn, TaskUpdate, TransformSample,
    };
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    type TestClient = Framed<UnixStream, ClientCodec>;

    async fn start_server(path: &PathBuf) -> (Arc<RoomRegistry>, broadcast::Sender<()>) {
        let registry = Arc::new(RoomRegistry::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(run_unix_accept_loop(
            path.clone(),
            Arc::clone(&registry),
            shutdown_rx,
            64,
        ));
        // Wait for the socket file to appear
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        (registry, shutdown_tx)
    }

    async fn connect_client(path: &PathBuf) -> TestClient {
        let stream = UnixStream::connect(path).await.unwrap();
        Framed::new(stream, ClientCodec::new())
    }

    async fn join(client: &mut TestClient, room_id: &str, user_id: &str) -> ServerMessage {
        client
            .send(ClientMessage::JoinRoom {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                color: Color::new(100, 100, 100),
            })
            .await
            .unwrap();
        client.next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_join_roundtrip_over_socket() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let (_registry, _shutdown) = start_server(&path).await;

        let mut c1 = connect_client(&path).await;
        match join(&mut c1, "r1", "u1").await {
            ServerMessage::RoomJoined { users } => assert!(users.is_empty()),
            other => panic!("expected RoomJoined, got {:?}", other),
        }

        let mut c2 = connect_client(&path).await;
        match join(&mut c2, "r1", "u2").await {
            ServerMessage::RoomJoined { users } => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].user_id, "u1");
            }
            other => panic!("expected RoomJoined, got {:?}", other),
        }

        // c1 hears about u2
        match c1.next().await.unwrap().unwrap() {
            ServerMessage::UserJoined { user_id, .. } => assert_eq!(user_id, "u2"),
            other => panic!("expected UserJoined, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transform_relayed_between_clients() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let (_registry, _shutdown) = start_server(&path).await;

        let mut c1 = connect_client(&path).await;
        let mut c2 = connect_client(&path).await;
        join(&mut c1, "r1", "u1").await;
        join(&mut c2, "r1", "u2").await;
        // Drain the UserJoined broadcast on c1
        c1.next().await.unwrap().unwrap();

        let transform = TransformSample::default();
        c1.send(ClientMessage::UpdateTransform { transform })
            .await
            .unwrap();

        match c2.next().await.unwrap().unwrap() {
            ServerMessage::RemoteTransform { user_id, .. } => assert_eq!(user_id, "u1"),
            other => panic!("expected RemoteTransform, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_task_update_observed_by_peer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let (_registry, _shutdown) = start_server(&path).await;

        let mut c1 = connect_client(&path).await;
        let mut c2 = connect_client(&path).await;
        join(&mut c1, "r1", "u1").await;
        join(&mut c2, "r1", "u2").await;
        c1.next().await.unwrap().unwrap();

        c1.send(ClientMessage::TaskUpdate {
            update: TaskUpdate::movement("t1", TaskColumn::Done, 0),
        })
        .await
        .unwrap();

        match c2.next().await.unwrap().unwrap() {
            ServerMessage::TaskChanged { update } => {
                assert_eq!(update.task_id, "t1");
                assert_eq!(update.column, TaskColumn::Done);
            }
            other => panic!("expected TaskChanged, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_capacity_disconnect_and_rejoin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let (registry, _shutdown) = start_server(&path).await;

        // Four participants fill the room
        let mut clients = Vec::new();
        for i in 1..=4 {
            let mut client = connect_client(&path).await;
            match join(&mut client, "r1", &format!("u{}", i)).await {
                ServerMessage::RoomJoined { .. } => {}
                other => panic!("expected RoomJoined, got {:?}", other),
            }
            clients.push(client);
        }

        // Fifth is refused
        let mut c5 = connect_client(&path).await;
        match join(&mut c5, "r1", "u5").await {
            ServerMessage::RoomFull { room_id } => assert_eq!(room_id, "r1"),
            other => panic!("expected RoomFull, got {:?}", other),
        }

        // u1 disconnects; u2 hears user-left after the join broadcasts
        let c1 = clients.remove(0);
        drop(c1);

        let c2 = &mut clients[0];
        loop {
            match c2.next().await.unwrap().unwrap() {
                ServerMessage::UserJoined { .. } => continue,
                ServerMessage::UserLeft { user_id } => {
                    assert_eq!(user_id, "u1");
                    break;
                }
                other => panic!("unexpected message {:?}", other),
            }
        }
        assert_eq!(registry.room_size("r1"), 3);

        // Now u5 fits
        match join(&mut c5, "r1", "u5").await {
            ServerMessage::RoomJoined { users } => assert_eq!(users.len(), 3),
            other => panic!("expected RoomJoined, got {:?}", other),
        }
        assert_eq!(registry.room_size("r1"), 4);
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped_connection_survives() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let (_registry, _shutdown) = start_server(&path).await;

        let mut stream = UnixStream::connect(&path).await.unwrap();
        // A well-framed payload that is not a valid ClientMessage
        stream
            .write_all(&[0, 0, 0, 4, 200, 0, 0, 0])
            .await
            .unwrap();

        let mut client = Framed::new(stream, ClientCodec::new());
        client.send(ClientMessage::Ping).await.unwrap();

        // The garbage frame was silently dropped; the ping still answers
        assert_eq!(
            client.next().await.unwrap().unwrap(),
            ServerMessage::Pong
        );
    }

    #[tokio::test]
    async fn test_disconnect_deletes_empty_room() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let (registry, _shutdown) = start_server(&path).await;

        let mut c1 = connect_client(&path).await;
        join(&mut c1, "r1", "u1").await;
        assert_eq!(registry.room_count(), 1);

        drop(c1);

        // The disconnect is processed asynchronously
        for _ in 0..100 {
            if registry.room_count() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_accept_loop_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sock");
        let registry = Arc::new(RoomRegistry::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_unix_accept_loop(
            path.clone(),
            registry,
            shutdown_rx,
            64,
        ));

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        shutdown_tx.send(()).unwrap();

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(1), handle).await;
        assert!(result.is_ok(), "accept loop did not shut down");
    }
}
