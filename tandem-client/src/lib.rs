//! tandem-client: transport and state replicas for tandem sessions
//!
//! The client side of the presence layer: [`transport::SyncTransport`]
//! manages the connection lifecycle (connect, bounded retry, disconnect)
//! and pushes typed [`transport::SessionEvent`]s to any number of
//! subscribers; [`presence::PresenceReplica`] and [`board::TaskBoardReplica`]
//! mirror remote participant and task-board state from those events;
//! [`session::CollabSession`] ties the three together for a tick-driven
//! consumer.

pub mod board;
pub mod config;
pub mod presence;
pub mod session;
pub mod transport;

pub use board::TaskBoardReplica;
pub use config::ClientConfig;
pub use presence::{PresenceReplica, PresenceStatus, RemoteParticipant};
pub use session::CollabSession;
pub use transport::{ConnectionState, EmitThrottle, SessionEvent, SyncTransport, TransportConfig};
