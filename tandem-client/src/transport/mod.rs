//! Connection lifecycle, typed sends, and event fan-out

mod client;
mod events;
mod throttle;

pub use client::{ConnectionState, SyncTransport, TransportConfig};
pub use events::SessionEvent;
pub use throttle::EmitThrottle;
