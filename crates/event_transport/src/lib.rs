//! Persistent bidirectional channel to the session event stream.
//!
//! The engine never talks to a socket directly: it sends [`ClientMessage`]s
//! through an [`EventTransport`] and consumes a stream of
//! [`TransportSignal`]s (connect, disconnect, inbound message). Delivery is
//! not assumed to be at-least-once; dropped frames are recovered by the
//! engine's backfill path, which is why this crate carries no replay logic.

pub mod backoff;
pub mod channel;
pub mod ws;

use async_trait::async_trait;
use thiserror::Error;

use session_wire::{ClientMessage, ServerMessage};

pub use channel::ChannelTransport;
pub use ws::{WebSocketConfig, WebSocketTransport};

/// Connection lifecycle and inbound traffic, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    Connected,
    Disconnected { reason: String },
    Message(ServerMessage),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport task is no longer running")]
    Closed,
}

/// Outbound half of the persistent channel.
///
/// Implementations deliver inbound traffic through the `TransportSignal`
/// receiver handed out at construction time rather than through this trait,
/// so a single consumer observes connects, disconnects, and messages in one
/// ordered stream.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn send(&self, message: ClientMessage) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}
