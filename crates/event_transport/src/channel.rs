use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use session_wire::ClientMessage;

use crate::{EventTransport, TransportError};

/// In-memory transport for tests and in-process embedding.
///
/// Outbound messages are forwarded to the receiver returned by [`new`];
/// inbound signals are injected by the harness through its own
/// `TransportSignal` channel, so this type carries no inbound machinery.
///
/// [`new`]: ChannelTransport::new
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    connected: Arc<AtomicBool>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound,
                connected: Arc::new(AtomicBool::new(true)),
            },
            outbound_rx,
        )
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

#[async_trait]
impl EventTransport for ChannelTransport {
    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use session_wire::ClientMessage;

    use super::ChannelTransport;
    use crate::{EventTransport, TransportError};

    #[tokio::test]
    async fn forwards_outbound_messages_in_order() {
        let (transport, mut outbound) = ChannelTransport::new();
        for id in ["s-1", "s-2"] {
            transport
                .send(ClientMessage::Subscribe {
                    session_id: id.to_string(),
                })
                .await
                .expect("send while connected");
        }

        let first = outbound.recv().await.expect("first message");
        assert_eq!(
            first,
            ClientMessage::Subscribe {
                session_id: "s-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn send_fails_while_disconnected() {
        let (transport, _outbound) = ChannelTransport::new();
        transport.set_connected(false);

        let result = transport
            .send(ClientMessage::Unsubscribe {
                session_id: "s-1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }
}
