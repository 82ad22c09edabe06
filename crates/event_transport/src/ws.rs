use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use session_wire::{parse_server_message, ClientMessage};

use crate::backoff::reconnect_delay;
use crate::{EventTransport, TransportError, TransportSignal};

/// Configuration for the websocket transport.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Endpoint URL (`ws://` or `wss://`).
    pub url: String,
    /// Reconnect automatically after a disconnect.
    pub reconnect: bool,
    /// Upper bound on the exponential reconnect delay.
    pub max_reconnect_delay: Duration,
}

impl WebSocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: true,
            max_reconnect_delay: Duration::from_secs(30),
        }
    }

    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_max_reconnect_delay(mut self, max_delay: Duration) -> Self {
        self.max_reconnect_delay = max_delay;
        self
    }
}

/// WebSocket implementation of [`EventTransport`].
///
/// Owns the connection lifecycle: a background task dials, pumps frames, and
/// re-dials with exponential backoff after a disconnect. Consumers observe
/// lifecycle edges and inbound messages through the `TransportSignal`
/// receiver returned by [`start`].
///
/// [`start`]: WebSocketTransport::start
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Validate the endpoint and spawn the connection task.
    ///
    /// The first `Connected` signal arrives once the initial dial succeeds;
    /// dial failures are retried with backoff rather than surfaced here.
    pub fn start(
        config: WebSocketConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportSignal>), TransportError> {
        let parsed = url::Url::parse(&config.url)
            .map_err(|error| TransportError::InvalidUrl(format!("{}: {error}", config.url)))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidUrl(format!(
                "{}: expected a ws:// or wss:// scheme",
                config.url
            )));
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_connection(
            config,
            outbound_rx,
            signals_tx,
            Arc::clone(&connected),
        ));

        Ok((
            Self {
                outbound,
                connected,
                task: Some(task),
            },
            signals_rx,
        ))
    }

    /// Tear down the connection task.
    pub async fn close(&mut self) {
        self.connected.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

#[async_trait]
impl EventTransport for WebSocketTransport {
    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let frame = serde_json::to_string(&message)?;
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum PumpExit {
    Disconnected(String),
    HandleDropped,
}

async fn run_connection(
    config: WebSocketConfig,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    signals: mpsc::UnboundedSender<TransportSignal>,
    connected: Arc<AtomicBool>,
) {
    let mut attempt: u32 = 0;

    loop {
        match connect_async(&config.url).await {
            Ok((stream, _)) => {
                attempt = 0;
                connected.store(true, Ordering::Release);
                if signals.send(TransportSignal::Connected).is_err() {
                    return;
                }

                let exit = pump(stream, &mut outbound_rx, &signals).await;
                connected.store(false, Ordering::Release);

                match exit {
                    PumpExit::Disconnected(reason) => {
                        debug!(reason, "websocket disconnected");
                        if signals
                            .send(TransportSignal::Disconnected { reason })
                            .is_err()
                        {
                            return;
                        }
                    }
                    PumpExit::HandleDropped => return,
                }
            }
            Err(error) => {
                warn!(url = %config.url, %error, "websocket dial failed");
            }
        }

        if !config.reconnect {
            return;
        }
        tokio::time::sleep(reconnect_delay(attempt, config.max_reconnect_delay)).await;
        attempt = attempt.saturating_add(1);
    }
}

async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    signals: &mpsc::UnboundedSender<TransportSignal>,
) -> PumpExit {
    let (mut sender, mut receiver) = stream.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if sender.send(Message::Text(frame)).await.is_err() {
                            return PumpExit::Disconnected("send_failed".to_string());
                        }
                    }
                    None => return PumpExit::HandleDropped,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if forward_frame(text.as_bytes(), signals).is_err() {
                            return PumpExit::HandleDropped;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if forward_frame(&data, signals).is_err() {
                            return PumpExit::HandleDropped;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return PumpExit::Disconnected("closed".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        return PumpExit::Disconnected(error.to_string());
                    }
                }
            }
        }
    }
}

fn forward_frame(
    bytes: &[u8],
    signals: &mpsc::UnboundedSender<TransportSignal>,
) -> Result<(), ()> {
    let value = match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, "dropping undecodable transport frame");
            return Ok(());
        }
    };

    match parse_server_message(value) {
        Some(message) => signals
            .send(TransportSignal::Message(message))
            .map_err(|_| ()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{WebSocketConfig, WebSocketTransport};
    use crate::TransportError;

    #[tokio::test]
    async fn rejects_non_websocket_schemes() {
        let result = WebSocketTransport::start(WebSocketConfig::new("http://host/stream"));
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn rejects_unparseable_urls() {
        let result = WebSocketTransport::start(WebSocketConfig::new("not a url"));
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }
}
