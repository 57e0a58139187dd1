//! Reconnecting WebSocket sessions for live broker adapters.
//!
//! Handles reconnection with exponential backoff, ping/pong keepalive, and
//! graceful shutdown. Text frames are handed to a callback; translating them
//! into the core model is the adapter's mapper layer (see [`crate::live`]).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult};

/// Type alias for a WebSocket connection.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callback invoked for each inbound text frame.
pub type MessageCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// WebSocket endpoint
    pub url: String,
    /// Give up after this many failed connection attempts
    pub reconnect_max_attempts: u32,
    /// First backoff delay in milliseconds
    pub reconnect_initial_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub reconnect_max_delay_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_max_attempts: 10,
            reconnect_initial_delay_ms: 250,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

/// A WebSocket session with automatic reconnection.
pub struct SocketSession {
    config: SocketConfig,
    connected: Arc<AtomicBool>,
    reconnect_attempts: Arc<AtomicU32>,
}

impl SocketSession {
    /// Create a session for the configured endpoint.
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            reconnect_attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// True while a connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_initial_delay_ms;
        let delay = base.saturating_mul(2u64.saturating_pow(attempt.min(10)));
        Duration::from_millis(delay.min(self.config.reconnect_max_delay_ms))
    }

    async fn connect(&self) -> GatewayResult<WsStream> {
        url::Url::parse(&self.config.url)
            .map_err(|e| GatewayError::Configuration(format!("invalid socket url: {e}")))?;

        match connect_async(&self.config.url).await {
            Ok((stream, _response)) => {
                info!(url = %self.config.url, "socket connected");
                self.connected.store(true, Ordering::SeqCst);
                self.reconnect_attempts.store(0, Ordering::SeqCst);
                Ok(stream)
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(GatewayError::connection(e.to_string()))
            }
        }
    }

    /// Run the session until shutdown or the attempt budget is spent.
    ///
    /// Each inbound text frame goes to `callback`; ping frames are answered;
    /// close frames and errors trigger a backoff reconnect.
    pub async fn run(
        &self,
        callback: MessageCallback,
        mut shutdown: broadcast::Receiver<()>,
    ) -> GatewayResult<()> {
        loop {
            if shutdown.try_recv().is_ok() {
                info!("socket shutdown requested");
                return Ok(());
            }

            let attempts = self.reconnect_attempts.load(Ordering::SeqCst);
            if attempts >= self.config.reconnect_max_attempts {
                return Err(GatewayError::connection(format!(
                    "gave up after {attempts} connection attempts"
                )));
            }

            let stream = match self.connect().await {
                Ok(stream) => stream,
                Err(error) => {
                    self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                    let delay = self.reconnect_delay(attempts);
                    warn!(%error, attempt = attempts + 1, ?delay, "socket connect failed");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            match self
                .run_connection(stream, callback.clone(), &mut shutdown)
                .await
            {
                Ok(()) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Ok(());
                }
                Err(error) => {
                    self.connected.store(false, Ordering::SeqCst);
                    if shutdown.try_recv().is_ok() {
                        return Ok(());
                    }
                    self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                    let delay = self.reconnect_delay(attempts);
                    warn!(%error, ?delay, "socket dropped, reconnecting");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn run_connection(
        &self,
        mut stream: WsStream,
        callback: MessageCallback,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> GatewayResult<()> {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = stream.send(Message::Close(None)).await;
                    debug!("socket closed on shutdown");
                    return Ok(());
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => callback(text.to_string()),
                        Some(Ok(Message::Ping(payload))) => {
                            stream
                                .send(Message::Pong(payload))
                                .await
                                .map_err(|e| GatewayError::connection(e.to_string()))?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Err(GatewayError::connection("server closed"));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(GatewayError::connection(e.to_string())),
                        None => return Err(GatewayError::connection("stream ended")),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let session = SocketSession::new(SocketConfig {
            url: "wss://example.invalid/ws".into(),
            reconnect_initial_delay_ms: 100,
            reconnect_max_delay_ms: 1_000,
            ..Default::default()
        });

        assert_eq!(session.reconnect_delay(0), Duration::from_millis(100));
        assert_eq!(session.reconnect_delay(1), Duration::from_millis(200));
        assert_eq!(session.reconnect_delay(2), Duration::from_millis(400));
        // Capped.
        assert_eq!(session.reconnect_delay(8), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_invalid_url_is_configuration_error() {
        let session = SocketSession::new(SocketConfig {
            url: "not a url".into(),
            ..Default::default()
        });
        let result = session.connect().await;
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }
}
