//! Event-stream listener.
//!
//! [`EventListener`] owns the single WebSocket connection to the engine.
//! It reads frames, parses and translates them into [`EngineEvent`]s, and
//! forwards them over an `mpsc` channel to the relay's consumer task. On
//! disconnect it reconnects with backoff unless reconnection is disabled.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{ComfyUIClient, EngineStream};
use crate::events::{translate, EngineEvent};
use crate::messages::parse_message;
use crate::reconnect::{reconnect_loop, ReconnectConfig};

/// Channel capacity between the listener and the consumer.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a connection's read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// Engine closed the socket or a receive error occurred.
    Dropped,
    /// Shutdown was requested.
    Cancelled,
    /// The consumer hung up; nobody is listening any more.
    ConsumerGone,
}

pub struct EventListener {
    client: ComfyUIClient,
    /// `None` disables reconnection: the listener exits after the first
    /// disconnect.
    reconnect: Option<ReconnectConfig>,
    tx: mpsc::Sender<EngineEvent>,
}

impl EventListener {
    pub fn new(
        client: ComfyUIClient,
        reconnect: Option<ReconnectConfig>,
        tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self {
            client,
            reconnect,
            tx,
        }
    }

    /// Connect -> read -> reconnect, until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(url = %self.client.stream_url(), "Event listener starting");

        let mut pending = match self.client.connect().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "Initial event stream connection failed");
                None
            }
        };

        loop {
            let conn = match pending.take() {
                Some(conn) => conn,
                None => match &self.reconnect {
                    Some(config) => match reconnect_loop(&self.client, config, &cancel).await {
                        Some(conn) => conn,
                        None => break,
                    },
                    None => {
                        tracing::warn!("Event stream unavailable and reconnection disabled");
                        break;
                    }
                },
            };

            if !self.emit(EngineEvent::StreamConnected).await {
                break;
            }

            let mut ws_stream = conn.ws_stream;
            let end = self.read_stream(&mut ws_stream, &cancel).await;

            if end == StreamEnd::ConsumerGone || !self.emit(EngineEvent::StreamDisconnected).await
            {
                break;
            }
            if end == StreamEnd::Cancelled {
                break;
            }
            if self.reconnect.is_none() {
                tracing::warn!("Event stream lost; reconnection disabled");
                break;
            }
            tracing::info!("Event stream lost, entering reconnect loop");
        }

        tracing::info!("Event listener exited");
    }

    /// Read frames until the socket closes, shutdown is requested, or the
    /// consumer drops its receiver.
    async fn read_stream(&self, ws_stream: &mut EngineStream, cancel: &CancellationToken) -> StreamEnd {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return StreamEnd::Cancelled,
                frame = ws_stream.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = event_from_text(&text) {
                        if !self.emit(event).await {
                            return StreamEnd::ConsumerGone;
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    // Preview images; the relay only serves final artifacts.
                    tracing::trace!("Ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "ComfyUI WebSocket closed");
                    return StreamEnd::Dropped;
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "WebSocket receive error");
                    return StreamEnd::Dropped;
                }
                None => return StreamEnd::Dropped,
            }
        }
    }

    /// Forward an event; `false` once the consumer is gone.
    async fn emit(&self, event: EngineEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

/// Parse and translate a single text frame.
///
/// Unknown message kinds are common (custom nodes add their own) and are
/// only logged at trace level.
pub fn event_from_text(text: &str) -> Option<EngineEvent> {
    match parse_message(text) {
        Ok(message) => translate(message),
        Err(e) => {
            tracing::trace!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI message");
            None
        }
    }
}
