//! WebSocket client for the ComfyUI event stream.
//!
//! [`ComfyUIClient`] holds the connection settings for the engine's
//! `/ws` endpoint. Call [`ComfyUIClient::connect`] to open a live
//! [`ComfyUIConnection`].

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Raw WebSocket stream type returned by tokio-tungstenite.
pub type EngineStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection settings for one ComfyUI event stream.
///
/// The `client_id` is fixed for the lifetime of the client so that every
/// reconnect, and every workflow submitted with the same id, is addressed to
/// the same logical listener.
pub struct ComfyUIClient {
    client_id: String,
    ws_url: String,
}

/// A live WebSocket connection to a ComfyUI instance.
pub struct ComfyUIConnection {
    /// Client ID sent during the WebSocket handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading frames.
    pub ws_stream: EngineStream,
}

impl ComfyUIClient {
    /// * `client_id` - identity announced to the engine.
    /// * `ws_url`    - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(client_id: String, ws_url: String) -> Self {
        Self { client_id, ws_url }
    }

    /// Create a client with a freshly generated UUID v4 client id.
    pub fn with_random_id(ws_url: String) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), ws_url)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Full handshake URL including the `clientId` query parameter.
    pub fn stream_url(&self) -> String {
        format!("{}/ws?clientId={}", self.ws_url, self.client_id)
    }

    /// Connect to the ComfyUI WebSocket endpoint.
    pub async fn connect(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let (ws_stream, _response) = connect_async(self.stream_url()).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %self.client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ComfyUIConnection {
            client_id: self.client_id.clone(),
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
