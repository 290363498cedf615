//! Transport abstraction for the items sync connection.
//!
//! `SyncTransport` is the narrow seam between the connection supervisor and
//! the underlying WebSocket, so tests can drive the supervisor with a
//! scripted transport. The production implementation is
//! [`TokioTransport`](super::tokio_transport::TokioTransport).

use async_trait::async_trait;
use url::Url;

/// Error from a transport operation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection attempt failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// A frame could not be sent.
    #[error("send failed: {0}")]
    SendFailed(String),
    /// The connection is closed.
    #[error("connection closed")]
    Closed,
    /// Any other transport error.
    #[error("{0}")]
    Other(String),
}

/// A received WebSocket frame, reduced to what the sync protocol handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// Text frame: either the heartbeat acknowledgment or a JSON-encoded
    /// [`SyncMessage`](super::message::SyncMessage).
    Text(String),
    /// Binary frame; the items protocol does not use these.
    Binary(Vec<u8>),
    /// Protocol-level ping.
    Ping(Vec<u8>),
    /// Protocol-level pong.
    Pong(Vec<u8>),
    /// Close frame.
    Close,
}

/// Bidirectional frame transport for one sync connection.
#[async_trait]
pub trait SyncTransport: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Receive the next frame; `None` means the stream ended.
    async fn recv(&mut self) -> Option<Result<WsMessage, TransportError>>;

    /// Close the connection with a normal-closure code.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Factory for sync transports.
///
/// Transports come back boxed so the connection supervisor stays free of
/// type parameters; tests substitute scripted connectors for
/// [`TokioConnector`](super::tokio_transport::TokioConnector).
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Open a transport to the given WebSocket URL.
    async fn connect(&self, url: &str) -> Result<Box<dyn SyncTransport>, TransportError>;
}

/// Location of the sync server.
#[derive(Debug, Clone)]
pub struct SyncEndpoint {
    /// Base server URL; `http(s)` schemes are rewritten to `ws(s)`.
    pub server_url: String,
}

impl SyncEndpoint {
    /// Create an endpoint from a base server URL.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
        }
    }

    /// Build the items sync URL: `wss://host/ws/items/{org_id}?token=...`.
    ///
    /// The credential goes through query-pair encoding, so tokens with
    /// reserved characters survive the trip.
    pub fn items_url(&self, org_id: &str, token: &str) -> Result<String, TransportError> {
        let ws_server = self
            .server_url
            .replace("https://", "wss://")
            .replace("http://", "ws://");
        let mut url = Url::parse(&ws_server)
            .map_err(|e| TransportError::Other(format!("invalid server URL: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| TransportError::Other("server URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("ws");
            segments.push("items");
            segments.push(org_id);
        }
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_url_basic() {
        let endpoint = SyncEndpoint::new("wss://sync.example.com");
        let url = endpoint.items_url("org-1", "tok").unwrap();
        assert_eq!(url, "wss://sync.example.com/ws/items/org-1?token=tok");
    }

    #[test]
    fn test_items_url_rewrites_http_schemes() {
        let endpoint = SyncEndpoint::new("https://sync.example.com");
        let url = endpoint.items_url("org-1", "tok").unwrap();
        assert!(url.starts_with("wss://sync.example.com/"));

        let endpoint = SyncEndpoint::new("http://localhost:8080");
        let url = endpoint.items_url("org-1", "tok").unwrap();
        assert!(url.starts_with("ws://localhost:8080/"));
    }

    #[test]
    fn test_items_url_encodes_token() {
        let endpoint = SyncEndpoint::new("wss://sync.example.com");
        let url = endpoint.items_url("org-1", "a+b/c=").unwrap();
        assert!(url.contains("token=a%2Bb"));
        assert!(!url.contains("a+b"));
    }

    #[test]
    fn test_items_url_handles_trailing_slash() {
        let endpoint = SyncEndpoint::new("wss://sync.example.com/");
        let url = endpoint.items_url("org-1", "t").unwrap();
        assert_eq!(url, "wss://sync.example.com/ws/items/org-1?token=t");
    }

    #[test]
    fn test_items_url_preserves_path_prefix() {
        let endpoint = SyncEndpoint::new("wss://example.com/sync");
        let url = endpoint.items_url("o", "t").unwrap();
        assert_eq!(url, "wss://example.com/sync/ws/items/o?token=t");
    }

    #[test]
    fn test_items_url_rejects_garbage() {
        let endpoint = SyncEndpoint::new("not a url");
        assert!(endpoint.items_url("o", "t").is_err());
    }
}
