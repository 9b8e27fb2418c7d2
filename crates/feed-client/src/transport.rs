//! Feed transport implementations.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::uri::InvalidUri;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::FeedError;

/// Opens connections to a point feed.
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    /// Open a connection to `url`.
    async fn open(&self, url: &str) -> Result<Box<dyn FeedConnection>, FeedError>;

    /// Transport name for logging.
    fn name(&self) -> &str;
}

/// One open feed connection.
#[async_trait]
pub trait FeedConnection: Send {
    /// Next text frame. `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<Result<String, FeedError>>;

    /// Close from our side.
    async fn close(&mut self);
}

/// Check that `url` is a WebSocket URL with a host.
pub fn validate_url(url: &str) -> Result<(), FeedError> {
    let invalid = |reason: &str| FeedError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = url
        .parse()
        .map_err(|e: InvalidUri| invalid(&e.to_string()))?;
    match uri.scheme_str() {
        Some("ws") | Some("wss") => {}
        Some(other) => return Err(invalid(&format!("unsupported scheme {other}"))),
        None => return Err(invalid("missing scheme")),
    }
    if uri.host().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(())
}

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn FeedConnection>, FeedError> {
        validate_url(url)?;
        let (stream, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| FeedError::Connection {
                message: e.to_string(),
            })?;
        tracing::debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(WebSocketConnection { stream }))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedConnection for WebSocketConnection {
    async fn next_frame(&mut self) -> Option<Result<String, FeedError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).map_err(|e| FeedError::Transport {
                        message: format!("binary frame is not UTF-8: {e}"),
                    }))
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Feed sent close frame");
                    return None;
                }
                // Ping/pong are answered by tungstenite on the next read.
                Ok(_) => continue,
                Err(e) => {
                    return Some(Err(FeedError::Transport {
                        message: e.to_string(),
                    }))
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Error while closing feed socket");
        }
    }
}
