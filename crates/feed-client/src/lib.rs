//! PhyVision Feed Client
//!
//! Receives normalized point batches from an external tracking feed and
//! fans them out to subscribers. Uses a pluggable transport so the
//! connection policy can run against any source:
//!
//! - **WebSocket:** the production feed (`ws://` / `wss://`)
//! - **Custom:** anything implementing [`FeedTransport`], e.g. test scripts
//!
//! Each inbound frame is a JSON array of `{x, y}` points. Malformed frames are
//! logged and dropped; the connection stays up.

pub mod client;
pub mod subscribers;
pub mod transport;

pub use client::{ConnectionState, FeedClient, FeedStats};
pub use subscribers::{Subscribers, SubscriptionId};
pub use transport::{validate_url, FeedConnection, FeedTransport, WebSocketTransport};

use phyvision_common::error::PhyvisionError;

/// Errors raised by feed transports.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("invalid feed URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },
}

impl From<FeedError> for PhyvisionError {
    fn from(err: FeedError) -> Self {
        PhyvisionError::feed(err.to_string())
    }
}
