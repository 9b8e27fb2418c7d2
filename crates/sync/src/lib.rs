//! PhyVision Sync
//!
//! Role-aware synchronization over a broadcast channel. One producer computes
//! state and drives the view of at most one designated observer; every
//! consumer can render the broadcast centroid set.
//!
//! - [`protocol`]: message types and their JSON wire form
//! - [`channel`]: the broadcast transport
//! - [`producer`]: observer assignment and view-target broadcasts
//! - [`consumer`]: applying targeted commands to a local view

pub mod channel;
pub mod consumer;
pub mod producer;
pub mod protocol;

pub use channel::{BroadcastChannel, SyncChannel, SyncReceiver};
pub use consumer::{ConsumerOutcome, SyncConsumer, ViewController, PAN_ANIMATION};
pub use producer::{compute_view_target, ObserverState, SyncProducer, DEFAULT_VIEWPORT};
pub use protocol::{ChannelMessage, Envelope, SyncMessage, ViewTarget};

use phyvision_common::error::PhyvisionError;

/// Errors decoding or encoding channel messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown message type {kind:?}")]
    UnknownType { kind: String },

    #[error("malformed message: {message}")]
    Malformed { message: String },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Malformed {
            message: err.to_string(),
        }
    }
}

impl From<ProtocolError> for PhyvisionError {
    fn from(err: ProtocolError) -> Self {
        PhyvisionError::sync(err.to_string())
    }
}
