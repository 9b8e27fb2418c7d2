//! Broadcast transport for sync messages.

use tokio::sync::broadcast;

use crate::protocol::ChannelMessage;
use crate::ProtocolError;

/// Fan-out channel shared by every session participant.
///
/// Messages are delivered to each subscriber in send order.
pub trait SyncChannel: Send + Sync {
    /// Send one encoded message. Returns the number of subscribers reached.
    fn send_raw(&self, text: String) -> usize;

    /// Start receiving messages sent from now on.
    fn subscribe(&self) -> SyncReceiver;

    /// Encode and send a message.
    fn publish(&self, message: &ChannelMessage) -> Result<usize, ProtocolError> {
        let text = message.encode()?;
        Ok(self.send_raw(text))
    }
}

/// In-process channel backed by `tokio::sync::broadcast`.
#[derive(Clone)]
pub struct BroadcastChannel {
    tx: broadcast::Sender<String>,
}

impl BroadcastChannel {
    /// Create a channel buffering up to `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        tracing::debug!(capacity, "Sync channel initialized");
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SyncChannel for BroadcastChannel {
    fn send_raw(&self, text: String) -> usize {
        // No subscribers is not an error for a broadcast.
        self.tx.send(text).unwrap_or(0)
    }

    fn subscribe(&self) -> SyncReceiver {
        SyncReceiver::new(self.tx.subscribe())
    }
}

/// Receiving half of a [`SyncChannel`].
pub struct SyncReceiver {
    rx: broadcast::Receiver<String>,
}

impl SyncReceiver {
    pub fn new(rx: broadcast::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Next raw message, or `None` once the channel is closed.
    ///
    /// If this receiver fell behind, the skipped messages are logged and
    /// reception continues with the oldest retained one.
    pub async fn recv_raw(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(text) => return Some(text),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Sync receiver lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next decodable message. Undecodable messages are logged and skipped.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        loop {
            let text = self.recv_raw().await?;
            match ChannelMessage::decode(&text) {
                Ok(message) => return Some(message),
                Err(ProtocolError::UnknownType { kind }) => {
                    tracing::warn!(kind = %kind, "Ignoring unknown sync message type");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed sync message");
                }
            }
        }
    }

    /// Non-blocking variant of [`SyncReceiver::recv`].
    pub fn try_recv(&mut self) -> Option<ChannelMessage> {
        loop {
            let text = match self.rx.try_recv() {
                Ok(text) => text,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Sync receiver lagged, messages dropped");
                    continue;
                }
                Err(_) => return None,
            };
            match ChannelMessage::decode(&text) {
                Ok(message) => return Some(message),
                Err(e) => tracing::warn!(error = %e, "Ignoring undecodable sync message"),
            }
        }
    }

    /// Drain every message currently queued.
    pub fn drain(&mut self) -> Vec<ChannelMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Envelope, SyncMessage};

    #[tokio::test]
    async fn delivers_in_send_order_to_every_subscriber() {
        let channel = BroadcastChannel::new(16);
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        for locked in [true, false, true] {
            let msg = ChannelMessage::Sync(Envelope::broadcast(SyncMessage::Lock { locked }));
            assert_eq!(channel.publish(&msg).unwrap(), 2);
        }

        for rx in [&mut a, &mut b] {
            let seen: Vec<bool> = rx
                .drain()
                .into_iter()
                .map(|m| match m {
                    ChannelMessage::Sync(Envelope {
                        message: SyncMessage::Lock { locked },
                        ..
                    }) => locked,
                    other => panic!("unexpected {other:?}"),
                })
                .collect();
            assert_eq!(seen, vec![true, false, true]);
        }
    }

    #[tokio::test]
    async fn skips_garbage_and_unknown_types() {
        let channel = BroadcastChannel::new(16);
        let mut rx = channel.subscribe();

        channel.send_raw("not json".to_string());
        channel.send_raw(r#"{"type":"TELEPORT","payload":{}}"#.to_string());
        channel.send_raw(r#"{"type":"LOCK","payload":{"locked":true}}"#.to_string());

        let msg = rx.recv().await.unwrap();
        assert_eq!(
            msg,
            ChannelMessage::Sync(Envelope::broadcast(SyncMessage::Lock { locked: true }))
        );
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let channel = BroadcastChannel::default();
        let msg = ChannelMessage::CentroidUpdate(vec![]);
        assert_eq!(channel.publish(&msg).unwrap(), 0);
    }

    #[tokio::test]
    async fn lagged_receiver_keeps_going() {
        let channel = BroadcastChannel::new(2);
        let mut rx = channel.subscribe();
        for i in 0..5 {
            channel.send_raw(format!(r#"{{"type":"LOCK","payload":{{"locked":{}}}}}"#, i % 2 == 0));
        }
        assert_eq!(rx.drain().len(), 2);
    }

    #[tokio::test]
    async fn closed_channel_ends_reception() {
        let channel = BroadcastChannel::new(4);
        let mut rx = channel.subscribe();
        drop(channel);
        assert!(rx.recv().await.is_none());
    }
}
