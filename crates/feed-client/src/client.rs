//! Feed connection lifecycle and reconnect policy.
//!
//! One background task owns the connection. When the connection closes and
//! the feed is still enabled, that same task waits out the reconnect delay
//! and tries again, so at most one reconnect is ever pending.
//! [`FeedClient::disconnect`] cancels the task, including a pending wait.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use phyvision_common::config::FeedConfig;
use phyvision_scene_model::geometry::Point;

use crate::subscribers::{Subscribers, SubscriptionId};
use crate::transport::{validate_url, FeedConnection, FeedTransport, WebSocketTransport};
use crate::FeedError;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Counters describing feed activity since the client was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub connect_attempts: u64,
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub reconnects_scheduled: u64,
}

#[derive(Default)]
struct Counters {
    connect_attempts: AtomicU64,
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    reconnects_scheduled: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> FeedStats {
        FeedStats {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
        }
    }
}

struct ActiveConnection {
    url: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Client for the external point feed.
pub struct FeedClient {
    transport: Arc<dyn FeedTransport>,
    subscribers: Arc<Subscribers>,
    enabled: Arc<AtomicBool>,
    reconnect_delay: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    counters: Arc<Counters>,
    active: Option<ActiveConnection>,
}

impl FeedClient {
    /// Create a client over `transport`.
    pub fn new(transport: impl FeedTransport, enabled: bool, reconnect_delay: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport: Arc::new(transport),
            subscribers: Arc::new(Subscribers::new()),
            enabled: Arc::new(AtomicBool::new(enabled)),
            reconnect_delay,
            state: Arc::new(state),
            counters: Arc::new(Counters::default()),
            active: None,
        }
    }

    /// WebSocket client configured from the `feed` config section.
    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            WebSocketTransport,
            config.enabled,
            Duration::from_millis(config.reconnect_delay_ms),
        )
    }

    /// Register a handler for every parsed point batch.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[Point]) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(handler)
    }

    /// Forward every batch into `tx`. Batches are dropped once the receiver
    /// is gone.
    pub fn subscribe_channel(&self, tx: mpsc::UnboundedSender<Vec<Point>>) -> SubscriptionId {
        self.subscribers.subscribe(move |points: &[Point]| {
            if tx.send(points.to_vec()).is_err() {
                tracing::trace!("Point receiver dropped");
            }
        })
    }

    /// Remove a handler. Safe to call more than once.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Change the enabled flag consulted by the reconnect policy.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> FeedStats {
        self.counters.snapshot()
    }

    /// URL of the current connection task, if any.
    pub fn url(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.url.as_str())
    }

    /// Open a connection to `url`, replacing any existing one.
    ///
    /// Empty or invalid URLs are logged and leave the client disconnected.
    /// Must be called from within a tokio runtime.
    pub async fn connect(&mut self, url: &str) {
        if url.trim().is_empty() {
            tracing::debug!("Feed URL is empty, not connecting");
            return;
        }

        self.disconnect().await;

        if let Err(e) = validate_url(url) {
            tracing::warn!(error = %e, "Not connecting to feed");
            return;
        }

        let cancel = CancellationToken::new();
        let worker = ConnectionWorker {
            url: url.to_string(),
            transport: self.transport.clone(),
            subscribers: self.subscribers.clone(),
            enabled: self.enabled.clone(),
            reconnect_delay: self.reconnect_delay,
            state: self.state.clone(),
            counters: self.counters.clone(),
            cancel: cancel.clone(),
        };

        tracing::info!(url = %url, transport = %self.transport.name(), "Starting feed client");
        let task = tokio::spawn(worker.run());
        self.active = Some(ActiveConnection {
            url: url.to_string(),
            cancel,
            task,
        });
    }

    /// Close the connection and cancel any pending reconnect.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.cancel.cancel();
        if let Err(e) = active.task.await {
            tracing::warn!(error = %e, "Feed task ended abnormally");
        }
        self.state.send_replace(ConnectionState::Disconnected);
        tracing::info!(url = %active.url, "Feed client stopped");
    }

    /// Apply changed feed settings: tear down, then reconnect if enabled.
    pub async fn apply_settings(&mut self, enabled: bool, url: &str) {
        self.set_enabled(enabled);
        self.disconnect().await;

        if !enabled || url.trim().is_empty() {
            tracing::info!(enabled, "Feed disabled or URL not set");
            return;
        }
        self.connect(url).await;
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}

/// Why the read loop stopped.
enum ReadEnd {
    Cancelled,
    Closed,
}

struct ConnectionWorker {
    url: String,
    transport: Arc<dyn FeedTransport>,
    subscribers: Arc<Subscribers>,
    enabled: Arc<AtomicBool>,
    reconnect_delay: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

impl ConnectionWorker {
    async fn run(self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            self.counters.connect_attempts.fetch_add(1, Ordering::Relaxed);

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break,
                opened = self.transport.open(&self.url) => opened,
            };

            match opened {
                Ok(mut conn) => {
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(url = %self.url, "Feed connected");

                    let end = self.read_frames(conn.as_mut()).await;
                    if let ReadEnd::Cancelled = end {
                        conn.close().await;
                        break;
                    }
                    tracing::info!(url = %self.url, "Feed connection closed");
                }
                Err(e @ FeedError::InvalidUrl { .. }) => {
                    tracing::warn!(error = %e, "Feed URL rejected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, url = %self.url, "Feed connection failed");
                }
            }

            self.set_state(ConnectionState::Disconnected);

            if !self.enabled.load(Ordering::SeqCst) {
                tracing::info!("Feed disabled, not reconnecting");
                break;
            }

            self.counters
                .reconnects_scheduled
                .fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Scheduling feed reconnect"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }

            if !self.enabled.load(Ordering::SeqCst) {
                tracing::info!("Feed disabled while waiting, not reconnecting");
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    async fn read_frames(&self, conn: &mut dyn FeedConnection) -> ReadEnd {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ReadEnd::Cancelled,
                frame = conn.next_frame() => frame,
            };

            match frame {
                Some(Ok(text)) => self.handle_frame(&text),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Feed read error");
                    return ReadEnd::Closed;
                }
                None => return ReadEnd::Closed,
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<Vec<Point>>(text) {
            Ok(points) => {
                self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(points = points.len(), "Feed frame");
                self.subscribers.deliver(&points);
            }
            Err(e) => {
                self.counters
                    .malformed_frames
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Discarding malformed feed frame");
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}
