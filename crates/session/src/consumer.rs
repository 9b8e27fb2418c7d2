//! Consumer session.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use phyvision_processing_core::reconcile::{SourceReconciler, SourceRegistry};
use phyvision_scene_model::geometry::Centroid;
use phyvision_sync::channel::{SyncChannel, SyncReceiver};
use phyvision_sync::consumer::{ConsumerOutcome, SyncConsumer, ViewController};
use phyvision_sync::protocol::ChannelMessage;

use crate::renderer::SceneRenderer;

/// A dependent participant: follows the producer's view commands when it is
/// the observer and mirrors the broadcast cluster set locally.
pub struct ConsumerSession<R, V, C> {
    sync: SyncConsumer,
    reconciler: SourceReconciler,
    registry: R,
    renderer: V,
    view: C,
    marker_color: u32,
    centroids: Vec<Centroid>,
}

impl<R, V, C> ConsumerSession<R, V, C>
where
    R: SourceRegistry,
    V: SceneRenderer,
    C: ViewController,
{
    pub fn new(
        identity: impl Into<String>,
        channel: Arc<dyn SyncChannel>,
        registry: R,
        renderer: V,
        view: C,
        vision_radius: f64,
        marker_color: u32,
    ) -> Self {
        Self {
            sync: SyncConsumer::new(identity, channel),
            reconciler: SourceReconciler::new(vision_radius),
            registry,
            renderer,
            view,
            marker_color,
            centroids: Vec::new(),
        }
    }

    /// Restore the observer flag persisted from a previous run.
    pub fn with_observer_flag(mut self, is_observer: bool) -> Self {
        self.sync = self.sync.with_observer_flag(is_observer);
        self
    }

    pub fn identity(&self) -> &str {
        self.sync.identity()
    }

    pub fn is_observer(&self) -> bool {
        self.sync.is_observer()
    }

    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn renderer(&self) -> &V {
        &self.renderer
    }

    pub fn view(&self) -> &C {
        &self.view
    }

    /// Apply one channel message.
    pub fn handle(&mut self, message: &ChannelMessage) -> ConsumerOutcome {
        match message {
            ChannelMessage::CentroidUpdate(centroids) => {
                self.centroids = centroids.clone();
                self.reconciler.apply(&mut self.registry, &self.centroids);
                self.renderer.render_centroids(&self.centroids, self.marker_color);
                ConsumerOutcome::Applied
            }
            ChannelMessage::Sync(_) => self.sync.handle(message, &mut self.view),
        }
    }

    /// Apply every message already queued on `inbound`.
    pub fn pump(&mut self, inbound: &mut SyncReceiver) -> usize {
        let messages = inbound.drain();
        for message in &messages {
            self.handle(message);
        }
        messages.len()
    }

    /// Process messages until `shutdown` fires or the channel closes.
    pub async fn run(mut self, mut inbound: SyncReceiver, shutdown: CancellationToken) -> Self {
        tracing::info!(identity = %self.identity(), "Consumer session running");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => {
                        self.handle(&message);
                    }
                    None => break,
                },
            }
        }
        tracing::info!(identity = %self.identity(), "Consumer session stopped");
        self
    }
}
