//! Producer session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use phyvision_common::config::AppConfig;
use phyvision_common::error::{PhyvisionError, PhyvisionResult};
use phyvision_processing_core::clustering::{ClusterEngine, ClusteringAlgorithm};
use phyvision_processing_core::mapping::map_points;
use phyvision_processing_core::reconcile::{
    ActiveSource, ReconcileOutcome, SourceReconciler, SourceRegistry,
};
use phyvision_scene_model::geometry::{Centroid, Frame, Point};
use phyvision_scene_model::scene::{resolve_frame, FrameDefaults, SceneStore};
use phyvision_sync::channel::{SyncChannel, SyncReceiver};
use phyvision_sync::producer::{ObserverState, SyncProducer};

use crate::renderer::SceneRenderer;

/// Settings for a producer session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Scene the session starts in.
    pub scene_id: String,

    /// Clustering algorithm and threshold in scene pixels.
    pub algorithm: ClusteringAlgorithm,

    /// Vision radius given to every source.
    pub vision_radius: f64,

    /// Marker color as `0xRRGGBB`.
    pub marker_color: u32,

    /// Frame used when a scene has none saved.
    pub frame_defaults: FrameDefaults,

    /// Points come from manual placement rather than the live feed.
    pub manual_mode: bool,
}

impl SessionConfig {
    /// Derive session settings from the application config.
    pub fn from_app(config: &AppConfig, scene_id: impl Into<String>) -> PhyvisionResult<Self> {
        config.validate()?;
        Ok(Self {
            scene_id: scene_id.into(),
            algorithm: ClusteringAlgorithm::Connectivity {
                threshold: config.clustering.threshold_px,
            },
            vision_radius: config.vision.radius_px,
            marker_color: config.marker_rgb()?,
            frame_defaults: FrameDefaults {
                width: config.viewport.default_width,
                aspect: config.aspect_ratio()?,
            },
            manual_mode: !config.feed.enabled,
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scene_id: "default".to_string(),
            algorithm: ClusteringAlgorithm::Connectivity { threshold: 100.0 },
            vision_radius: 300.0,
            marker_color: 0xff0000,
            frame_defaults: FrameDefaults::default(),
            manual_mode: false,
        }
    }
}

/// Counters reported when a session loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub cycles: u64,
    pub skipped_reconciles: u64,
    pub channel_messages: u64,
}

/// Authoritative session: owns the current cluster set and frame.
pub struct ProducerSession<R, V> {
    config: SessionConfig,
    store: Arc<dyn SceneStore>,
    engine: ClusterEngine,
    scene_id: String,
    frame: Frame,
    clusters: Vec<Centroid>,
    reconciler: SourceReconciler,
    registry: R,
    renderer: V,
    sync: SyncProducer,
    stats: SessionStats,
}

impl<R: SourceRegistry, V: SceneRenderer> ProducerSession<R, V> {
    /// Open a session on `config.scene_id`, resolving its frame.
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn SceneStore>,
        channel: Arc<dyn SyncChannel>,
        registry: R,
        renderer: V,
    ) -> PhyvisionResult<Self> {
        let scene_id = config.scene_id.clone();
        let frame = resolve_frame(store.as_ref(), &scene_id, &config.frame_defaults)?;
        let sync = SyncProducer::new(channel, store.clone())?;

        tracing::info!(
            scene = %scene_id,
            manual = config.manual_mode,
            algorithm = ?config.algorithm,
            "Producer session opened"
        );

        let mut session = Self {
            engine: ClusterEngine::new(config.algorithm),
            reconciler: SourceReconciler::new(config.vision_radius),
            config,
            store,
            scene_id,
            frame,
            clusters: Vec::new(),
            registry,
            renderer,
            sync,
            stats: SessionStats::default(),
        };
        session.renderer.render_frame(&session.frame);
        if session.config.manual_mode {
            session.recluster_manual()?;
        }
        Ok(session)
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// The current cluster set.
    pub fn clusters(&self) -> &[Centroid] {
        &self.clusters
    }

    pub fn active_sources(&self) -> impl Iterator<Item = &ActiveSource> {
        self.reconciler.active_sources()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn renderer(&self) -> &V {
        &self.renderer
    }

    pub fn observer(&self) -> &ObserverState {
        self.sync.observer()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Run one feed cycle: map normalized points through the frame, cluster
    /// them, and replace the current cluster set.
    pub fn ingest(&mut self, points: &[Point]) -> &[Centroid] {
        let mapped = map_points(points, &self.frame);
        let clusters = self.engine.cluster(&mapped);
        tracing::trace!(points = points.len(), clusters = clusters.len(), "Feed cycle");
        self.replace_clusters(clusters);
        &self.clusters
    }

    /// Place a point by hand (scene pixels) and recluster.
    pub fn add_manual_point(&mut self, point: Point) -> PhyvisionResult<()> {
        let mut record = self.store.load_scene(&self.scene_id)?;
        record.manual_points.push(point);
        self.store.save_scene(&record)?;
        tracing::debug!(x = point.x, y = point.y, "Manual point added");
        self.cluster_scene_points(&record.manual_points);
        Ok(())
    }

    /// Remove the stored manual point nearest to `near`.
    ///
    /// Returns the removed point, or `None` if there were none.
    pub fn remove_nearest_manual_point(&mut self, near: Point) -> PhyvisionResult<Option<Point>> {
        let mut record = self.store.load_scene(&self.scene_id)?;
        let nearest = record
            .manual_points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.distance_to(&near).total_cmp(&b.distance_to(&near)))
            .map(|(i, _)| i);

        let Some(index) = nearest else {
            return Ok(None);
        };

        let removed = record.manual_points.remove(index);
        self.store.save_scene(&record)?;
        tracing::debug!(x = removed.x, y = removed.y, "Manual point removed");
        self.cluster_scene_points(&record.manual_points);
        Ok(Some(removed))
    }

    /// Recluster the scene's stored manual points.
    pub fn recluster_manual(&mut self) -> PhyvisionResult<()> {
        let record = self.store.load_scene(&self.scene_id)?;
        self.cluster_scene_points(&record.manual_points);
        Ok(())
    }

    /// Move the frame's origin.
    pub fn move_frame(&mut self, x: f64, y: f64) -> PhyvisionResult<()> {
        let frame = self.frame.moved_to(x, y)?;
        self.commit_frame(frame)
    }

    /// Change the frame's size, keeping its origin.
    pub fn resize_frame(&mut self, w: f64, h: f64) -> PhyvisionResult<()> {
        let frame = self.frame.resized(w, h)?;
        self.commit_frame(frame)
    }

    /// Restore the default frame size, keeping its origin.
    pub fn reset_frame_size(&mut self) -> PhyvisionResult<()> {
        let default = self.config.frame_defaults.frame()?;
        let frame = self.frame.resized(default.w(), default.h())?;
        self.commit_frame(frame)
    }

    /// Switch to another scene.
    ///
    /// Clears the current clusters and sends the observer a full sync.
    pub fn change_scene(&mut self, scene_id: &str) -> PhyvisionResult<()> {
        let frame = resolve_frame(self.store.as_ref(), scene_id, &self.config.frame_defaults)?;
        tracing::info!(from = %self.scene_id, to = %scene_id, "Changing scene");

        self.scene_id = scene_id.to_string();
        self.frame = frame;
        self.renderer.render_frame(&self.frame);
        self.replace_clusters(Vec::new());
        self.sync.full_sync(&self.scene_id, &self.frame)?;

        if self.config.manual_mode {
            self.recluster_manual()?;
        }
        Ok(())
    }

    /// Make `observer_id` the observer.
    pub fn select_observer(&mut self, observer_id: &str) -> PhyvisionResult<()> {
        if observer_id.is_empty() {
            return Err(PhyvisionError::sync("observer id must not be empty"));
        }
        self.sync.select_observer(observer_id, &self.scene_id, &self.frame)
    }

    pub fn clear_observer(&mut self) -> PhyvisionResult<()> {
        self.sync.clear_observer()
    }

    /// Lock or unlock the observer's own view controls.
    pub fn set_view_lock(&mut self, locked: bool) {
        self.sync.set_lock(locked);
    }

    /// Handle a message received on the sync channel.
    pub fn handle_channel_message(&mut self, message: &phyvision_sync::ChannelMessage) {
        self.stats.channel_messages += 1;
        if let Err(e) = self.sync.handle_inbound(&self.scene_id, &self.frame, message) {
            tracing::warn!(error = %e, "Failed to handle sync message");
        }
    }

    /// Drive the session until `shutdown` fires or the point stream ends.
    pub async fn run(
        mut self,
        mut points: mpsc::UnboundedReceiver<Vec<Point>>,
        mut inbound: SyncReceiver,
        shutdown: CancellationToken,
    ) -> SessionStats {
        tracing::info!(scene = %self.scene_id, "Producer session running");
        let mut inbound_open = true;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Producer session shutting down");
                    break;
                }
                batch = points.recv() => match batch {
                    Some(batch) => {
                        self.ingest(&batch);
                    }
                    None => {
                        tracing::info!("Point stream ended");
                        break;
                    }
                },
                message = inbound.recv(), if inbound_open => match message {
                    Some(message) => self.handle_channel_message(&message),
                    None => {
                        tracing::debug!("Sync channel closed");
                        inbound_open = false;
                    }
                },
            }
        }

        tracing::info!(
            cycles = self.stats.cycles,
            skipped = self.stats.skipped_reconciles,
            "Producer session stopped"
        );
        self.stats
    }

    fn cluster_scene_points(&mut self, points: &[Point]) {
        let clusters = self.engine.cluster(points);
        self.replace_clusters(clusters);
    }

    /// Replace the current cluster set and push it to every collaborator.
    fn replace_clusters(&mut self, clusters: Vec<Centroid>) {
        self.clusters = clusters;
        self.stats.cycles += 1;

        let outcome = self.reconciler.apply(&mut self.registry, &self.clusters);
        if outcome == ReconcileOutcome::Skipped {
            self.stats.skipped_reconciles += 1;
        }
        self.renderer.render_centroids(&self.clusters, self.config.marker_color);
        self.sync.publish_centroids(&self.clusters);
    }

    fn commit_frame(&mut self, frame: Frame) -> PhyvisionResult<()> {
        let mut record = self.store.load_scene(&self.scene_id)?;
        record.frame = Some(frame);
        self.store.save_scene(&record)?;

        self.frame = frame;
        self.renderer.render_frame(&self.frame);
        self.sync.broadcast_frame(&self.scene_id, &self.frame);
        tracing::debug!(
            x = frame.x(),
            y = frame.y(),
            w = frame.w(),
            h = frame.h(),
            "Frame updated"
        );
        Ok(())
    }
}
