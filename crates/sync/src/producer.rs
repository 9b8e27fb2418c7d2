//! Producer side of the sync protocol.

use std::sync::Arc;

use phyvision_common::error::PhyvisionResult;
use phyvision_scene_model::geometry::{Centroid, Frame};
use phyvision_scene_model::scene::SceneStore;

use crate::channel::SyncChannel;
use crate::protocol::{ChannelMessage, Envelope, SyncMessage, ViewTarget};

/// Viewport assumed for an observer that has not reported one.
pub const DEFAULT_VIEWPORT: (f64, f64) = (1920.0, 1080.0);

/// View target that fits `frame` inside a `viewport` of `(width, height)`.
///
/// Centers on the frame and scales uniformly so the whole frame is visible.
pub fn compute_view_target(frame: &Frame, viewport: Option<(f64, f64)>) -> ViewTarget {
    let (vw, vh) = viewport
        .filter(|(w, h)| *w > 0.0 && *h > 0.0)
        .unwrap_or(DEFAULT_VIEWPORT);
    let center = frame.center();
    ViewTarget {
        x: center.x,
        y: center.y,
        scale: (vw / frame.w()).min(vh / frame.h()),
    }
}

/// Which consumer is the observer, and whether its controls are locked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserverState {
    pub observer_id: Option<String>,
    pub locked: bool,
}

/// Authoritative side of the protocol.
///
/// Owns the observer assignment and sends targeted view commands to it.
pub struct SyncProducer {
    channel: Arc<dyn SyncChannel>,
    store: Arc<dyn SceneStore>,
    observer: ObserverState,
    /// Most recent viewport reported by the current observer.
    last_viewport: Option<(f64, f64)>,
}

impl SyncProducer {
    /// Create a producer, restoring the persisted observer assignment.
    pub fn new(channel: Arc<dyn SyncChannel>, store: Arc<dyn SceneStore>) -> PhyvisionResult<Self> {
        let world = store.load_world()?;
        let observer_id = world.selected_observer_id.filter(|id| !id.is_empty());
        if let Some(id) = &observer_id {
            tracing::info!(observer = %id, "Restored observer assignment");
        }
        Ok(Self {
            channel,
            store,
            observer: ObserverState {
                observer_id,
                locked: false,
            },
            last_viewport: None,
        })
    }

    pub fn observer(&self) -> &ObserverState {
        &self.observer
    }

    pub fn observer_id(&self) -> Option<&str> {
        self.observer.observer_id.as_deref()
    }

    /// Hand the observer role to `observer_id`.
    ///
    /// The previous observer is disabled before the new assignment is
    /// persisted and the new observer enabled, so two observers are never
    /// enabled at once. The new observer then gets a full sync, followed by
    /// the current view lock if one is held.
    pub fn select_observer(
        &mut self,
        observer_id: &str,
        scene_id: &str,
        frame: &Frame,
    ) -> PhyvisionResult<()> {
        let changed = self.observer_id() != Some(observer_id);
        if changed {
            if let Some(previous) = self.observer.observer_id.clone() {
                self.send_set_observer(&previous, false);
            }
            self.last_viewport = None;
        }

        self.persist_observer(Some(observer_id.to_string()))?;
        self.send_set_observer(observer_id, true);
        tracing::info!(observer = %observer_id, locked = self.observer.locked, "Observer assigned");

        self.full_sync(scene_id, frame)?;
        if self.observer.locked {
            self.send_to_observer(SyncMessage::Lock { locked: true });
        }
        Ok(())
    }

    /// Disable the current observer and persist an empty assignment.
    pub fn clear_observer(&mut self) -> PhyvisionResult<()> {
        let Some(previous) = self.observer.observer_id.clone() else {
            return Ok(());
        };
        self.send_set_observer(&previous, false);
        self.persist_observer(None)?;
        self.observer.locked = false;
        self.last_viewport = None;
        tracing::info!(observer = %previous, "Observer cleared");
        Ok(())
    }

    /// Lock or unlock the observer's view controls.
    pub fn set_lock(&mut self, locked: bool) {
        self.observer.locked = locked;
        self.send_to_observer(SyncMessage::Lock { locked });
    }

    /// Animate the observer's view onto `frame`.
    pub fn broadcast_frame(&self, scene_id: &str, frame: &Frame) {
        let target = compute_view_target(frame, self.observer_viewport(scene_id));
        self.send_to_observer(SyncMessage::Pan(target));
    }

    /// Move the observer into `scene_id` and snap its view onto `frame`.
    pub fn full_sync(&self, scene_id: &str, frame: &Frame) -> PhyvisionResult<()> {
        let target = compute_view_target(frame, self.observer_viewport(scene_id));
        self.send_to_observer(SyncMessage::FullSync {
            target,
            scene_id: scene_id.to_string(),
        });
        Ok(())
    }

    /// Broadcast the current cluster set to every consumer.
    pub fn publish_centroids(&self, centroids: &[Centroid]) {
        self.publish(&ChannelMessage::CentroidUpdate(centroids.to_vec()));
    }

    /// Record a viewport reported by `observer_id` while `scene_id` shows
    /// `frame`.
    ///
    /// Reports from anyone but the current observer are ignored. A report
    /// that changes the viewport in use re-syncs the observer onto `frame`.
    /// Returns whether the report was stored.
    pub fn record_observer_viewport(
        &mut self,
        scene_id: &str,
        frame: &Frame,
        observer_id: &str,
        width: f64,
        height: f64,
    ) -> PhyvisionResult<bool> {
        if self.observer_id() != Some(observer_id) {
            tracing::debug!(from = %observer_id, "Ignoring viewport report from non-observer");
            return Ok(false);
        }

        let viewport = Frame::new(0.0, 0.0, width, height)?;
        let previous = self.observer_viewport(scene_id);
        let mut record = self.store.load_scene(scene_id)?;
        record.viewport = Some(viewport);
        self.store.save_scene(&record)?;
        self.last_viewport = Some((width, height));
        tracing::debug!(scene = %scene_id, width, height, "Observer viewport recorded");

        if previous != Some((width, height)) {
            self.full_sync(scene_id, frame)?;
        }
        Ok(true)
    }

    /// Handle a message received on the channel.
    ///
    /// Only viewport reports concern the producer; everything else is the
    /// producer's own traffic or meant for consumers.
    pub fn handle_inbound(
        &mut self,
        scene_id: &str,
        frame: &Frame,
        message: &ChannelMessage,
    ) -> PhyvisionResult<bool> {
        match message {
            ChannelMessage::Sync(Envelope {
                message:
                    SyncMessage::Viewport {
                        observer_id,
                        width,
                        height,
                    },
                ..
            }) => self.record_observer_viewport(scene_id, frame, observer_id, *width, *height),
            _ => Ok(false),
        }
    }

    /// The observer's live report wins; otherwise the last viewport saved
    /// for the scene.
    fn observer_viewport(&self, scene_id: &str) -> Option<(f64, f64)> {
        if self.last_viewport.is_some() {
            return self.last_viewport;
        }
        match self.store.load_scene(scene_id) {
            Ok(record) => record.viewport.map(|v| (v.w(), v.h())),
            Err(e) => {
                tracing::warn!(error = %e, scene = %scene_id, "Could not load observer viewport");
                None
            }
        }
    }

    fn persist_observer(&mut self, observer_id: Option<String>) -> PhyvisionResult<()> {
        let mut world = self.store.load_world()?;
        world.selected_observer_id = observer_id.clone();
        self.store.save_world(&world)?;
        self.observer.observer_id = observer_id;
        Ok(())
    }

    fn send_set_observer(&self, observer_id: &str, enabled: bool) {
        self.publish(&ChannelMessage::Sync(Envelope::to(
            observer_id,
            SyncMessage::SetObserver {
                observer_id: observer_id.to_string(),
                enabled,
            },
        )));
    }

    fn send_to_observer(&self, message: SyncMessage) {
        match self.observer_id() {
            Some(id) => self.publish(&ChannelMessage::Sync(Envelope::to(id, message))),
            None => tracing::trace!(kind = message.kind(), "No observer, not sending"),
        }
    }

    fn publish(&self, message: &ChannelMessage) {
        if let Err(e) = self.channel.publish(message) {
            tracing::warn!(error = %e, "Failed to publish sync message");
        }
    }
}
