//! Consumer side of the sync protocol.

use std::sync::Arc;
use std::time::Duration;

use crate::channel::SyncChannel;
use crate::protocol::{ChannelMessage, Envelope, SyncMessage, ViewTarget};

/// Duration of the animated pan applied on `PAN`.
pub const PAN_ANIMATION: Duration = Duration::from_millis(250);

/// The consumer's local view, provided by the host.
pub trait ViewController {
    /// Scene currently shown, if any.
    fn current_scene(&self) -> Option<String>;

    /// Switch to another scene. Returns `false` if the scene is unknown.
    fn switch_scene(&mut self, scene_id: &str) -> bool;

    /// Jump to a target without animation.
    fn snap_to(&mut self, target: ViewTarget);

    /// Animate to a target over `duration`.
    fn animate_to(&mut self, target: ViewTarget, duration: Duration);

    /// Enable or disable the user's own pan/zoom controls.
    fn set_controls_locked(&mut self, locked: bool);

    /// Show a notification to the user.
    fn notify(&mut self, message: &str);

    /// Visible area in screen pixels, reported to the producer.
    fn viewport_size(&self) -> (f64, f64);
}

/// What a consumer did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerOutcome {
    /// Addressed to someone else, or not applicable to this consumer.
    Ignored,
    Applied,
}

/// One consumer participant.
pub struct SyncConsumer {
    identity: String,
    channel: Arc<dyn SyncChannel>,
    is_observer: bool,
    locked: bool,
}

impl SyncConsumer {
    pub fn new(identity: impl Into<String>, channel: Arc<dyn SyncChannel>) -> Self {
        Self {
            identity: identity.into(),
            channel,
            is_observer: false,
            locked: false,
        }
    }

    /// Start with a previously persisted observer flag.
    pub fn with_observer_flag(mut self, is_observer: bool) -> Self {
        self.is_observer = is_observer;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_observer(&self) -> bool {
        self.is_observer
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Apply a channel message to the local view.
    ///
    /// Centroid updates are not view commands and are left to the caller.
    pub fn handle(
        &mut self,
        message: &ChannelMessage,
        view: &mut dyn ViewController,
    ) -> ConsumerOutcome {
        match message {
            ChannelMessage::Sync(envelope) => self.handle_envelope(envelope, view),
            ChannelMessage::CentroidUpdate(_) => ConsumerOutcome::Ignored,
        }
    }

    pub fn handle_envelope(
        &mut self,
        envelope: &Envelope,
        view: &mut dyn ViewController,
    ) -> ConsumerOutcome {
        if !envelope.is_for(&self.identity) {
            return ConsumerOutcome::Ignored;
        }

        match &envelope.message {
            SyncMessage::SetObserver {
                observer_id,
                enabled,
            } => {
                if *observer_id != self.identity {
                    return ConsumerOutcome::Ignored;
                }
                self.set_observer(*enabled, view);
                ConsumerOutcome::Applied
            }
            SyncMessage::Pan(target) => {
                if !self.is_observer {
                    return ConsumerOutcome::Ignored;
                }
                view.animate_to(*target, PAN_ANIMATION);
                ConsumerOutcome::Applied
            }
            SyncMessage::FullSync { target, scene_id } => {
                if !self.is_observer {
                    return ConsumerOutcome::Ignored;
                }
                if view.current_scene().as_deref() != Some(scene_id.as_str())
                    && !view.switch_scene(scene_id)
                {
                    tracing::warn!(scene = %scene_id, "Full sync for unknown scene");
                    return ConsumerOutcome::Ignored;
                }
                view.snap_to(*target);
                ConsumerOutcome::Applied
            }
            SyncMessage::Lock { locked } => {
                if !self.is_observer {
                    return ConsumerOutcome::Ignored;
                }
                self.locked = *locked;
                view.set_controls_locked(*locked);
                ConsumerOutcome::Applied
            }
            SyncMessage::Viewport { .. } => ConsumerOutcome::Ignored,
        }
    }

    fn set_observer(&mut self, enabled: bool, view: &mut dyn ViewController) {
        self.is_observer = enabled;
        if enabled {
            view.notify("You are now the observer");
            let (width, height) = view.viewport_size();
            let report = ChannelMessage::Sync(Envelope::broadcast(SyncMessage::Viewport {
                observer_id: self.identity.clone(),
                width,
                height,
            }));
            if let Err(e) = self.channel.publish(&report) {
                tracing::warn!(error = %e, "Failed to report viewport");
            }
        } else {
            view.notify("Observer mode disabled");
            if self.locked {
                self.locked = false;
                view.set_controls_locked(false);
            }
        }
        tracing::info!(identity = %self.identity, enabled, "Observer mode changed");
    }
}
