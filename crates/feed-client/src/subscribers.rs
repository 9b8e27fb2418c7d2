//! Subscriber registry for point batches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use phyvision_scene_model::geometry::Point;

/// Handle returned by [`Subscribers::subscribe`].
pub type SubscriptionId = u64;

type Handler = Arc<dyn Fn(&[Point]) + Send + Sync>;

/// Ordered set of point-batch handlers.
///
/// Handlers run in subscription order on the delivering task. The handler
/// list is snapshotted before delivery, so a handler may unsubscribe itself.
#[derive(Default)]
pub struct Subscribers {
    handlers: Mutex<Vec<(SubscriptionId, Handler)>>,
    next_id: AtomicU64,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[Point]) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one batch to every handler.
    pub fn deliver(&self, points: &[Point]) {
        let snapshot: Vec<Handler> = self.lock().iter().map(|(_, h)| h.clone()).collect();
        for handler in snapshot {
            handler(points);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Handler)>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
