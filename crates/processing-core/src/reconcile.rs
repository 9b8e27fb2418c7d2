//! Vision source reconciliation.
//!
//! Every cycle replaces the whole set of active sources: all previous sources
//! are removed, then one source per centroid is created with a positional id.
//! Identity is not carried across cycles.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use phyvision_scene_model::geometry::Centroid;

/// Positional identifier of a source within the current cluster set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceId(pub usize);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phyvision-source-{}", self.0)
    }
}

/// A vision source registered with the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActiveSource {
    pub id: SourceId,
    pub x: f64,
    pub y: f64,
    /// Vision radius in scene pixels.
    pub radius: f64,
}

/// External registry holding active vision sources.
pub trait SourceRegistry {
    /// Whether the registry can accept changes right now.
    fn is_ready(&self) -> bool;

    fn remove_source(&mut self, source: &ActiveSource);

    fn add_source(&mut self, source: &ActiveSource);

    /// Called once after a pass changed the registry.
    fn refresh(&mut self) {}
}

/// Effects of one reconciliation pass, removals first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub to_remove: Vec<ActiveSource>,
    pub to_create: Vec<(Centroid, SourceId)>,
}

/// Compute the effects of replacing `previous` with sources for `next`.
pub fn reconcile(previous: &BTreeMap<SourceId, ActiveSource>, next: &[Centroid]) -> ReconcilePlan {
    ReconcilePlan {
        to_remove: previous.values().copied().collect(),
        to_create: next
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, SourceId(i)))
            .collect(),
    }
}

/// Result of [`SourceReconciler::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Registry not ready; nothing changed, retry next cycle.
    Skipped,
    Applied { removed: usize, created: usize },
}

/// Owns the active sources and drives a [`SourceRegistry`].
pub struct SourceReconciler {
    sources: BTreeMap<SourceId, ActiveSource>,
    radius: f64,
}

impl SourceReconciler {
    pub fn new(radius: f64) -> Self {
        Self {
            sources: BTreeMap::new(),
            radius,
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Sources currently registered, ordered by id.
    pub fn active_sources(&self) -> impl Iterator<Item = &ActiveSource> {
        self.sources.values()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Replace all active sources with one per centroid.
    pub fn apply(
        &mut self,
        registry: &mut dyn SourceRegistry,
        centroids: &[Centroid],
    ) -> ReconcileOutcome {
        if !registry.is_ready() {
            tracing::debug!("Source registry not ready, skipping reconciliation");
            return ReconcileOutcome::Skipped;
        }

        let plan = reconcile(&self.sources, centroids);
        let removed = plan.to_remove.len();
        let created = plan.to_create.len();

        for source in &plan.to_remove {
            registry.remove_source(source);
        }
        self.sources.clear();

        for (centroid, id) in plan.to_create {
            let source = ActiveSource {
                id,
                x: centroid.x,
                y: centroid.y,
                radius: self.radius,
            };
            registry.add_source(&source);
            self.sources.insert(id, source);
        }

        registry.refresh();
        tracing::trace!(removed, created, "Reconciled vision sources");
        ReconcileOutcome::Applied { removed, created }
    }

    /// Remove every active source.
    pub fn clear(&mut self, registry: &mut dyn SourceRegistry) -> ReconcileOutcome {
        self.apply(registry, &[])
    }
}

/// In-process registry that records what a host would display.
#[derive(Debug)]
pub struct MemoryRegistry {
    ready: bool,
    sources: BTreeMap<SourceId, ActiveSource>,
    collisions: usize,
    refreshes: usize,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self {
            ready: true,
            sources: BTreeMap::new(),
            collisions: 0,
            refreshes: 0,
        }
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle availability, e.g. while the host scene is loading.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn sources(&self) -> &BTreeMap<SourceId, ActiveSource> {
        &self.sources
    }

    /// Times a source was added under an id that was still occupied.
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes
    }
}

impl SourceRegistry for MemoryRegistry {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn remove_source(&mut self, source: &ActiveSource) {
        self.sources.remove(&source.id);
    }

    fn add_source(&mut self, source: &ActiveSource) {
        if self.sources.insert(source.id, *source).is_some() {
            self.collisions += 1;
            tracing::warn!(id = %source.id, "Source id already registered");
        }
    }

    fn refresh(&mut self) {
        self.refreshes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centroids(n: usize) -> Vec<Centroid> {
        (0..n)
            .map(|i| Centroid {
                x: i as f64 * 10.0,
                y: 5.0,
                size: 1,
            })
            .collect()
    }

    #[test]
    fn test_plan_removes_everything_and_creates_positionally() {
        let mut previous = BTreeMap::new();
        previous.insert(
            SourceId(0),
            ActiveSource {
                id: SourceId(0),
                x: 1.0,
                y: 1.0,
                radius: 5.0,
            },
        );

        let plan = reconcile(&previous, &centroids(2));
        assert_eq!(plan.to_remove.len(), 1);
        assert_eq!(
            plan.to_create.iter().map(|(_, id)| *id).collect::<Vec<_>>(),
            vec![SourceId(0), SourceId(1)]
        );
    }

    #[test]
    fn test_registry_holds_exactly_n_sources() {
        let mut registry = MemoryRegistry::new();
        let mut reconciler = SourceReconciler::new(60.0);

        for n in [3, 5, 1, 0, 4] {
            let outcome = reconciler.apply(&mut registry, &centroids(n));
            assert!(matches!(outcome, ReconcileOutcome::Applied { created, .. } if created == n));
            assert_eq!(registry.sources().len(), n);
            assert_eq!(reconciler.len(), n);
        }
        assert_eq!(registry.collisions(), 0);
        assert_eq!(registry.refreshes(), 5);
    }

    #[test]
    fn test_sources_carry_radius_and_position() {
        let mut registry = MemoryRegistry::new();
        let mut reconciler = SourceReconciler::new(42.0);
        reconciler.apply(&mut registry, &centroids(2));

        let second = registry.sources()[&SourceId(1)];
        assert_eq!((second.x, second.y, second.radius), (10.0, 5.0, 42.0));
    }

    #[test]
    fn test_unready_registry_is_skipped_and_retried() {
        let mut registry = MemoryRegistry::new();
        registry.set_ready(false);
        let mut reconciler = SourceReconciler::new(10.0);

        assert_eq!(
            reconciler.apply(&mut registry, &centroids(3)),
            ReconcileOutcome::Skipped
        );
        assert!(registry.sources().is_empty());
        assert!(reconciler.is_empty());

        registry.set_ready(true);
        assert_eq!(
            reconciler.apply(&mut registry, &centroids(3)),
            ReconcileOutcome::Applied {
                removed: 0,
                created: 3
            }
        );
        assert_eq!(registry.sources().len(), 3);
    }

    #[test]
    fn test_clear_empties_registry() {
        let mut registry = MemoryRegistry::new();
        let mut reconciler = SourceReconciler::new(10.0);
        reconciler.apply(&mut registry, &centroids(4));
        reconciler.clear(&mut registry);
        assert!(registry.sources().is_empty());
        assert!(reconciler.is_empty());
    }

    /// Fails on any add that would shadow a live id.
    struct StrictRegistry {
        live: BTreeMap<SourceId, ActiveSource>,
        log: Vec<String>,
    }

    impl SourceRegistry for StrictRegistry {
        fn is_ready(&self) -> bool {
            true
        }

        fn remove_source(&mut self, source: &ActiveSource) {
            self.log.push(format!("remove {}", source.id));
            self.live.remove(&source.id);
        }

        fn add_source(&mut self, source: &ActiveSource) {
            assert!(
                !self.live.contains_key(&source.id),
                "duplicate id {}",
                source.id
            );
            self.log.push(format!("add {}", source.id));
            self.live.insert(source.id, *source);
        }
    }

    #[test]
    fn test_removals_precede_creations() {
        let mut registry = StrictRegistry {
            live: BTreeMap::new(),
            log: Vec::new(),
        };
        let mut reconciler = SourceReconciler::new(10.0);
        reconciler.apply(&mut registry, &centroids(2));
        registry.log.clear();

        reconciler.apply(&mut registry, &centroids(2));
        assert_eq!(
            registry.log,
            vec![
                "remove phyvision-source-0",
                "remove phyvision-source-1",
                "add phyvision-source-0",
                "add phyvision-source-1",
            ]
        );
    }
}
