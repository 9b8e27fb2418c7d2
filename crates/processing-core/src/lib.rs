//! PhyVision Processing Core
//!
//! Turns raw point observations into vision sources:
//! - **Clustering:** group points into weighted centroids by proximity
//! - **Mapping:** project normalized feed points into scene pixels
//! - **Reconciliation:** replace the registry's active sources each cycle
//!
//! Pure computation plus one collaborator trait ([`reconcile::SourceRegistry`]).
//! No I/O, no async.

pub mod clustering;
pub mod mapping;
pub mod reconcile;

pub use clustering::{cluster_points, ClusterEngine, ClusteringAlgorithm};
pub use mapping::{map_points, to_normalized, to_scene_space};
pub use reconcile::{
    ActiveSource, MemoryRegistry, ReconcileOutcome, SourceId, SourceReconciler, SourceRegistry,
};
