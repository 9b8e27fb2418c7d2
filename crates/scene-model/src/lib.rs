//! PhyVision Scene Model
//!
//! Defines the core data contracts shared by every PhyVision crate:
//! - **Geometry:** points, frames, and cluster centroids
//! - **Scene state:** per-scene frame, observer viewport, and manual points
//! - **Stores:** pluggable persistence for scene and world state
//!
//! Feed coordinates are normalized to `[0.0, 1.0]`; everything downstream of
//! the coordinate mapper is in scene pixels.

pub mod geometry;
pub mod scene;

pub use geometry::*;
pub use scene::*;
