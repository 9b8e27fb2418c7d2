//! PhyVision Session
//!
//! Explicit context objects that own the pipeline state:
//! - [`ProducerSession`]: feed points → clusters → sources, frame editing,
//!   observer management and outbound sync
//! - [`ConsumerSession`]: applies inbound sync commands and centroid
//!   broadcasts to a local view
//!
//! Each session is driven from a single task, which is the only writer of
//! the current cluster set and frame.

pub mod consumer;
pub mod producer;
pub mod renderer;

pub use consumer::ConsumerSession;
pub use producer::{ProducerSession, SessionConfig, SessionStats};
pub use renderer::{LoggingRenderer, SceneRenderer};
