//! Rendering collaborator.

use phyvision_scene_model::geometry::{Centroid, Frame};

/// Draws the current state. Implemented by the host.
pub trait SceneRenderer {
    /// Replace the displayed centroid markers.
    fn render_centroids(&mut self, centroids: &[Centroid], color: u32);

    /// Redraw the producer frame outline.
    fn render_frame(&mut self, frame: &Frame);
}

/// Renderer that only logs what it would draw.
#[derive(Debug, Default)]
pub struct LoggingRenderer {
    frames_drawn: u64,
    last_centroids: Vec<Centroid>,
}

impl LoggingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_centroids(&self) -> &[Centroid] {
        &self.last_centroids
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }
}

impl SceneRenderer for LoggingRenderer {
    fn render_centroids(&mut self, centroids: &[Centroid], color: u32) {
        tracing::debug!(
            count = centroids.len(),
            color = %format_args!("#{color:06x}"),
            "Render centroids"
        );
        self.last_centroids = centroids.to_vec();
    }

    fn render_frame(&mut self, frame: &Frame) {
        self.frames_drawn += 1;
        tracing::debug!(
            x = frame.x(),
            y = frame.y(),
            w = frame.w(),
            h = frame.h(),
            "Render frame"
        );
    }
}
