//! Offline clustering of a point file.

use std::path::PathBuf;

use phyvision_common::config::AppConfig;
use phyvision_processing_core::clustering::{ClusterEngine, ClusteringAlgorithm};
use phyvision_processing_core::mapping::map_points;
use phyvision_scene_model::geometry::{Centroid, Frame, Point};

pub fn run(
    config: &AppConfig,
    points: PathBuf,
    threshold: Option<f64>,
    frame: Option<Frame>,
    greedy: bool,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&points)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", points.display()))?;
    let input: Vec<Point> = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("{} is not a JSON array of points: {e}", points.display()))?;

    let threshold = threshold.unwrap_or(config.clustering.threshold_px);
    let centroids = cluster(&input, threshold, frame.as_ref(), greedy);

    tracing::info!(points = input.len(), clusters = centroids.len(), "Clustered");
    println!("{}", serde_json::to_string_pretty(&centroids)?);
    Ok(())
}

fn cluster(points: &[Point], threshold: f64, frame: Option<&Frame>, greedy: bool) -> Vec<Centroid> {
    let algorithm = if greedy {
        ClusteringAlgorithm::Greedy { threshold }
    } else {
        ClusteringAlgorithm::Connectivity { threshold }
    };
    let engine = ClusterEngine::new(algorithm);

    match frame {
        Some(frame) => engine.cluster(&map_points(points, frame)),
        None => engine.cluster(points),
    }
}
