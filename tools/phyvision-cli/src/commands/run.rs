//! Run a producer session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use phyvision_common::config::AppConfig;
use phyvision_feed_client::FeedClient;
use phyvision_processing_core::reconcile::MemoryRegistry;
use phyvision_scene_model::scene::JsonSceneStore;
use phyvision_session::{LoggingRenderer, ProducerSession, SessionConfig};
use phyvision_sync::{BroadcastChannel, SyncChannel};

pub async fn run(
    mut config: AppConfig,
    url: Option<String>,
    scene: String,
    threshold: Option<f64>,
    observer: Option<String>,
) -> anyhow::Result<()> {
    if let Some(url) = url {
        config.feed.url = url;
        config.feed.enabled = true;
    }
    if let Some(threshold) = threshold {
        config.clustering.threshold_px = threshold;
    }

    let session_config = SessionConfig::from_app(&config, scene.clone())?;

    println!("Starting producer session: {scene}");
    println!("  State dir: {}", config.state_dir.display());
    if config.feed.enabled {
        println!("  Feed: {}", config.feed.url);
    } else {
        println!("  Feed: disabled (manual points)");
    }
    println!("  Threshold: {}px", config.clustering.threshold_px);
    println!("  Vision radius: {}px", config.vision.radius_px);
    println!();

    let store = Arc::new(
        JsonSceneStore::open(&config.state_dir)
            .map_err(|e| anyhow::anyhow!("Failed to open scene store: {e}"))?,
    );
    let channel = Arc::new(BroadcastChannel::default());

    let mut session = ProducerSession::new(
        session_config,
        store,
        channel.clone(),
        MemoryRegistry::new(),
        LoggingRenderer::new(),
    )?;
    if let Some(observer) = observer {
        session.select_observer(&observer)?;
        println!("Observer: {observer}");
    }

    let frame = *session.frame();
    println!(
        "Frame: ({}, {}) {} x {}",
        frame.x(),
        frame.y(),
        frame.w(),
        frame.h()
    );

    let (tx, points) = mpsc::unbounded_channel();
    let mut feed = FeedClient::from_config(&config.feed);
    feed.subscribe_channel(tx);
    if config.feed.enabled {
        feed.connect(&config.feed.url).await;
    }

    let shutdown = CancellationToken::new();
    let inbound = channel.subscribe();
    let task = tokio::spawn(session.run(points, inbound, shutdown.clone()));

    println!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;
    println!();

    feed.disconnect().await;
    shutdown.cancel();
    let stats = task.await?;
    let feed_stats = feed.stats();

    println!("Session stopped");
    println!("  Cycles: {}", stats.cycles);
    println!("  Skipped reconciles: {}", stats.skipped_reconciles);
    println!(
        "  Feed frames: {} ({} malformed, {} reconnects)",
        feed_stats.frames_received, feed_stats.malformed_frames, feed_stats.reconnects_scheduled
    );
    Ok(())
}
