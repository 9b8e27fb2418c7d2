//! PhyVision CLI: run a producer session and inspect its persisted state.
//!
//! Usage:
//!   phyvision run [OPTIONS]                 Run a producer session against the feed
//!   phyvision cluster <POINTS> [OPTIONS]    Cluster a JSON point file offline
//!   phyvision frame <SCENE> <ACTION>        Show or edit a scene's frame
//!   phyvision config [--write]              Print the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use phyvision_common::config::AppConfig;
use phyvision_scene_model::geometry::Frame;

mod commands;

#[derive(Parser)]
#[command(
    name = "phyvision",
    about = "Point clustering and observer view sync",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the standard location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a producer session until Ctrl+C
    Run {
        /// Feed URL; enables the feed when given
        #[arg(long)]
        url: Option<String>,

        /// Scene to open
        #[arg(short, long, default_value = "default")]
        scene: String,

        /// Cluster distance threshold in scene pixels
        #[arg(long)]
        threshold: Option<f64>,

        /// Consumer to assign as observer on start
        #[arg(long)]
        observer: Option<String>,
    },

    /// Cluster a JSON array of {x, y} points and print the centroids
    Cluster {
        /// Path to the points file
        points: PathBuf,

        /// Cluster distance threshold in scene pixels
        #[arg(long)]
        threshold: Option<f64>,

        /// Treat points as normalized and map them through x,y,w,h first
        #[arg(long, value_parser = parse_frame)]
        frame: Option<Frame>,

        /// Use greedy clustering instead of connectivity
        #[arg(long)]
        greedy: bool,
    },

    /// Show or edit the persisted frame of a scene
    Frame {
        /// Scene identifier
        scene: String,

        #[command(subcommand)]
        action: commands::frame::FrameAction,
    },

    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Parse `x,y,w,h` into a frame.
fn parse_frame(s: &str) -> Result<Frame, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid number in {s:?}: {e}"))?;
    match values.as_slice() {
        [x, y, w, h] => Frame::new(*x, *y, *w, *h).map_err(|e| e.to_string()),
        _ => Err(format!("expected x,y,w,h, got {s:?}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    phyvision_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Run {
            url,
            scene,
            threshold,
            observer,
        } => commands::run::run(config, url, scene, threshold, observer).await,
        Commands::Cluster {
            points,
            threshold,
            frame,
            greedy,
        } => commands::cluster::run(&config, points, threshold, frame, greedy),
        Commands::Frame { scene, action } => commands::frame::run(&config, scene, action),
        Commands::Config { write } => commands::config::run(&config, write, cli.config),
    }
}
