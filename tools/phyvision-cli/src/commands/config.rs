//! Print or write the effective configuration.

use std::path::PathBuf;

use phyvision_common::config::{config_file_path, AppConfig};

pub fn run(config: &AppConfig, write: bool, path: Option<PathBuf>) -> anyhow::Result<()> {
    if let Err(e) = config.validate() {
        eprintln!("Warning: {e}");
    }

    println!("{}", serde_json::to_string_pretty(config)?);

    if write {
        let path = path.unwrap_or_else(config_file_path);
        config.save_to(&path)?;
        println!();
        println!("Configuration written to: {}", path.display());
    }
    Ok(())
}
