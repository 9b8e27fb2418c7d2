//! Application configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PhyvisionError, PhyvisionResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where per-scene state is persisted.
    pub state_dir: PathBuf,

    /// Point feed connection settings.
    pub feed: FeedConfig,

    /// Clustering parameters.
    pub clustering: ClusteringConfig,

    /// Vision source and marker settings.
    pub vision: VisionConfig,

    /// Default frame geometry for scenes without a saved frame.
    pub viewport: ViewportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Point feed connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Whether the live feed is used at all.
    pub enabled: bool,

    /// WebSocket URL of the tracking feed.
    pub url: String,

    /// Delay before a reconnect attempt after the connection closes.
    pub reconnect_delay_ms: u64,
}

/// Clustering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Maximum linking distance between two points, in scene pixels.
    pub threshold_px: f64,
}

/// Vision source and marker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Radius of each generated vision source, in scene pixels.
    pub radius_px: f64,

    /// Marker color as `#rrggbb`.
    pub marker_color: String,
}

/// Default frame geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportDefaults {
    /// Default frame width in scene pixels.
    pub default_width: f64,

    /// Aspect ratio as `"W:H"`.
    pub aspect_ratio: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "phyvision=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            feed: FeedConfig::default(),
            clustering: ClusteringConfig::default(),
            vision: VisionConfig::default(),
            viewport: ViewportDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "ws://localhost:8080".to_string(),
            reconnect_delay_ms: 5000,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self { threshold_px: 100.0 }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            radius_px: 300.0,
            marker_color: "#ff0000".to_string(),
        }
    }
}

impl Default for ViewportDefaults {
    fn default() -> Self {
        Self {
            default_width: 1920.0,
            aspect_ratio: "16:9".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> PhyvisionResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PhyvisionError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Check values that serde alone cannot reject.
    pub fn validate(&self) -> PhyvisionResult<()> {
        self.viewport.aspect_ratio.parse::<AspectRatio>()?;
        if !(self.viewport.default_width > 0.0) {
            return Err(PhyvisionError::config(format!(
                "viewport.default_width must be positive, got {}",
                self.viewport.default_width
            )));
        }
        if !(self.clustering.threshold_px >= 0.0) {
            return Err(PhyvisionError::config(format!(
                "clustering.threshold_px must be non-negative, got {}",
                self.clustering.threshold_px
            )));
        }
        if !(self.vision.radius_px >= 0.0) {
            return Err(PhyvisionError::config(format!(
                "vision.radius_px must be non-negative, got {}",
                self.vision.radius_px
            )));
        }
        parse_hex_color(&self.vision.marker_color)?;
        Ok(())
    }

    /// Parsed default aspect ratio.
    pub fn aspect_ratio(&self) -> PhyvisionResult<AspectRatio> {
        self.viewport.aspect_ratio.parse()
    }

    /// Marker color as a packed `0xRRGGBB` value.
    pub fn marker_rgb(&self) -> PhyvisionResult<u32> {
        parse_hex_color(&self.vision.marker_color)
    }
}

/// A `W:H` aspect ratio with both sides positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatio {
    pub width: f64,
    pub height: f64,
}

impl AspectRatio {
    /// Height matching `width` at this ratio.
    pub fn height_for(&self, width: f64) -> f64 {
        width * (self.height / self.width)
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self {
            width: 16.0,
            height: 9.0,
        }
    }
}

impl FromStr for AspectRatio {
    type Err = PhyvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PhyvisionError::config(format!("invalid aspect ratio {s:?}, expected W:H"));

        let (w, h) = s.split_once(':').ok_or_else(invalid)?;
        let width: f64 = w.trim().parse().map_err(|_| invalid())?;
        let height: f64 = h.trim().parse().map_err(|_| invalid())?;

        if !(width > 0.0 && height > 0.0) || !width.is_finite() || !height.is_finite() {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Parse `#rrggbb` (leading `#` optional) into `0xRRGGBB`.
pub fn parse_hex_color(s: &str) -> PhyvisionResult<u32> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return Err(PhyvisionError::config(format!(
            "invalid color {s:?}, expected #rrggbb"
        )));
    }
    u32::from_str_radix(hex, 16)
        .map_err(|_| PhyvisionError::config(format!("invalid color {s:?}, expected #rrggbb")))
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("phyvision").join("config.json")
}

/// Default state root; the scene store lays out `scenes/` beneath it.
fn default_state_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("phyvision")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert!(!config.feed.enabled);
        assert_eq!(config.feed.url, "ws://localhost:8080");
        assert_eq!(config.feed.reconnect_delay_ms, 5000);
        assert_eq!(config.marker_rgb().unwrap(), 0xff0000);
    }

    #[test]
    fn test_default_state_dir_is_app_root() {
        let dir = AppConfig::default().state_dir;
        assert_eq!(dir.file_name().and_then(|n| n.to_str()), Some("phyvision"));
    }

    #[test]
    fn test_aspect_ratio_parse() {
        let ratio: AspectRatio = "16:9".parse().unwrap();
        assert!((ratio.height_for(1920.0) - 1080.0).abs() < 1e-9);

        let square: AspectRatio = " 4 : 4 ".parse().unwrap();
        assert_eq!(square.height_for(100.0), 100.0);

        assert!("16x9".parse::<AspectRatio>().is_err());
        assert!("0:9".parse::<AspectRatio>().is_err());
        assert!("16:-1".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_hex_color() {
        assert_eq!(parse_hex_color("#00ff00").unwrap(), 0x00ff00);
        assert_eq!(parse_hex_color("abcdef").unwrap(), 0xabcdef);
        assert!(parse_hex_color("#fff").is_err());
        assert!(parse_hex_color("#gggggg").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.viewport.aspect_ratio = "wide".to_string();
        assert!(matches!(
            config.validate(),
            Err(PhyvisionError::Config { .. })
        ));

        let mut config = AppConfig::default();
        config.clustering.threshold_px = -1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.viewport.default_width = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "feed": { "enabled": true }, "clustering": { "threshold_px": 42.0 } }"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.feed.enabled);
        assert_eq!(config.feed.url, "ws://localhost:8080");
        assert_eq!(config.clustering.threshold_px, 42.0);
        assert_eq!(config.viewport.aspect_ratio, "16:9");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.vision.marker_color = "#123456".to_string();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.vision.marker_color, "#123456");
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_from(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PhyvisionError::FileNotFound { .. }));
    }
}
