//! Error types shared across PhyVision crates.

use std::path::PathBuf;

/// Top-level error type for PhyVision operations.
#[derive(Debug, thiserror::Error)]
pub enum PhyvisionError {
    #[error("Feed error: {message}")]
    Feed { message: String },

    #[error("Sync error: {message}")]
    Sync { message: String },

    #[error("Scene error: {message}")]
    Scene { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid frame: {message}")]
    InvalidFrame { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PhyvisionError.
pub type PhyvisionResult<T> = Result<T, PhyvisionError>;

impl PhyvisionError {
    pub fn feed(msg: impl Into<String>) -> Self {
        Self::Feed {
            message: msg.into(),
        }
    }

    pub fn sync(msg: impl Into<String>) -> Self {
        Self::Sync {
            message: msg.into(),
        }
    }

    pub fn scene(msg: impl Into<String>) -> Self {
        Self::Scene {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: msg.into(),
        }
    }
}
