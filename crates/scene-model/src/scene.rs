//! Persisted scene and world state.
//!
//! Each scene keeps its own frame, the observer's last reported viewport and
//! any manually placed points. World state holds values shared by every
//! scene, currently the selected observer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use phyvision_common::config::AspectRatio;
use phyvision_common::error::PhyvisionError;

use crate::geometry::{Frame, Point};

/// State persisted for one scene (`scenes/<id>.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRecord {
    /// Scene identifier supplied by the host.
    pub scene_id: String,

    /// Producer frame, absent until first resolved.
    #[serde(default)]
    pub frame: Option<Frame>,

    /// Last viewport reported by the observer for this scene.
    #[serde(default)]
    pub viewport: Option<Frame>,

    /// Points placed by hand, in scene pixels.
    #[serde(default)]
    pub manual_points: Vec<Point>,

    /// Last modified timestamp (RFC 3339).
    #[serde(default)]
    pub updated_at: String,
}

impl SceneRecord {
    pub fn new(scene_id: impl Into<String>) -> Self {
        Self {
            scene_id: scene_id.into(),
            ..Default::default()
        }
    }
}

/// State shared across scenes (`world.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldRecord {
    /// Consumer currently acting as observer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_observer_id: Option<String>,
}

/// Inputs for deriving a frame when a scene has none saved.
#[derive(Debug, Clone, Copy)]
pub struct FrameDefaults {
    pub width: f64,
    pub aspect: AspectRatio,
}

impl Default for FrameDefaults {
    fn default() -> Self {
        Self {
            width: 1920.0,
            aspect: AspectRatio::default(),
        }
    }
}

impl FrameDefaults {
    /// Default frame at the scene origin.
    pub fn frame(&self) -> Result<Frame, SceneError> {
        Frame::from_aspect(self.width, self.aspect).map_err(|e| SceneError::ValidationError {
            message: e.to_string(),
        })
    }
}

/// Persistence backend for scene and world state.
pub trait SceneStore: Send + Sync {
    /// Load a scene. A scene that was never saved yields an empty record.
    fn load_scene(&self, scene_id: &str) -> Result<SceneRecord, SceneError>;

    /// Save a scene record under its `scene_id`.
    fn save_scene(&self, record: &SceneRecord) -> Result<(), SceneError>;

    /// Load world state, empty if never saved.
    fn load_world(&self) -> Result<WorldRecord, SceneError>;

    /// Save world state.
    fn save_world(&self, record: &WorldRecord) -> Result<(), SceneError>;
}

impl<S: SceneStore + ?Sized> SceneStore for Arc<S> {
    fn load_scene(&self, scene_id: &str) -> Result<SceneRecord, SceneError> {
        (**self).load_scene(scene_id)
    }

    fn save_scene(&self, record: &SceneRecord) -> Result<(), SceneError> {
        (**self).save_scene(record)
    }

    fn load_world(&self) -> Result<WorldRecord, SceneError> {
        (**self).load_world()
    }

    fn save_world(&self, record: &WorldRecord) -> Result<(), SceneError> {
        (**self).save_world(record)
    }
}

/// Return the scene's saved frame, or derive, persist and return the default.
///
/// Once persisted, the derived frame stays stable until explicitly edited.
pub fn resolve_frame(
    store: &dyn SceneStore,
    scene_id: &str,
    defaults: &FrameDefaults,
) -> Result<Frame, SceneError> {
    let mut record = store.load_scene(scene_id)?;
    if let Some(frame) = record.frame {
        return Ok(frame);
    }

    let frame = defaults.frame()?;
    record.frame = Some(frame);
    store.save_scene(&record)?;
    tracing::debug!(scene = %scene_id, w = frame.w(), h = frame.h(), "Derived default frame");
    Ok(frame)
}

/// File-backed store writing pretty JSON under a root directory.
pub struct JsonSceneStore {
    root: PathBuf,
}

impl JsonSceneStore {
    /// Open a store rooted at `root`, creating the directory layout.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, SceneError> {
        let root = root.as_ref().to_path_buf();
        let scenes = root.join("scenes");
        std::fs::create_dir_all(&scenes).map_err(|e| SceneError::IoError {
            path: scenes,
            source: e,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scene_path(&self, scene_id: &str) -> Result<PathBuf, SceneError> {
        if scene_id.trim().is_empty() {
            return Err(SceneError::ValidationError {
                message: "scene id must not be empty".to_string(),
            });
        }
        Ok(self
            .root
            .join("scenes")
            .join(format!("{}.json", sanitize_file_stem(scene_id))))
    }

    fn world_path(&self) -> PathBuf {
        self.root.join("world.json")
    }
}

impl SceneStore for JsonSceneStore {
    fn load_scene(&self, scene_id: &str) -> Result<SceneRecord, SceneError> {
        let path = self.scene_path(scene_id)?;
        match read_json::<SceneRecord>(&path)? {
            Some(mut record) => {
                record.scene_id = scene_id.to_string();
                Ok(record)
            }
            None => Ok(SceneRecord::new(scene_id)),
        }
    }

    fn save_scene(&self, record: &SceneRecord) -> Result<(), SceneError> {
        let path = self.scene_path(&record.scene_id)?;
        let mut record = record.clone();
        record.updated_at = chrono::Utc::now().to_rfc3339();
        write_json(&path, &record)
    }

    fn load_world(&self) -> Result<WorldRecord, SceneError> {
        Ok(read_json(&self.world_path())?.unwrap_or_default())
    }

    fn save_world(&self, record: &WorldRecord) -> Result<(), SceneError> {
        write_json(&self.world_path(), record)
    }
}

/// In-process store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySceneStore {
    scenes: Mutex<HashMap<String, SceneRecord>>,
    world: Mutex<WorldRecord>,
}

impl MemorySceneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SceneStore for MemorySceneStore {
    fn load_scene(&self, scene_id: &str) -> Result<SceneRecord, SceneError> {
        let scenes = self.scenes.lock().map_err(|_| SceneError::Poisoned)?;
        Ok(scenes
            .get(scene_id)
            .cloned()
            .unwrap_or_else(|| SceneRecord::new(scene_id)))
    }

    fn save_scene(&self, record: &SceneRecord) -> Result<(), SceneError> {
        let mut scenes = self.scenes.lock().map_err(|_| SceneError::Poisoned)?;
        scenes.insert(record.scene_id.clone(), record.clone());
        Ok(())
    }

    fn load_world(&self) -> Result<WorldRecord, SceneError> {
        Ok(self
            .world
            .lock()
            .map_err(|_| SceneError::Poisoned)?
            .clone())
    }

    fn save_world(&self, record: &WorldRecord) -> Result<(), SceneError> {
        *self.world.lock().map_err(|_| SceneError::Poisoned)? = record.clone();
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, SceneError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| SceneError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| SceneError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SceneError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| SceneError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    std::fs::write(path, json).map_err(|e| SceneError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Host scene ids are opaque; keep them filesystem-safe.
///
/// Bytes outside `[A-Za-z0-9_-]` are percent-encoded, so distinct ids never
/// share a file.
fn sanitize_file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

/// Errors that can occur when loading or saving scene state.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid scene state: {message}")]
    ValidationError { message: String },

    #[error("Scene store lock poisoned")]
    Poisoned,
}

impl From<SceneError> for PhyvisionError {
    fn from(err: SceneError) -> Self {
        PhyvisionError::scene(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsaved_scene_is_empty() {
        let store = MemorySceneStore::new();
        let record = store.load_scene("tavern").unwrap();
        assert_eq!(record.scene_id, "tavern");
        assert!(record.frame.is_none());
        assert!(record.manual_points.is_empty());
    }

    #[test]
    fn test_resolve_frame_derives_and_persists_default() {
        let store = MemorySceneStore::new();
        let defaults = FrameDefaults {
            width: 1000.0,
            aspect: "4:3".parse().unwrap(),
        };

        let frame = resolve_frame(&store, "crypt", &defaults).unwrap();
        assert_eq!(frame.w(), 1000.0);
        assert!((frame.h() - 750.0).abs() < 1e-9);
        assert_eq!(store.load_scene("crypt").unwrap().frame, Some(frame));
    }

    #[test]
    fn test_resolve_frame_keeps_saved_frame() {
        let store = MemorySceneStore::new();
        let mut record = SceneRecord::new("crypt");
        let saved = Frame::new(5.0, 5.0, 300.0, 200.0).unwrap();
        record.frame = Some(saved);
        store.save_scene(&record).unwrap();

        let frame = resolve_frame(&store, "crypt", &FrameDefaults::default()).unwrap();
        assert_eq!(frame, saved);
    }

    #[test]
    fn test_json_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSceneStore::open(dir.path()).unwrap();

        let mut record = SceneRecord::new("Scene.abc/123");
        record.frame = Some(Frame::new(10.0, 20.0, 100.0, 50.0).unwrap());
        record.manual_points = vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0)];
        store.save_scene(&record).unwrap();

        let loaded = store.load_scene("Scene.abc/123").unwrap();
        assert_eq!(loaded.frame, record.frame);
        assert_eq!(loaded.manual_points, record.manual_points);
        assert!(!loaded.updated_at.is_empty());
        assert!(dir.path().join("scenes").join("Scene%2Eabc%2F123.json").exists());
    }

    #[test]
    fn test_json_store_keeps_similar_ids_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSceneStore::open(dir.path()).unwrap();

        let mut dotted = SceneRecord::new("Scene.a");
        dotted.frame = Some(Frame::new(1.0, 1.0, 10.0, 10.0).unwrap());
        dotted.manual_points = vec![Point::new(4.0, 4.0)];
        store.save_scene(&dotted).unwrap();

        let other = store.load_scene("Scene_a").unwrap();
        assert!(other.frame.is_none());
        assert!(other.manual_points.is_empty());
        assert_eq!(store.load_scene("Scene.a").unwrap().frame, dotted.frame);
    }

    #[test]
    fn test_file_stem_is_injective() {
        assert_eq!(sanitize_file_stem("Scene_a"), "Scene_a");
        assert_eq!(sanitize_file_stem("Scene.a"), "Scene%2Ea");
        assert_eq!(sanitize_file_stem("a%2Eb"), "a%252Eb");
        assert_eq!(sanitize_file_stem("é"), "%C3%A9");
    }

    #[test]
    fn test_json_store_world_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSceneStore::open(dir.path()).unwrap();
        assert_eq!(store.load_world().unwrap().selected_observer_id, None);

        store
            .save_world(&WorldRecord {
                selected_observer_id: Some("user-7".to_string()),
            })
            .unwrap();
        let content = std::fs::read_to_string(dir.path().join("world.json")).unwrap();
        assert!(content.contains("selectedObserverId"));
        assert_eq!(
            store.load_world().unwrap().selected_observer_id.as_deref(),
            Some("user-7")
        );
    }

    #[test]
    fn test_json_store_rejects_empty_scene_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSceneStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load_scene("  "),
            Err(SceneError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_json_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSceneStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("scenes").join("bad.json"), "{ nope").unwrap();
        assert!(matches!(
            store.load_scene("bad"),
            Err(SceneError::ParseError { .. })
        ));
    }

    #[test]
    fn test_legacy_record_without_optional_fields() {
        let json = r#"{ "sceneId": "old", "frame": { "x": 0, "y": 0, "w": 1920, "h": 1080 } }"#;
        let record: SceneRecord = serde_json::from_str(json).unwrap();
        assert!(record.viewport.is_none());
        assert!(record.manual_points.is_empty());
        assert_eq!(record.frame.unwrap().w(), 1920.0);
    }
}
