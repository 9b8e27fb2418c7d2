//! Channel message types and their wire form.
//!
//! Sync commands travel as `{"type": ..., "payload": {...}, "targetId": ...}`.
//! The centroid broadcast uses a separate shape,
//! `{"action": "updateCentroids", "centroids": [...]}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use phyvision_scene_model::geometry::Centroid;

use crate::ProtocolError;

/// Where an observer's view should be centered, and at what zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTarget {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

/// A sync command.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// Animate the observer's view to a target in the same scene.
    Pan(ViewTarget),

    /// Switch to `scene_id` if needed, then snap the view to the target.
    FullSync { target: ViewTarget, scene_id: String },

    /// Enable or disable observer mode on the consumer `observer_id`.
    SetObserver { observer_id: String, enabled: bool },

    /// Lock or unlock the observer's own view controls.
    Lock { locked: bool },

    /// Observer reporting its visible area to the producer.
    Viewport {
        observer_id: String,
        width: f64,
        height: f64,
    },
}

impl SyncMessage {
    /// Wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Pan(_) => "PAN",
            SyncMessage::FullSync { .. } => "FULL_SYNC",
            SyncMessage::SetObserver { .. } => "SET_OBSERVER",
            SyncMessage::Lock { .. } => "LOCK",
            SyncMessage::Viewport { .. } => "VIEWPORT",
        }
    }
}

/// A sync command plus its optional recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message: SyncMessage,
    /// `None` broadcasts to every consumer.
    pub target_id: Option<String>,
}

impl Envelope {
    pub fn broadcast(message: SyncMessage) -> Self {
        Self {
            message,
            target_id: None,
        }
    }

    pub fn to(target_id: impl Into<String>, message: SyncMessage) -> Self {
        Self {
            message,
            target_id: Some(target_id.into()),
        }
    }

    /// Whether a participant named `identity` should act on this envelope.
    pub fn is_for(&self, identity: &str) -> bool {
        self.target_id.as_deref().map_or(true, |t| t == identity)
    }
}

/// Anything that can travel on the sync channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Sync(Envelope),
    CentroidUpdate(Vec<Centroid>),
}

impl ChannelMessage {
    /// Encode to the JSON wire form.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let text = match self {
            ChannelMessage::Sync(envelope) => {
                serde_json::to_string(&WireEnvelope::from_envelope(envelope)?)?
            }
            ChannelMessage::CentroidUpdate(centroids) => serde_json::to_string(&WireAction {
                action: UPDATE_CENTROIDS.to_string(),
                centroids: Some(centroids.clone()),
            })?,
        };
        Ok(text)
    }

    /// Decode from the JSON wire form.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("action").is_some() {
            let action: WireAction = serde_json::from_value(value)?;
            if action.action != UPDATE_CENTROIDS {
                return Err(ProtocolError::UnknownType {
                    kind: action.action,
                });
            }
            let centroids = action.centroids.ok_or_else(|| ProtocolError::Malformed {
                message: "updateCentroids without centroids".to_string(),
            })?;
            if centroids.iter().any(|c| c.size == 0) {
                return Err(ProtocolError::Malformed {
                    message: "centroid with no members".to_string(),
                });
            }
            return Ok(ChannelMessage::CentroidUpdate(centroids));
        }

        let wire: WireEnvelope = serde_json::from_value(value)?;
        Ok(ChannelMessage::Sync(wire.into_envelope()?))
    }
}

const UPDATE_CENTROIDS: &str = "updateCentroids";

#[derive(Serialize, Deserialize)]
struct WireAction {
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    centroids: Option<Vec<Centroid>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullSyncPayload {
    #[serde(flatten)]
    target: ViewTarget,
    scene_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetObserverPayload {
    observer_id: String,
    enabled: bool,
}

#[derive(Serialize, Deserialize)]
struct LockPayload {
    locked: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewportPayload {
    observer_id: String,
    width: f64,
    height: f64,
}

impl WireEnvelope {
    fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let payload = match &envelope.message {
            SyncMessage::Pan(target) => serde_json::to_value(target)?,
            SyncMessage::FullSync { target, scene_id } => serde_json::to_value(FullSyncPayload {
                target: *target,
                scene_id: scene_id.clone(),
            })?,
            SyncMessage::SetObserver {
                observer_id,
                enabled,
            } => serde_json::to_value(SetObserverPayload {
                observer_id: observer_id.clone(),
                enabled: *enabled,
            })?,
            SyncMessage::Lock { locked } => serde_json::to_value(LockPayload { locked: *locked })?,
            SyncMessage::Viewport {
                observer_id,
                width,
                height,
            } => serde_json::to_value(ViewportPayload {
                observer_id: observer_id.clone(),
                width: *width,
                height: *height,
            })?,
        };

        Ok(Self {
            kind: envelope.message.kind().to_string(),
            payload,
            target_id: envelope.target_id.clone(),
        })
    }

    fn into_envelope(self) -> Result<Envelope, ProtocolError> {
        let message = match self.kind.as_str() {
            "PAN" => SyncMessage::Pan(serde_json::from_value(self.payload)?),
            "FULL_SYNC" => {
                let p: FullSyncPayload = serde_json::from_value(self.payload)?;
                SyncMessage::FullSync {
                    target: p.target,
                    scene_id: p.scene_id,
                }
            }
            "SET_OBSERVER" => {
                let p: SetObserverPayload = serde_json::from_value(self.payload)?;
                SyncMessage::SetObserver {
                    observer_id: p.observer_id,
                    enabled: p.enabled,
                }
            }
            "LOCK" => {
                let p: LockPayload = serde_json::from_value(self.payload)?;
                SyncMessage::Lock { locked: p.locked }
            }
            "VIEWPORT" => {
                let p: ViewportPayload = serde_json::from_value(self.payload)?;
                SyncMessage::Viewport {
                    observer_id: p.observer_id,
                    width: p.width,
                    height: p.height,
                }
            }
            _ => return Err(ProtocolError::UnknownType { kind: self.kind }),
        };

        Ok(Envelope {
            message,
            target_id: self.target_id.filter(|t| !t.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(message: &ChannelMessage) -> Value {
        serde_json::from_str(&message.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_pan_wire_shape() {
        let msg = ChannelMessage::Sync(Envelope::to(
            "user-2",
            SyncMessage::Pan(ViewTarget {
                x: 960.0,
                y: 540.0,
                scale: 1.0,
            }),
        ));
        assert_eq!(
            wire(&msg),
            json!({"type": "PAN", "payload": {"x": 960.0, "y": 540.0, "scale": 1.0}, "targetId": "user-2"})
        );
    }

    #[test]
    fn test_full_sync_payload_is_flat() {
        let msg = ChannelMessage::Sync(Envelope::to(
            "user-2",
            SyncMessage::FullSync {
                target: ViewTarget {
                    x: 1.0,
                    y: 2.0,
                    scale: 0.5,
                },
                scene_id: "scene-a".to_string(),
            },
        ));
        let value = wire(&msg);
        assert_eq!(value["type"], "FULL_SYNC");
        assert_eq!(value["payload"]["sceneId"], "scene-a");
        assert_eq!(value["payload"]["scale"], 0.5);
    }

    #[test]
    fn test_broadcast_omits_target() {
        let msg = ChannelMessage::Sync(Envelope::broadcast(SyncMessage::Lock { locked: true }));
        let value = wire(&msg);
        assert!(value.get("targetId").is_none());
        assert_eq!(value["payload"], json!({"locked": true}));
    }

    #[test]
    fn test_centroid_update_shape() {
        let msg = ChannelMessage::CentroidUpdate(vec![Centroid {
            x: 5.0,
            y: 6.0,
            size: 3,
        }]);
        assert_eq!(
            wire(&msg),
            json!({"action": "updateCentroids", "centroids": [{"x": 5.0, "y": 6.0, "size": 3}]})
        );
    }

    #[test]
    fn test_decodes_set_observer_from_host_json() {
        let text = r#"{"type":"SET_OBSERVER","payload":{"observerId":"u1","enabled":false},"targetId":"u1"}"#;
        let decoded = ChannelMessage::decode(text).unwrap();
        assert_eq!(
            decoded,
            ChannelMessage::Sync(Envelope::to(
                "u1",
                SyncMessage::SetObserver {
                    observer_id: "u1".to_string(),
                    enabled: false
                }
            ))
        );
    }

    #[test]
    fn test_null_or_empty_target_means_broadcast() {
        for text in [
            r#"{"type":"LOCK","payload":{"locked":true},"targetId":null}"#,
            r#"{"type":"LOCK","payload":{"locked":true},"targetId":""}"#,
        ] {
            match ChannelMessage::decode(text).unwrap() {
                ChannelMessage::Sync(env) => assert!(env.target_id.is_none()),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let err = ChannelMessage::decode(r#"{"type":"ZOOM","payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType { kind } if kind == "ZOOM"));

        let err = ChannelMessage::decode(r#"{"action":"explode"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType { .. }));
    }

    #[test]
    fn test_bad_payload_is_malformed() {
        let err = ChannelMessage::decode(r#"{"type":"PAN","payload":{"x":"left"}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
        assert!(matches!(
            ChannelMessage::decode("[1,2"),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn test_empty_centroid_is_malformed() {
        let text = r#"{"action":"updateCentroids","centroids":[{"x":1.0,"y":1.0,"size":2},{"x":3.0,"y":3.0,"size":0}]}"#;
        assert!(matches!(
            ChannelMessage::decode(text),
            Err(ProtocolError::Malformed { .. })
        ));

        let empty_set = r#"{"action":"updateCentroids","centroids":[]}"#;
        assert_eq!(
            ChannelMessage::decode(empty_set).unwrap(),
            ChannelMessage::CentroidUpdate(vec![])
        );
    }

    #[test]
    fn test_is_for() {
        let targeted = Envelope::to("a", SyncMessage::Lock { locked: false });
        assert!(targeted.is_for("a"));
        assert!(!targeted.is_for("b"));
        assert!(Envelope::broadcast(SyncMessage::Lock { locked: false }).is_for("b"));
    }
}
