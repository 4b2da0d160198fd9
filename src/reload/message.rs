//! Hot Update Message Protocol
//!
//! Defines the JSON message format delivered to development clients over
//! whatever persistent transport the host provides (the bundled server uses
//! WebSocket).
//!
//! # Message Types
//!
//! - `connected`: sent once per new connection
//! - `update`: ordered list of module swaps, dependency-before-dependent
//! - `full-reload`: discard all in-memory state and restart
//! - `error`: surface an internal fault to the client
//! - `custom`: out-of-band notification

use serde::{Deserialize, Serialize};

use crate::graph::ModuleKind;

/// A single module swap inside an `update` message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntry {
    /// Resolved module path the client should re-fetch
    pub path: String,
    /// Module kind tag (`component`, `store`, `style`, `asset`, `module`)
    pub module_kind: ModuleKind,
    /// Milliseconds since the Unix epoch, cache-busting token
    pub timestamp: u64,
}

/// Payload of a `custom` message: an event name plus free-form fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomPayload {
    pub event: String,
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Hot update message sent to every development client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UpdateMessage {
    /// Connection established
    Connected,

    /// Surgical update: swap these modules in place, in listed order
    Update { updates: Vec<UpdateEntry> },

    /// Fallback: reload the page/process
    FullReload,

    /// Internal fault surfaced to the client
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },

    /// Out-of-band notification, independent of file changes
    Custom { data: CustomPayload },
}

impl UpdateMessage {
    pub fn update(updates: Vec<UpdateEntry>) -> Self {
        Self::Update { updates }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            stack: None,
        }
    }

    /// Build a `custom` message. An object payload is flattened into the
    /// `data` envelope next to `event`; any other JSON value is nested
    /// under a `data` key.
    pub fn custom(event: impl Into<String>, data: serde_json::Value) -> Self {
        let data = match data {
            serde_json::Value::Object(map) => CustomPayload {
                event: event.into(),
                data: map,
            },
            serde_json::Value::Null => CustomPayload {
                event: event.into(),
                data: serde_json::Map::new(),
            },
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                CustomPayload {
                    event: event.into(),
                    data: map,
                }
            }
        };
        Self::Custom { data }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"full-reload"}"#.to_string())
    }

    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags() {
        assert_eq!(UpdateMessage::Connected.to_json(), r#"{"type":"connected"}"#);
        assert_eq!(UpdateMessage::FullReload.to_json(), r#"{"type":"full-reload"}"#);
    }

    #[test]
    fn test_update_serialization() {
        let msg = UpdateMessage::update(vec![UpdateEntry {
            path: "/src/counter.jsx".to_string(),
            module_kind: ModuleKind::Component,
            timestamp: 1700000000123,
        }]);

        let json = msg.to_json();
        assert!(json.contains(r#""type":"update""#));
        assert!(json.contains(r#""path":"/src/counter.jsx""#));
        assert!(json.contains(r#""moduleKind":"component""#));
        assert!(json.contains(r#""timestamp":1700000000123"#));

        let parsed = UpdateMessage::from_json(&json).unwrap();
        match parsed {
            UpdateMessage::Update { updates } => {
                assert_eq!(updates.len(), 1);
                assert_eq!(updates[0].module_kind, ModuleKind::Component);
            }
            _ => panic!("expected update message"),
        }
    }

    #[test]
    fn test_error_omits_empty_stack() {
        let json = UpdateMessage::error("graph corrupted").to_json();
        assert!(json.contains(r#""message":"graph corrupted""#));
        assert!(!json.contains("stack"));
    }

    #[test]
    fn test_custom_flattens_object_payload() {
        let msg = UpdateMessage::custom(
            "devtools:highlight",
            serde_json::json!({ "selector": "#app" }),
        );
        let json = msg.to_json();
        assert!(json.contains(r#""type":"custom""#));
        assert!(json.contains(r#""event":"devtools:highlight""#));
        assert!(json.contains(r##""selector":"#app""##));
    }

    #[test]
    fn test_custom_wraps_scalar_payload() {
        let msg = UpdateMessage::custom("ping", serde_json::json!(42));
        let json = msg.to_json();
        assert!(json.contains(r#""event":"ping""#));
        assert!(json.contains(r#""data":42"#));
    }
}
