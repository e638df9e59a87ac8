//! Reliable control channel: session bootstrap messages.
//!
//! Messages are UTF-8 JSON objects discriminated by an `action` field.
//! Unknown actions are surfaced as [`ControlDecode::Unknown`] so the caller
//! can log and ignore them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lightcycle_sim::{Color, PlayerId};

use crate::WireError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlMessage {
    /// The sender's local player is ready.
    Commit { id: String },
    /// Master-chosen start instant, seconds since the UNIX epoch.
    Sync { time: f64 },
}

/// Result of decoding a control payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlDecode {
    Known(ControlMessage),
    Unknown { action: String },
}

impl ControlMessage {
    pub fn commit(id: &PlayerId) -> Self {
        Self::Commit {
            id: id.as_str().to_string(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<ControlDecode, WireError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or(WireError::MissingAction)?;

        match action {
            "commit" | "sync" => Ok(ControlDecode::Known(serde_json::from_value(value)?)),
            other => Ok(ControlDecode::Unknown {
                action: other.to_string(),
            }),
        }
    }
}

/// Discovery payload each peer advertises when it joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    pub color: Color,
}

impl PeerInfo {
    pub fn new(id: &PlayerId, color: Color) -> Self {
        Self {
            id: id.as_str().to_string(),
            color,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        PlayerId::from(self.id.as_str())
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_wire_shape() {
        let msg = ControlMessage::commit(&PlayerId::from("abc"));
        let json: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["action"], "commit");
        assert_eq!(json["id"], "abc");
    }

    #[test]
    fn test_sync_roundtrip() {
        let msg = ControlMessage::Sync {
            time: 1_700_000_000.25,
        };
        let decoded = ControlMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, ControlDecode::Known(msg));
    }

    #[test]
    fn test_unknown_action_is_not_an_error() {
        let decoded =
            ControlMessage::decode(br#"{"action": "move", "id": "x", "pos": [1, 2]}"#).unwrap();
        assert_eq!(
            decoded,
            ControlDecode::Unknown {
                action: "move".to_string()
            }
        );
    }

    #[test]
    fn test_missing_action_and_bad_json() {
        assert!(matches!(
            ControlMessage::decode(br#"{"id": "x"}"#),
            Err(WireError::MissingAction)
        ));
        assert!(matches!(
            ControlMessage::decode(b"not json"),
            Err(WireError::Json(_))
        ));
        assert!(matches!(
            ControlMessage::decode(br#"{"action": "sync"}"#),
            Err(WireError::Json(_))
        ));
    }

    #[test]
    fn test_peer_info_roundtrip() {
        let info = PeerInfo::new(&PlayerId::from("p1"), [0.0, 1.0, 1.0]);
        let decoded = PeerInfo::decode(&info.encode().unwrap()).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.player_id(), PlayerId::from("p1"));
    }
}
