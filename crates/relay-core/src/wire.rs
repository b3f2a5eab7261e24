//! JSON wire protocol shared by clients and the relay.
//!
//! Every frame is one JSON object carrying a `type` discriminator. Client and
//! server frames are modelled separately because the `presence` type is
//! asymmetric: a client sends `{"type":"presence","sender":..}` to claim a
//! display name, while the server pushes `{"type":"presence","users":[..]}`
//! with the full member list. Both shapes are part of the protocol as deployed
//! and must stay wire-compatible.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::WireError;

/// One encoded outbound frame. Cheap to clone across many recipients.
pub type Frame = Arc<str>;

/// A chat message as broadcast and persisted.
///
/// `id` stays `None` until the store assigns one; it is omitted from the JSON
/// in that case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub sender: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            sender: sender.into(),
            content: content.into(),
            timestamp,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// Typing indicator. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub is_typing: bool,
}

/// Current member list, derived from the hub registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub users: Vec<String>,
}

impl PresenceSnapshot {
    /// Build a snapshot from display names. Empty names are skipped, duplicates
    /// collapse, and the result is sorted so two snapshots of the same registry
    /// serialize identically.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let users: BTreeSet<String> = names
            .into_iter()
            .filter(|n| !n.as_ref().is_empty())
            .map(|n| n.as_ref().to_owned())
            .collect();
        Self {
            users: users.into_iter().collect(),
        }
    }
}

/// Frames accepted from a client.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "chat")]
    Chat {
        #[serde(default)]
        sender: String,
        #[serde(default)]
        content: String,
    },

    #[serde(rename = "typing")]
    Typing(TypingEvent),

    /// Display-name registration. Only `sender` is meaningful here.
    #[serde(rename = "presence")]
    Presence {
        #[serde(default)]
        sender: String,
    },
}

impl ClientFrame {
    pub fn decode(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Decode)
    }
}

/// Frames pushed by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "chat")]
    Chat(ChatMessage),

    #[serde(rename = "typing")]
    Typing(TypingEvent),

    #[serde(rename = "presence")]
    Presence(PresenceSnapshot),
}

impl ServerFrame {
    pub fn encode(&self) -> Result<Frame, WireError> {
        let json = serde_json::to_string(self).map_err(WireError::Encode)?;
        Ok(Frame::from(json))
    }

    pub fn decode(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn decode_chat() {
        let frame = ClientFrame::decode(r#"{"type":"chat","sender":"ana","content":"hi"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Chat {
                sender: "ana".into(),
                content: "hi".into()
            }
        );
    }

    #[test]
    fn decode_chat_ignores_client_supplied_id_and_timestamp() {
        let frame = ClientFrame::decode(
            r#"{"type":"chat","sender":"ana","content":"hi","id":99,"timestamp":"garbage"}"#,
        )
        .unwrap();
        assert!(matches!(frame, ClientFrame::Chat { .. }));
    }

    #[test]
    fn decode_typing() {
        let frame = ClientFrame::decode(r#"{"type":"typing","sender":"bo","is_typing":true}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Typing(TypingEvent {
                sender: "bo".into(),
                is_typing: true
            })
        );
    }

    #[test]
    fn decode_presence_registration() {
        let frame = ClientFrame::decode(r#"{"type":"presence","sender":"cy"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Presence { sender: "cy".into() });
    }

    #[test]
    fn decode_unknown_type_fails() {
        assert!(ClientFrame::decode(r#"{"type":"shout","sender":"x"}"#).is_err());
    }

    #[test]
    fn decode_missing_type_fails() {
        assert!(ClientFrame::decode(r#"{"sender":"x","content":"y"}"#).is_err());
    }

    #[test]
    fn decode_non_json_fails() {
        let err = ClientFrame::decode("hello there").unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));
    }

    #[test]
    fn unpersisted_chat_omits_id() {
        let frame = ServerFrame::Chat(ChatMessage::new("ana", "hi", ts()));
        let json: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "chat");
        assert_eq!(json["sender"], "ana");
        assert_eq!(json["content"], "hi");
        assert!(json.get("id").is_none());
        assert!(json["timestamp"].as_str().unwrap().starts_with("2026-03-01T12:00:00"));
    }

    #[test]
    fn persisted_chat_carries_id() {
        let mut msg = ChatMessage::new("ana", "hi", ts());
        msg.id = Some(7);
        assert!(msg.is_persisted());
        let json: serde_json::Value =
            serde_json::from_str(&ServerFrame::Chat(msg).encode().unwrap()).unwrap();
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn empty_content_is_omitted() {
        let frame = ServerFrame::Chat(ChatMessage::new("ana", "", ts()));
        let json: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert!(json.get("content").is_none());
    }

    #[test]
    fn presence_frame_shape() {
        let frame = ServerFrame::Presence(PresenceSnapshot::from_names(["bo", "ana"]));
        let json: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "presence", "users": ["ana", "bo"]}));
    }

    #[test]
    fn empty_presence_serializes_empty_list() {
        let frame = ServerFrame::Presence(PresenceSnapshot::default());
        assert_eq!(&*frame.encode().unwrap(), r#"{"type":"presence","users":[]}"#);
    }

    #[test]
    fn snapshot_skips_unnamed_and_dedupes() {
        let snap = PresenceSnapshot::from_names(["cy", "", "ana", "cy"]);
        assert_eq!(snap.users, vec!["ana".to_string(), "cy".to_string()]);
    }

    #[test]
    fn server_chat_decodes_back() {
        let mut msg = ChatMessage::new("ana", "hi", ts());
        msg.id = Some(3);
        let encoded = ServerFrame::Chat(msg.clone()).encode().unwrap();
        assert_eq!(ServerFrame::decode(&encoded).unwrap(), ServerFrame::Chat(msg));
    }
}
