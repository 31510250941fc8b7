//! Realtime protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire. A
//! realtime connection opens with `ClientMessage::Join`; the server answers
//! with `Welcome` or `Rejected` and then streams `Event`s for that
//! conference. A control connection sends `Control` frames only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::control::{ControlCommand, ControlReply};

/// Messages sent by a realtime client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach to a conference; must be the first frame
    Join {
        conference_code: String,
        /// Verified user id; absent for guests
        #[serde(default)]
        user_id: Option<Uuid>,
        /// Mandatory for guests
        #[serde(default)]
        display_name: Option<String>,
        /// Reattach to an existing roster entry
        #[serde(default)]
        participant_id: Option<Uuid>,
    },

    /// Chat line for everyone in the conference
    Chat { content: String },

    /// Ask for a translation to be relayed; languages default to the
    /// conference's pair
    Translate {
        text: String,
        #[serde(default)]
        source_language: Option<String>,
        #[serde(default)]
        target_language: Option<String>,
    },

    /// Leave the roster before disconnecting
    Leave,

    Ping,

    /// Lifecycle or moderation request on behalf of `actor`
    Control {
        actor: Uuid,
        command: ControlCommand,
    },
}

/// Messages sent by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted
    Welcome {
        conference_id: Uuid,
        connection_id: Uuid,
        participant_id: Uuid,
        display_name: String,
        language_from: String,
        language_to: String,
    },

    /// Join refused; the connection is closed afterwards
    Rejected { reason: String },

    /// A fanned-out conference event
    Event(RealtimeEvent),

    Pong,

    /// Control request succeeded
    Reply { reply: ControlReply },

    /// Control request failed; `kind` is stable, `message` is for humans
    Failed { kind: String, message: String },

    /// Server is shutting down
    ServerShutdown,
}

/// Display identity of the participant an event originates from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub participant_id: Uuid,
    pub display_name: String,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    ParticipantJoined,
    ParticipantLeft,
    ChatMessage {
        content: String,
    },
    TranslationResult {
        original: String,
        translated: String,
        source_language: String,
        target_language: String,
    },
}

impl EventPayload {
    /// Whether the originating connection is left out of the fanout
    pub fn suppresses_echo(&self) -> bool {
        matches!(self, EventPayload::ParticipantJoined)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::ParticipantJoined => "participant_joined",
            EventPayload::ParticipantLeft => "participant_left",
            EventPayload::ChatMessage { .. } => "chat_message",
            EventPayload::TranslationResult { .. } => "translation_result",
        }
    }
}

/// An event as delivered to every connection of a conference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub conference_id: Uuid,
    pub sender: SenderIdentity,
    #[serde(flatten)]
    pub payload: EventPayload,
    /// Assigned by the hub on receipt
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_defaults_optional_fields() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","conference_code":"abc-defg-hij"}"#).unwrap();
        match msg {
            ClientMessage::Join {
                conference_code,
                user_id,
                display_name,
                participant_id,
            } => {
                assert_eq!(conference_code, "abc-defg-hij");
                assert!(user_id.is_none());
                assert!(display_name.is_none());
                assert!(participant_id.is_none());
            }
            other => panic!("Wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_event_wire_shape() {
        let event = RealtimeEvent {
            conference_id: Uuid::new_v4(),
            sender: SenderIdentity {
                participant_id: Uuid::new_v4(),
                display_name: "Alex".into(),
            },
            payload: EventPayload::ChatMessage {
                content: "hi".into(),
            },
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(ServerMessage::Event(event.clone())).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["kind"], "chat_message");
        assert_eq!(value["content"], "hi");
        assert_eq!(value["sender"]["display_name"], "Alex");

        let decoded: ServerMessage = serde_json::from_value(value).unwrap();
        assert!(matches!(decoded, ServerMessage::Event(e) if e == event));
    }

    #[test]
    fn test_echo_suppression() {
        assert!(EventPayload::ParticipantJoined.suppresses_echo());
        assert!(!EventPayload::ParticipantLeft.suppresses_echo());
        assert!(!EventPayload::ChatMessage {
            content: String::new()
        }
        .suppresses_echo());
    }
}
