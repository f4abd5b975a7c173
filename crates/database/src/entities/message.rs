//! Message entity definitions

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sender id reserved for engine-authored messages.
pub const SYSTEM_SENDER_ID: &str = "system";
pub const SYSTEM_SENDER_NAME: &str = "System";
/// Body stored in place of the original text once a message is deleted.
pub const DELETED_BODY: &str = "[Message deleted]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    System,
    CallStart,
    CallEnd,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::System => "system",
            MessageKind::CallStart => "call_start",
            MessageKind::CallEnd => "call_end",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageKind::Text),
            "system" => Some(MessageKind::System),
            "call_start" => Some(MessageKind::CallStart),
            "call_end" => Some(MessageKind::CallEnd),
            _ => None,
        }
    }
}

/// Lifecycle of a message body. Deletion is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MessageState {
    Original,
    Edited { at: DateTime<Utc> },
    Deleted { at: DateTime<Utc> },
}

impl MessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::Original => "original",
            MessageState::Edited { .. } => "edited",
            MessageState::Deleted { .. } => "deleted",
        }
    }

    pub fn changed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            MessageState::Original => None,
            MessageState::Edited { at } | MessageState::Deleted { at } => Some(*at),
        }
    }

    pub fn from_parts(state: &str, changed_at: Option<DateTime<Utc>>) -> Option<Self> {
        match (state, changed_at) {
            ("original", _) => Some(MessageState::Original),
            ("edited", Some(at)) => Some(MessageState::Edited { at }),
            ("deleted", Some(at)) => Some(MessageState::Deleted { at }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub body: String,
    pub kind: MessageKind,
    pub state: MessageState,
    pub parent_id: Option<String>,
    pub reply_count: i64,
    pub call_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_edited(&self) -> bool {
        matches!(self.state, MessageState::Edited { .. })
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.state, MessageState::Deleted { .. })
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub body: String,
    pub kind: MessageKind,
    pub parent_id: Option<String>,
    pub call_data: Option<String>,
    pub created_at: DateTime<Utc>,
}
