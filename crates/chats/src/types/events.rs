//! Events pushed to connected clients.

use parley_database::Message;
use serde::Serialize;
use std::fmt;

/// Broadcast destinations. Each room fans out over five topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Room(String),
    Typing(String),
    Edits(String),
    Deletes(String),
    Video(String),
}

impl Topic {
    pub fn all_for_room(room_id: &str) -> [Topic; 5] {
        [
            Topic::Room(room_id.to_string()),
            Topic::Typing(room_id.to_string()),
            Topic::Edits(room_id.to_string()),
            Topic::Deletes(room_id.to_string()),
            Topic::Video(room_id.to_string()),
        ]
    }

    pub fn room_id(&self) -> &str {
        match self {
            Topic::Room(id)
            | Topic::Typing(id)
            | Topic::Edits(id)
            | Topic::Deletes(id)
            | Topic::Video(id) => id,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Room(id) => write!(f, "room/{id}"),
            Topic::Typing(id) => write!(f, "room/{id}/typing"),
            Topic::Edits(id) => write!(f, "room/{id}/edit"),
            Topic::Deletes(id) => write!(f, "room/{id}/delete"),
            Topic::Video(id) => write!(f, "room/{id}/video"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    MessageCreated {
        room_id: String,
        message: Message,
    },
    MessageEdited {
        room_id: String,
        message: Message,
    },
    MessageDeleted {
        room_id: String,
        message_id: String,
        deleted_by: String,
    },
    Typing {
        room_id: String,
        user_id: String,
        display_name: String,
        is_typing: bool,
    },
    VideoCallStarted {
        room_id: String,
        video_room_id: String,
        started_by: String,
        message: Message,
    },
    VideoCallEnded {
        room_id: String,
        ended_by: String,
        message: Message,
    },
    MemberJoined {
        room_id: String,
        user_id: String,
    },
    MemberLeft {
        room_id: String,
        user_id: String,
    },
    RoomDeactivated {
        room_id: String,
    },
    /// Private acknowledgement of a subscription.
    RoomJoined {
        room_id: String,
        status: &'static str,
    },
    RoomLeft {
        room_id: String,
    },
    WorkspaceJoined {
        workspace_id: String,
        room_ids: Vec<String>,
    },
    Error {
        error: String,
    },
    Pong,
}

impl ChatEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ChatEvent::Error {
            error: message.into(),
        }
    }

    pub fn room_joined(room_id: impl Into<String>) -> Self {
        ChatEvent::RoomJoined {
            room_id: room_id.into(),
            status: "joined",
        }
    }

    /// Topic an event is broadcast on; `None` for private-queue events.
    pub fn topic(&self) -> Option<Topic> {
        match self {
            ChatEvent::MessageCreated { room_id, .. }
            | ChatEvent::MemberJoined { room_id, .. }
            | ChatEvent::MemberLeft { room_id, .. }
            | ChatEvent::RoomDeactivated { room_id } => Some(Topic::Room(room_id.clone())),
            ChatEvent::MessageEdited { room_id, .. } => Some(Topic::Edits(room_id.clone())),
            ChatEvent::MessageDeleted { room_id, .. } => Some(Topic::Deletes(room_id.clone())),
            ChatEvent::Typing { room_id, .. } => Some(Topic::Typing(room_id.clone())),
            ChatEvent::VideoCallStarted { room_id, .. } | ChatEvent::VideoCallEnded { room_id, .. } => {
                Some(Topic::Video(room_id.clone()))
            }
            ChatEvent::RoomJoined { .. }
            | ChatEvent::RoomLeft { .. }
            | ChatEvent::WorkspaceJoined { .. }
            | ChatEvent::Error { .. }
            | ChatEvent::Pong => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_render_as_paths() {
        let topics: Vec<String> = Topic::all_for_room("r1").iter().map(ToString::to_string).collect();
        assert_eq!(
            topics,
            vec!["room/r1", "room/r1/typing", "room/r1/edit", "room/r1/delete", "room/r1/video"]
        );
    }

    #[test]
    fn private_events_have_no_topic() {
        assert!(ChatEvent::error("boom").topic().is_none());
        assert!(ChatEvent::room_joined("r1").topic().is_none());
        assert_eq!(
            ChatEvent::RoomDeactivated { room_id: "r1".into() }.topic(),
            Some(Topic::Room("r1".into()))
        );
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(ChatEvent::room_joined("r1")).unwrap();
        assert_eq!(json["type"], "room_joined");
        assert_eq!(json["status"], "joined");

        let json = serde_json::to_value(ChatEvent::error("nope")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "error": "nope"}));
    }
}
