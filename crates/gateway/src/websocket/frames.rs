//! Inbound frame format.
//!
//! Every text frame carries its own bearer token next to a `type`-tagged
//! command, e.g. `{"token": "...", "type": "join_room", "room_id": "r1"}`.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(flatten)]
    pub command: ClientCommand,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    SendMessage {
        room_id: String,
        text: String,
        #[serde(default)]
        parent_id: Option<String>,
    },
    EditMessage {
        message_id: String,
        text: String,
    },
    DeleteMessage {
        message_id: String,
    },
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    Typing {
        room_id: String,
        #[serde(default = "typing_default")]
        is_typing: bool,
    },
    StartVideoCall {
        room_id: String,
        video_room_id: String,
        #[serde(default)]
        call_data: Option<String>,
    },
    EndVideoCall {
        room_id: String,
        #[serde(default)]
        call_data: Option<String>,
    },
    Ping,
}

fn typing_default() -> bool {
    true
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::SendMessage { .. } => "send_message",
            ClientCommand::EditMessage { .. } => "edit_message",
            ClientCommand::DeleteMessage { .. } => "delete_message",
            ClientCommand::JoinRoom { .. } => "join_room",
            ClientCommand::LeaveRoom { .. } => "leave_room",
            ClientCommand::Typing { .. } => "typing",
            ClientCommand::StartVideoCall { .. } => "start_video_call",
            ClientCommand::EndVideoCall { .. } => "end_video_call",
            ClientCommand::Ping => "ping",
        }
    }
}

/// `None` for anything that is not a well-formed frame.
pub fn parse_frame(text: &str) -> Option<ClientFrame> {
    serde_json::from_str(text).ok()
}
