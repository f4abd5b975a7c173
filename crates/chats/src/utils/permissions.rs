//! Permission checking utilities.

use crate::types::{ChatError, ChatResult};
use parley_database::{Message, Room};
use tracing::debug;

pub struct PermissionChecker;

impl PermissionChecker {
    pub fn require_room_admin(room: &Room, user_id: &str, action: &'static str) -> ChatResult<()> {
        if room.admin_id != user_id {
            debug!(room_id = %room.id, user_id, action, "rejected non-admin room action");
            return Err(ChatError::NotRoomAdmin { action });
        }
        Ok(())
    }

    pub fn require_active(room: &Room) -> ChatResult<()> {
        if !room.is_active() {
            return Err(ChatError::RoomInactive {
                id: room.id.clone(),
            });
        }
        Ok(())
    }

    /// Deleted messages are immutable whoever asks; otherwise only the sender edits.
    pub fn can_edit_message(message: &Message, user_id: &str) -> ChatResult<()> {
        if message.is_deleted() {
            return Err(ChatError::AlreadyDeleted {
                id: message.id.clone(),
            });
        }
        if message.sender_id != user_id {
            debug!(message_id = %message.id, user_id, "rejected edit by non-sender");
            return Err(ChatError::NotSender);
        }
        Ok(())
    }

    pub fn can_delete_message(message: &Message, room: &Room, user_id: &str) -> ChatResult<()> {
        if message.is_deleted() {
            return Err(ChatError::AlreadyDeleted {
                id: message.id.clone(),
            });
        }
        if message.sender_id != user_id && room.admin_id != user_id {
            debug!(message_id = %message.id, user_id, "rejected delete by non-sender");
            return Err(ChatError::NotSenderOrAdmin);
        }
        Ok(())
    }
}
