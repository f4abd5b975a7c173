//! Append-only message streams per room.

use crate::services::room_roster::find_room;
use crate::types::{ChatError, ChatResult, Page};
use crate::utils::{ids, Clock, EngineLocks, PermissionChecker, Validator};
use parley_auth::Identity;
use parley_config::RoomsConfig;
use parley_database::{
    Message, MessageKind, MessageRepository, MessageState, NewMessage, RoomRepository,
    SqliteConnection, DELETED_BODY, SYSTEM_SENDER_ID, SYSTEM_SENDER_NAME,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

const CALL_START_BODY: &str = "Started a video call";
const CALL_END_BODY: &str = "Ended the video call";

struct Draft<'a> {
    room_id: &'a str,
    sender_id: &'a str,
    sender_name: &'a str,
    body: String,
    kind: MessageKind,
    parent_id: Option<&'a str>,
    call_data: Option<String>,
    require_member: bool,
}

#[derive(Clone)]
pub struct MessageLog {
    pool: SqlitePool,
    locks: EngineLocks,
    clock: Arc<dyn Clock>,
    config: RoomsConfig,
}

impl MessageLog {
    pub fn new(pool: SqlitePool, locks: EngineLocks, clock: Arc<dyn Clock>, config: RoomsConfig) -> Self {
        Self {
            pool,
            locks,
            clock,
            config,
        }
    }

    /// Append a text message from a room member, optionally as a reply.
    pub async fn append(
        &self,
        room_id: &str,
        sender: &Identity,
        text: &str,
        parent_id: Option<&str>,
    ) -> ChatResult<Message> {
        Validator::message_text(text)?;
        self.write(Draft {
            room_id,
            sender_id: &sender.user_id,
            sender_name: &sender.display_name,
            body: text.trim().to_string(),
            kind: MessageKind::Text,
            parent_id,
            call_data: None,
            require_member: true,
        })
        .await
    }

    pub async fn append_system(&self, room_id: &str, text: &str) -> ChatResult<Message> {
        Validator::message_text(text)?;
        self.write(Draft {
            room_id,
            sender_id: SYSTEM_SENDER_ID,
            sender_name: SYSTEM_SENDER_NAME,
            body: text.trim().to_string(),
            kind: MessageKind::System,
            parent_id: None,
            call_data: None,
            require_member: false,
        })
        .await
    }

    pub async fn append_call_start(
        &self,
        room_id: &str,
        sender: &Identity,
        call_data: Option<String>,
    ) -> ChatResult<Message> {
        self.write(Draft {
            room_id,
            sender_id: &sender.user_id,
            sender_name: &sender.display_name,
            body: CALL_START_BODY.to_string(),
            kind: MessageKind::CallStart,
            parent_id: None,
            call_data,
            require_member: true,
        })
        .await
    }

    pub async fn append_call_end(
        &self,
        room_id: &str,
        sender: &Identity,
        call_data: Option<String>,
    ) -> ChatResult<Message> {
        self.write(Draft {
            room_id,
            sender_id: &sender.user_id,
            sender_name: &sender.display_name,
            body: CALL_END_BODY.to_string(),
            kind: MessageKind::CallEnd,
            parent_id: None,
            call_data,
            require_member: true,
        })
        .await
    }

    async fn write(&self, draft: Draft<'_>) -> ChatResult<Message> {
        let _room_guard = self.locks.rooms.lock(draft.room_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let room = find_room(&mut tx, draft.room_id).await?;
        PermissionChecker::require_active(&room)?;
        if draft.require_member {
            require_member(&mut tx, draft.room_id, draft.sender_id).await?;
        }

        if let Some(parent_id) = draft.parent_id {
            let parent = MessageRepository::find_by_id(&mut tx, parent_id)
                .await?
                .filter(|parent| parent.room_id == draft.room_id)
                .ok_or_else(|| ChatError::message_not_found(parent_id))?;
            if parent.is_deleted() {
                return Err(ChatError::AlreadyDeleted { id: parent.id });
            }
            MessageRepository::increment_reply_count(&mut tx, parent_id).await?;
        }

        let now = self.clock.now();
        let message = MessageRepository::insert(
            &mut tx,
            &NewMessage {
                id: ids::new_id(),
                room_id: draft.room_id.to_string(),
                sender_id: draft.sender_id.to_string(),
                sender_name: draft.sender_name.to_string(),
                body: draft.body,
                kind: draft.kind,
                parent_id: draft.parent_id.map(str::to_string),
                call_data: draft.call_data,
                created_at: now,
            },
        )
        .await?;
        RoomRepository::touch(&mut tx, draft.room_id, now).await?;
        tx.commit().await?;

        info!(
            message_id = %message.id,
            room_id = %message.room_id,
            sender_id = %message.sender_id,
            kind = message.kind.as_str(),
            "appended message"
        );
        Ok(message)
    }

    pub async fn edit(&self, message_id: &str, text: &str, caller_id: &str) -> ChatResult<Message> {
        let room_id = self.get(message_id).await?.room_id;

        let _room_guard = self.locks.rooms.lock(&room_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let message = find_message(&mut tx, message_id).await?;
        PermissionChecker::can_edit_message(&message, caller_id)?;
        Validator::message_text(text)?;

        let state = MessageState::Edited {
            at: self.clock.now(),
        };
        MessageRepository::rewrite(&mut tx, message_id, text.trim(), state).await?;
        let message = find_message(&mut tx, message_id).await?;
        tx.commit().await?;

        info!(message_id, room_id = %message.room_id, caller_id, "edited message");
        Ok(message)
    }

    /// Blank the body of a message. The sender or the room admin may do this once.
    pub async fn delete(&self, message_id: &str, caller_id: &str) -> ChatResult<Message> {
        let room_id = self.get(message_id).await?.room_id;

        let _room_guard = self.locks.rooms.lock(&room_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let message = find_message(&mut tx, message_id).await?;
        let room = find_room(&mut tx, &message.room_id).await?;
        PermissionChecker::can_delete_message(&message, &room, caller_id)?;

        let state = MessageState::Deleted {
            at: self.clock.now(),
        };
        MessageRepository::rewrite(&mut tx, message_id, DELETED_BODY, state).await?;
        let message = find_message(&mut tx, message_id).await?;
        tx.commit().await?;

        info!(message_id, room_id = %message.room_id, caller_id, "deleted message");
        Ok(message)
    }

    pub async fn get(&self, message_id: &str) -> ChatResult<Message> {
        let mut conn = self.pool.acquire().await?;
        find_message(&mut conn, message_id).await
    }

    /// Visible messages of a room, newest first. `page` counts from zero.
    pub async fn list_by_room(
        &self,
        room_id: &str,
        requester_id: &str,
        page: u32,
        page_size: u32,
    ) -> ChatResult<Page<Message>> {
        let page_size = page_size.min(self.config.max_page_size).max(1);
        let mut conn = self.pool.acquire().await?;
        find_room(&mut conn, room_id).await?;
        require_member(&mut conn, room_id, requester_id).await?;

        let offset = u64::from(page) * u64::from(page_size);
        let items = MessageRepository::page_by_room(&mut conn, room_id, page_size, offset).await?;
        let total = MessageRepository::count_by_room(&mut conn, room_id).await?;
        Ok(Page {
            items,
            page,
            page_size,
            total,
        })
    }

    pub async fn recent(&self, room_id: &str, requester_id: &str) -> ChatResult<Vec<Message>> {
        let limit = self.config.recent_message_limit.max(1);
        let mut conn = self.pool.acquire().await?;
        find_room(&mut conn, room_id).await?;
        require_member(&mut conn, room_id, requester_id).await?;
        Ok(MessageRepository::page_by_room(&mut conn, room_id, limit, 0).await?)
    }

    pub async fn latest(&self, room_id: &str) -> ChatResult<Option<Message>> {
        let mut conn = self.pool.acquire().await?;
        find_room(&mut conn, room_id).await?;
        Ok(MessageRepository::latest(&mut conn, room_id).await?)
    }

    pub async fn count_for_room(&self, room_id: &str) -> ChatResult<i64> {
        let mut conn = self.pool.acquire().await?;
        find_room(&mut conn, room_id).await?;
        Ok(MessageRepository::count_by_room(&mut conn, room_id).await?)
    }

    pub async fn search(
        &self,
        room_id: &str,
        requester_id: &str,
        query: &str,
    ) -> ChatResult<Vec<Message>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::validation("search query cannot be empty"));
        }
        let mut conn = self.pool.acquire().await?;
        find_room(&mut conn, room_id).await?;
        require_member(&mut conn, room_id, requester_id).await?;
        Ok(MessageRepository::search(&mut conn, room_id, query).await?)
    }

    /// Replies to a message, oldest first.
    pub async fn thread_of(&self, parent_id: &str, requester_id: &str) -> ChatResult<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        let parent = find_message(&mut conn, parent_id).await?;
        require_member(&mut conn, &parent.room_id, requester_id).await?;
        Ok(MessageRepository::thread(&mut conn, parent_id).await?)
    }

    pub async fn messages_by_user_in_room(
        &self,
        room_id: &str,
        requester_id: &str,
        sender_id: &str,
    ) -> ChatResult<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        find_room(&mut conn, room_id).await?;
        require_member(&mut conn, room_id, requester_id).await?;
        Ok(MessageRepository::by_sender_in_room(&mut conn, room_id, sender_id).await?)
    }

    pub async fn video_call_messages(
        &self,
        room_id: &str,
        requester_id: &str,
    ) -> ChatResult<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        find_room(&mut conn, room_id).await?;
        require_member(&mut conn, room_id, requester_id).await?;
        Ok(MessageRepository::call_markers(&mut conn, room_id).await?)
    }
}

async fn find_message(conn: &mut SqliteConnection, message_id: &str) -> ChatResult<Message> {
    MessageRepository::find_by_id(conn, message_id)
        .await?
        .ok_or_else(|| ChatError::message_not_found(message_id))
}

async fn require_member(conn: &mut SqliteConnection, room_id: &str, user_id: &str) -> ChatResult<()> {
    if !RoomRepository::is_member(conn, room_id, user_id).await? {
        return Err(ChatError::not_member(room_id, user_id));
    }
    Ok(())
}
