//! Repository for message data access operations.

use crate::entities::{Message, MessageKind, MessageState, NewMessage};
use crate::repos::contains_pattern;
use crate::types::{DatabaseError, DatabaseResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, sender_name, body, kind, state, state_changed_at, parent_id, reply_count, call_data, created_at";

pub struct MessageRepository;

impl MessageRepository {
    pub async fn insert(conn: &mut SqliteConnection, message: &NewMessage) -> DatabaseResult<Message> {
        sqlx::query(
            "INSERT INTO messages (id, room_id, sender_id, sender_name, body, kind, state, parent_id, call_data, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'original', ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.room_id)
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(&message.body)
        .bind(message.kind.as_str())
        .bind(&message.parent_id)
        .bind(&message.call_data)
        .bind(message.created_at)
        .execute(&mut *conn)
        .await?;

        Self::find_by_id(conn, &message.id)
            .await?
            .ok_or_else(|| DatabaseError::corrupt("message vanished after insert"))
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: &str) -> DatabaseResult<Option<Message>> {
        let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
            .bind(id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    /// Replace the body and move the message into `state`.
    pub async fn rewrite(
        conn: &mut SqliteConnection,
        id: &str,
        body: &str,
        state: MessageState,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE messages SET body = ?, state = ?, state_changed_at = ? WHERE id = ?")
            .bind(body)
            .bind(state.as_str())
            .bind(state.changed_at())
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn increment_reply_count(conn: &mut SqliteConnection, id: &str) -> DatabaseResult<()> {
        sqlx::query("UPDATE messages SET reply_count = reply_count + 1 WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Visible messages of a room, newest first.
    pub async fn page_by_room(
        conn: &mut SqliteConnection,
        room_id: &str,
        limit: u32,
        offset: u64,
    ) -> DatabaseResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE room_id = ? AND state != 'deleted'
             ORDER BY created_at DESC, rowid DESC
             LIMIT ? OFFSET ?"
        ))
        .bind(room_id)
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(conn)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    pub async fn count_by_room(conn: &mut SqliteConnection, room_id: &str) -> DatabaseResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE room_id = ? AND state != 'deleted'",
        )
        .bind(room_id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }

    pub async fn latest(conn: &mut SqliteConnection, room_id: &str) -> DatabaseResult<Option<Message>> {
        Ok(Self::page_by_room(conn, room_id, 1, 0).await?.into_iter().next())
    }

    pub async fn search(
        conn: &mut SqliteConnection,
        room_id: &str,
        fragment: &str,
    ) -> DatabaseResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE room_id = ? AND state != 'deleted' AND LOWER(body) LIKE ? ESCAPE '\\'
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(room_id)
        .bind(contains_pattern(fragment))
        .fetch_all(conn)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    /// Visible replies to `parent_id`, oldest first.
    pub async fn thread(conn: &mut SqliteConnection, parent_id: &str) -> DatabaseResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE parent_id = ? AND state != 'deleted'
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(parent_id)
        .fetch_all(conn)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    pub async fn by_sender_in_room(
        conn: &mut SqliteConnection,
        room_id: &str,
        sender_id: &str,
    ) -> DatabaseResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE room_id = ? AND sender_id = ? AND state != 'deleted'
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(room_id)
        .bind(sender_id)
        .fetch_all(conn)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    /// Call start/end markers of a room, newest first.
    pub async fn call_markers(conn: &mut SqliteConnection, room_id: &str) -> DatabaseResult<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE room_id = ? AND kind IN ('call_start', 'call_end')
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(room_id)
        .fetch_all(conn)
        .await?;
        rows.iter().map(message_from_row).collect()
    }
}

fn message_from_row(row: &SqliteRow) -> DatabaseResult<Message> {
    let kind: String = row.try_get("kind")?;
    let kind = MessageKind::parse(&kind)
        .ok_or_else(|| DatabaseError::corrupt(format!("unknown message kind {kind}")))?;
    let state: String = row.try_get("state")?;
    let state = MessageState::from_parts(&state, row.try_get("state_changed_at")?)
        .ok_or_else(|| DatabaseError::corrupt(format!("inconsistent message state {state}")))?;

    Ok(Message {
        id: row.try_get("id")?,
        room_id: row.try_get("room_id")?,
        sender_id: row.try_get("sender_id")?,
        sender_name: row.try_get("sender_name")?,
        body: row.try_get("body")?,
        kind,
        state,
        parent_id: row.try_get("parent_id")?,
        reply_count: row.try_get("reply_count")?,
        call_data: row.try_get("call_data")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{NewRoom, NewWorkspace, RoomSettings, DELETED_BODY};
    use crate::repos::test_support::memory_pool;
    use crate::repos::{RoomRepository, WorkspaceRepository};
    use chrono::{Duration, Utc};

    async fn seed_room(conn: &mut SqliteConnection) {
        WorkspaceRepository::insert(
            conn,
            &NewWorkspace {
                id: "ws".into(),
                name: "Acme".into(),
                description: None,
                admin_id: "alice".into(),
                invite_code: "ABCD1234".into(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        RoomRepository::insert(
            conn,
            &NewRoom {
                id: "room".into(),
                workspace_id: "ws".into(),
                name: "general".into(),
                description: None,
                admin_id: "alice".into(),
                settings: RoomSettings::default(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    }

    fn text(id: &str, body: &str, offset_secs: i64) -> NewMessage {
        NewMessage {
            id: id.into(),
            room_id: "room".into(),
            sender_id: "alice".into(),
            sender_name: "Alice".into(),
            body: body.into(),
            kind: MessageKind::Text,
            parent_id: None,
            call_data: None,
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn pages_newest_first_and_hide_deleted() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        seed_room(&mut conn).await;

        for (i, id) in ["m1", "m2", "m3"].iter().enumerate() {
            MessageRepository::insert(&mut conn, &text(id, "hello", i as i64)).await.unwrap();
        }
        MessageRepository::rewrite(
            &mut conn,
            "m2",
            DELETED_BODY,
            MessageState::Deleted { at: Utc::now() },
        )
        .await
        .unwrap();

        let page = MessageRepository::page_by_room(&mut conn, "room", 10, 0).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m1"]);
        assert_eq!(MessageRepository::count_by_room(&mut conn, "room").await.unwrap(), 2);

        let deleted = MessageRepository::find_by_id(&mut conn, "m2").await.unwrap().unwrap();
        assert!(deleted.is_deleted());
        assert_eq!(deleted.body, DELETED_BODY);
    }

    #[tokio::test]
    async fn thread_is_oldest_first() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        seed_room(&mut conn).await;

        MessageRepository::insert(&mut conn, &text("root", "question", 0)).await.unwrap();
        for (i, id) in ["r1", "r2"].iter().enumerate() {
            let mut reply = text(id, "answer", i as i64 + 1);
            reply.parent_id = Some("root".into());
            MessageRepository::insert(&mut conn, &reply).await.unwrap();
            MessageRepository::increment_reply_count(&mut conn, "root").await.unwrap();
        }

        let thread = MessageRepository::thread(&mut conn, "root").await.unwrap();
        let ids: Vec<&str> = thread.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        let root = MessageRepository::find_by_id(&mut conn, "root").await.unwrap().unwrap();
        assert_eq!(root.reply_count, 2);
    }

    #[tokio::test]
    async fn search_ignores_case_and_wildcards() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        seed_room(&mut conn).await;

        MessageRepository::insert(&mut conn, &text("m1", "Ship It today", 0)).await.unwrap();
        MessageRepository::insert(&mut conn, &text("m2", "100% done", 1)).await.unwrap();

        let hits = MessageRepository::search(&mut conn, "room", "ship it").await.unwrap();
        assert_eq!(hits.len(), 1);
        let hits = MessageRepository::search(&mut conn, "room", "%").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m2");
    }
}
