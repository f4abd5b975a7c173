//! Repository for rooms and the room membership roster.

use crate::entities::{NewRoom, Room, RoomSettings, RoomStatus, VideoSession};
use crate::repos::contains_pattern;
use crate::types::{DatabaseError, DatabaseResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;

const ROOM_SELECT: &str = "SELECT r.id, r.workspace_id, r.name, r.description, r.admin_id, r.status,
        r.max_members, r.is_private, r.allow_file_sharing, r.video_call_enabled, r.max_video_participants,
        r.video_provider, r.video_room_id, r.video_active, r.video_started_by, r.video_started_at,
        r.created_at, r.last_activity_at,
        (SELECT COUNT(*) FROM room_members m WHERE m.room_id = r.id) AS member_count
    FROM rooms r";

pub struct RoomRepository;

impl RoomRepository {
    /// Insert a room together with its admin's roster entry.
    pub async fn insert(conn: &mut SqliteConnection, room: &NewRoom) -> DatabaseResult<Room> {
        sqlx::query(
            "INSERT INTO rooms (id, workspace_id, name, description, admin_id, status, max_members,
                is_private, allow_file_sharing, video_call_enabled, max_video_participants,
                created_at, last_activity_at)
             VALUES (?, ?, ?, ?, ?, 'active', ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&room.id)
        .bind(&room.workspace_id)
        .bind(&room.name)
        .bind(&room.description)
        .bind(&room.admin_id)
        .bind(i64::from(room.settings.max_members))
        .bind(room.settings.is_private)
        .bind(room.settings.allow_file_sharing)
        .bind(room.settings.video_call_enabled)
        .bind(i64::from(room.settings.max_video_participants))
        .bind(room.created_at)
        .bind(room.created_at)
        .execute(&mut *conn)
        .await?;

        Self::add_member(conn, &room.id, &room.admin_id, room.created_at).await?;

        Self::find_by_id(conn, &room.id)
            .await?
            .ok_or_else(|| DatabaseError::corrupt("room vanished after insert"))
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: &str) -> DatabaseResult<Option<Room>> {
        let row = sqlx::query(&format!("{ROOM_SELECT} WHERE r.id = ?"))
            .bind(id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(room_from_row).transpose()
    }

    /// Whether an active room other than `excluding` already uses `name`.
    pub async fn active_name_taken(
        conn: &mut SqliteConnection,
        name: &str,
        excluding: Option<&str>,
    ) -> DatabaseResult<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM rooms WHERE name = ? AND status = 'active' AND id != COALESCE(?, '')",
        )
        .bind(name)
        .bind(excluding)
        .fetch_one(conn)
        .await?;
        Ok(count > 0)
    }

    pub async fn list_active(conn: &mut SqliteConnection) -> DatabaseResult<Vec<Room>> {
        Self::fetch_many(
            conn,
            &format!("{ROOM_SELECT} WHERE r.status = 'active' ORDER BY r.created_at DESC, r.rowid DESC"),
            &[],
        )
        .await
    }

    pub async fn list_public(conn: &mut SqliteConnection) -> DatabaseResult<Vec<Room>> {
        Self::fetch_many(
            conn,
            &format!(
                "{ROOM_SELECT} WHERE r.status = 'active' AND r.is_private = 0
                 ORDER BY r.created_at DESC, r.rowid DESC"
            ),
            &[],
        )
        .await
    }

    /// Active rooms the user belongs to, most recently active first.
    pub async fn list_for_user(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> DatabaseResult<Vec<Room>> {
        Self::fetch_many(
            conn,
            &format!(
                "{ROOM_SELECT} JOIN room_members rm ON rm.room_id = r.id
                 WHERE rm.user_id = ? AND r.status = 'active'
                 ORDER BY r.last_activity_at DESC, r.rowid DESC"
            ),
            &[user_id],
        )
        .await
    }

    pub async fn list_admin(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> DatabaseResult<Vec<Room>> {
        Self::fetch_many(
            conn,
            &format!(
                "{ROOM_SELECT} WHERE r.admin_id = ? AND r.status = 'active'
                 ORDER BY r.created_at DESC, r.rowid DESC"
            ),
            &[user_id],
        )
        .await
    }

    /// Case-insensitive name search over active rooms.
    pub async fn search(conn: &mut SqliteConnection, fragment: &str) -> DatabaseResult<Vec<Room>> {
        let pattern = contains_pattern(fragment);
        Self::fetch_many(
            conn,
            &format!(
                "{ROOM_SELECT} WHERE r.status = 'active' AND LOWER(r.name) LIKE ? ESCAPE '\\'
                 ORDER BY r.name"
            ),
            &[&pattern],
        )
        .await
    }

    pub async fn popular(conn: &mut SqliteConnection, limit: u32) -> DatabaseResult<Vec<Room>> {
        let rows = sqlx::query(&format!(
            "{ROOM_SELECT} WHERE r.status = 'active'
             ORDER BY member_count DESC, r.last_activity_at DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(conn)
        .await?;
        rows.iter().map(room_from_row).collect()
    }

    pub async fn active_ids_in_workspace(
        conn: &mut SqliteConnection,
        workspace_id: &str,
    ) -> DatabaseResult<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM rooms WHERE workspace_id = ? AND status = 'active' ORDER BY id",
        )
        .bind(workspace_id)
        .fetch_all(conn)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    pub async fn update_details(
        conn: &mut SqliteConnection,
        id: &str,
        name: &str,
        description: Option<&str>,
        settings: &RoomSettings,
    ) -> DatabaseResult<()> {
        sqlx::query(
            "UPDATE rooms SET name = ?, description = ?, max_members = ?, is_private = ?,
                allow_file_sharing = ?, video_call_enabled = ?, max_video_participants = ?
             WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(i64::from(settings.max_members))
        .bind(settings.is_private)
        .bind(settings.allow_file_sharing)
        .bind(settings.video_call_enabled)
        .bind(i64::from(settings.max_video_participants))
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn set_status(
        conn: &mut SqliteConnection,
        id: &str,
        status: RoomStatus,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE rooms SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(conn)
            .await?;
        info!(room_id = %id, status = status.as_str(), "room status changed");
        Ok(())
    }

    pub async fn set_admin(
        conn: &mut SqliteConnection,
        id: &str,
        admin_id: &str,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE rooms SET admin_id = ? WHERE id = ?")
            .bind(admin_id)
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn touch(
        conn: &mut SqliteConnection,
        id: &str,
        at: DateTime<Utc>,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE rooms SET last_activity_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn set_video(
        conn: &mut SqliteConnection,
        id: &str,
        session: &VideoSession,
    ) -> DatabaseResult<()> {
        sqlx::query(
            "UPDATE rooms SET video_provider = ?, video_room_id = ?, video_active = ?,
                video_started_by = ?, video_started_at = ?
             WHERE id = ?",
        )
        .bind(&session.provider)
        .bind(&session.video_room_id)
        .bind(session.active)
        .bind(&session.started_by)
        .bind(session.started_at)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Returns false when the user was already on the roster.
    pub async fn add_member(
        conn: &mut SqliteConnection,
        room_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO room_members (room_id, user_id, joined_at) VALUES (?, ?, ?)",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_member(
        conn: &mut SqliteConnection,
        room_id: &str,
        user_id: &str,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM room_members WHERE room_id = ? AND user_id = ?")
            .bind(room_id)
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_member(
        conn: &mut SqliteConnection,
        room_id: &str,
        user_id: &str,
    ) -> DatabaseResult<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM room_members WHERE room_id = ? AND user_id = ?")
                .bind(room_id)
                .bind(user_id)
                .fetch_one(conn)
                .await?;
        Ok(count > 0)
    }

    pub async fn member_ids(
        conn: &mut SqliteConnection,
        room_id: &str,
    ) -> DatabaseResult<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM room_members WHERE room_id = ? ORDER BY joined_at, rowid",
        )
        .bind(room_id)
        .fetch_all(conn)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    pub async fn member_count(conn: &mut SqliteConnection, room_id: &str) -> DatabaseResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM room_members WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(conn)
            .await?;
        Ok(count)
    }

    async fn fetch_many(
        conn: &mut SqliteConnection,
        sql: &str,
        binds: &[&str],
    ) -> DatabaseResult<Vec<Room>> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(value.to_string());
        }
        let rows = query.fetch_all(conn).await?;
        rows.iter().map(room_from_row).collect()
    }
}

fn room_from_row(row: &SqliteRow) -> DatabaseResult<Room> {
    let status: String = row.try_get("status")?;
    let status = RoomStatus::parse(&status)
        .ok_or_else(|| DatabaseError::corrupt(format!("unknown room status {status}")))?;

    let max_members: i64 = row.try_get("max_members")?;
    let max_video: i64 = row.try_get("max_video_participants")?;

    let video_room_id: Option<String> = row.try_get("video_room_id")?;
    let video = match video_room_id {
        Some(video_room_id) => Some(VideoSession {
            provider: row
                .try_get::<Option<String>, _>("video_provider")?
                .unwrap_or_default(),
            video_room_id,
            active: row.try_get("video_active")?,
            started_by: row
                .try_get::<Option<String>, _>("video_started_by")?
                .unwrap_or_default(),
            started_at: row
                .try_get::<Option<DateTime<Utc>>, _>("video_started_at")?
                .ok_or_else(|| DatabaseError::corrupt("video session without start time"))?,
        }),
        None => None,
    };

    Ok(Room {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        admin_id: row.try_get("admin_id")?,
        status,
        settings: RoomSettings {
            max_members: u32::try_from(max_members)
                .map_err(|_| DatabaseError::corrupt("max_members out of range"))?,
            is_private: row.try_get("is_private")?,
            allow_file_sharing: row.try_get("allow_file_sharing")?,
            video_call_enabled: row.try_get("video_call_enabled")?,
            max_video_participants: u32::try_from(max_video)
                .map_err(|_| DatabaseError::corrupt("max_video_participants out of range"))?,
        },
        video,
        member_count: row.try_get("member_count")?,
        created_at: row.try_get("created_at")?,
        last_activity_at: row.try_get("last_activity_at")?,
    })
}
