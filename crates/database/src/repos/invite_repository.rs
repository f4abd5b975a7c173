//! Repository for workspace invites.

use crate::entities::{InviteStatus, WorkspaceInvite};
use crate::types::{DatabaseError, DatabaseResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;

const INVITE_COLUMNS: &str = "id, workspace_id, email, invited_by, invited_at, expires_at, status, used_at";

pub struct InviteRepository;

impl InviteRepository {
    pub async fn insert(conn: &mut SqliteConnection, invite: &WorkspaceInvite) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO workspace_invites (id, workspace_id, email, invited_by, invited_at, expires_at, status, used_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&invite.id)
        .bind(&invite.workspace_id)
        .bind(&invite.email)
        .bind(&invite.invited_by)
        .bind(invite.invited_at)
        .bind(invite.expires_at)
        .bind(invite.status.as_str())
        .bind(invite.used_at)
        .execute(conn)
        .await?;

        info!(invite_id = %invite.id, workspace_id = %invite.workspace_id, "created workspace invite");
        Ok(())
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: &str) -> DatabaseResult<Option<WorkspaceInvite>> {
        let row = sqlx::query(&format!("SELECT {INVITE_COLUMNS} FROM workspace_invites WHERE id = ?"))
            .bind(id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(invite_from_row).transpose()
    }

    /// The stored pending invite for a (workspace, email) pair, expired or not.
    pub async fn find_pending(
        conn: &mut SqliteConnection,
        workspace_id: &str,
        email: &str,
    ) -> DatabaseResult<Option<WorkspaceInvite>> {
        let row = sqlx::query(&format!(
            "SELECT {INVITE_COLUMNS} FROM workspace_invites
             WHERE workspace_id = ? AND email = ? AND status = 'pending'"
        ))
        .bind(workspace_id)
        .bind(email)
        .fetch_optional(conn)
        .await?;
        row.as_ref().map(invite_from_row).transpose()
    }

    /// Stored pending invites addressed to `email`, newest first.
    pub async fn pending_for_email(
        conn: &mut SqliteConnection,
        email: &str,
    ) -> DatabaseResult<Vec<WorkspaceInvite>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVITE_COLUMNS} FROM workspace_invites
             WHERE email = ? AND status = 'pending'
             ORDER BY invited_at DESC, rowid DESC"
        ))
        .bind(email)
        .fetch_all(conn)
        .await?;
        rows.iter().map(invite_from_row).collect()
    }

    pub async fn list_for_workspace(
        conn: &mut SqliteConnection,
        workspace_id: &str,
    ) -> DatabaseResult<Vec<WorkspaceInvite>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVITE_COLUMNS} FROM workspace_invites
             WHERE workspace_id = ? ORDER BY invited_at DESC, rowid DESC"
        ))
        .bind(workspace_id)
        .fetch_all(conn)
        .await?;
        rows.iter().map(invite_from_row).collect()
    }

    pub async fn set_status(
        conn: &mut SqliteConnection,
        id: &str,
        status: InviteStatus,
        used_at: Option<DateTime<Utc>>,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE workspace_invites SET status = ?, used_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(used_at)
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM workspace_invites WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Pending invites of a workspace that have not reached their deadline.
    pub async fn count_valid(
        conn: &mut SqliteConnection,
        workspace_id: &str,
        now: DateTime<Utc>,
    ) -> DatabaseResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM workspace_invites
             WHERE workspace_id = ? AND status = 'pending' AND expires_at > ?",
        )
        .bind(workspace_id)
        .bind(now)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }

    /// Delete every invite that can no longer be accepted.
    pub async fn delete_settled(conn: &mut SqliteConnection, now: DateTime<Utc>) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "DELETE FROM workspace_invites WHERE status != 'pending' OR expires_at <= ?",
        )
        .bind(now)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}

fn invite_from_row(row: &SqliteRow) -> DatabaseResult<WorkspaceInvite> {
    let status: String = row.try_get("status")?;
    Ok(WorkspaceInvite {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        email: row.try_get("email")?,
        invited_by: row.try_get("invited_by")?,
        invited_at: row.try_get("invited_at")?,
        expires_at: row.try_get("expires_at")?,
        status: InviteStatus::parse(&status)
            .ok_or_else(|| DatabaseError::corrupt(format!("unknown invite status {status}")))?,
        used_at: row.try_get("used_at")?,
    })
}
