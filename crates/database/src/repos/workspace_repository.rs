//! Repository for workspaces and their membership rows.

use crate::entities::{NewWorkspace, Workspace, WorkspaceMember, WorkspaceRole};
use crate::types::{DatabaseError, DatabaseResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;

const WORKSPACE_COLUMNS: &str = "w.id, w.name, w.description, w.admin_id, w.active, w.invite_code, w.created_at";
const MEMBER_COLUMNS: &str = "id, workspace_id, user_id, role, active, joined_at";

pub struct WorkspaceRepository;

impl WorkspaceRepository {
    pub async fn insert(conn: &mut SqliteConnection, workspace: &NewWorkspace) -> DatabaseResult<Workspace> {
        sqlx::query(
            "INSERT INTO workspaces (id, name, description, admin_id, active, invite_code, created_at)
             VALUES (?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(&workspace.id)
        .bind(&workspace.name)
        .bind(&workspace.description)
        .bind(&workspace.admin_id)
        .bind(&workspace.invite_code)
        .bind(workspace.created_at)
        .execute(&mut *conn)
        .await?;

        info!(workspace_id = %workspace.id, name = %workspace.name, "created workspace");

        Self::find_by_id(conn, &workspace.id)
            .await?
            .ok_or_else(|| DatabaseError::corrupt("workspace vanished after insert"))
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: &str) -> DatabaseResult<Option<Workspace>> {
        let row = sqlx::query(&format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces w WHERE w.id = ?"))
            .bind(id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(workspace_from_row).transpose()
    }

    pub async fn find_by_invite_code(
        conn: &mut SqliteConnection,
        code: &str,
    ) -> DatabaseResult<Option<Workspace>> {
        let row = sqlx::query(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces w WHERE w.invite_code = ? AND w.active = 1"
        ))
        .bind(code)
        .fetch_optional(conn)
        .await?;
        row.as_ref().map(workspace_from_row).transpose()
    }

    /// Names compare case-insensitively.
    pub async fn name_taken(conn: &mut SqliteConnection, name: &str) -> DatabaseResult<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workspaces WHERE name = ? COLLATE NOCASE")
            .bind(name)
            .fetch_one(conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn invite_code_taken(conn: &mut SqliteConnection, code: &str) -> DatabaseResult<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workspaces WHERE invite_code = ?")
            .bind(code)
            .fetch_one(conn)
            .await?;
        Ok(count > 0)
    }

    /// Active workspaces where the user holds an active membership.
    pub async fn list_for_user(conn: &mut SqliteConnection, user_id: &str) -> DatabaseResult<Vec<Workspace>> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces w
             JOIN workspace_members wm ON wm.workspace_id = w.id
             WHERE wm.user_id = ? AND wm.active = 1 AND w.active = 1
             ORDER BY wm.joined_at, wm.rowid"
        ))
        .bind(user_id)
        .fetch_all(conn)
        .await?;
        rows.iter().map(workspace_from_row).collect()
    }

    pub async fn list_admin(conn: &mut SqliteConnection, user_id: &str) -> DatabaseResult<Vec<Workspace>> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces w
             JOIN workspace_members wm ON wm.workspace_id = w.id
             WHERE wm.user_id = ? AND wm.active = 1 AND wm.role = 'admin' AND w.active = 1
             ORDER BY wm.joined_at, wm.rowid"
        ))
        .bind(user_id)
        .fetch_all(conn)
        .await?;
        rows.iter().map(workspace_from_row).collect()
    }

    pub async fn find_member(
        conn: &mut SqliteConnection,
        workspace_id: &str,
        user_id: &str,
    ) -> DatabaseResult<Option<WorkspaceMember>> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM workspace_members WHERE workspace_id = ? AND user_id = ?"
        ))
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    /// Insert the membership row, or reactivate it with the given role.
    pub async fn upsert_member(
        conn: &mut SqliteConnection,
        id: &str,
        workspace_id: &str,
        user_id: &str,
        role: WorkspaceRole,
        at: DateTime<Utc>,
    ) -> DatabaseResult<WorkspaceMember> {
        sqlx::query(
            "INSERT INTO workspace_members (id, workspace_id, user_id, role, active, joined_at)
             VALUES (?, ?, ?, ?, 1, ?)
             ON CONFLICT (workspace_id, user_id)
             DO UPDATE SET active = 1, role = excluded.role, joined_at = excluded.joined_at",
        )
        .bind(id)
        .bind(workspace_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(at)
        .execute(&mut *conn)
        .await?;

        info!(workspace_id = %workspace_id, user_id = %user_id, role = role.as_str(), "workspace member active");

        Self::find_member(conn, workspace_id, user_id)
            .await?
            .ok_or_else(|| DatabaseError::corrupt("workspace member vanished after upsert"))
    }

    pub async fn deactivate_member(
        conn: &mut SqliteConnection,
        workspace_id: &str,
        user_id: &str,
    ) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "UPDATE workspace_members SET active = 0 WHERE workspace_id = ? AND user_id = ? AND active = 1",
        )
        .bind(workspace_id)
        .bind(user_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn active_members(
        conn: &mut SqliteConnection,
        workspace_id: &str,
    ) -> DatabaseResult<Vec<WorkspaceMember>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM workspace_members
             WHERE workspace_id = ? AND active = 1 ORDER BY joined_at, rowid"
        ))
        .bind(workspace_id)
        .fetch_all(conn)
        .await?;
        rows.iter().map(member_from_row).collect()
    }

    pub async fn active_member_count(conn: &mut SqliteConnection, workspace_id: &str) -> DatabaseResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM workspace_members WHERE workspace_id = ? AND active = 1",
        )
        .bind(workspace_id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }
}

fn workspace_from_row(row: &SqliteRow) -> DatabaseResult<Workspace> {
    Ok(Workspace {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        admin_id: row.try_get("admin_id")?,
        active: row.try_get("active")?,
        invite_code: row.try_get("invite_code")?,
        created_at: row.try_get("created_at")?,
    })
}

fn member_from_row(row: &SqliteRow) -> DatabaseResult<WorkspaceMember> {
    let role: String = row.try_get("role")?;
    Ok(WorkspaceMember {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        user_id: row.try_get("user_id")?,
        role: WorkspaceRole::parse(&role)
            .ok_or_else(|| DatabaseError::corrupt(format!("unknown workspace role {role}")))?,
        active: row.try_get("active")?,
        joined_at: row.try_get("joined_at")?,
    })
}
