//! Repository for user data access operations.

use crate::entities::{NewUser, User};
use crate::types::{DatabaseError, DatabaseResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;

const USER_COLUMNS: &str = "id, username, email, display_name, password_hash, current_workspace_id, active, created_at, last_login_at";

pub struct UserRepository;

impl UserRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        user: &NewUser,
        now: DateTime<Utc>,
    ) -> DatabaseResult<User> {
        sqlx::query(
            "INSERT INTO users (id, username, email, display_name, password_hash, active, created_at)
             VALUES (?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        info!(user_id = %user.id, username = %user.username, "created user");

        Self::find_by_id(conn, &user.id)
            .await?
            .ok_or_else(|| DatabaseError::corrupt("user vanished after insert"))
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: &str) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn find_by_email(
        conn: &mut SqliteConnection,
        email: &str,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(conn)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    /// Find a user by email or username, whichever matches.
    pub async fn find_by_login(
        conn: &mut SqliteConnection,
        login: &str,
    ) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? OR username = ? LIMIT 1"
        ))
        .bind(login.to_lowercase())
        .bind(login)
        .fetch_optional(conn)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn email_exists(conn: &mut SqliteConnection, email: &str) -> DatabaseResult<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn username_exists(
        conn: &mut SqliteConnection,
        username: &str,
    ) -> DatabaseResult<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn set_current_workspace(
        conn: &mut SqliteConnection,
        user_id: &str,
        workspace_id: Option<&str>,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET current_workspace_id = ? WHERE id = ?")
            .bind(workspace_id)
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Set the current workspace only when the user has none yet.
    pub async fn adopt_workspace_if_unset(
        conn: &mut SqliteConnection,
        user_id: &str,
        workspace_id: &str,
    ) -> DatabaseResult<()> {
        sqlx::query(
            "UPDATE users SET current_workspace_id = ? WHERE id = ? AND current_workspace_id IS NULL",
        )
        .bind(workspace_id)
        .bind(user_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn record_login(
        conn: &mut SqliteConnection,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(at)
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(())
    }
}

fn user_from_row(row: &SqliteRow) -> DatabaseResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        password_hash: row.try_get("password_hash")?,
        current_workspace_id: row.try_get("current_workspace_id")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        last_login_at: row.try_get("last_login_at")?,
    })
}
