//! Parley Database Crate
//!
//! Connection management, embedded migrations, persisted entities and the
//! repositories the chat services compose inside transactions.

use parley_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::prepare_database;
pub use migrations::run_migrations;

pub use repos::{
    InviteRepository, MessageRepository, RoomRepository, UserRepository, WorkspaceRepository,
};

pub use entities::{
    InviteStatus, Message, MessageKind, MessageState, NewMessage, NewRoom, NewUser, NewWorkspace,
    Room, RoomSettings, RoomStatus, User, VideoSession, Workspace, WorkspaceInvite,
    WorkspaceMember, WorkspaceRole, DELETED_BODY, SYSTEM_SENDER_ID, SYSTEM_SENDER_NAME,
};

pub use types::{DatabaseError, DatabaseResult};

pub use sqlx::{SqliteConnection, SqlitePool as Pool};

/// Initialize the database with migrations
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|e| DatabaseError::ConnectionError(format!("{e:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("{e:#}")))?;

    Ok(pool)
}
