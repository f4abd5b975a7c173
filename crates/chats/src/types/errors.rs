//! Error types for the chat system.

use parley_auth::AuthError;
use parley_database::{DatabaseError, InviteStatus};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Coarse classification every failure maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    Conflict,
    InvalidState,
    Validation,
    Upstream,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Validation => "validation",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("room not found: {id}")]
    RoomNotFound { id: String },

    #[error("message not found: {id}")]
    MessageNotFound { id: String },

    #[error("workspace not found: {id}")]
    WorkspaceNotFound { id: String },

    #[error("invite not found: {id}")]
    InviteNotFound { id: String },

    #[error("user not found: {id}")]
    UserNotFound { id: String },

    #[error("authentication required")]
    Unauthorized,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is inactive")]
    AccountInactive,

    #[error("only the sender may edit this message")]
    NotSender,

    #[error("only the sender or the room admin may delete this message")]
    NotSenderOrAdmin,

    #[error("only the room admin may {action}")]
    NotRoomAdmin { action: &'static str },

    #[error("only a workspace admin may {action}")]
    NotWorkspaceAdmin { action: &'static str },

    #[error("user {user_id} is not a member of room {room_id}")]
    NotMember { room_id: String, user_id: String },

    #[error("user {user_id} is not a member of workspace {workspace_id}")]
    NotWorkspaceMember { workspace_id: String, user_id: String },

    #[error("invite is addressed to a different email")]
    InviteEmailMismatch,

    #[error("a room named '{name}' already exists")]
    DuplicateRoomName { name: String },

    #[error("a workspace named '{name}' already exists")]
    DuplicateWorkspaceName { name: String },

    #[error("email is already registered")]
    EmailTaken,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("user {user_id} is already a member")]
    AlreadyMember { user_id: String },

    #[error("{email} already has a pending invite")]
    AlreadyInvited { email: String },

    #[error("room {room_id} is full ({capacity} members)")]
    RoomFull { room_id: String, capacity: u32 },

    #[error("capacity {requested} is below the current {members} members")]
    CapacityBelowMembers { requested: u32, members: i64 },

    #[error("room {id} is no longer active")]
    RoomInactive { id: String },

    #[error("message {id} was deleted")]
    AlreadyDeleted { id: String },

    #[error("the room admin cannot leave; transfer admin first")]
    AdminCannotLeave,

    #[error("the workspace admin cannot be removed")]
    WorkspaceAdminCannotLeave,

    #[error("invite is {}", .status.as_str())]
    InviteNotPending { status: InviteStatus },

    #[error("invite has expired")]
    InviteExpired,

    #[error("video calls are disabled in this room")]
    VideoCallsDisabled,

    #[error("no video call is active in this room")]
    NoActiveCall,

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("upstream failure: {message}")]
    Upstream { message: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ChatError {
    pub fn room_not_found(id: impl Into<String>) -> Self {
        Self::RoomNotFound { id: id.into() }
    }

    pub fn message_not_found(id: impl Into<String>) -> Self {
        Self::MessageNotFound { id: id.into() }
    }

    pub fn workspace_not_found(id: impl Into<String>) -> Self {
        Self::WorkspaceNotFound { id: id.into() }
    }

    pub fn invite_not_found(id: impl Into<String>) -> Self {
        Self::InviteNotFound { id: id.into() }
    }

    pub fn user_not_found(id: impl Into<String>) -> Self {
        Self::UserNotFound { id: id.into() }
    }

    pub fn not_member(room_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::NotMember {
            room_id: room_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::RoomNotFound { .. }
            | ChatError::MessageNotFound { .. }
            | ChatError::WorkspaceNotFound { .. }
            | ChatError::InviteNotFound { .. }
            | ChatError::UserNotFound { .. } => ErrorKind::NotFound,

            ChatError::Unauthorized | ChatError::InvalidCredentials => ErrorKind::Unauthorized,

            ChatError::AccountInactive
            | ChatError::NotSender
            | ChatError::NotSenderOrAdmin
            | ChatError::NotRoomAdmin { .. }
            | ChatError::NotWorkspaceAdmin { .. }
            | ChatError::NotMember { .. }
            | ChatError::NotWorkspaceMember { .. }
            | ChatError::InviteEmailMismatch => ErrorKind::Forbidden,

            ChatError::DuplicateRoomName { .. }
            | ChatError::DuplicateWorkspaceName { .. }
            | ChatError::EmailTaken
            | ChatError::UsernameTaken
            | ChatError::AlreadyMember { .. }
            | ChatError::AlreadyInvited { .. }
            | ChatError::RoomFull { .. }
            | ChatError::CapacityBelowMembers { .. } => ErrorKind::Conflict,

            ChatError::RoomInactive { .. }
            | ChatError::AlreadyDeleted { .. }
            | ChatError::AdminCannotLeave
            | ChatError::WorkspaceAdminCannotLeave
            | ChatError::InviteNotPending { .. }
            | ChatError::InviteExpired
            | ChatError::VideoCallsDisabled
            | ChatError::NoActiveCall => ErrorKind::InvalidState,

            ChatError::Validation { .. } => ErrorKind::Validation,
            ChatError::Upstream { .. } => ErrorKind::Upstream,

            ChatError::Auth(AuthError::CapabilityDisabled | AuthError::InvalidSystemKey) => {
                ErrorKind::Forbidden
            }
            ChatError::Auth(_) | ChatError::Database(_) | ChatError::Task(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show the caller. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(DatabaseError::from(err))
    }
}
