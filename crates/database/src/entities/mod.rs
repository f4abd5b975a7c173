//! Persisted records

pub mod invite;
pub mod message;
pub mod room;
pub mod user;
pub mod workspace;

pub use invite::{InviteStatus, WorkspaceInvite};
pub use message::{
    Message, MessageKind, MessageState, NewMessage, DELETED_BODY, SYSTEM_SENDER_ID,
    SYSTEM_SENDER_NAME,
};
pub use room::{NewRoom, Room, RoomSettings, RoomStatus, VideoSession};
pub use user::{NewUser, User};
pub use workspace::{NewWorkspace, Workspace, WorkspaceMember, WorkspaceRole};
