//! Outputs of the chat services.

use parley_database::{User, WorkspaceInvite, WorkspaceMember};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

/// Result of adding a user to a workspace and all of its active rooms.
#[derive(Debug, Clone, Serialize)]
pub struct CascadeOutcome {
    pub invite: Option<WorkspaceInvite>,
    pub membership: WorkspaceMember,
    pub joined_room_ids: Vec<String>,
    pub already_member_room_ids: Vec<String>,
}

impl CascadeOutcome {
    pub fn workspace_id(&self) -> &str {
        &self.membership.workspace_id
    }

    pub fn all_room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .joined_room_ids
            .iter()
            .chain(&self.already_member_room_ids)
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    pub token: String,
    pub user: User,
    pub workspace_id: Option<String>,
    /// Why a pending invite could not be accepted during registration.
    pub invite_error: Option<String>,
}

/// A user with the back-references derived from the rosters.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user: User,
    pub room_ids: Vec<String>,
    pub admin_room_ids: Vec<String>,
    pub workspace_ids: Vec<String>,
}
