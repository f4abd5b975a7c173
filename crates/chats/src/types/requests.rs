//! Inputs to the chat services.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomSettingsInput {
    pub max_members: Option<u32>,
    pub is_private: Option<bool>,
    pub allow_file_sharing: Option<bool>,
    pub video_call_enabled: Option<bool>,
    pub max_video_participants: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomRequest {
    pub workspace_id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub settings: RoomSettingsInput,
}

/// Partial room update; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub settings: RoomSettingsInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Email or username.
    pub login: String,
    pub password: String,
}
