//! Room entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Active,
    Deactivated,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Deactivated => "deactivated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(RoomStatus::Active),
            "deactivated" => Some(RoomStatus::Deactivated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub max_members: u32,
    pub is_private: bool,
    pub allow_file_sharing: bool,
    pub video_call_enabled: bool,
    pub max_video_participants: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_members: 100,
            is_private: false,
            allow_file_sharing: true,
            video_call_enabled: true,
            max_video_participants: 10,
        }
    }
}

/// Reference to a call room hosted by the external video provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoSession {
    pub provider: String,
    pub video_room_id: String,
    pub active: bool,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Room {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub description: Option<String>,
    pub admin_id: String,
    pub status: RoomStatus,
    pub settings: RoomSettings,
    pub video: Option<VideoSession>,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Room {
    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }

    pub fn is_full(&self) -> bool {
        self.member_count >= i64::from(self.settings.max_members)
    }
}

#[derive(Debug, Clone)]
pub struct NewRoom {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub description: Option<String>,
    pub admin_id: String,
    pub settings: RoomSettings,
    pub created_at: DateTime<Utc>,
}
