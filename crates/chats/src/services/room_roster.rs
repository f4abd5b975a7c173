//! Room lifecycle and membership.

use crate::types::{ChatError, ChatResult, CreateRoomRequest, RoomSettingsInput, UpdateRoomRequest};
use crate::utils::{ids, Clock, EngineLocks, PermissionChecker, Validator};
use parley_config::RoomsConfig;
use parley_database::{
    NewRoom, Room, RoomRepository, RoomSettings, RoomStatus, SqliteConnection, VideoSession,
    WorkspaceRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

const VIDEO_PROVIDER: &str = "videosdk";

/// Owns room records and their member sets.
#[derive(Clone)]
pub struct RoomRoster {
    pool: SqlitePool,
    locks: EngineLocks,
    clock: Arc<dyn Clock>,
    config: RoomsConfig,
}

impl RoomRoster {
    pub fn new(pool: SqlitePool, locks: EngineLocks, clock: Arc<dyn Clock>, config: RoomsConfig) -> Self {
        Self {
            pool,
            locks,
            clock,
            config,
        }
    }

    /// Create a room in a workspace the admin belongs to. The admin becomes its first member.
    pub async fn create(&self, request: CreateRoomRequest, admin_id: &str) -> ChatResult<Room> {
        let name = request.name.trim().to_string();
        Validator::room_name(&name)?;
        Validator::description(request.description.as_deref())?;
        let settings = self.settings_from_input(&request.settings, None)?;

        // Serialised with invite acceptance so no cascade misses the new room.
        let _workspace_guard = self.locks.workspaces.lock(&request.workspace_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let workspace = WorkspaceRepository::find_by_id(&mut tx, &request.workspace_id)
            .await?
            .filter(|w| w.active)
            .ok_or_else(|| ChatError::workspace_not_found(&request.workspace_id))?;

        let is_member = WorkspaceRepository::find_member(&mut tx, &workspace.id, admin_id)
            .await?
            .is_some_and(|m| m.active);
        if !is_member {
            return Err(ChatError::NotWorkspaceMember {
                workspace_id: workspace.id,
                user_id: admin_id.to_string(),
            });
        }

        if RoomRepository::active_name_taken(&mut tx, &name, None).await? {
            return Err(ChatError::DuplicateRoomName { name });
        }

        let room = RoomRepository::insert(
            &mut tx,
            &NewRoom {
                id: ids::new_id(),
                workspace_id: workspace.id.clone(),
                name: name.clone(),
                description: request.description.clone(),
                admin_id: admin_id.to_string(),
                settings,
                created_at: self.clock.now(),
            },
        )
        .await
        .map_err(|err| {
            if err.is_unique_violation() {
                ChatError::DuplicateRoomName { name: name.clone() }
            } else {
                err.into()
            }
        })?;

        tx.commit().await?;
        info!(room_id = %room.id, workspace_id = %room.workspace_id, admin_id, "created room");
        Ok(room)
    }

    pub async fn get(&self, room_id: &str) -> ChatResult<Room> {
        let mut conn = self.pool.acquire().await?;
        find_room(&mut conn, room_id).await
    }

    /// Add a user to an active room with free capacity.
    pub async fn join(&self, room_id: &str, user_id: &str) -> ChatResult<Room> {
        let _room_guard = self.locks.rooms.lock(room_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let room = find_room(&mut tx, room_id).await?;
        PermissionChecker::require_active(&room)?;
        if RoomRepository::is_member(&mut tx, room_id, user_id).await? {
            return Err(ChatError::AlreadyMember {
                user_id: user_id.to_string(),
            });
        }
        if room.is_full() {
            return Err(ChatError::RoomFull {
                room_id: room.id,
                capacity: room.settings.max_members,
            });
        }

        RoomRepository::add_member(&mut tx, room_id, user_id, self.clock.now()).await?;
        let room = find_room(&mut tx, room_id).await?;
        tx.commit().await?;

        info!(room_id, user_id, members = room.member_count, "user joined room");
        Ok(room)
    }

    pub async fn leave(&self, room_id: &str, user_id: &str) -> ChatResult<Room> {
        let _room_guard = self.locks.rooms.lock(room_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let room = find_room(&mut tx, room_id).await?;
        if !RoomRepository::is_member(&mut tx, room_id, user_id).await? {
            return Err(ChatError::not_member(room_id, user_id));
        }
        if room.admin_id == user_id {
            return Err(ChatError::AdminCannotLeave);
        }

        RoomRepository::remove_member(&mut tx, room_id, user_id).await?;
        let room = find_room(&mut tx, room_id).await?;
        tx.commit().await?;

        info!(room_id, user_id, "user left room");
        Ok(room)
    }

    pub async fn transfer_admin(
        &self,
        room_id: &str,
        current_admin_id: &str,
        new_admin_id: &str,
    ) -> ChatResult<Room> {
        let _room_guard = self.locks.rooms.lock(room_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let room = find_room(&mut tx, room_id).await?;
        PermissionChecker::require_room_admin(&room, current_admin_id, "transfer admin rights")?;
        PermissionChecker::require_active(&room)?;
        if !RoomRepository::is_member(&mut tx, room_id, new_admin_id).await? {
            return Err(ChatError::not_member(room_id, new_admin_id));
        }

        RoomRepository::set_admin(&mut tx, room_id, new_admin_id).await?;
        let room = find_room(&mut tx, room_id).await?;
        tx.commit().await?;

        info!(room_id, from = current_admin_id, to = new_admin_id, "transferred room admin");
        Ok(room)
    }

    /// Deactivate a room. Its history stays, but it leaves every member's room list.
    pub async fn delete(&self, room_id: &str, caller_id: &str) -> ChatResult<Room> {
        let _room_guard = self.locks.rooms.lock(room_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let room = find_room(&mut tx, room_id).await?;
        PermissionChecker::require_room_admin(&room, caller_id, "delete the room")?;
        PermissionChecker::require_active(&room)?;

        RoomRepository::set_status(&mut tx, room_id, RoomStatus::Deactivated).await?;
        let room = find_room(&mut tx, room_id).await?;
        tx.commit().await?;

        info!(room_id, caller_id, "deactivated room");
        Ok(room)
    }

    pub async fn update(
        &self,
        room_id: &str,
        caller_id: &str,
        request: UpdateRoomRequest,
    ) -> ChatResult<Room> {
        let _room_guard = self.locks.rooms.lock(room_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let room = find_room(&mut tx, room_id).await?;
        PermissionChecker::require_room_admin(&room, caller_id, "update the room")?;
        PermissionChecker::require_active(&room)?;

        let name = match request.name.as_deref().map(str::trim) {
            Some(name) => {
                Validator::room_name(name)?;
                if name != room.name
                    && RoomRepository::active_name_taken(&mut tx, name, Some(room_id)).await?
                {
                    return Err(ChatError::DuplicateRoomName {
                        name: name.to_string(),
                    });
                }
                name.to_string()
            }
            None => room.name.clone(),
        };
        let description = match request.description {
            Some(description) => Some(description),
            None => room.description.clone(),
        };
        Validator::description(description.as_deref())?;

        let settings = self.settings_from_input(&request.settings, Some(&room.settings))?;
        if i64::from(settings.max_members) < room.member_count {
            return Err(ChatError::CapacityBelowMembers {
                requested: settings.max_members,
                members: room.member_count,
            });
        }

        RoomRepository::update_details(&mut tx, room_id, &name, description.as_deref(), &settings)
            .await?;
        let room = find_room(&mut tx, room_id).await?;
        tx.commit().await?;

        info!(room_id, caller_id, "updated room");
        Ok(room)
    }

    /// Whether the user is on the room's live roster. Unknown rooms yield false.
    pub async fn is_member(&self, room_id: &str, user_id: &str) -> ChatResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(RoomRepository::is_member(&mut conn, room_id, user_id).await?)
    }

    pub async fn is_admin(&self, room_id: &str, user_id: &str) -> ChatResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(RoomRepository::find_by_id(&mut conn, room_id)
            .await?
            .is_some_and(|room| room.admin_id == user_id))
    }

    pub async fn members(&self, room_id: &str) -> ChatResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        find_room(&mut conn, room_id).await?;
        Ok(RoomRepository::member_ids(&mut conn, room_id).await?)
    }

    pub async fn list_active(&self) -> ChatResult<Vec<Room>> {
        let mut conn = self.pool.acquire().await?;
        Ok(RoomRepository::list_active(&mut conn).await?)
    }

    pub async fn list_public(&self) -> ChatResult<Vec<Room>> {
        let mut conn = self.pool.acquire().await?;
        Ok(RoomRepository::list_public(&mut conn).await?)
    }

    pub async fn list_for_user(&self, user_id: &str) -> ChatResult<Vec<Room>> {
        let mut conn = self.pool.acquire().await?;
        Ok(RoomRepository::list_for_user(&mut conn, user_id).await?)
    }

    pub async fn list_admin_rooms(&self, user_id: &str) -> ChatResult<Vec<Room>> {
        let mut conn = self.pool.acquire().await?;
        Ok(RoomRepository::list_admin(&mut conn, user_id).await?)
    }

    pub async fn search(&self, fragment: &str) -> ChatResult<Vec<Room>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Err(ChatError::validation("search term cannot be empty"));
        }
        let mut conn = self.pool.acquire().await?;
        Ok(RoomRepository::search(&mut conn, fragment).await?)
    }

    pub async fn popular(&self, limit: u32) -> ChatResult<Vec<Room>> {
        let limit = limit.min(self.config.max_page_size).max(1);
        let mut conn = self.pool.acquire().await?;
        Ok(RoomRepository::popular(&mut conn, limit).await?)
    }

    pub async fn room_ids_in_workspace(&self, workspace_id: &str) -> ChatResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        Ok(RoomRepository::active_ids_in_workspace(&mut conn, workspace_id).await?)
    }

    pub async fn touch(&self, room_id: &str) -> ChatResult<()> {
        let _writer = self.locks.writer().await;
        let mut conn = self.pool.acquire().await?;
        find_room(&mut conn, room_id).await?;
        RoomRepository::touch(&mut conn, room_id, self.clock.now()).await?;
        Ok(())
    }

    /// Record the externally issued call room a member started.
    pub async fn attach_video_room(
        &self,
        room_id: &str,
        video_room_id: &str,
        started_by: &str,
    ) -> ChatResult<Room> {
        if video_room_id.trim().is_empty() {
            return Err(ChatError::validation("video room id cannot be empty"));
        }

        let _room_guard = self.locks.rooms.lock(room_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let room = find_room(&mut tx, room_id).await?;
        PermissionChecker::require_active(&room)?;
        if !RoomRepository::is_member(&mut tx, room_id, started_by).await? {
            return Err(ChatError::not_member(room_id, started_by));
        }
        if !room.settings.video_call_enabled {
            return Err(ChatError::VideoCallsDisabled);
        }

        let session = VideoSession {
            provider: VIDEO_PROVIDER.to_string(),
            video_room_id: video_room_id.trim().to_string(),
            active: true,
            started_by: started_by.to_string(),
            started_at: self.clock.now(),
        };
        RoomRepository::set_video(&mut tx, room_id, &session).await?;
        let room = find_room(&mut tx, room_id).await?;
        tx.commit().await?;

        info!(room_id, video_room_id = %session.video_room_id, started_by, "attached video room");
        Ok(room)
    }

    pub async fn end_video_call(&self, room_id: &str, caller_id: &str) -> ChatResult<Room> {
        let _room_guard = self.locks.rooms.lock(room_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let room = find_room(&mut tx, room_id).await?;
        PermissionChecker::require_room_admin(&room, caller_id, "end the video call")?;
        let mut session = match room.video {
            Some(session) if session.active => session,
            _ => return Err(ChatError::NoActiveCall),
        };
        session.active = false;

        RoomRepository::set_video(&mut tx, room_id, &session).await?;
        let room = find_room(&mut tx, room_id).await?;
        tx.commit().await?;

        info!(room_id, caller_id, "ended video call");
        Ok(room)
    }

    fn settings_from_input(
        &self,
        input: &RoomSettingsInput,
        current: Option<&RoomSettings>,
    ) -> ChatResult<RoomSettings> {
        let base = current.cloned().unwrap_or_else(|| RoomSettings {
            max_members: self.config.default_max_members,
            max_video_participants: self.config.max_video_participants,
            ..RoomSettings::default()
        });
        let settings = RoomSettings {
            max_members: input.max_members.unwrap_or(base.max_members),
            is_private: input.is_private.unwrap_or(base.is_private),
            allow_file_sharing: input.allow_file_sharing.unwrap_or(base.allow_file_sharing),
            video_call_enabled: input.video_call_enabled.unwrap_or(base.video_call_enabled),
            max_video_participants: input
                .max_video_participants
                .unwrap_or(base.max_video_participants),
        };
        Validator::capacity(settings.max_members)?;
        Ok(settings)
    }
}

pub(crate) async fn find_room(conn: &mut SqliteConnection, room_id: &str) -> ChatResult<Room> {
    RoomRepository::find_by_id(conn, room_id)
        .await?
        .ok_or_else(|| ChatError::room_not_found(room_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Fixture;
    use crate::types::ErrorKind;

    #[tokio::test]
    async fn create_adds_admin_and_rejects_duplicate_names() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let ws = fx.workspace("Acme", &alice).await;

        let room = fx.room(&ws, "general", &alice, None).await;
        assert_eq!(room.member_count, 1);
        assert_eq!(room.admin_id, alice);
        assert!(fx.services.rooms.is_member(&room.id, &alice).await.unwrap());
        assert!(fx.services.rooms.is_admin(&room.id, &alice).await.unwrap());

        let err = fx
            .services
            .rooms
            .create(
                CreateRoomRequest {
                    workspace_id: ws.clone(),
                    name: "general".into(),
                    description: None,
                    settings: Default::default(),
                },
                &alice,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::DuplicateRoomName { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn create_requires_known_workspace_membership() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let mallory = fx.user("mallory").await;
        let ws = fx.workspace("Acme", &alice).await;

        let request = |workspace_id: &str| CreateRoomRequest {
            workspace_id: workspace_id.into(),
            name: "general".into(),
            description: None,
            settings: Default::default(),
        };

        let err = fx.services.rooms.create(request("missing"), &alice).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = fx.services.rooms.create(request(&ws), &mallory).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn capacity_is_enforced_on_join() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let c = fx.user("carol").await;
        let ws = fx.workspace("Acme", &a).await;
        let room = fx.room(&ws, "tiny", &a, Some(2)).await;

        let room_after_b = fx.services.rooms.join(&room.id, &b).await.unwrap();
        assert_eq!(room_after_b.member_count, 2);

        let err = fx.services.rooms.join(&room.id, &c).await.unwrap_err();
        assert!(matches!(err, ChatError::RoomFull { capacity: 2, .. }));
        assert_eq!(fx.services.rooms.get(&room.id).await.unwrap().member_count, 2);

        let err = fx.services.rooms.join(&room.id, &b).await.unwrap_err();
        assert!(matches!(err, ChatError::AlreadyMember { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_never_exceed_capacity() {
        let fx = Fixture::on_disk().await;
        let admin = fx.user("admin").await;
        let ws = fx.workspace("Acme", &admin).await;
        let room = fx.room(&ws, "lobby", &admin, Some(4)).await;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..10 {
            let rooms = fx.services.rooms.clone();
            let room_id = room.id.clone();
            tasks.spawn(async move { rooms.join(&room_id, &format!("user-{i}")).await });
        }

        let mut joined = 0;
        let mut full = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => joined += 1,
                Err(ChatError::RoomFull { .. }) => full += 1,
                Err(other) => panic!("unexpected error {other}"),
            }
        }

        assert_eq!(joined, 3);
        assert_eq!(full, 7);
        assert_eq!(fx.services.rooms.get(&room.id).await.unwrap().member_count, 4);
    }

    #[tokio::test]
    async fn admin_cannot_leave_but_members_can() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let ws = fx.workspace("Acme", &a).await;
        let room = fx.room(&ws, "general", &a, None).await;
        fx.services.rooms.join(&room.id, &b).await.unwrap();

        let err = fx.services.rooms.leave(&room.id, &a).await.unwrap_err();
        assert!(matches!(err, ChatError::AdminCannotLeave));

        fx.services.rooms.leave(&room.id, &b).await.unwrap();
        let err = fx.services.rooms.leave(&room.id, &b).await.unwrap_err();
        assert!(matches!(err, ChatError::NotMember { .. }));
    }

    #[tokio::test]
    async fn transfer_admin_requires_current_admin_and_member_target() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let c = fx.user("carol").await;
        let ws = fx.workspace("Acme", &a).await;
        let room = fx.room(&ws, "general", &a, None).await;
        fx.services.rooms.join(&room.id, &b).await.unwrap();

        let err = fx.services.rooms.transfer_admin(&room.id, &b, &b).await.unwrap_err();
        assert!(matches!(err, ChatError::NotRoomAdmin { .. }));
        let err = fx.services.rooms.transfer_admin(&room.id, &a, &c).await.unwrap_err();
        assert!(matches!(err, ChatError::NotMember { .. }));

        let room = fx.services.rooms.transfer_admin(&room.id, &a, &b).await.unwrap();
        assert_eq!(room.admin_id, b);
        fx.services.rooms.leave(&room.id, &a).await.unwrap();
    }

    #[tokio::test]
    async fn deleted_room_rejects_joins_and_leaves_back_references() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let c = fx.user("carol").await;
        let ws = fx.workspace("Acme", &a).await;
        let room = fx.room(&ws, "general", &a, None).await;
        fx.services.rooms.join(&room.id, &b).await.unwrap();

        let err = fx.services.rooms.delete(&room.id, &b).await.unwrap_err();
        assert!(matches!(err, ChatError::NotRoomAdmin { .. }));

        let room = fx.services.rooms.delete(&room.id, &a).await.unwrap();
        assert_eq!(room.status, RoomStatus::Deactivated);

        let err = fx.services.rooms.join(&room.id, &c).await.unwrap_err();
        assert!(matches!(err, ChatError::RoomInactive { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        for user in [&a, &b] {
            let profile = fx.services.accounts.profile(user).await.unwrap();
            assert!(!profile.room_ids.contains(&room.id));
            assert!(!profile.admin_room_ids.contains(&room.id));
        }
        assert!(fx.services.rooms.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_checks_name_and_capacity() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let ws = fx.workspace("Acme", &a).await;
        let general = fx.room(&ws, "general", &a, None).await;
        fx.room(&ws, "random", &a, None).await;
        fx.services.rooms.join(&general.id, &b).await.unwrap();

        let rename = UpdateRoomRequest {
            name: Some("random".into()),
            ..Default::default()
        };
        let err = fx.services.rooms.update(&general.id, &a, rename).await.unwrap_err();
        assert!(matches!(err, ChatError::DuplicateRoomName { .. }));

        let shrink = UpdateRoomRequest {
            settings: RoomSettingsInput {
                max_members: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = fx.services.rooms.update(&general.id, &a, shrink).await.unwrap_err();
        assert!(matches!(err, ChatError::CapacityBelowMembers { members: 2, .. }));

        let ok = UpdateRoomRequest {
            name: Some("general-chat".into()),
            description: Some("everything else".into()),
            settings: RoomSettingsInput {
                is_private: Some(true),
                ..Default::default()
            },
        };
        let room = fx.services.rooms.update(&general.id, &a, ok).await.unwrap();
        assert_eq!(room.name, "general-chat");
        assert!(room.settings.is_private);
        assert!(fx.services.rooms.list_public().await.unwrap().iter().all(|r| r.id != room.id));
    }

    #[tokio::test]
    async fn video_hooks_follow_room_rules() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let ws = fx.workspace("Acme", &a).await;
        let room = fx.room(&ws, "general", &a, None).await;

        let err = fx.services.rooms.attach_video_room(&room.id, "call-1", &b).await.unwrap_err();
        assert!(matches!(err, ChatError::NotMember { .. }));

        fx.services.rooms.join(&room.id, &b).await.unwrap();
        let room = fx.services.rooms.attach_video_room(&room.id, "call-1", &b).await.unwrap();
        let video = room.video.clone().unwrap();
        assert!(video.active);
        assert_eq!(video.started_by, b);

        let err = fx.services.rooms.end_video_call(&room.id, &b).await.unwrap_err();
        assert!(matches!(err, ChatError::NotRoomAdmin { .. }));
        let room = fx.services.rooms.end_video_call(&room.id, &a).await.unwrap();
        assert!(!room.video.unwrap().active);

        let err = fx.services.rooms.end_video_call(&room.id, &a).await.unwrap_err();
        assert!(matches!(err, ChatError::NoActiveCall));
    }

    #[tokio::test]
    async fn search_and_listing_views() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let ws = fx.workspace("Acme", &a).await;
        let design = fx.room(&ws, "Design Review", &a, None).await;
        let random = fx.room(&ws, "random", &a, None).await;
        fx.services.rooms.join(&random.id, &b).await.unwrap();

        let hits = fx.services.rooms.search("DESIGN").await.unwrap();
        assert_eq!(hits.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec![design.id.as_str()]);

        let popular = fx.services.rooms.popular(1).await.unwrap();
        assert_eq!(popular[0].id, random.id);

        let mine = fx.services.rooms.list_for_user(&b).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(fx.services.rooms.list_admin_rooms(&a).await.unwrap().len(), 2);
        assert_eq!(fx.services.rooms.members(&random.id).await.unwrap(), vec![a.clone(), b.clone()]);
    }
}
