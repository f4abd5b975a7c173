//! Workspaces, invites and the invite-to-room membership cascade.
//!
//! Accepting an invite (or a privileged direct add) puts the user in the
//! workspace and in every room that is active in it at that moment. The
//! whole unit runs under the workspace lock, with every room lock held, in
//! one transaction; a full room aborts it without writing anything.

use crate::services::room_roster::find_room;
use crate::types::{CascadeOutcome, ChatError, ChatResult};
use crate::utils::{ids, Clock, EngineLocks, Validator};
use chrono::Duration;
use parley_auth::SystemGrant;
use parley_config::InvitesConfig;
use parley_database::{
    DatabaseError, InviteRepository, InviteStatus, NewWorkspace, RoomRepository, SqliteConnection,
    UserRepository, Workspace, WorkspaceInvite, WorkspaceMember, WorkspaceRepository,
    WorkspaceRole,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

const INVITE_CODE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct WorkspaceCascade {
    pool: SqlitePool,
    locks: EngineLocks,
    clock: Arc<dyn Clock>,
    config: InvitesConfig,
}

impl WorkspaceCascade {
    pub fn new(
        pool: SqlitePool,
        locks: EngineLocks,
        clock: Arc<dyn Clock>,
        config: InvitesConfig,
    ) -> Self {
        Self {
            pool,
            locks,
            clock,
            config,
        }
    }

    pub async fn create_workspace(
        &self,
        name: &str,
        description: Option<String>,
        admin_id: &str,
    ) -> ChatResult<Workspace> {
        let name = name.trim().to_string();
        Validator::workspace_name(&name)?;
        Validator::description(description.as_deref())?;

        let mut tx = self.locks.begin_write(&self.pool).await?;
        UserRepository::find_by_id(&mut tx, admin_id)
            .await?
            .ok_or_else(|| ChatError::user_not_found(admin_id))?;
        if WorkspaceRepository::name_taken(&mut tx, &name).await? {
            return Err(ChatError::DuplicateWorkspaceName { name });
        }

        let mut invite_code = None;
        for _ in 0..INVITE_CODE_ATTEMPTS {
            let candidate = ids::new_invite_code();
            if !WorkspaceRepository::invite_code_taken(&mut tx, &candidate).await? {
                invite_code = Some(candidate);
                break;
            }
        }
        let invite_code = invite_code.ok_or_else(|| {
            DatabaseError::UniqueViolation("could not allocate a free invite code".to_string())
        })?;

        let now = self.clock.now();
        let workspace = WorkspaceRepository::insert(
            &mut tx,
            &NewWorkspace {
                id: ids::new_id(),
                name: name.clone(),
                description,
                admin_id: admin_id.to_string(),
                invite_code,
                created_at: now,
            },
        )
        .await
        .map_err(|err| {
            if err.is_unique_violation() {
                ChatError::DuplicateWorkspaceName { name: name.clone() }
            } else {
                err.into()
            }
        })?;
        WorkspaceRepository::upsert_member(
            &mut tx,
            &ids::new_id(),
            &workspace.id,
            admin_id,
            WorkspaceRole::Admin,
            now,
        )
        .await?;
        UserRepository::adopt_workspace_if_unset(&mut tx, admin_id, &workspace.id).await?;
        tx.commit().await?;

        Ok(workspace)
    }

    pub async fn get_workspace(&self, workspace_id: &str) -> ChatResult<Workspace> {
        let mut conn = self.pool.acquire().await?;
        find_workspace(&mut conn, workspace_id).await
    }

    pub async fn find_by_invite_code(&self, code: &str) -> ChatResult<Workspace> {
        let code = code.trim().to_ascii_uppercase();
        let mut conn = self.pool.acquire().await?;
        WorkspaceRepository::find_by_invite_code(&mut conn, &code)
            .await?
            .filter(|workspace| workspace.active)
            .ok_or_else(|| ChatError::workspace_not_found(code))
    }

    pub async fn user_workspaces(&self, user_id: &str) -> ChatResult<Vec<Workspace>> {
        let mut conn = self.pool.acquire().await?;
        Ok(WorkspaceRepository::list_for_user(&mut conn, user_id).await?)
    }

    pub async fn admin_workspaces(&self, user_id: &str) -> ChatResult<Vec<Workspace>> {
        let mut conn = self.pool.acquire().await?;
        Ok(WorkspaceRepository::list_admin(&mut conn, user_id).await?)
    }

    pub async fn is_workspace_admin(&self, workspace_id: &str, user_id: &str) -> ChatResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(active_role(&mut conn, workspace_id, user_id).await? == Some(WorkspaceRole::Admin))
    }

    pub async fn is_workspace_member(&self, workspace_id: &str, user_id: &str) -> ChatResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(active_role(&mut conn, workspace_id, user_id).await?.is_some())
    }

    /// Active members, visible to other members only.
    pub async fn members(
        &self,
        workspace_id: &str,
        requester_id: &str,
    ) -> ChatResult<Vec<WorkspaceMember>> {
        let mut conn = self.pool.acquire().await?;
        find_workspace(&mut conn, workspace_id).await?;
        if active_role(&mut conn, workspace_id, requester_id).await?.is_none() {
            return Err(ChatError::NotWorkspaceMember {
                workspace_id: workspace_id.to_string(),
                user_id: requester_id.to_string(),
            });
        }
        Ok(WorkspaceRepository::active_members(&mut conn, workspace_id).await?)
    }

    pub async fn member_count(&self, workspace_id: &str) -> ChatResult<i64> {
        let mut conn = self.pool.acquire().await?;
        find_workspace(&mut conn, workspace_id).await?;
        Ok(WorkspaceRepository::active_member_count(&mut conn, workspace_id).await?)
    }

    pub async fn room_ids_in_workspace(&self, workspace_id: &str) -> ChatResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        Ok(RoomRepository::active_ids_in_workspace(&mut conn, workspace_id).await?)
    }

    /// Soft-remove a member and drop them from the workspace's rooms they do not administer.
    /// Deactivate a membership and drop the user from the workspace's rooms.
    /// Returns the ids of the rooms the user was removed from.
    pub async fn remove_member(
        &self,
        workspace_id: &str,
        requester_id: &str,
        user_id: &str,
    ) -> ChatResult<Vec<String>> {
        let _workspace_guard = self.locks.workspaces.lock(workspace_id).await;
        let room_ids = self.room_ids_in_workspace(workspace_id).await?;
        let _room_guards = self.locks.rooms.lock_all(&room_ids).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let workspace = find_workspace(&mut tx, workspace_id).await?;
        require_workspace_admin(&mut tx, workspace_id, requester_id, "remove members").await?;
        if workspace.admin_id == user_id {
            return Err(ChatError::WorkspaceAdminCannotLeave);
        }
        if !WorkspaceRepository::deactivate_member(&mut tx, workspace_id, user_id).await? {
            return Err(ChatError::NotWorkspaceMember {
                workspace_id: workspace_id.to_string(),
                user_id: user_id.to_string(),
            });
        }

        let mut removed_from = Vec::new();
        for room_id in &room_ids {
            let room = find_room(&mut tx, room_id).await?;
            if room.admin_id != user_id
                && RoomRepository::remove_member(&mut tx, room_id, user_id).await?
            {
                removed_from.push(room.id);
            }
        }

        let user = UserRepository::find_by_id(&mut tx, user_id).await?;
        if user.and_then(|u| u.current_workspace_id).as_deref() == Some(workspace_id) {
            let next = WorkspaceRepository::list_for_user(&mut tx, user_id)
                .await?
                .into_iter()
                .next()
                .map(|w| w.id);
            UserRepository::set_current_workspace(&mut tx, user_id, next.as_deref()).await?;
        }
        tx.commit().await?;

        info!(workspace_id, user_id, requester_id, rooms = removed_from.len(), "removed workspace member");
        Ok(removed_from)
    }

    pub async fn create_invite(
        &self,
        workspace_id: &str,
        email: &str,
        inviter_id: &str,
    ) -> ChatResult<WorkspaceInvite> {
        let email = Validator::normalize_email(email);
        Validator::email(&email)?;

        let _workspace_guard = self.locks.workspaces.lock(workspace_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        find_workspace(&mut tx, workspace_id).await?;
        require_workspace_admin(&mut tx, workspace_id, inviter_id, "invite members").await?;

        if let Some(user) = UserRepository::find_by_email(&mut tx, &email).await? {
            if active_role(&mut tx, workspace_id, &user.id).await?.is_some() {
                return Err(ChatError::AlreadyMember { user_id: user.id });
            }
        }

        let now = self.clock.now();
        if let Some(existing) = InviteRepository::find_pending(&mut tx, workspace_id, &email).await? {
            if existing.is_valid_at(now) {
                return Err(ChatError::AlreadyInvited { email });
            }
            InviteRepository::set_status(&mut tx, &existing.id, InviteStatus::Expired, None).await?;
            debug!(invite_id = %existing.id, "expired stale invite before re-inviting");
        }

        let invite = self.fresh_invite(workspace_id, &email, inviter_id);
        InviteRepository::insert(&mut tx, &invite).await?;
        tx.commit().await?;
        Ok(invite)
    }

    /// Cancel a pending invite and issue a replacement with a new deadline.
    pub async fn resend_invite(
        &self,
        invite_id: &str,
        requester_id: &str,
    ) -> ChatResult<WorkspaceInvite> {
        let workspace_id = self.invite_workspace(invite_id).await?;
        let _workspace_guard = self.locks.workspaces.lock(&workspace_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let old = find_invite(&mut tx, invite_id).await?;
        require_workspace_admin(&mut tx, &old.workspace_id, requester_id, "resend invites").await?;
        if old.status != InviteStatus::Pending {
            return Err(ChatError::InviteNotPending { status: old.status });
        }

        InviteRepository::set_status(&mut tx, &old.id, InviteStatus::Cancelled, None).await?;
        let invite = self.fresh_invite(&old.workspace_id, &old.email, requester_id);
        InviteRepository::insert(&mut tx, &invite).await?;
        tx.commit().await?;

        info!(old_invite_id = %old.id, invite_id = %invite.id, "resent workspace invite");
        Ok(invite)
    }

    /// Remove an invite outright.
    pub async fn cancel_invite(&self, invite_id: &str, requester_id: &str) -> ChatResult<()> {
        let workspace_id = self.invite_workspace(invite_id).await?;
        let _workspace_guard = self.locks.workspaces.lock(&workspace_id).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;

        let invite = find_invite(&mut tx, invite_id).await?;
        require_workspace_admin(&mut tx, &invite.workspace_id, requester_id, "cancel invites")
            .await?;
        InviteRepository::delete(&mut tx, invite_id).await?;
        tx.commit().await?;

        info!(invite_id, requester_id, "cancelled workspace invite");
        Ok(())
    }

    /// Invites of a workspace, newest first, with expiry applied to their status.
    pub async fn list_invites(
        &self,
        workspace_id: &str,
        requester_id: &str,
    ) -> ChatResult<Vec<WorkspaceInvite>> {
        let mut conn = self.pool.acquire().await?;
        find_workspace(&mut conn, workspace_id).await?;
        require_workspace_admin(&mut conn, workspace_id, requester_id, "list invites").await?;

        let now = self.clock.now();
        let invites = InviteRepository::list_for_workspace(&mut conn, workspace_id).await?;
        Ok(invites
            .into_iter()
            .map(|mut invite| {
                invite.status = invite.effective_status(now);
                invite
            })
            .collect())
    }

    pub async fn find_pending_invite_by_email(
        &self,
        email: &str,
    ) -> ChatResult<Option<WorkspaceInvite>> {
        let email = Validator::normalize_email(email);
        let now = self.clock.now();
        let pending = {
            let mut conn = self.pool.acquire().await?;
            InviteRepository::pending_for_email(&mut conn, &email).await?
        };
        let (valid, stale): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|invite| invite.is_valid_at(now));

        if !stale.is_empty() {
            let _writer = self.locks.writer().await;
            let mut conn = self.pool.acquire().await?;
            for invite in &stale {
                InviteRepository::set_status(&mut conn, &invite.id, InviteStatus::Expired, None)
                    .await?;
                debug!(invite_id = %invite.id, "expired stale invite on read");
            }
        }
        Ok(valid.into_iter().next())
    }

    /// The newest valid invite for `email` together with its (active) workspace.
    pub async fn verify_email_invite(
        &self,
        email: &str,
    ) -> ChatResult<Option<(WorkspaceInvite, Workspace)>> {
        let Some(invite) = self.find_pending_invite_by_email(email).await? else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        let workspace = WorkspaceRepository::find_by_id(&mut conn, &invite.workspace_id)
            .await?
            .filter(|workspace| workspace.active);
        Ok(workspace.map(|workspace| (invite, workspace)))
    }

    pub async fn pending_invite_count(&self, workspace_id: &str) -> ChatResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Ok(InviteRepository::count_valid(&mut conn, workspace_id, self.clock.now()).await?)
    }

    /// Delete invites that can no longer be accepted.
    pub async fn cleanup_expired_invites(&self) -> ChatResult<u64> {
        let _writer = self.locks.writer().await;
        let mut conn = self.pool.acquire().await?;
        let removed = InviteRepository::delete_settled(&mut conn, self.clock.now()).await?;
        info!(removed, "cleaned up settled invites");
        Ok(removed)
    }

    /// Accept an invite on behalf of `user_id`, joining the workspace and all its active rooms.
    pub async fn accept_invite(&self, invite_id: &str, user_id: &str) -> ChatResult<CascadeOutcome> {
        let workspace_id = self.invite_workspace(invite_id).await?;
        self.cascade(&workspace_id, user_id, Some(invite_id)).await
    }

    /// Privileged direct add; runs the same room cascade as an accepted invite.
    pub async fn add_member(
        &self,
        _grant: &SystemGrant,
        workspace_id: &str,
        user_id: &str,
    ) -> ChatResult<CascadeOutcome> {
        self.cascade(workspace_id, user_id, None).await
    }

    async fn cascade(
        &self,
        workspace_id: &str,
        user_id: &str,
        invite_id: Option<&str>,
    ) -> ChatResult<CascadeOutcome> {
        let _workspace_guard = self.locks.workspaces.lock(workspace_id).await;
        // Room creation needs the workspace lock, so this list cannot grow until we are done.
        let room_ids = self.room_ids_in_workspace(workspace_id).await?;
        let _room_guards = self.locks.rooms.lock_all(&room_ids).await;
        let mut tx = self.locks.begin_write(&self.pool).await?;
        let now = self.clock.now();

        let invite = match invite_id {
            Some(invite_id) => {
                let invite = find_invite(&mut tx, invite_id).await?;
                match invite.effective_status(now) {
                    InviteStatus::Pending => Some(invite),
                    InviteStatus::Expired => {
                        if invite.status == InviteStatus::Pending {
                            InviteRepository::set_status(
                                &mut tx,
                                invite_id,
                                InviteStatus::Expired,
                                None,
                            )
                            .await?;
                            tx.commit().await?;
                        }
                        return Err(ChatError::InviteExpired);
                    }
                    status => return Err(ChatError::InviteNotPending { status }),
                }
            }
            None => None,
        };

        let user = UserRepository::find_by_id(&mut tx, user_id)
            .await?
            .ok_or_else(|| ChatError::user_not_found(user_id))?;
        if let Some(invite) = &invite {
            if invite.email != Validator::normalize_email(&user.email) {
                return Err(ChatError::InviteEmailMismatch);
            }
        }
        find_workspace(&mut tx, workspace_id).await?;
        if active_role(&mut tx, workspace_id, user_id).await?.is_some() {
            return Err(ChatError::AlreadyMember {
                user_id: user_id.to_string(),
            });
        }

        let invite = match invite {
            Some(mut invite) => {
                InviteRepository::set_status(&mut tx, &invite.id, InviteStatus::Accepted, Some(now))
                    .await?;
                invite.status = InviteStatus::Accepted;
                invite.used_at = Some(now);
                Some(invite)
            }
            None => None,
        };

        let membership = WorkspaceRepository::upsert_member(
            &mut tx,
            &ids::new_id(),
            workspace_id,
            user_id,
            WorkspaceRole::Member,
            now,
        )
        .await?;
        UserRepository::adopt_workspace_if_unset(&mut tx, user_id, workspace_id).await?;

        let mut joined_room_ids = Vec::new();
        let mut already_member_room_ids = Vec::new();
        for room_id in &room_ids {
            let room = find_room(&mut tx, room_id).await?;
            if !room.is_active() {
                continue;
            }
            if RoomRepository::is_member(&mut tx, room_id, user_id).await? {
                already_member_room_ids.push(room.id);
                continue;
            }
            if room.is_full() {
                return Err(ChatError::RoomFull {
                    room_id: room.id,
                    capacity: room.settings.max_members,
                });
            }
            RoomRepository::add_member(&mut tx, room_id, user_id, now).await?;
            joined_room_ids.push(room.id);
        }
        tx.commit().await?;

        info!(
            workspace_id,
            user_id,
            invite_id = invite.as_ref().map(|i| i.id.as_str()),
            joined = joined_room_ids.len(),
            "workspace cascade complete"
        );
        Ok(CascadeOutcome {
            invite,
            membership,
            joined_room_ids,
            already_member_room_ids,
        })
    }

    async fn invite_workspace(&self, invite_id: &str) -> ChatResult<String> {
        let mut conn = self.pool.acquire().await?;
        Ok(find_invite(&mut conn, invite_id).await?.workspace_id)
    }

    fn fresh_invite(&self, workspace_id: &str, email: &str, invited_by: &str) -> WorkspaceInvite {
        let now = self.clock.now();
        WorkspaceInvite {
            id: ids::new_id(),
            workspace_id: workspace_id.to_string(),
            email: email.to_string(),
            invited_by: invited_by.to_string(),
            invited_at: now,
            expires_at: now + Duration::days(i64::from(self.config.ttl_days)),
            status: InviteStatus::Pending,
            used_at: None,
        }
    }
}

async fn find_workspace(conn: &mut SqliteConnection, workspace_id: &str) -> ChatResult<Workspace> {
    WorkspaceRepository::find_by_id(conn, workspace_id)
        .await?
        .filter(|workspace| workspace.active)
        .ok_or_else(|| ChatError::workspace_not_found(workspace_id))
}

async fn find_invite(conn: &mut SqliteConnection, invite_id: &str) -> ChatResult<WorkspaceInvite> {
    InviteRepository::find_by_id(conn, invite_id)
        .await?
        .ok_or_else(|| ChatError::invite_not_found(invite_id))
}

async fn active_role(
    conn: &mut SqliteConnection,
    workspace_id: &str,
    user_id: &str,
) -> ChatResult<Option<WorkspaceRole>> {
    Ok(WorkspaceRepository::find_member(conn, workspace_id, user_id)
        .await?
        .filter(|member| member.active)
        .map(|member| member.role))
}

async fn require_workspace_admin(
    conn: &mut SqliteConnection,
    workspace_id: &str,
    user_id: &str,
    action: &'static str,
) -> ChatResult<()> {
    if active_role(conn, workspace_id, user_id).await? != Some(WorkspaceRole::Admin) {
        debug!(workspace_id, user_id, action, "rejected non-admin workspace action");
        return Err(ChatError::NotWorkspaceAdmin { action });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Fixture;
    use crate::types::{CreateRoomRequest, ErrorKind};
    use crate::utils::clock::MockClock;
    use chrono::{TimeZone, Utc};
    use parley_auth::SystemCapability;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// A mocked clock whose reading can be advanced by the test.
    fn stepping_clock(start: i64) -> (Arc<dyn Clock>, Arc<AtomicI64>) {
        let now = Arc::new(AtomicI64::new(start));
        let reading = now.clone();
        let mut clock = MockClock::new();
        clock.expect_now().returning(move || {
            Utc.timestamp_opt(reading.load(Ordering::SeqCst), 0)
                .single()
                .unwrap()
        });
        (Arc::new(clock), now)
    }

    const DAY: i64 = 86_400;

    #[tokio::test]
    async fn create_workspace_registers_admin_and_rejects_duplicates() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let ws = fx.services.workspaces.create_workspace("Acme", None, &a).await.unwrap();

        assert_eq!(ws.invite_code.len(), 8);
        assert!(fx.services.workspaces.is_workspace_admin(&ws.id, &a).await.unwrap());
        assert_eq!(fx.services.workspaces.member_count(&ws.id).await.unwrap(), 1);
        let by_code = fx
            .services
            .workspaces
            .find_by_invite_code(&ws.invite_code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(by_code.id, ws.id);

        let err = fx.services.workspaces.create_workspace("acme", None, &a).await.unwrap_err();
        assert!(matches!(err, ChatError::DuplicateWorkspaceName { .. }));
    }

    #[tokio::test]
    async fn accept_invite_cascades_into_every_active_room() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let ws = fx.workspace("Acme", &a).await;
        let general = fx.room(&ws, "general", &a, None).await;
        let random = fx.room(&ws, "random", &a, None).await;
        let retired = fx.room(&ws, "retired", &a, None).await;
        fx.services.rooms.delete(&retired.id, &a).await.unwrap();

        let invite = fx
            .services
            .workspaces
            .create_invite(&ws, "Bobby@Example.com ", &a)
            .await
            .unwrap();
        assert_eq!(invite.email, "bobby@example.com");

        let b = fx.user("bobby").await;
        let outcome = fx.services.workspaces.accept_invite(&invite.id, &b).await.unwrap();

        let mut expected = vec![general.id.clone(), random.id.clone()];
        expected.sort();
        assert_eq!(outcome.all_room_ids(), expected);
        assert_eq!(outcome.invite.unwrap().status, InviteStatus::Accepted);
        assert_eq!(outcome.membership.role, WorkspaceRole::Member);
        assert!(fx.services.rooms.is_member(&general.id, &b).await.unwrap());
        assert!(!fx.services.rooms.is_member(&retired.id, &b).await.unwrap());

        let profile = fx.services.accounts.profile(&b).await.unwrap();
        assert_eq!(profile.user.current_workspace_id.as_deref(), Some(ws.as_str()));
        assert_eq!(profile.workspace_ids, vec![ws.clone()]);

        let err = fx.services.workspaces.accept_invite(&invite.id, &b).await.unwrap_err();
        assert!(matches!(err, ChatError::InviteNotPending { status: InviteStatus::Accepted }));
    }

    #[tokio::test]
    async fn accept_invite_is_all_or_nothing_when_a_room_is_full() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let ws = fx.workspace("Acme", &a).await;
        let open = fx.room(&ws, "open", &a, None).await;
        let solo = fx.room(&ws, "solo", &a, Some(1)).await;

        let invite = fx.services.workspaces.create_invite(&ws, "bobby@example.com", &a).await.unwrap();
        let b = fx.user("bobby").await;

        let err = fx.services.workspaces.accept_invite(&invite.id, &b).await.unwrap_err();
        assert!(matches!(err, ChatError::RoomFull { ref room_id, .. } if *room_id == solo.id));

        assert!(!fx.services.rooms.is_member(&open.id, &b).await.unwrap());
        assert!(!fx.services.workspaces.is_workspace_member(&ws, &b).await.unwrap());
        let pending = fx.services.workspaces.find_pending_invite_by_email("bobby@example.com").await.unwrap();
        assert_eq!(pending.map(|i| i.id), Some(invite.id));
    }

    #[tokio::test]
    async fn invite_rules() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let ws = fx.workspace("Acme", &a).await;

        let err = fx.services.workspaces.create_invite(&ws, "x@y.com", &b).await.unwrap_err();
        assert!(matches!(err, ChatError::NotWorkspaceAdmin { .. }));

        let err = fx.services.workspaces.create_invite(&ws, "not-an-email", &a).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = fx
            .services
            .workspaces
            .create_invite(&ws, "alice@example.com", &a)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::AlreadyMember { .. }));

        fx.services.workspaces.create_invite(&ws, "x@y.com", &a).await.unwrap();
        let err = fx.services.workspaces.create_invite(&ws, "X@Y.com", &a).await.unwrap_err();
        assert!(matches!(err, ChatError::AlreadyInvited { .. }));
        assert_eq!(fx.services.workspaces.pending_invite_count(&ws).await.unwrap(), 1);

        let err = fx.services.workspaces.accept_invite("missing", &b).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn accept_requires_matching_email() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let m = fx.user("mallory").await;
        let ws = fx.workspace("Acme", &a).await;
        let invite = fx.services.workspaces.create_invite(&ws, "bobby@example.com", &a).await.unwrap();

        let err = fx.services.workspaces.accept_invite(&invite.id, &m).await.unwrap_err();
        assert!(matches!(err, ChatError::InviteEmailMismatch));
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn expired_invites_are_settled_lazily() {
        let (clock, now) = stepping_clock(1_700_000_000);
        let fx = Fixture::with_clock(clock).await;
        let a = fx.user("alice").await;
        let ws = fx.workspace("Acme", &a).await;
        let invite = fx.services.workspaces.create_invite(&ws, "bobby@example.com", &a).await.unwrap();
        assert_eq!(invite.expires_at - invite.invited_at, Duration::days(7));
        let b = fx.user("bobby").await;

        now.fetch_add(7 * DAY, Ordering::SeqCst);
        let err = fx.services.workspaces.accept_invite(&invite.id, &b).await.unwrap_err();
        assert!(matches!(err, ChatError::InviteExpired));
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let listed = fx.services.workspaces.list_invites(&ws, &a).await.unwrap();
        assert_eq!(listed[0].status, InviteStatus::Expired);
        assert_eq!(fx.services.workspaces.pending_invite_count(&ws).await.unwrap(), 0);

        // An expired invite no longer blocks a fresh one.
        let again = fx.services.workspaces.create_invite(&ws, "bobby@example.com", &a).await.unwrap();
        fx.services.workspaces.accept_invite(&again.id, &b).await.unwrap();

        assert_eq!(fx.services.workspaces.cleanup_expired_invites().await.unwrap(), 2);
        assert!(fx.services.workspaces.list_invites(&ws, &a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_pending_invite_is_expired_before_reinviting() {
        let (clock, now) = stepping_clock(1_700_000_000);
        let fx = Fixture::with_clock(clock).await;
        let a = fx.user("alice").await;
        let ws = fx.workspace("Acme", &a).await;
        let first = fx.services.workspaces.create_invite(&ws, "x@y.com", &a).await.unwrap();

        now.fetch_add(8 * DAY, Ordering::SeqCst);
        let second = fx.services.workspaces.create_invite(&ws, "x@y.com", &a).await.unwrap();
        assert_ne!(first.id, second.id);

        let statuses: Vec<_> = fx
            .services
            .workspaces
            .list_invites(&ws, &a)
            .await
            .unwrap()
            .into_iter()
            .map(|i| (i.id, i.status))
            .collect();
        assert!(statuses.contains(&(first.id, InviteStatus::Expired)));
        assert!(statuses.contains(&(second.id, InviteStatus::Pending)));
    }

    #[tokio::test]
    async fn resend_and_cancel() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let ws = fx.workspace("Acme", &a).await;
        let invite = fx.services.workspaces.create_invite(&ws, "x@y.com", &a).await.unwrap();

        let err = fx.services.workspaces.resend_invite(&invite.id, &b).await.unwrap_err();
        assert!(matches!(err, ChatError::NotWorkspaceAdmin { .. }));

        let fresh = fx.services.workspaces.resend_invite(&invite.id, &a).await.unwrap();
        assert_ne!(fresh.id, invite.id);
        let err = fx.services.workspaces.resend_invite(&invite.id, &a).await.unwrap_err();
        assert!(matches!(err, ChatError::InviteNotPending { status: InviteStatus::Cancelled }));

        let (verified, workspace) = fx
            .services
            .workspaces
            .verify_email_invite("x@y.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verified.id, fresh.id);
        assert_eq!(workspace.id, ws);

        fx.services.workspaces.cancel_invite(&fresh.id, &a).await.unwrap();
        assert!(fx.services.workspaces.verify_email_invite("x@y.com").await.unwrap().is_none());
        let err = fx.services.workspaces.cancel_invite(&fresh.id, &a).await.unwrap_err();
        assert!(matches!(err, ChatError::InviteNotFound { .. }));
    }

    #[tokio::test]
    async fn system_grant_adds_member_through_cascade() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let ws = fx.workspace("Acme", &a).await;
        let room = fx.room(&ws, "general", &a, None).await;

        let grant = SystemCapability::new(Some("ops".into())).verify("ops").unwrap();
        let outcome = fx.services.workspaces.add_member(&grant, &ws, &b).await.unwrap();
        assert!(outcome.invite.is_none());
        assert_eq!(outcome.joined_room_ids, vec![room.id.clone()]);

        let err = fx.services.workspaces.add_member(&grant, &ws, &b).await.unwrap_err();
        assert!(matches!(err, ChatError::AlreadyMember { .. }));
    }

    #[tokio::test]
    async fn remove_member_drops_rooms_and_reassigns_current_workspace() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let ws = fx.workspace("Acme", &a).await;
        let general = fx.room(&ws, "general", &a, None).await;
        let grant = SystemCapability::new(Some("ops".into())).verify("ops").unwrap();
        fx.services.workspaces.add_member(&grant, &ws, &b).await.unwrap();

        let err = fx.services.workspaces.remove_member(&ws, &b, &a).await.unwrap_err();
        assert!(matches!(err, ChatError::NotWorkspaceAdmin { .. }));
        let err = fx.services.workspaces.remove_member(&ws, &a, &a).await.unwrap_err();
        assert!(matches!(err, ChatError::WorkspaceAdminCannotLeave));

        let removed = fx.services.workspaces.remove_member(&ws, &a, &b).await.unwrap();
        assert_eq!(removed, vec![general.id.clone()]);
        assert!(!fx.services.workspaces.is_workspace_member(&ws, &b).await.unwrap());
        assert!(!fx.services.rooms.is_member(&general.id, &b).await.unwrap());
        let profile = fx.services.accounts.profile(&b).await.unwrap();
        assert!(profile.user.current_workspace_id.is_none());

        // Re-adding reactivates the same membership row.
        let outcome = fx.services.workspaces.add_member(&grant, &ws, &b).await.unwrap();
        assert!(outcome.membership.active);
        let members = fx.services.workspaces.members(&ws, &a).await.unwrap();
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn members_are_visible_to_members_only() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let m = fx.user("mallory").await;
        let ws = fx.workspace("Acme", &a).await;

        let err = fx.services.workspaces.members(&ws, &m).await.unwrap_err();
        assert!(matches!(err, ChatError::NotWorkspaceMember { .. }));
        assert_eq!(fx.services.workspaces.user_workspaces(&a).await.unwrap().len(), 1);
        assert_eq!(fx.services.workspaces.admin_workspaces(&m).await.unwrap().len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn room_creation_racing_a_cascade_never_leaves_a_gap() {
        let fx = Fixture::on_disk().await;
        let a = fx.user("alice").await;
        let mut cases = Vec::new();
        for i in 0..6 {
            let ws = fx.workspace(&format!("Team {i}"), &a).await;
            let general = fx.room(&ws, &format!("general {i}"), &a, None).await;
            let email = format!("guest{i}@example.com");
            let invite = fx.services.workspaces.create_invite(&ws, &email, &a).await.unwrap();
            let guest = fx.user(&format!("guest{i}")).await;
            cases.push((ws, general.id, invite.id, guest));
        }

        let mut tasks = tokio::task::JoinSet::new();
        for (i, (ws, _, invite_id, guest)) in cases.iter().enumerate() {
            let workspaces = fx.services.workspaces.clone();
            let rooms = fx.services.rooms.clone();
            let (ws, invite_id, guest, admin) = (ws.clone(), invite_id.clone(), guest.clone(), a.clone());
            tasks.spawn(async move {
                let create = rooms.create(
                    CreateRoomRequest {
                        workspace_id: ws,
                        name: format!("late {i}"),
                        description: None,
                        settings: Default::default(),
                    },
                    &admin,
                );
                let accept = workspaces.accept_invite(&invite_id, &guest);
                let (room, outcome) = tokio::join!(create, accept);
                (room.map(|room| room.id), outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(result) = tasks.join_next().await {
            let (room, outcome) = result.unwrap();
            results.push((room.unwrap(), outcome.unwrap()));
        }

        for (late_id, outcome) in results {
            let (_, general_id, _, guest) = cases
                .iter()
                .find(|(ws, ..)| *ws == outcome.workspace_id())
                .unwrap();
            assert!(fx.services.rooms.is_member(general_id, guest).await.unwrap());
            // Either the cascade saw the new room and joined it, or the room came after.
            let joined_late = fx.services.rooms.is_member(&late_id, guest).await.unwrap();
            assert_eq!(joined_late, outcome.joined_room_ids.contains(&late_id));
            let late = fx.services.rooms.get(&late_id).await.unwrap();
            assert_eq!(late.member_count, if joined_late { 2 } else { 1 });
        }
    }
}
