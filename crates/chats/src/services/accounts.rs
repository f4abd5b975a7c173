//! Registration, login and profiles.

use crate::services::membership_index::MembershipIndex;
use crate::services::workspace_cascade::WorkspaceCascade;
use crate::types::{AuthOutcome, ChatError, ChatResult, RegisterRequest, UserProfile};
use crate::utils::{ids, Clock, EngineLocks, Validator};
use parley_auth::{PasswordHasher, TokenValidator};
use parley_database::{NewUser, User, UserRepository};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

const WORKSPACE_NAME_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct AccountService {
    pool: SqlitePool,
    hasher: PasswordHasher,
    tokens: TokenValidator,
    cascade: WorkspaceCascade,
    index: MembershipIndex,
    locks: EngineLocks,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(
        pool: SqlitePool,
        locks: EngineLocks,
        tokens: TokenValidator,
        cascade: WorkspaceCascade,
        index: MembershipIndex,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            locks,
            hasher: PasswordHasher,
            tokens,
            cascade,
            index,
            clock,
        }
    }

    /// Create an account. A valid pending invite for the email is accepted on the
    /// spot; otherwise the user gets a personal workspace.
    pub async fn register(&self, request: RegisterRequest) -> ChatResult<AuthOutcome> {
        let username = request.username.trim().to_string();
        let email = Validator::normalize_email(&request.email);
        Validator::username(&username)?;
        Validator::email(&email)?;
        Validator::password(&request.password)?;
        let display_name = request
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        {
            let mut conn = self.pool.acquire().await?;
            if UserRepository::email_exists(&mut conn, &email).await? {
                return Err(ChatError::EmailTaken);
            }
            if UserRepository::username_exists(&mut conn, &username).await? {
                return Err(ChatError::UsernameTaken);
            }
        }

        let hasher = self.hasher;
        let password = request.password;
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;
        let user = {
            let _writer = self.locks.writer().await;
            let mut conn = self.pool.acquire().await?;
            let new_user = NewUser {
                id: ids::new_id(),
                username,
                email,
                display_name,
                password_hash,
            };
            match UserRepository::insert(&mut conn, &new_user, self.clock.now()).await {
                Ok(user) => user,
                // Lost a race with a concurrent registration.
                Err(err) if err.is_unique_violation() => {
                    return Err(
                        if UserRepository::email_exists(&mut conn, &new_user.email).await? {
                            ChatError::EmailTaken
                        } else {
                            ChatError::UsernameTaken
                        },
                    );
                }
                Err(err) => return Err(err.into()),
            }
        };
        info!(user_id = %user.id, username = %user.username, "registered user");

        let settled = self.settle_workspace(&user).await;
        let user = self.reload(&user.id).await?;
        let token = self.tokens.issue(&user.id, user.name())?;

        Ok(AuthOutcome {
            token,
            workspace_id: settled.workspace_id.or_else(|| user.current_workspace_id.clone()),
            invite_error: settled.invite_error,
            user,
        })
    }

    /// Authenticate by email or username.
    pub async fn login(&self, login: &str, password: &str) -> ChatResult<AuthOutcome> {
        let user = {
            let mut conn = self.pool.acquire().await?;
            UserRepository::find_by_login(&mut conn, login.trim())
                .await?
                .ok_or(ChatError::InvalidCredentials)?
        };

        let hasher = self.hasher;
        let password = password.to_string();
        let stored_hash = user.password_hash.clone();
        let verified =
            tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash)).await?;
        if !verified {
            warn!(user_id = %user.id, "rejected login with wrong password");
            return Err(ChatError::InvalidCredentials);
        }
        if !user.active {
            return Err(ChatError::AccountInactive);
        }

        {
            let _writer = self.locks.writer().await;
            let mut conn = self.pool.acquire().await?;
            UserRepository::record_login(&mut conn, &user.id, self.clock.now()).await?;
        }

        let token = self.tokens.issue(&user.id, user.name())?;
        info!(user_id = %user.id, "user logged in");
        Ok(AuthOutcome {
            token,
            workspace_id: user.current_workspace_id.clone(),
            invite_error: None,
            user,
        })
    }

    /// The user together with the back-references derived from the rosters.
    pub async fn profile(&self, user_id: &str) -> ChatResult<UserProfile> {
        let user = self.reload(user_id).await?;
        Ok(UserProfile {
            room_ids: self.index.joined_room_ids(user_id).await?,
            admin_room_ids: self.index.admin_room_ids(user_id).await?,
            workspace_ids: self.index.workspace_ids(user_id).await?,
            user,
        })
    }

    async fn reload(&self, user_id: &str) -> ChatResult<User> {
        let mut conn = self.pool.acquire().await?;
        UserRepository::find_by_id(&mut conn, user_id)
            .await?
            .ok_or_else(|| ChatError::user_not_found(user_id))
    }

    /// Join the inviting workspace, falling back to a personal one when there is
    /// no usable invite. Failures here leave the account in place.
    async fn settle_workspace(&self, user: &User) -> Settlement {
        let mut invite_error = None;
        match self.cascade.find_pending_invite_by_email(&user.email).await {
            Ok(Some(invite)) => match self.cascade.accept_invite(&invite.id, &user.id).await {
                Ok(outcome) => {
                    return Settlement {
                        workspace_id: Some(outcome.workspace_id().to_string()),
                        invite_error: None,
                    }
                }
                Err(err) => {
                    warn!(user_id = %user.id, invite_id = %invite.id, error = %err, "invite cascade failed during registration");
                    invite_error = Some(err.public_message());
                }
            },
            Ok(None) => {}
            Err(err) => {
                warn!(user_id = %user.id, error = %err, "invite lookup failed during registration");
            }
        }

        Settlement {
            workspace_id: self.personal_workspace(user).await,
            invite_error,
        }
    }

    async fn personal_workspace(&self, user: &User) -> Option<String> {
        let base = format!("{}'s Workspace", personal_name(user));
        for attempt in 1..=WORKSPACE_NAME_ATTEMPTS {
            let name = if attempt == 1 {
                base.clone()
            } else {
                format!("{base} {attempt}")
            };
            match self.cascade.create_workspace(&name, None, &user.id).await {
                Ok(workspace) => return Some(workspace.id),
                Err(ChatError::DuplicateWorkspaceName { .. }) => continue,
                Err(err) => {
                    warn!(user_id = %user.id, error = %err, "personal workspace creation failed");
                    return None;
                }
            }
        }

        warn!(user_id = %user.id, "no free personal workspace name");
        None
    }
}

struct Settlement {
    workspace_id: Option<String>,
    invite_error: Option<String>,
}

/// First word of the display name, or the username.
fn personal_name(user: &User) -> &str {
    user.display_name
        .as_deref()
        .and_then(|name| name.split_whitespace().next())
        .filter(|first| first.chars().count() <= 20)
        .unwrap_or(&user.username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Fixture;
    use crate::types::ErrorKind;

    fn request(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: "hunter22".into(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn register_creates_personal_workspace_and_valid_token() {
        let fx = Fixture::new().await;
        let outcome = fx
            .services
            .accounts
            .register(RegisterRequest {
                display_name: Some("Ada Lovelace".into()),
                ..request("ada", " Ada@Example.com")
            })
            .await
            .unwrap();

        assert_eq!(outcome.user.email, "ada@example.com");
        let ws_id = outcome.workspace_id.clone().unwrap();
        let ws = fx.services.workspaces.get_workspace(&ws_id).await.unwrap();
        assert_eq!(ws.name, "Ada's Workspace");
        assert_eq!(outcome.user.current_workspace_id, Some(ws_id));

        let identity = fx.tokens.validate(&outcome.token).unwrap();
        assert_eq!(identity.user_id, outcome.user.id);
        assert_eq!(identity.display_name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn register_rejects_taken_email_and_username() {
        let fx = Fixture::new().await;
        fx.services.accounts.register(request("ada", "ada@example.com")).await.unwrap();

        let err = fx
            .services
            .accounts
            .register(request("ada2", "ADA@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmailTaken));

        let err = fx
            .services
            .accounts
            .register(request("ada", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UsernameTaken));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn personal_workspace_name_collisions_get_a_suffix() {
        let fx = Fixture::new().await;
        let first = fx.services.accounts.register(request("sam", "sam@a.com")).await.unwrap();
        let second = fx
            .services
            .accounts
            .register(RegisterRequest {
                display_name: Some("Sam Other".into()),
                ..request("samuel", "sam@b.com")
            })
            .await
            .unwrap();

        let names: Vec<String> = [first, second]
            .iter()
            .map(|o| o.workspace_id.clone().unwrap())
            .collect();
        let a = fx.services.workspaces.get_workspace(&names[0]).await.unwrap();
        let b = fx.services.workspaces.get_workspace(&names[1]).await.unwrap();
        assert_eq!(a.name, "sam's Workspace");
        assert_eq!(b.name, "Sam's Workspace 2");
    }

    #[tokio::test]
    async fn login_by_email_or_username() {
        let fx = Fixture::new().await;
        let registered = fx.services.accounts.register(request("ada", "ada@example.com")).await.unwrap();

        let by_email = fx.services.accounts.login("ADA@example.com", "hunter22").await.unwrap();
        assert_eq!(by_email.user.id, registered.user.id);
        let by_name = fx.services.accounts.login("ada", "hunter22").await.unwrap();
        assert!(fx.tokens.validate(&by_name.token).is_some());

        let err = fx.services.accounts.login("ada", "wrong-pass").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidCredentials));
        let err = fx.services.accounts.login("nobody", "hunter22").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn profile_reports_back_references() {
        let fx = Fixture::new().await;
        let outcome = fx.services.accounts.register(request("ada", "ada@example.com")).await.unwrap();
        let ws = outcome.workspace_id.unwrap();
        let room = fx.room(&ws, "general", &outcome.user.id, None).await;

        let profile = fx.services.accounts.profile(&outcome.user.id).await.unwrap();
        assert_eq!(profile.room_ids, vec![room.id.clone()]);
        assert_eq!(profile.admin_room_ids, vec![room.id]);
        assert_eq!(profile.workspace_ids, vec![ws]);

        let err = fx.services.accounts.profile("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn failed_invite_cascade_falls_back_to_personal_workspace() {
        let fx = Fixture::new().await;
        let owner = fx.user("owner").await;
        let team = fx.workspace("Team", &owner).await;
        fx.room(&team, "solo", &owner, Some(1)).await;
        let invite = fx
            .services
            .workspaces
            .create_invite(&team, "ada@example.com", &owner)
            .await
            .unwrap();

        let outcome = fx.services.accounts.register(request("ada", "ada@example.com")).await.unwrap();

        let ws_id = outcome.workspace_id.clone().unwrap();
        assert_ne!(ws_id, team);
        let ws = fx.services.workspaces.get_workspace(&ws_id).await.unwrap();
        assert_eq!(ws.name, "ada's Workspace");
        assert_eq!(outcome.user.current_workspace_id, Some(ws_id));
        assert!(outcome.invite_error.as_deref().unwrap().contains("full"));

        assert!(!fx.services.workspaces.is_workspace_member(&team, &outcome.user.id).await.unwrap());
        let pending = fx.services.workspaces.find_pending_invite_by_email("ada@example.com").await.unwrap();
        assert_eq!(pending.map(|i| i.id), Some(invite.id));
    }

    #[tokio::test]
    async fn accepted_invite_reports_no_invite_error() {
        let fx = Fixture::new().await;
        let owner = fx.user("owner").await;
        let team = fx.workspace("Team", &owner).await;
        fx.services.workspaces.create_invite(&team, "ada@example.com", &owner).await.unwrap();

        let outcome = fx.services.accounts.register(request("ada", "ada@example.com")).await.unwrap();
        assert_eq!(outcome.workspace_id.as_deref(), Some(team.as_str()));
        assert!(outcome.invite_error.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_logins_do_not_starve_a_single_connection_pool() {
        let fx = Fixture::new().await;
        let registered = fx.services.accounts.register(request("ada", "ada@example.com")).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let accounts = fx.services.accounts.clone();
            tasks.spawn(async move { accounts.login("ada", "hunter22").await });
        }
        let rooms = fx.services.rooms.clone();
        let listing = tokio::time::timeout(std::time::Duration::from_secs(10), rooms.list_active())
            .await
            .expect("listing waited on password checks");
        assert!(listing.unwrap().is_empty());

        while let Some(result) = tasks.join_next().await {
            let outcome = result.unwrap().unwrap();
            assert_eq!(outcome.user.id, registered.user.id);
            assert!(outcome.invite_error.is_none());
        }
        let profile = fx.services.accounts.profile(&registered.user.id).await.unwrap();
        assert!(profile.user.last_login_at.is_some());
    }
}
