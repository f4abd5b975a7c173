//! Workspace and invite REST endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use parley_auth::Identity;
use parley_chats::{CascadeOutcome, ChatEvent};
use parley_database::{Workspace, WorkspaceInvite, WorkspaceMember};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::error::GatewayResult;
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkspaceResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub admin_id: String,
    pub invite_code: String,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkspaceMemberResponse {
    pub workspace_id: String,
    pub user_id: String,
    /// `admin` or `member`.
    pub role: String,
    pub joined_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InviteResponse {
    pub id: String,
    pub workspace_id: String,
    pub email: String,
    pub invited_by: String,
    pub invited_at: String,
    pub expires_at: String,
    /// `pending`, `accepted`, `expired` or `cancelled`.
    pub status: String,
    pub used_at: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyInviteResponse {
    pub valid: bool,
    pub invite: Option<InviteResponse>,
    pub workspace: Option<WorkspaceResponse>,
}

/// What a user was added to when they joined a workspace.
#[derive(Debug, Serialize, ToSchema)]
pub struct CascadeResponse {
    pub workspace_id: String,
    pub invite: Option<InviteResponse>,
    pub joined_room_ids: Vec<String>,
    pub already_member_room_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWorkspaceBody {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInviteBody {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyInviteBody {
    pub email: String,
}

impl From<Workspace> for WorkspaceResponse {
    fn from(workspace: Workspace) -> Self {
        Self {
            id: workspace.id,
            name: workspace.name,
            description: workspace.description,
            admin_id: workspace.admin_id,
            invite_code: workspace.invite_code,
            active: workspace.active,
            created_at: workspace.created_at.to_rfc3339(),
        }
    }
}

impl From<WorkspaceMember> for WorkspaceMemberResponse {
    fn from(member: WorkspaceMember) -> Self {
        Self {
            role: member.role.as_str().to_string(),
            workspace_id: member.workspace_id,
            user_id: member.user_id,
            joined_at: member.joined_at.to_rfc3339(),
        }
    }
}

impl From<WorkspaceInvite> for InviteResponse {
    fn from(invite: WorkspaceInvite) -> Self {
        Self {
            status: invite.status.as_str().to_string(),
            id: invite.id,
            workspace_id: invite.workspace_id,
            email: invite.email,
            invited_by: invite.invited_by,
            invited_at: invite.invited_at.to_rfc3339(),
            expires_at: invite.expires_at.to_rfc3339(),
            used_at: invite.used_at.map(|at| at.to_rfc3339()),
        }
    }
}

impl From<CascadeOutcome> for CascadeResponse {
    fn from(outcome: CascadeOutcome) -> Self {
        Self {
            workspace_id: outcome.workspace_id().to_string(),
            invite: outcome.invite.map(Into::into),
            joined_room_ids: outcome.joined_room_ids,
            already_member_room_ids: outcome.already_member_room_ids,
        }
    }
}

/// Tell the rooms about their new member and the member about their rooms.
pub(crate) async fn publish_cascade(state: &GatewayState, user_id: &str, outcome: &CascadeOutcome) {
    for room_id in &outcome.joined_room_ids {
        state
            .dispatcher
            .emit(ChatEvent::MemberJoined {
                room_id: room_id.clone(),
                user_id: user_id.to_string(),
            })
            .await;
    }
    state
        .dispatcher
        .send_to_user(
            user_id,
            ChatEvent::WorkspaceJoined {
                workspace_id: outcome.workspace_id().to_string(),
                room_ids: outcome.all_room_ids(),
            },
        )
        .await;
    info!(
        user_id,
        workspace_id = outcome.workspace_id(),
        rooms = outcome.joined_room_ids.len(),
        "published workspace join"
    );
}

/// Create workspace and invite routes
pub fn create_workspace_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .route("/workspaces/:workspace_id", get(get_workspace))
        .route("/workspaces/:workspace_id/members", get(list_workspace_members))
        .route(
            "/workspaces/:workspace_id/members/:user_id",
            delete(remove_workspace_member),
        )
        .route(
            "/workspaces/:workspace_id/invites",
            get(list_invites).post(create_invite),
        )
        .route("/invites/verify", post(verify_invite))
        .route("/invites/:invite_id", delete(cancel_invite))
        .route("/invites/:invite_id/accept", post(accept_invite))
        .route("/invites/:invite_id/resend", post(resend_invite))
}

#[utoipa::path(
    get,
    path = "/api/workspaces",
    tag = "workspaces",
    responses((status = 200, description = "Workspaces the caller belongs to", body = Vec<WorkspaceResponse>))
)]
pub async fn list_workspaces(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<Vec<WorkspaceResponse>>> {
    let workspaces = state
        .services
        .workspaces
        .user_workspaces(&identity.user_id)
        .await?;
    Ok(Json(workspaces.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/api/workspaces",
    tag = "workspaces",
    request_body = CreateWorkspaceBody,
    responses(
        (status = 201, description = "Workspace created with the caller as admin", body = WorkspaceResponse),
        (status = 409, description = "Name taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_workspace(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateWorkspaceBody>,
) -> GatewayResult<(StatusCode, Json<WorkspaceResponse>)> {
    let workspace = state
        .services
        .workspaces
        .create_workspace(&body.name, body.description, &identity.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(workspace.into())))
}

#[utoipa::path(
    get,
    path = "/api/workspaces/{workspace_id}",
    tag = "workspaces",
    params(("workspace_id" = String, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Workspace", body = WorkspaceResponse),
        (status = 404, description = "Workspace not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_workspace(
    State(state): State<Arc<GatewayState>>,
    Path(workspace_id): Path<String>,
) -> GatewayResult<Json<WorkspaceResponse>> {
    Ok(Json(
        state.services.workspaces.get_workspace(&workspace_id).await?.into(),
    ))
}

#[utoipa::path(
    get,
    path = "/api/workspaces/{workspace_id}/members",
    tag = "workspaces",
    params(("workspace_id" = String, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Active members", body = Vec<WorkspaceMemberResponse>),
        (status = 403, description = "Caller is not a member", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_workspace_members(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(workspace_id): Path<String>,
) -> GatewayResult<Json<Vec<WorkspaceMemberResponse>>> {
    let members = state
        .services
        .workspaces
        .members(&workspace_id, &identity.user_id)
        .await?;
    Ok(Json(members.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    delete,
    path = "/api/workspaces/{workspace_id}/members/{user_id}",
    tag = "workspaces",
    params(
        ("workspace_id" = String, Path, description = "Workspace id"),
        ("user_id" = String, Path, description = "Member to remove")
    ),
    responses(
        (status = 204, description = "Member removed from the workspace and its rooms"),
        (status = 403, description = "Caller is not a workspace admin", body = crate::error::ErrorResponse),
        (status = 422, description = "The workspace admin cannot be removed", body = crate::error::ErrorResponse)
    )
)]
pub async fn remove_workspace_member(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path((workspace_id, user_id)): Path<(String, String)>,
) -> GatewayResult<StatusCode> {
    let removed_from = state
        .services
        .workspaces
        .remove_member(&workspace_id, &identity.user_id, &user_id)
        .await?;
    for room_id in removed_from {
        state
            .dispatcher
            .emit(ChatEvent::MemberLeft {
                room_id,
                user_id: user_id.clone(),
            })
            .await;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/workspaces/{workspace_id}/invites",
    tag = "invites",
    params(("workspace_id" = String, Path, description = "Workspace id")),
    responses(
        (status = 200, description = "Invites with their effective status", body = Vec<InviteResponse>),
        (status = 403, description = "Caller is not a workspace admin", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_invites(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(workspace_id): Path<String>,
) -> GatewayResult<Json<Vec<InviteResponse>>> {
    let invites = state
        .services
        .workspaces
        .list_invites(&workspace_id, &identity.user_id)
        .await?;
    Ok(Json(invites.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/api/workspaces/{workspace_id}/invites",
    tag = "invites",
    params(("workspace_id" = String, Path, description = "Workspace id")),
    request_body = CreateInviteBody,
    responses(
        (status = 201, description = "Invite created", body = InviteResponse),
        (status = 403, description = "Caller is not a workspace admin", body = crate::error::ErrorResponse),
        (status = 409, description = "Already a member or already invited", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_invite(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(workspace_id): Path<String>,
    Json(body): Json<CreateInviteBody>,
) -> GatewayResult<(StatusCode, Json<InviteResponse>)> {
    let invite = state
        .services
        .workspaces
        .create_invite(&workspace_id, &body.email, &identity.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(invite.into())))
}

#[utoipa::path(
    post,
    path = "/api/invites/verify",
    tag = "invites",
    request_body = VerifyInviteBody,
    responses((status = 200, description = "Whether a valid invite exists for the email", body = VerifyInviteResponse))
)]
pub async fn verify_invite(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<VerifyInviteBody>,
) -> GatewayResult<Json<VerifyInviteResponse>> {
    let response = match state
        .services
        .workspaces
        .verify_email_invite(&body.email)
        .await?
    {
        Some((invite, workspace)) => VerifyInviteResponse {
            valid: true,
            invite: Some(invite.into()),
            workspace: Some(workspace.into()),
        },
        None => VerifyInviteResponse {
            valid: false,
            invite: None,
            workspace: None,
        },
    };
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/invites/{invite_id}/accept",
    tag = "invites",
    params(("invite_id" = String, Path, description = "Invite id")),
    responses(
        (status = 200, description = "Joined the workspace and every active room", body = CascadeResponse),
        (status = 403, description = "Invite addressed to another email", body = crate::error::ErrorResponse),
        (status = 409, description = "Already a member, or a room is full", body = crate::error::ErrorResponse),
        (status = 422, description = "Invite expired or no longer pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn accept_invite(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(invite_id): Path<String>,
) -> GatewayResult<Json<CascadeResponse>> {
    let outcome = state
        .services
        .workspaces
        .accept_invite(&invite_id, &identity.user_id)
        .await?;
    publish_cascade(&state, &identity.user_id, &outcome).await;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    post,
    path = "/api/invites/{invite_id}/resend",
    tag = "invites",
    params(("invite_id" = String, Path, description = "Invite id")),
    responses(
        (status = 200, description = "Replacement invite with a fresh expiry", body = InviteResponse),
        (status = 403, description = "Caller is not a workspace admin", body = crate::error::ErrorResponse)
    )
)]
pub async fn resend_invite(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(invite_id): Path<String>,
) -> GatewayResult<Json<InviteResponse>> {
    let invite = state
        .services
        .workspaces
        .resend_invite(&invite_id, &identity.user_id)
        .await?;
    Ok(Json(invite.into()))
}

#[utoipa::path(
    delete,
    path = "/api/invites/{invite_id}",
    tag = "invites",
    params(("invite_id" = String, Path, description = "Invite id")),
    responses(
        (status = 204, description = "Invite cancelled"),
        (status = 403, description = "Caller is not a workspace admin", body = crate::error::ErrorResponse),
        (status = 404, description = "Invite not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_invite(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(invite_id): Path<String>,
) -> GatewayResult<StatusCode> {
    state
        .services
        .workspaces
        .cancel_invite(&invite_id, &identity.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::rest::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use parley_chats::{ChatEvent, Topic};
    use serde_json::json;

    #[tokio::test]
    async fn invite_then_register_joins_every_room() {
        let app = TestApp::new().await;
        let admin = app.register("alice").await;
        let general = app.create_room(&admin, "general", 10).await;
        let random = app.create_room(&admin, "random", 10).await;

        let (status, invite) = app
            .call(
                Method::POST,
                &format!("/api/workspaces/{}/invites", admin.workspace_id),
                Some(&admin.token),
                Some(json!({"email": "newbie@example.com"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{invite}");
        assert_eq!(invite["status"], "pending");

        let (status, verified) = app
            .call(
                Method::POST,
                "/api/invites/verify",
                Some(&admin.token),
                Some(json!({"email": "NEWBIE@example.com"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verified["valid"], true);

        let newbie = app.register("newbie").await;
        assert_eq!(newbie.workspace_id, admin.workspace_id);

        let (_, profile) = app.call(Method::GET, "/api/auth/me", Some(&newbie.token), None).await;
        let mut rooms: Vec<String> = serde_json::from_value(profile["room_ids"].clone()).unwrap();
        rooms.sort();
        let mut expected = vec![general, random];
        expected.sort();
        assert_eq!(rooms, expected);

        let (_, invites) = app
            .call(
                Method::GET,
                &format!("/api/workspaces/{}/invites", admin.workspace_id),
                Some(&admin.token),
                None,
            )
            .await;
        assert_eq!(invites[0]["status"], "accepted");
    }

    #[tokio::test]
    async fn only_admins_manage_invites() {
        let app = TestApp::new().await;
        let admin = app.register("alice").await;
        let other = app.register("bobby").await;

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/workspaces/{}/invites", admin.workspace_id),
                Some(&other.token),
                Some(json!({"email": "x@y.com"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

        let (_, invite) = app
            .call(
                Method::POST,
                &format!("/api/workspaces/{}/invites", admin.workspace_id),
                Some(&admin.token),
                Some(json!({"email": "x@y.com"})),
            )
            .await;
        let invite_id = invite["id"].as_str().unwrap();

        let (status, _) = app
            .call(Method::DELETE, &format!("/api/invites/{invite_id}"), Some(&other.token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .call(Method::DELETE, &format!("/api/invites/{invite_id}"), Some(&admin.token), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn accepting_someone_elses_invite_is_forbidden() {
        let app = TestApp::new().await;
        let admin = app.register("alice").await;
        let other = app.register("bobby").await;
        let (_, invite) = app
            .call(
                Method::POST,
                &format!("/api/workspaces/{}/invites", admin.workspace_id),
                Some(&admin.token),
                Some(json!({"email": "someone@else.com"})),
            )
            .await;

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/invites/{}/accept", invite["id"].as_str().unwrap()),
                Some(&other.token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    }

    #[tokio::test]
    async fn removing_a_member_announces_each_room_they_lose() {
        let app = TestApp::new().await;
        let admin = app.register("alice").await;
        let general = app.create_room(&admin, "general", 10).await;
        app.call(
            Method::POST,
            &format!("/api/workspaces/{}/invites", admin.workspace_id),
            Some(&admin.token),
            Some(json!({"email": "newbie@example.com"})),
        )
        .await;
        let newbie = app.register("newbie").await;
        let mut rx = app.state.dispatcher.subscribe(&Topic::Room(general.clone())).await;

        let (status, body) = app
            .call(
                Method::DELETE,
                &format!("/api/workspaces/{}/members/{}", admin.workspace_id, newbie.id),
                Some(&admin.token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT, "{body}");

        match rx.recv().await.unwrap() {
            ChatEvent::MemberLeft { room_id, user_id } => {
                assert_eq!(room_id, general);
                assert_eq!(user_id, newbie.id);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
