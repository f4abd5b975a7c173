//! Authentication REST endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use parley_auth::Identity;
use parley_chats::{AuthOutcome, RegisterRequest, UserProfile};
use parley_database::User;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::GatewayResult;
use crate::state::GatewayState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterBody {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginBody {
    /// Email or username.
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub current_workspace_id: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
    pub workspace_id: Option<String>,
    /// Set when a pending invite could not be accepted and a personal workspace was created instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub room_ids: Vec<String>,
    pub admin_room_ids: Vec<String>,
    pub workspace_ids: Vec<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            current_workspace_id: user.current_workspace_id,
            active: user.active,
            created_at: user.created_at.to_rfc3339(),
            last_login_at: user.last_login_at.map(|at| at.to_rfc3339()),
        }
    }
}

impl From<AuthOutcome> for AuthResponse {
    fn from(outcome: AuthOutcome) -> Self {
        Self {
            token: outcome.token,
            user: outcome.user.into(),
            workspace_id: outcome.workspace_id,
            invite_error: outcome.invite_error,
        }
    }
}

impl From<UserProfile> for ProfileResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            user: profile.user.into(),
            room_ids: profile.room_ids,
            admin_room_ids: profile.admin_room_ids,
            workspace_ids: profile.workspace_ids,
        }
    }
}

/// Public routes: registration and login.
pub fn create_auth_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// Routes that need a bearer token.
pub fn create_profile_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/auth/me", get(me))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterBody,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 409, description = "Email or username taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<RegisterBody>,
) -> GatewayResult<(StatusCode, Json<AuthResponse>)> {
    let outcome = state
        .services
        .accounts
        .register(RegisterRequest {
            username: body.username,
            email: body.email,
            password: body.password,
            display_name: body.display_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(outcome.into())))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginBody,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 403, description = "Account inactive", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<LoginBody>,
) -> GatewayResult<Json<AuthResponse>> {
    let outcome = state
        .services
        .accounts
        .login(&body.login, &body.password)
        .await?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user with room and workspace references", body = ProfileResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<ProfileResponse>> {
    let profile = state.services.accounts.profile(&identity.user_id).await?;
    Ok(Json(profile.into()))
}
