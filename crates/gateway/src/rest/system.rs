//! Privileged endpoints guarded by the system key.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::GatewayResult;
use crate::middleware::SYSTEM_KEY_HEADER;
use crate::rest::workspaces::{publish_cascade, CascadeResponse};
use crate::state::GatewayState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberBody {
    pub user_id: String,
}

pub fn create_system_routes() -> Router<Arc<GatewayState>> {
    Router::new().route(
        "/system/workspaces/:workspace_id/members",
        post(add_workspace_member),
    )
}

#[utoipa::path(
    post,
    path = "/api/system/workspaces/{workspace_id}/members",
    tag = "system",
    params(
        ("workspace_id" = String, Path, description = "Workspace id"),
        ("x-system-key" = String, Header, description = "Configured system key")
    ),
    request_body = AddMemberBody,
    responses(
        (status = 200, description = "User added to the workspace and all its active rooms", body = CascadeResponse),
        (status = 403, description = "Missing or wrong system key, or no key configured", body = crate::error::ErrorResponse),
        (status = 409, description = "Already a member, or a room is full", body = crate::error::ErrorResponse)
    )
)]
pub async fn add_workspace_member(
    State(state): State<Arc<GatewayState>>,
    Path(workspace_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddMemberBody>,
) -> GatewayResult<Json<CascadeResponse>> {
    let presented = headers
        .get(SYSTEM_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let grant = state.capability.verify(presented)?;

    let outcome = state
        .services
        .workspaces
        .add_member(&grant, &workspace_id, &body.user_id)
        .await?;
    publish_cascade(&state, &body.user_id, &outcome).await;
    Ok(Json(outcome.into()))
}
