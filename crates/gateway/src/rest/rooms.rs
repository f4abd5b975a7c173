//! Room REST endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use parley_auth::Identity;
use parley_chats::{ChatEvent, CreateRoomRequest, RoomSettingsInput, UpdateRoomRequest};
use parley_database::{Room, RoomSettings, VideoSession};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::error::GatewayResult;
use crate::state::GatewayState;

const DEFAULT_POPULAR_LIMIT: u32 = 10;

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomSettingsResponse {
    pub max_members: u32,
    pub is_private: bool,
    pub allow_file_sharing: bool,
    pub video_call_enabled: bool,
    pub max_video_participants: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VideoSessionResponse {
    pub provider: String,
    pub video_room_id: String,
    pub active: bool,
    pub started_by: String,
    pub started_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomResponse {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub description: Option<String>,
    pub admin_id: String,
    /// `active` or `deactivated`.
    pub status: String,
    pub settings: RoomSettingsResponse,
    pub video: Option<VideoSessionResponse>,
    pub member_count: i64,
    pub created_at: String,
    pub last_activity_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoomMembersResponse {
    pub room_id: String,
    pub member_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RoomSettingsBody {
    pub max_members: Option<u32>,
    pub is_private: Option<bool>,
    pub allow_file_sharing: Option<bool>,
    pub video_call_enabled: Option<bool>,
    pub max_video_participants: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomBody {
    pub workspace_id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub settings: RoomSettingsBody,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateRoomBody {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub settings: RoomSettingsBody,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferAdminBody {
    pub new_admin_id: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoomSearchQuery {
    /// Fragment of the room name.
    pub q: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PopularQuery {
    pub limit: Option<u32>,
}

impl From<RoomSettings> for RoomSettingsResponse {
    fn from(settings: RoomSettings) -> Self {
        Self {
            max_members: settings.max_members,
            is_private: settings.is_private,
            allow_file_sharing: settings.allow_file_sharing,
            video_call_enabled: settings.video_call_enabled,
            max_video_participants: settings.max_video_participants,
        }
    }
}

impl From<VideoSession> for VideoSessionResponse {
    fn from(session: VideoSession) -> Self {
        Self {
            provider: session.provider,
            video_room_id: session.video_room_id,
            active: session.active,
            started_by: session.started_by,
            started_at: session.started_at.to_rfc3339(),
        }
    }
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        Self {
            status: room.status.as_str().to_string(),
            id: room.id,
            workspace_id: room.workspace_id,
            name: room.name,
            description: room.description,
            admin_id: room.admin_id,
            settings: room.settings.into(),
            video: room.video.map(Into::into),
            member_count: room.member_count,
            created_at: room.created_at.to_rfc3339(),
            last_activity_at: room.last_activity_at.to_rfc3339(),
        }
    }
}

impl From<RoomSettingsBody> for RoomSettingsInput {
    fn from(body: RoomSettingsBody) -> Self {
        Self {
            max_members: body.max_members,
            is_private: body.is_private,
            allow_file_sharing: body.allow_file_sharing,
            video_call_enabled: body.video_call_enabled,
            max_video_participants: body.max_video_participants,
        }
    }
}

fn rooms_response(rooms: Vec<Room>) -> Json<Vec<RoomResponse>> {
    Json(rooms.into_iter().map(Into::into).collect())
}

/// Create room routes
pub fn create_room_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/public", get(list_public_rooms))
        .route("/rooms/mine", get(list_my_rooms))
        .route("/rooms/admin", get(list_admin_rooms))
        .route("/rooms/search", get(search_rooms))
        .route("/rooms/popular", get(popular_rooms))
        .route(
            "/rooms/:room_id",
            get(get_room).put(update_room).delete(delete_room),
        )
        .route("/rooms/:room_id/join", post(join_room))
        .route("/rooms/:room_id/leave", post(leave_room))
        .route("/rooms/:room_id/transfer-admin", post(transfer_admin))
        .route("/rooms/:room_id/members", get(list_room_members))
}

#[utoipa::path(
    get,
    path = "/api/rooms",
    tag = "rooms",
    responses((status = 200, description = "All active rooms", body = Vec<RoomResponse>))
)]
pub async fn list_rooms(State(state): State<Arc<GatewayState>>) -> GatewayResult<Json<Vec<RoomResponse>>> {
    Ok(rooms_response(state.services.rooms.list_active().await?))
}

#[utoipa::path(
    post,
    path = "/api/rooms",
    tag = "rooms",
    request_body = CreateRoomBody,
    responses(
        (status = 201, description = "Room created; the caller is its admin and first member", body = RoomResponse),
        (status = 400, description = "Invalid name or settings", body = crate::error::ErrorResponse),
        (status = 403, description = "Caller is not a workspace member", body = crate::error::ErrorResponse),
        (status = 404, description = "Workspace not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Room name taken", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_room(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateRoomBody>,
) -> GatewayResult<(StatusCode, Json<RoomResponse>)> {
    let room = state
        .services
        .rooms
        .create(
            CreateRoomRequest {
                workspace_id: body.workspace_id,
                name: body.name,
                description: body.description,
                settings: body.settings.into(),
            },
            &identity.user_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(room.into())))
}

#[utoipa::path(
    get,
    path = "/api/rooms/public",
    tag = "rooms",
    responses((status = 200, description = "Active rooms that are not private", body = Vec<RoomResponse>))
)]
pub async fn list_public_rooms(
    State(state): State<Arc<GatewayState>>,
) -> GatewayResult<Json<Vec<RoomResponse>>> {
    Ok(rooms_response(state.services.rooms.list_public().await?))
}

#[utoipa::path(
    get,
    path = "/api/rooms/mine",
    tag = "rooms",
    responses((status = 200, description = "Rooms the caller belongs to, most recently active first", body = Vec<RoomResponse>))
)]
pub async fn list_my_rooms(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<Vec<RoomResponse>>> {
    Ok(rooms_response(
        state.services.rooms.list_for_user(&identity.user_id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/rooms/admin",
    tag = "rooms",
    responses((status = 200, description = "Rooms the caller administers", body = Vec<RoomResponse>))
)]
pub async fn list_admin_rooms(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> GatewayResult<Json<Vec<RoomResponse>>> {
    Ok(rooms_response(
        state.services.rooms.list_admin_rooms(&identity.user_id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/rooms/search",
    tag = "rooms",
    params(RoomSearchQuery),
    responses(
        (status = 200, description = "Active rooms whose name contains the fragment", body = Vec<RoomResponse>),
        (status = 400, description = "Empty search term", body = crate::error::ErrorResponse)
    )
)]
pub async fn search_rooms(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<RoomSearchQuery>,
) -> GatewayResult<Json<Vec<RoomResponse>>> {
    Ok(rooms_response(state.services.rooms.search(&query.q).await?))
}

#[utoipa::path(
    get,
    path = "/api/rooms/popular",
    tag = "rooms",
    params(PopularQuery),
    responses((status = 200, description = "Active rooms by member count", body = Vec<RoomResponse>))
)]
pub async fn popular_rooms(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<PopularQuery>,
) -> GatewayResult<Json<Vec<RoomResponse>>> {
    let limit = query.limit.unwrap_or(DEFAULT_POPULAR_LIMIT);
    Ok(rooms_response(state.services.rooms.popular(limit).await?))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Room", body = RoomResponse),
        (status = 404, description = "Room not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_room(
    State(state): State<Arc<GatewayState>>,
    Path(room_id): Path<String>,
) -> GatewayResult<Json<RoomResponse>> {
    Ok(Json(state.services.rooms.get(&room_id).await?.into()))
}

#[utoipa::path(
    put,
    path = "/api/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id")),
    request_body = UpdateRoomBody,
    responses(
        (status = 200, description = "Updated room", body = RoomResponse),
        (status = 403, description = "Caller is not the room admin", body = crate::error::ErrorResponse),
        (status = 409, description = "Name taken or capacity below member count", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_room(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(room_id): Path<String>,
    Json(body): Json<UpdateRoomBody>,
) -> GatewayResult<Json<RoomResponse>> {
    let room = state
        .services
        .rooms
        .update(
            &room_id,
            &identity.user_id,
            UpdateRoomRequest {
                name: body.name,
                description: body.description,
                settings: body.settings.into(),
            },
        )
        .await?;
    Ok(Json(room.into()))
}

#[utoipa::path(
    delete,
    path = "/api/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Room deactivated", body = RoomResponse),
        (status = 403, description = "Caller is not the room admin", body = crate::error::ErrorResponse),
        (status = 422, description = "Room already inactive", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_room(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(room_id): Path<String>,
) -> GatewayResult<Json<RoomResponse>> {
    let room = state.services.rooms.delete(&room_id, &identity.user_id).await?;
    state
        .dispatcher
        .emit(ChatEvent::RoomDeactivated {
            room_id: room.id.clone(),
        })
        .await;
    Ok(Json(room.into()))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/join",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Joined", body = RoomResponse),
        (status = 409, description = "Already a member or room full", body = crate::error::ErrorResponse),
        (status = 422, description = "Room inactive", body = crate::error::ErrorResponse)
    )
)]
pub async fn join_room(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(room_id): Path<String>,
) -> GatewayResult<Json<RoomResponse>> {
    let room = state.services.rooms.join(&room_id, &identity.user_id).await?;
    state
        .dispatcher
        .emit(ChatEvent::MemberJoined {
            room_id: room.id.clone(),
            user_id: identity.user_id,
        })
        .await;
    Ok(Json(room.into()))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/leave",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Left", body = RoomResponse),
        (status = 403, description = "Not a member", body = crate::error::ErrorResponse),
        (status = 422, description = "The admin cannot leave", body = crate::error::ErrorResponse)
    )
)]
pub async fn leave_room(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(room_id): Path<String>,
) -> GatewayResult<Json<RoomResponse>> {
    let room = state.services.rooms.leave(&room_id, &identity.user_id).await?;
    state
        .dispatcher
        .emit(ChatEvent::MemberLeft {
            room_id: room.id.clone(),
            user_id: identity.user_id,
        })
        .await;
    Ok(Json(room.into()))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/transfer-admin",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id")),
    request_body = TransferAdminBody,
    responses(
        (status = 200, description = "Admin transferred", body = RoomResponse),
        (status = 403, description = "Caller is not the admin or target is not a member", body = crate::error::ErrorResponse)
    )
)]
pub async fn transfer_admin(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(room_id): Path<String>,
    Json(body): Json<TransferAdminBody>,
) -> GatewayResult<Json<RoomResponse>> {
    let room = state
        .services
        .rooms
        .transfer_admin(&room_id, &identity.user_id, &body.new_admin_id)
        .await?;
    Ok(Json(room.into()))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/members",
    tag = "rooms",
    params(("room_id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Member ids in join order", body = RoomMembersResponse),
        (status = 404, description = "Room not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_room_members(
    State(state): State<Arc<GatewayState>>,
    Path(room_id): Path<String>,
) -> GatewayResult<Json<RoomMembersResponse>> {
    let member_ids = state.services.rooms.members(&room_id).await?;
    Ok(Json(RoomMembersResponse {
        room_id,
        member_ids,
    }))
}
