//! Message REST endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use parley_auth::Identity;
use parley_chats::{ChatError, ChatEvent, Page};
use parley_database::Message;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::error::GatewayResult;
use crate::state::GatewayState;

const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub body: String,
    /// `text`, `system`, `call_start` or `call_end`.
    pub kind: String,
    /// `original`, `edited` or `deleted`.
    pub state: String,
    pub edited: bool,
    pub deleted: bool,
    pub changed_at: Option<String>,
    pub parent_id: Option<String>,
    pub reply_count: i64,
    pub call_data: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessagePageResponse {
    pub items: Vec<MessageResponse>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMessageBody {
    pub text: String,
    /// Message this one replies to.
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditMessageBody {
    pub text: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Zero-based page number.
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MessageSearchQuery {
    pub q: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            kind: message.kind.as_str().to_string(),
            state: message.state.as_str().to_string(),
            edited: message.is_edited(),
            deleted: message.is_deleted(),
            changed_at: message.state.changed_at().map(|at| at.to_rfc3339()),
            id: message.id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            body: message.body,
            parent_id: message.parent_id,
            reply_count: message.reply_count,
            call_data: message.call_data,
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

impl From<Page<Message>> for MessagePageResponse {
    fn from(page: Page<Message>) -> Self {
        Self {
            items: page.items.into_iter().map(Into::into).collect(),
            page: page.page,
            page_size: page.page_size,
            total: page.total,
        }
    }
}

fn messages_response(messages: Vec<Message>) -> Json<Vec<MessageResponse>> {
    Json(messages.into_iter().map(Into::into).collect())
}

/// Create message routes
pub fn create_message_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route(
            "/rooms/:room_id/messages",
            get(list_messages).post(create_message),
        )
        .route("/rooms/:room_id/messages/recent", get(recent_messages))
        .route("/rooms/:room_id/messages/latest", get(latest_message))
        .route("/rooms/:room_id/messages/search", get(search_messages))
        .route(
            "/messages/:message_id",
            axum::routing::put(edit_message).delete(delete_message),
        )
        .route("/messages/:message_id/thread", get(message_thread))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/messages",
    tag = "messages",
    params(("room_id" = String, Path, description = "Room id"), PageQuery),
    responses(
        (status = 200, description = "Visible messages, newest first", body = MessagePageResponse),
        (status = 403, description = "Caller is not a member", body = crate::error::ErrorResponse),
        (status = 404, description = "Room not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_messages(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(room_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> GatewayResult<Json<MessagePageResponse>> {
    let page = state
        .services
        .messages
        .list_by_room(
            &room_id,
            &identity.user_id,
            query.page.unwrap_or(0),
            query.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    post,
    path = "/api/rooms/{room_id}/messages",
    tag = "messages",
    params(("room_id" = String, Path, description = "Room id")),
    request_body = CreateMessageBody,
    responses(
        (status = 201, description = "Message appended and broadcast", body = MessageResponse),
        (status = 400, description = "Blank or over-long text", body = crate::error::ErrorResponse),
        (status = 403, description = "Caller is not a member", body = crate::error::ErrorResponse),
        (status = 422, description = "Room inactive or parent deleted", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_message(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(room_id): Path<String>,
    Json(body): Json<CreateMessageBody>,
) -> GatewayResult<(StatusCode, Json<MessageResponse>)> {
    let message = state
        .services
        .messages
        .append(&room_id, &identity, &body.text, body.parent_id.as_deref())
        .await?;
    state
        .dispatcher
        .emit(ChatEvent::MessageCreated {
            room_id: message.room_id.clone(),
            message: message.clone(),
        })
        .await;
    Ok((StatusCode::CREATED, Json(message.into())))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/messages/recent",
    tag = "messages",
    params(("room_id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Most recent visible messages", body = Vec<MessageResponse>),
        (status = 403, description = "Caller is not a member", body = crate::error::ErrorResponse)
    )
)]
pub async fn recent_messages(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(room_id): Path<String>,
) -> GatewayResult<Json<Vec<MessageResponse>>> {
    Ok(messages_response(
        state.services.messages.recent(&room_id, &identity.user_id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/messages/latest",
    tag = "messages",
    params(("room_id" = String, Path, description = "Room id")),
    responses(
        (status = 200, description = "Latest visible message, or null", body = Option<MessageResponse>),
        (status = 403, description = "Caller is not a member", body = crate::error::ErrorResponse)
    )
)]
pub async fn latest_message(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(room_id): Path<String>,
) -> GatewayResult<Json<Option<MessageResponse>>> {
    let latest = state.services.messages.latest(&room_id).await?;
    if !state.services.rooms.is_member(&room_id, &identity.user_id).await? {
        return Err(ChatError::not_member(room_id, identity.user_id).into());
    }
    Ok(Json(latest.map(Into::into)))
}

#[utoipa::path(
    get,
    path = "/api/rooms/{room_id}/messages/search",
    tag = "messages",
    params(("room_id" = String, Path, description = "Room id"), MessageSearchQuery),
    responses(
        (status = 200, description = "Visible messages containing the text", body = Vec<MessageResponse>),
        (status = 400, description = "Empty query", body = crate::error::ErrorResponse),
        (status = 403, description = "Caller is not a member", body = crate::error::ErrorResponse)
    )
)]
pub async fn search_messages(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(room_id): Path<String>,
    Query(query): Query<MessageSearchQuery>,
) -> GatewayResult<Json<Vec<MessageResponse>>> {
    Ok(messages_response(
        state
            .services
            .messages
            .search(&room_id, &identity.user_id, &query.q)
            .await?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/messages/{message_id}",
    tag = "messages",
    params(("message_id" = String, Path, description = "Message id")),
    request_body = EditMessageBody,
    responses(
        (status = 200, description = "Edited message", body = MessageResponse),
        (status = 403, description = "Caller is not the sender", body = crate::error::ErrorResponse),
        (status = 422, description = "Message was deleted", body = crate::error::ErrorResponse)
    )
)]
pub async fn edit_message(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<String>,
    Json(body): Json<EditMessageBody>,
) -> GatewayResult<Json<MessageResponse>> {
    let message = state
        .services
        .messages
        .edit(&message_id, &body.text, &identity.user_id)
        .await?;
    state
        .dispatcher
        .emit(ChatEvent::MessageEdited {
            room_id: message.room_id.clone(),
            message: message.clone(),
        })
        .await;
    Ok(Json(message.into()))
}

#[utoipa::path(
    delete,
    path = "/api/messages/{message_id}",
    tag = "messages",
    params(("message_id" = String, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message marked deleted", body = MessageResponse),
        (status = 403, description = "Caller is neither the sender nor the room admin", body = crate::error::ErrorResponse),
        (status = 422, description = "Message was already deleted", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_message(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<String>,
) -> GatewayResult<Json<MessageResponse>> {
    let message = state
        .services
        .messages
        .delete(&message_id, &identity.user_id)
        .await?;
    state
        .dispatcher
        .emit(ChatEvent::MessageDeleted {
            room_id: message.room_id.clone(),
            message_id: message.id.clone(),
            deleted_by: identity.user_id,
        })
        .await;
    Ok(Json(message.into()))
}

#[utoipa::path(
    get,
    path = "/api/messages/{message_id}/thread",
    tag = "messages",
    params(("message_id" = String, Path, description = "Parent message id")),
    responses(
        (status = 200, description = "Replies in posting order", body = Vec<MessageResponse>),
        (status = 403, description = "Caller is not a member", body = crate::error::ErrorResponse),
        (status = 404, description = "Message not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn message_thread(
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<String>,
) -> GatewayResult<Json<Vec<MessageResponse>>> {
    Ok(messages_response(
        state
            .services
            .messages
            .thread_of(&message_id, &identity.user_id)
            .await?,
    ))
}
