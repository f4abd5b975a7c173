//! # Parley Gateway Crate
//!
//! HTTP and WebSocket surface of Parley. REST handlers and socket sessions
//! call into the chat services and hand resulting events to the
//! [`Dispatcher`], which fans them out to subscribed connections.
//!
//! ## Architecture
//!
//! - **REST**: HTTP API under `/api` with OpenAPI documentation
//! - **WebSocket**: `/ws`, one [`websocket::Session`] per connection
//! - **Dispatch**: per-topic broadcast channels and per-user private queues
//! - **Middleware**: bearer authentication, request logging, tracing
//!
//! ## Usage
//!
//! ```rust,ignore
//! use parley_gateway::{create_router, GatewayState};
//!
//! # async fn run(config: parley_config::AppConfig) -> anyhow::Result<()> {
//! let state = GatewayState::from_config(&config).await?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, create_router(state)).await?;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod websocket;

pub use dispatch::Dispatcher;
pub use error::{ErrorResponse, GatewayError, GatewayResult};
pub use middleware::auth_middleware;
pub use state::GatewayState;

use axum::{http::Method, middleware as axum_middleware, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

/// Create the main application router with all routes
pub fn create_router(state: GatewayState) -> Router {
    create_router_with_state(Arc::new(state))
}

/// Same as [`create_router`] for callers that keep a handle on the state.
pub fn create_router_with_state(state: Arc<GatewayState>) -> Router {
    #[allow(unused_mut)]
    let mut router = Router::new()
        .merge(rest::create_rest_routes(state.clone()))
        .merge(websocket::create_websocket_routes())
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers(Any),
        )
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(middleware::create_trace_middleware());

    #[cfg(debug_assertions)]
    {
        router = router.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        );
    }

    router
}

#[cfg(debug_assertions)]
#[derive(OpenApi)]
#[openapi(
    paths(
        rest::auth::register,
        rest::auth::login,
        rest::auth::me,
        rest::rooms::list_rooms,
        rest::rooms::create_room,
        rest::rooms::list_public_rooms,
        rest::rooms::list_my_rooms,
        rest::rooms::list_admin_rooms,
        rest::rooms::search_rooms,
        rest::rooms::popular_rooms,
        rest::rooms::get_room,
        rest::rooms::update_room,
        rest::rooms::delete_room,
        rest::rooms::join_room,
        rest::rooms::leave_room,
        rest::rooms::transfer_admin,
        rest::rooms::list_room_members,
        rest::messages::list_messages,
        rest::messages::create_message,
        rest::messages::recent_messages,
        rest::messages::latest_message,
        rest::messages::search_messages,
        rest::messages::edit_message,
        rest::messages::delete_message,
        rest::messages::message_thread,
        rest::workspaces::list_workspaces,
        rest::workspaces::create_workspace,
        rest::workspaces::get_workspace,
        rest::workspaces::list_workspace_members,
        rest::workspaces::remove_workspace_member,
        rest::workspaces::list_invites,
        rest::workspaces::create_invite,
        rest::workspaces::verify_invite,
        rest::workspaces::accept_invite,
        rest::workspaces::resend_invite,
        rest::workspaces::cancel_invite,
        rest::system::add_workspace_member,
        rest::health::health_check,
    ),
    components(
        schemas(
            ErrorResponse,
            rest::auth::RegisterBody,
            rest::auth::LoginBody,
            rest::auth::UserResponse,
            rest::auth::AuthResponse,
            rest::auth::ProfileResponse,
            rest::rooms::RoomSettingsResponse,
            rest::rooms::VideoSessionResponse,
            rest::rooms::RoomResponse,
            rest::rooms::RoomMembersResponse,
            rest::rooms::RoomSettingsBody,
            rest::rooms::CreateRoomBody,
            rest::rooms::UpdateRoomBody,
            rest::rooms::TransferAdminBody,
            rest::messages::MessageResponse,
            rest::messages::MessagePageResponse,
            rest::messages::CreateMessageBody,
            rest::messages::EditMessageBody,
            rest::workspaces::WorkspaceResponse,
            rest::workspaces::WorkspaceMemberResponse,
            rest::workspaces::InviteResponse,
            rest::workspaces::VerifyInviteResponse,
            rest::workspaces::CascadeResponse,
            rest::workspaces::CreateWorkspaceBody,
            rest::workspaces::CreateInviteBody,
            rest::workspaces::VerifyInviteBody,
            rest::system::AddMemberBody,
            rest::health::HealthResponse,
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and profile"),
        (name = "rooms", description = "Room roster"),
        (name = "messages", description = "Message log"),
        (name = "workspaces", description = "Workspaces and their members"),
        (name = "invites", description = "Workspace invitations"),
        (name = "system", description = "Privileged operations"),
        (name = "health", description = "Liveness probe"),
    )
)]
struct ApiDoc;
