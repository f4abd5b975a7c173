//! REST API endpoints for the gateway

pub mod auth;
pub mod health;
pub mod messages;
pub mod rooms;
pub mod system;
pub mod workspaces;

use axum::{middleware as axum_middleware, Router};
use std::sync::Arc;

use crate::middleware::auth_middleware;
use crate::state::GatewayState;

/// Create all REST API routes. Everything but registration, login, the
/// system endpoints and the health probe needs a bearer token.
pub fn create_rest_routes(state: Arc<GatewayState>) -> Router<Arc<GatewayState>> {
    let protected = Router::new()
        .merge(auth::create_profile_routes())
        .merge(rooms::create_room_routes())
        .merge(messages::create_message_routes())
        .merge(workspaces::create_workspace_routes())
        .route_layer(axum_middleware::from_fn_with_state(state, auth_middleware));

    let api = Router::new()
        .merge(auth::create_auth_routes())
        .merge(system::create_system_routes())
        .merge(protected);

    Router::new()
        .nest("/api", api)
        .merge(health::create_health_routes())
}
