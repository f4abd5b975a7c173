//! WebSocket endpoint for the gateway

pub mod frames;
pub mod session;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use parley_chats::ChatEvent;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::GatewayState;
pub use session::Session;

#[derive(Debug, Default, Deserialize)]
pub struct WebSocketQuery {
    /// Optional token that binds the private queue before the first frame.
    pub token: Option<String>,
}

pub fn create_websocket_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/ws", get(ws_handler))
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<WebSocketQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>, token: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ChatEvent>(state.config.channel_capacity);
    let mut session = Session::new(state.clone(), outbound_tx);

    match token.as_deref().map(|token| state.tokens.validate(token)) {
        Some(Some(identity)) => {
            session.bind_user(&identity.user_id).await;
            info!(user_id = %identity.user_id, "websocket connected");
        }
        Some(None) => debug!("websocket connected with an invalid query token"),
        None => debug!("websocket connected"),
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "failed to encode outbound event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let receive = async {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => session.handle_text(&text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = receive => {},
        _ = &mut send_task => {},
    }

    session.close().await;
    send_task.abort();
}
