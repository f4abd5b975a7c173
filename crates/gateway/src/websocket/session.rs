//! Per-connection state: which private queues and room topics feed this socket.

use parley_auth::Identity;
use parley_chats::utils::PermissionChecker;
use parley_chats::{ChatError, ChatEvent, ChatResult, ErrorKind, Topic};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::frames::{parse_frame, ClientCommand};
use crate::state::GatewayState;

pub struct Session {
    state: Arc<GatewayState>,
    outbound: mpsc::Sender<ChatEvent>,
    rooms: HashMap<String, JoinHandle<()>>,
    queues: HashMap<String, JoinHandle<()>>,
}

impl Session {
    pub fn new(state: Arc<GatewayState>, outbound: mpsc::Sender<ChatEvent>) -> Self {
        Self {
            state,
            outbound,
            rooms: HashMap::new(),
            queues: HashMap::new(),
        }
    }

    /// Feed the private queue of `user_id` into this socket.
    pub async fn bind_user(&mut self, user_id: &str) {
        if self.queues.contains_key(user_id) {
            return;
        }
        let receiver = self.state.dispatcher.user_queue(user_id).await;
        self.queues
            .insert(user_id.to_string(), forward(receiver, self.outbound.clone()));
    }

    /// Handle one inbound text frame. Frames that do not parse or carry no
    /// valid token are dropped without a reply.
    pub async fn handle_text(&mut self, text: &str) {
        let Some(frame) = parse_frame(text) else {
            debug!("dropped unparseable frame");
            return;
        };
        let command = frame.command.name();
        let Some(identity) = frame
            .token
            .as_deref()
            .and_then(|token| self.state.tokens.validate(token))
        else {
            debug!(command, "dropped frame without a valid token");
            return;
        };

        self.bind_user(&identity.user_id).await;
        if let Err(err) = self.execute(&identity, frame.command).await {
            if err.kind() == ErrorKind::Internal {
                error!(error = ?err, command, user_id = %identity.user_id, "socket command failed");
            } else {
                debug!(error = %err, command, user_id = %identity.user_id, "socket command rejected");
            }
            self.state
                .dispatcher
                .send_to_user(&identity.user_id, ChatEvent::error(err.public_message()))
                .await;
        }
    }

    async fn execute(&mut self, identity: &Identity, command: ClientCommand) -> ChatResult<()> {
        let state = self.state.clone();
        let services = &state.services;
        let dispatcher = &state.dispatcher;

        match command {
            ClientCommand::SendMessage {
                room_id,
                text,
                parent_id,
            } => {
                let message = services
                    .messages
                    .append(&room_id, identity, &text, parent_id.as_deref())
                    .await?;
                dispatcher
                    .emit(ChatEvent::MessageCreated {
                        room_id: message.room_id.clone(),
                        message,
                    })
                    .await;
            }
            ClientCommand::EditMessage { message_id, text } => {
                let message = services
                    .messages
                    .edit(&message_id, &text, &identity.user_id)
                    .await?;
                dispatcher
                    .emit(ChatEvent::MessageEdited {
                        room_id: message.room_id.clone(),
                        message,
                    })
                    .await;
            }
            ClientCommand::DeleteMessage { message_id } => {
                let message = services
                    .messages
                    .delete(&message_id, &identity.user_id)
                    .await?;
                dispatcher
                    .emit(ChatEvent::MessageDeleted {
                        room_id: message.room_id,
                        message_id: message.id,
                        deleted_by: identity.user_id.clone(),
                    })
                    .await;
            }
            ClientCommand::JoinRoom { room_id } => {
                let room = services.rooms.get(&room_id).await?;
                PermissionChecker::require_active(&room)?;
                if !services.rooms.is_member(&room_id, &identity.user_id).await? {
                    return Err(ChatError::not_member(room_id, identity.user_id.clone()));
                }

                let fresh = self.subscribe_room(&room_id, &identity.user_id).await;
                dispatcher
                    .send_to_user(&identity.user_id, ChatEvent::room_joined(room_id.clone()))
                    .await;
                if fresh && state.config.announce_presence {
                    self.announce(&room_id, &format!("{} joined the room", identity.display_name))
                        .await;
                }
            }
            ClientCommand::LeaveRoom { room_id } => {
                let was_subscribed = self.unsubscribe_room(&room_id);
                dispatcher
                    .send_to_user(
                        &identity.user_id,
                        ChatEvent::RoomLeft {
                            room_id: room_id.clone(),
                        },
                    )
                    .await;
                if was_subscribed && state.config.announce_presence {
                    self.announce(&room_id, &format!("{} left the room", identity.display_name))
                        .await;
                }
            }
            ClientCommand::Typing { room_id, is_typing } => {
                if !services.rooms.is_member(&room_id, &identity.user_id).await? {
                    return Err(ChatError::not_member(room_id, identity.user_id.clone()));
                }
                dispatcher
                    .emit(ChatEvent::Typing {
                        room_id,
                        user_id: identity.user_id.clone(),
                        display_name: identity.display_name.clone(),
                        is_typing,
                    })
                    .await;
            }
            ClientCommand::StartVideoCall {
                room_id,
                video_room_id,
                call_data,
            } => {
                let room = services
                    .rooms
                    .attach_video_room(&room_id, &video_room_id, &identity.user_id)
                    .await?;
                let message = services
                    .messages
                    .append_call_start(&room_id, identity, call_data)
                    .await?;
                dispatcher
                    .emit(ChatEvent::VideoCallStarted {
                        room_id,
                        video_room_id: room
                            .video
                            .map(|session| session.video_room_id)
                            .unwrap_or(video_room_id),
                        started_by: identity.user_id.clone(),
                        message,
                    })
                    .await;
            }
            ClientCommand::EndVideoCall { room_id, call_data } => {
                services
                    .rooms
                    .end_video_call(&room_id, &identity.user_id)
                    .await?;
                let message = services
                    .messages
                    .append_call_end(&room_id, identity, call_data)
                    .await?;
                dispatcher
                    .emit(ChatEvent::VideoCallEnded {
                        room_id,
                        ended_by: identity.user_id.clone(),
                        message,
                    })
                    .await;
            }
            ClientCommand::Ping => {
                dispatcher
                    .send_to_user(&identity.user_id, ChatEvent::Pong)
                    .await;
            }
        }
        Ok(())
    }

    /// Subscribe to every topic of the room on behalf of `user_id`. Returns
    /// `false` if a live subscription already exists.
    async fn subscribe_room(&mut self, room_id: &str, user_id: &str) -> bool {
        if self
            .rooms
            .get(room_id)
            .is_some_and(|forwarder| !forwarder.is_finished())
        {
            return false;
        }
        let [room, typing, edits, deletes, video] = Topic::all_for_room(room_id);
        let dispatcher = &self.state.dispatcher;
        let feeds = RoomFeeds {
            room: dispatcher.subscribe(&room).await,
            typing: dispatcher.subscribe(&typing).await,
            edits: dispatcher.subscribe(&edits).await,
            deletes: dispatcher.subscribe(&deletes).await,
            video: dispatcher.subscribe(&video).await,
        };
        let forwarder = forward_room(
            room_id.to_string(),
            user_id.to_string(),
            feeds,
            self.outbound.clone(),
        );
        self.rooms.insert(room_id.to_string(), forwarder);
        true
    }

    /// Returns `true` if a live subscription was dropped.
    fn unsubscribe_room(&mut self, room_id: &str) -> bool {
        match self.rooms.remove(room_id) {
            Some(forwarder) => {
                let live = !forwarder.is_finished();
                forwarder.abort();
                live
            }
            None => false,
        }
    }

    async fn announce(&self, room_id: &str, text: &str) {
        match self.state.services.messages.append_system(room_id, text).await {
            Ok(message) => {
                self.state
                    .dispatcher
                    .emit(ChatEvent::MessageCreated {
                        room_id: room_id.to_string(),
                        message,
                    })
                    .await;
            }
            Err(err) => warn!(room_id, error = %err, "presence announcement failed"),
        }
    }

    pub fn subscribed_rooms(&self) -> usize {
        self.rooms
            .values()
            .filter(|forwarder| !forwarder.is_finished())
            .count()
    }

    /// Tear down every subscription of the connection.
    pub async fn close(mut self) {
        let rooms: Vec<String> = self.rooms.keys().cloned().collect();
        for room_id in &rooms {
            self.unsubscribe_room(room_id);
        }
        for (_, forwarder) in self.queues.drain() {
            forwarder.abort();
        }
        // Aborted forwarders drop their receivers on their next poll.
        tokio::task::yield_now().await;
        let pruned = self.state.dispatcher.prune().await;
        info!(rooms = rooms.len(), pruned, "websocket session closed");
    }
}

/// Receivers for the five topics of one room.
struct RoomFeeds {
    room: broadcast::Receiver<ChatEvent>,
    typing: broadcast::Receiver<ChatEvent>,
    edits: broadcast::Receiver<ChatEvent>,
    deletes: broadcast::Receiver<ChatEvent>,
    video: broadcast::Receiver<ChatEvent>,
}

/// Whether `event` ends `user_id`'s right to hear from `room_id`.
fn revokes(event: &ChatEvent, room_id: &str, user_id: &str) -> bool {
    match event {
        ChatEvent::MemberLeft {
            room_id: left_room,
            user_id: left_user,
        } => left_room == room_id && left_user == user_id,
        ChatEvent::RoomDeactivated { room_id: gone } => gone == room_id,
        _ => false,
    }
}

/// Merge the room's topics into the socket until the subscriber loses access.
/// The room topic is polled first so a revocation is seen before anything
/// published after it on the other topics.
fn forward_room(
    room_id: String,
    user_id: String,
    mut feeds: RoomFeeds,
    outbound: mpsc::Sender<ChatEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                biased;
                received = feeds.room.recv() => received,
                received = feeds.edits.recv() => received,
                received = feeds.deletes.recv() => received,
                received = feeds.video.recv() => received,
                received = feeds.typing.recv() => received,
            };
            match received {
                Ok(event) => {
                    let revoked = revokes(&event, &room_id, &user_id);
                    if outbound.send(event).await.is_err() {
                        break;
                    }
                    if revoked {
                        debug!(%room_id, %user_id, "room access revoked; subscription dropped");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%room_id, skipped, "socket fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn forward(
    mut receiver: broadcast::Receiver<ChatEvent>,
    outbound: mpsc::Sender<ChatEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if outbound.send(event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "socket fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
