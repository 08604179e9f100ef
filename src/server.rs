//! Live delivery channel: authenticated WebSocket connections, room
//! membership, and fan-out of newly persisted messages.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::conversation::conversation_key;
use crate::directory::{profile_or_placeholder, Directory};
use crate::models::PopulatedMessage;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::store::MessageStore;

type Connections = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>>;
type Rooms = Arc<RwLock<HashMap<String, HashSet<String>>>>;

/// Everything a handler may know about one live connection: the identity
/// bound at the handshake and the rooms joined since. Passed explicitly to
/// every event handler; there is no ambient connection state.
pub struct ConnectionCtx {
    pub conn_id: String,
    pub user_id: String,
    joined: HashSet<String>,
}

impl ConnectionCtx {
    fn new(conn_id: String, user_id: String) -> Self {
        ConnectionCtx {
            conn_id,
            user_id,
            joined: HashSet::new(),
        }
    }
}

#[derive(Clone)]
pub struct ChatServer {
    connections: Connections,
    rooms: Rooms,
    store: MessageStore,
    directory: Arc<dyn Directory>,
}

impl ChatServer {
    pub fn new(store: MessageStore, directory: Arc<dyn Directory>) -> Self {
        ChatServer {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RwLock::new(HashMap::new())),
            store,
            directory,
        }
    }

    /// Take over a freshly upgraded socket. `user_id` comes from the
    /// verified handshake credential; it is the sender identity for every
    /// message on this connection, regardless of payload contents.
    pub async fn handle_connection(&self, ws: WebSocket, user_id: String) {
        let conn_id = Uuid::new_v4().to_string();
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(conn_id.clone(), tx);
        }
        log::info!("user {user_id} connected ({conn_id})");

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    log::debug!("websocket send failed: {e}");
                    break;
                }
            }
        });

        let server = self.clone();
        tokio::spawn(async move {
            let mut ctx = ConnectionCtx::new(conn_id, user_id);

            // Events are handled one at a time per connection, so a send's
            // persist completes before the next send starts: per-sender
            // order is preserved end to end.
            while let Some(result) = ws_rx.next().await {
                match result {
                    Ok(msg) => {
                        if let Ok(text) = msg.to_str() {
                            match serde_json::from_str::<ClientEvent>(text) {
                                Ok(event) => server.handle_client_event(&mut ctx, event).await,
                                Err(e) => {
                                    server
                                        .send_to_connection(
                                            &ctx.conn_id,
                                            &ServerEvent::Error {
                                                message: format!("malformed event: {e}"),
                                            },
                                        )
                                        .await;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!("websocket error for user {}: {e}", ctx.user_id);
                        break;
                    }
                }
            }

            server.handle_disconnect(&ctx).await;
        });
    }

    async fn handle_client_event(&self, ctx: &mut ConnectionCtx, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom {
                other_user,
                listing,
            } => {
                let key = conversation_key(&ctx.user_id, &other_user, &listing);
                {
                    let mut rooms = self.rooms.write().await;
                    rooms
                        .entry(key.clone())
                        .or_default()
                        .insert(ctx.conn_id.clone());
                }
                ctx.joined.insert(key.clone());
                log::info!("user {} joined room {key}", ctx.user_id);
                self.send_to_connection(&ctx.conn_id, &ServerEvent::RoomJoined { room: key })
                    .await;
            }

            ClientEvent::LeaveRoom {
                other_user,
                listing,
            } => {
                let key = conversation_key(&ctx.user_id, &other_user, &listing);
                ctx.joined.remove(&key);
                self.remove_from_room(&key, &ctx.conn_id).await;
            }

            ClientEvent::SendMessage {
                receiver,
                listing,
                content,
            } => {
                // Persist first; only a durably stored message is ever
                // broadcast. Failures go back to this connection alone.
                match self
                    .store
                    .create(&ctx.user_id, &receiver, &listing, &content)
                    .await
                {
                    Ok(message) => {
                        let key = conversation_key(&ctx.user_id, &receiver, &listing);
                        let sender =
                            profile_or_placeholder(self.directory.as_ref(), &message.sender).await;
                        let receiver_profile =
                            profile_or_placeholder(self.directory.as_ref(), &message.receiver)
                                .await;
                        let populated = PopulatedMessage::new(message, sender, receiver_profile);
                        self.broadcast_to_room(
                            &key,
                            &ServerEvent::NewMessage { message: populated },
                        )
                        .await;
                    }
                    Err(e) => {
                        log::warn!("send from {} failed: {e}", ctx.user_id);
                        self.send_to_connection(
                            &ctx.conn_id,
                            &ServerEvent::Error {
                                message: e.to_string(),
                            },
                        )
                        .await;
                    }
                }
            }
        }
    }

    /// Drop the connection's room memberships and its outbound channel.
    /// Nothing persisted changes; an in-flight persist that completes after
    /// this simply surfaces on the next fetch.
    async fn handle_disconnect(&self, ctx: &ConnectionCtx) {
        for key in &ctx.joined {
            self.remove_from_room(key, &ctx.conn_id).await;
        }
        let mut connections = self.connections.write().await;
        connections.remove(&ctx.conn_id);
        log::info!("user {} disconnected ({})", ctx.user_id, ctx.conn_id);
    }

    async fn remove_from_room(&self, key: &str, conn_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(key) {
            members.remove(conn_id);
            if members.is_empty() {
                rooms.remove(key);
            }
        }
    }

    /// Push an event to every connection currently in the room, the
    /// sender's own included.
    async fn broadcast_to_room(&self, key: &str, event: &ServerEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let rooms = self.rooms.read().await;
            let Some(members) = rooms.get(key) else {
                return;
            };
            let connections = self.connections.read().await;
            for conn_id in members {
                if let Some(sender) = connections.get(conn_id) {
                    let _ = sender.send(Message::text(json.clone()));
                }
            }
        }
    }

    async fn send_to_connection(&self, conn_id: &str, event: &ServerEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let connections = self.connections.read().await;
            if let Some(sender) = connections.get(conn_id) {
                let _ = sender.send(Message::text(json));
            }
        }
    }
}
