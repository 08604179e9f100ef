//! Live-channel wire protocol.
//!
//! JSON events tagged by `type`, names matching the marketplace client
//! contract (`joinRoom`, `sendMessage`, `newMessage`, ...).

use serde::{Deserialize, Serialize};

use crate::models::PopulatedMessage;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { other_user: String, listing: String },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { other_user: String, listing: String },
    SendMessage {
        receiver: String,
        listing: String,
        content: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    RoomJoined { room: String },
    NewMessage { message: PopulatedMessage },
    Error { message: String },
}
