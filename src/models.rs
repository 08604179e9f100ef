use serde::{Deserialize, Serialize};

/// A stored chat message. Immutable once created except for the `read`
/// flag, which flips to true when the receiver opens the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub listing: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Display data for a user, resolved from the user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub occupation: Option<String>,
}

impl UserProfile {
    /// Fallback profile when the directory has no row for an id, so
    /// enrichment can never fail a delivery.
    pub fn placeholder(id: &str) -> Self {
        UserProfile {
            id: id.to_string(),
            name: id.to_string(),
            avatar: None,
            occupation: None,
        }
    }
}

/// Display data for a listing, resolved from the listing directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingCard {
    pub id: String,
    pub title: String,
    pub owner: String,
}

/// A message enriched with participant display data, as pushed to room
/// members and returned from the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedMessage {
    pub id: String,
    pub sender: UserProfile,
    pub receiver: UserProfile,
    pub listing: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl PopulatedMessage {
    pub fn new(message: Message, sender: UserProfile, receiver: UserProfile) -> Self {
        PopulatedMessage {
            id: message.id,
            sender,
            receiver,
            listing: message.listing,
            content: message.content,
            read: message.read,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

/// One inbox row: the conversation with `other_user` about `listing`,
/// seen from the viewing user's side. Derived from messages, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub other_user: UserProfile,
    pub listing: ListingCard,
    pub last_message: PopulatedMessage,
    pub unread_count: i64,
}

/// Aggregation result before directory enrichment.
#[derive(Debug, Clone)]
pub struct ThreadRow {
    pub other_user: String,
    pub listing: String,
    pub last_message: Message,
    pub unread_count: i64,
}
