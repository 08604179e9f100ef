//! Message Store: the durable source of truth for conversation history and
//! read state.

use chrono::{SecondsFormat, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::db::{map_tr_err, Database};
use crate::error::{AppError, AppResult};
use crate::models::Message;

/// Server-assigned creation/update timestamp: RFC 3339 UTC with millisecond
/// precision, so string order is chronological order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender: row.get(1)?,
        receiver: row.get(2)?,
        listing: row.get(3)?,
        content: row.get(4)?,
        read: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, sender, receiver, listing, content, read, created_at, updated_at";

#[derive(Clone)]
pub struct MessageStore {
    db: Database,
}

impl MessageStore {
    pub fn new(db: Database) -> Self {
        MessageStore { db }
    }

    /// The underlying database handle (shared with the directory tables).
    pub fn db_handle(&self) -> Database {
        self.db.clone()
    }

    /// Persist a new message and return the stored record.
    ///
    /// Rejects empty content and self-addressed messages with
    /// [`AppError::Validation`] before anything touches the database.
    pub async fn create(
        &self,
        sender: &str,
        receiver: &str,
        listing: &str,
        content: &str,
    ) -> AppResult<Message> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("message content is empty".to_string()));
        }
        if sender == receiver {
            return Err(AppError::Validation(
                "sender and receiver are the same user".to_string(),
            ));
        }
        if receiver.is_empty() || listing.is_empty() {
            return Err(AppError::Validation(
                "receiver and listing are required".to_string(),
            ));
        }

        let now = now_timestamp();
        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            listing: listing.to_string(),
            content: content.to_string(),
            read: false,
            created_at: now.clone(),
            updated_at: now,
        };

        let stored = message.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO messages (id, sender, receiver, listing, content, read, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        stored.id,
                        stored.sender,
                        stored.receiver,
                        stored.listing,
                        stored.content,
                        stored.read,
                        stored.created_at,
                        stored.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        Ok(message)
    }

    /// All messages between two users about one listing, oldest first.
    /// A fresh read every call; rowid breaks created_at ties.
    pub async fn list_conversation(
        &self,
        listing: &str,
        user_a: &str,
        user_b: &str,
    ) -> AppResult<Vec<Message>> {
        let listing = listing.to_string();
        let user_a = user_a.to_string();
        let user_b = user_b.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE listing = ?1
                       AND ((sender = ?2 AND receiver = ?3) OR (sender = ?3 AND receiver = ?2))
                     ORDER BY created_at ASC, rowid ASC"
                ))?;
                let rows = stmt.query_map(params![listing, user_a, user_b], row_to_message)?;
                let mut messages = Vec::new();
                for row in rows {
                    messages.push(row?);
                }
                Ok(messages)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Flip `read` on every unread message from `other_user` to
    /// `viewing_user`, optionally scoped to one listing. Returns how many
    /// rows changed; calling again immediately returns 0.
    pub async fn mark_read(
        &self,
        viewing_user: &str,
        other_user: &str,
        listing: Option<&str>,
    ) -> AppResult<usize> {
        let viewing_user = viewing_user.to_string();
        let other_user = other_user.to_string();
        let listing = listing.map(str::to_string);
        let now = now_timestamp();
        self.db
            .connection()
            .call(move |conn| {
                let updated = match &listing {
                    Some(listing) => conn.execute(
                        "UPDATE messages SET read = 1, updated_at = ?1
                         WHERE receiver = ?2 AND sender = ?3 AND listing = ?4 AND read = 0",
                        params![now, viewing_user, other_user, listing],
                    )?,
                    None => conn.execute(
                        "UPDATE messages SET read = 1, updated_at = ?1
                         WHERE receiver = ?2 AND sender = ?3 AND read = 0",
                        params![now, viewing_user, other_user],
                    )?,
                };
                Ok(updated)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Inbound inquiries for a listing, one row per distinct sender (their
    /// most recent message), newest first.
    pub async fn list_inquiries(&self, listing: &str, owner: &str) -> AppResult<Vec<Message>> {
        let listing = listing.to_string();
        let owner = owner.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE listing = ?1 AND receiver = ?2
                     ORDER BY created_at DESC, rowid DESC"
                ))?;
                let rows = stmt.query_map(params![listing, owner], row_to_message)?;
                let mut latest_per_sender: Vec<Message> = Vec::new();
                for row in rows {
                    let message = row?;
                    if !latest_per_sender.iter().any(|m| m.sender == message.sender) {
                        latest_per_sender.push(message);
                    }
                }
                Ok(latest_per_sender)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Durable unread counter for one conversation side; the reconciler's
    /// in-app counter must always converge to this.
    pub async fn unread_count(
        &self,
        viewing_user: &str,
        other_user: &str,
        listing: &str,
    ) -> AppResult<i64> {
        let viewing_user = viewing_user.to_string();
        let other_user = other_user.to_string();
        let listing = listing.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM messages
                     WHERE receiver = ?1 AND sender = ?2 AND listing = ?3 AND read = 0",
                    params![viewing_user, other_user, listing],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Every message the user is party to, newest first. Input for the
    /// thread aggregator.
    pub async fn list_for_user(&self, user: &str) -> AppResult<Vec<Message>> {
        let user = user.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE sender = ?1 OR receiver = ?1
                     ORDER BY created_at DESC, rowid DESC"
                ))?;
                let rows = stmt.query_map(params![user], row_to_message)?;
                let mut messages = Vec::new();
                for row in rows {
                    messages.push(row?);
                }
                Ok(messages)
            })
            .await
            .map_err(map_tr_err)
    }
}
