//! Thread aggregation: the per-user inbox view.
//!
//! One row per (other participant, listing) pair the user has exchanged
//! messages on, carrying the latest message and the unread count. Computed
//! from the store at read time; the live channel keeps client copies fresh
//! incrementally (see `inbox`).

use std::collections::HashMap;

use crate::directory::{listing_or_placeholder, profile_or_placeholder, Directory};
use crate::error::AppResult;
use crate::models::{PopulatedMessage, Thread, ThreadRow};
use crate::store::MessageStore;

/// Group the user's messages into threads, most recently active first.
pub async fn aggregate(store: &MessageStore, user: &str) -> AppResult<Vec<ThreadRow>> {
    // Newest first, so the first message seen for a pair is its last_message
    // and the result order is recency order.
    let messages = store.list_for_user(user).await?;

    let mut rows: Vec<ThreadRow> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for message in messages {
        let other = if message.sender == user {
            message.receiver.clone()
        } else {
            message.sender.clone()
        };
        let key = (other.clone(), message.listing.clone());
        let unread = u64::from(message.receiver == user && !message.read);

        match index.get(&key) {
            Some(&i) => rows[i].unread_count += unread as i64,
            None => {
                index.insert(key, rows.len());
                rows.push(ThreadRow {
                    other_user: other,
                    listing: message.listing.clone(),
                    unread_count: unread as i64,
                    last_message: message,
                });
            }
        }
    }

    Ok(rows)
}

/// Join directory display data onto aggregated rows.
pub async fn populate(directory: &dyn Directory, rows: Vec<ThreadRow>) -> Vec<Thread> {
    let mut threads = Vec::with_capacity(rows.len());
    for row in rows {
        let other_user = profile_or_placeholder(directory, &row.other_user).await;
        let listing = listing_or_placeholder(directory, &row.listing).await;
        let sender = profile_or_placeholder(directory, &row.last_message.sender).await;
        let receiver = profile_or_placeholder(directory, &row.last_message.receiver).await;
        threads.push(Thread {
            other_user,
            listing,
            last_message: PopulatedMessage::new(row.last_message, sender, receiver),
            unread_count: row.unread_count,
        });
    }
    threads
}
