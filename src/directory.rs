//! Read-only access to the user and listing directories.
//!
//! The marketplace app owns these records; the messaging core only joins
//! display data onto messages and threads. Kept behind a trait so the
//! enrichment source can be swapped without touching delivery or storage.

use async_trait::async_trait;
use rusqlite::params;

use crate::db::{map_tr_err, Database};
use crate::error::AppResult;
use crate::models::{ListingCard, UserProfile};

#[async_trait]
pub trait Directory: Send + Sync {
    async fn user_profile(&self, id: &str) -> AppResult<Option<UserProfile>>;
    async fn listing_card(&self, id: &str) -> AppResult<Option<ListingCard>>;
}

/// Directory backed by the marketplace tables in the shared database file.
#[derive(Clone)]
pub struct SqliteDirectory {
    db: Database,
}

impl SqliteDirectory {
    pub fn new(db: Database) -> Self {
        SqliteDirectory { db }
    }
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn user_profile(&self, id: &str) -> AppResult<Option<UserProfile>> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT id, name, avatar, occupation FROM users WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(UserProfile {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            avatar: row.get(2)?,
                            occupation: row.get(3)?,
                        })
                    },
                );
                match result {
                    Ok(profile) => Ok(Some(profile)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(map_tr_err)
    }

    async fn listing_card(&self, id: &str) -> AppResult<Option<ListingCard>> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let result = conn.query_row(
                    "SELECT id, title, owner FROM listings WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(ListingCard {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            owner: row.get(2)?,
                        })
                    },
                );
                match result {
                    Ok(card) => Ok(Some(card)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Resolve a profile, falling back to a placeholder so a missing directory
/// row never fails a delivery.
pub async fn profile_or_placeholder(directory: &dyn Directory, id: &str) -> UserProfile {
    match directory.user_profile(id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => UserProfile::placeholder(id),
        Err(e) => {
            log::warn!("user directory lookup failed for {id}: {e}");
            UserProfile::placeholder(id)
        }
    }
}

/// Resolve a listing card, with the same placeholder policy.
pub async fn listing_or_placeholder(directory: &dyn Directory, id: &str) -> ListingCard {
    match directory.listing_card(id).await {
        Ok(Some(card)) => card,
        Ok(None) => ListingCard {
            id: id.to_string(),
            title: id.to_string(),
            owner: String::new(),
        },
        Err(e) => {
            log::warn!("listing directory lookup failed for {id}: {e}");
            ListingCard {
                id: id.to_string(),
                title: id.to_string(),
                owner: String::new(),
            }
        }
    }
}

/// Enrich a batch of messages, resolving each distinct participant once.
pub async fn populate_messages(
    directory: &dyn Directory,
    messages: Vec<crate::models::Message>,
) -> Vec<crate::models::PopulatedMessage> {
    use std::collections::HashMap;

    let mut profiles: HashMap<String, UserProfile> = HashMap::new();
    let mut populated = Vec::with_capacity(messages.len());
    for message in messages {
        for id in [message.sender.clone(), message.receiver.clone()] {
            if !profiles.contains_key(&id) {
                let profile = profile_or_placeholder(directory, &id).await;
                profiles.insert(id, profile);
            }
        }
        let sender = profiles[&message.sender].clone();
        let receiver = profiles[&message.receiver].clone();
        populated.push(crate::models::PopulatedMessage::new(message, sender, receiver));
    }
    populated
}

#[cfg(test)]
pub mod testutil {
    use super::*;

    /// Seed directory rows the way the marketplace app would.
    pub async fn seed_user(db: &Database, id: &str, name: &str, occupation: Option<&str>) {
        let id = id.to_string();
        let name = name.to_string();
        let occupation = occupation.map(str::to_string);
        db.connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO users (id, name, avatar, occupation)
                     VALUES (?1, ?2, NULL, ?3)",
                    params![id, name, occupation],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    pub async fn seed_listing(db: &Database, id: &str, title: &str, owner: &str) {
        let id = id.to_string();
        let title = title.to_string();
        let owner = owner.to_string();
        db.connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO listings (id, title, owner) VALUES (?1, ?2, ?3)",
                    params![id, title, owner],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{seed_listing, seed_user};
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn resolves_seeded_rows() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("dir.db").to_str().unwrap())
            .await
            .unwrap();
        seed_user(&db, "u1", "Ada", Some("engineer")).await;
        seed_listing(&db, "l1", "Sunny room in Mitte", "u1").await;

        let directory = SqliteDirectory::new(db);
        let profile = directory.user_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.name, "Ada");
        assert_eq!(profile.occupation.as_deref(), Some("engineer"));

        let card = directory.listing_card("l1").await.unwrap().unwrap();
        assert_eq!(card.title, "Sunny room in Mitte");
        assert_eq!(card.owner, "u1");

        assert!(directory.user_profile("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_rows_fall_back_to_placeholders() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("dir.db").to_str().unwrap())
            .await
            .unwrap();
        let directory = SqliteDirectory::new(db);

        let profile = profile_or_placeholder(&directory, "u9").await;
        assert_eq!(profile.id, "u9");
        assert_eq!(profile.name, "u9");

        let card = listing_or_placeholder(&directory, "l9").await;
        assert_eq!(card.id, "l9");
        assert!(card.owner.is_empty());
    }
}
