//! Read-state reconciliation for a live inbox view.
//!
//! [`InboxState`] is the client-side half of the read-state model: it holds
//! the thread list one user sees and reacts to conversation opens and live
//! `newMessage` events. Every transition is pure: it mutates local state
//! and returns [`InboxEffect`]s (mark-read calls, thread refetches) for the
//! embedding client to execute. The store stays the durable truth: effects
//! are idempotent and `replace_threads` with a fresh aggregation always
//! converges, so a message racing a mark-read resolves as "last observed
//! state wins".

use crate::models::{Message, ThreadRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRef {
    pub other_user: String,
    pub listing: String,
}

/// Work the embedding client must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxEffect {
    /// Call `mark_read(other_user, listing)` against the service.
    MarkRead { other_user: String, listing: String },
    /// Re-run the thread aggregation; a live message arrived for a
    /// conversation this view has not materialized yet.
    RefetchThreads,
}

pub struct InboxState {
    me: String,
    threads: Vec<ThreadRow>,
    open: Option<ConversationRef>,
}

impl InboxState {
    pub fn new(me: impl Into<String>) -> Self {
        InboxState {
            me: me.into(),
            threads: Vec::new(),
            open: None,
        }
    }

    /// Install a fresh aggregation result (initial load or refetch).
    pub fn replace_threads(&mut self, rows: Vec<ThreadRow>) {
        self.threads = rows;
        // An open conversation stays read locally even if the fetch raced a
        // new message; the emitted MarkRead has already been sent or will
        // settle it.
        if let Some(open) = self.open.clone() {
            if let Some(thread) = self.thread_mut(&open.other_user, &open.listing) {
                thread.unread_count = 0;
            }
        }
    }

    pub fn threads(&self) -> &[ThreadRow] {
        &self.threads
    }

    pub fn unread_for(&self, other_user: &str, listing: &str) -> i64 {
        self.threads
            .iter()
            .find(|t| t.other_user == other_user && t.listing == listing)
            .map_or(0, |t| t.unread_count)
    }

    pub fn total_unread(&self) -> i64 {
        self.threads.iter().map(|t| t.unread_count).sum()
    }

    /// The viewer opened a conversation: its counter drops to zero locally
    /// and the durable flags are flipped via the returned effect.
    pub fn open_conversation(&mut self, other_user: &str, listing: &str) -> Vec<InboxEffect> {
        self.open = Some(ConversationRef {
            other_user: other_user.to_string(),
            listing: listing.to_string(),
        });
        if let Some(thread) = self.thread_mut(other_user, listing) {
            thread.unread_count = 0;
        }
        vec![InboxEffect::MarkRead {
            other_user: other_user.to_string(),
            listing: listing.to_string(),
        }]
    }

    pub fn close_conversation(&mut self) {
        self.open = None;
    }

    /// A `newMessage` event reached this view. The viewer may be sender or
    /// receiver; every room member gets the broadcast.
    pub fn observe_message(&mut self, message: &Message) -> Vec<InboxEffect> {
        let other = if message.sender == self.me {
            message.receiver.clone()
        } else {
            message.sender.clone()
        };
        let listing = message.listing.clone();
        let inbound = message.sender != self.me;
        let is_open = self
            .open
            .as_ref()
            .is_some_and(|o| o.other_user == other && o.listing == listing);

        let Some(position) = self
            .threads
            .iter()
            .position(|t| t.other_user == other && t.listing == listing)
        else {
            return vec![InboxEffect::RefetchThreads];
        };

        let mut thread = self.threads.remove(position);
        thread.last_message = message.clone();

        let mut effects = Vec::new();
        if inbound {
            if is_open {
                // The viewer is looking at it right now: read immediately
                // instead of counting.
                thread.unread_count = 0;
                effects.push(InboxEffect::MarkRead {
                    other_user: other,
                    listing,
                });
            } else {
                thread.unread_count += 1;
            }
        }

        // Most recently active conversation first, like the aggregator.
        self.threads.insert(0, thread);
        effects
    }

    fn thread_mut(&mut self, other_user: &str, listing: &str) -> Option<&mut ThreadRow> {
        self.threads
            .iter_mut()
            .find(|t| t.other_user == other_user && t.listing == listing)
    }
}
