//! Canonical conversation identity.
//!
//! A conversation is the unordered pair of two participants plus the
//! listing it is about; two users can have independent conversations per
//! listing. The key below is used verbatim as the broadcast room name and
//! must come out identical no matter which participant computes it.

/// Derive the canonical room key for a conversation.
///
/// The two user ids are ordered lexicographically before joining, so
/// `conversation_key(a, b, l) == conversation_key(b, a, l)`. Pure function,
/// no side effects.
pub fn conversation_key(user_a: &str, user_b: &str, listing: &str) -> String {
    let (first, second) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("room_{listing}_{first}_{second}")
}
