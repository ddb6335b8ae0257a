//! Domain types shared by the protocol, server, and client.
//!
//! This module provides the core chat types:
//! - [`Account`]: a registered user (id, username, password digest)
//! - [`Message`]: a stored message with its delivery [`MessageStatus`]
//! - [`MessageStatus`]: the monotonic `pending → delivered → seen` lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique account identifier, assigned by the server at creation.
pub type AccountId = Uuid;

/// Unique message identifier, assigned by the store at creation.
pub type MessageId = u64;

/// A registered account.
///
/// The password is stored as a SHA-256 hex digest, never as plaintext (see
/// [`crate::auth::hash_password`]). A live-connection reference is deliberately
/// NOT part of this type: which connection (if any) an account is bound to is
/// transient routing state owned by the server's delivery engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Server-assigned unique id.
    pub id: AccountId,
    /// Unique, case-sensitive username.
    pub username: String,
    /// SHA-256 hex digest of the password.
    pub password_hash: String,
}

impl Account {
    /// Creates an account with a freshly assigned id.
    #[must_use]
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash: password_hash.into(),
        }
    }
}

/// Delivery status of a message.
///
/// Transitions are strictly monotonic: `Pending → Delivered → Seen`. A message
/// never moves backward and never skips `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Stored but not yet handed to the recipient.
    Pending,
    /// Handed to the recipient's connection or released via an inbox check.
    Delivered,
    /// Acknowledged as read by the recipient.
    Seen,
}

impl MessageStatus {
    /// Returns true if a message in `self` may move to `next`.
    ///
    /// Only single forward steps are valid; `Pending → Seen` is not.
    #[must_use]
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Pending, MessageStatus::Delivered)
                | (MessageStatus::Delivered, MessageStatus::Seen)
        )
    }

    /// Wire/display name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Seen => "seen",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored message.
///
/// `created_at` is supplied by the sending client and is the ordering key for
/// conversation views; server receipt time is never used for ordering, so
/// out-of-order network arrival cannot scramble a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned unique id.
    pub id: MessageId,
    /// Sending account.
    pub sender: AccountId,
    /// Receiving account.
    pub recipient: AccountId,
    /// Message text, UTF-8.
    pub body: String,
    /// Delivery status.
    pub status: MessageStatus,
    /// Client-supplied creation time (ordering key).
    pub created_at: DateTime<Utc>,
    /// Time of the last status change.
    pub status_changed_at: DateTime<Utc>,
}

impl Message {
    /// Ordering key for inbox views: oldest first, id as tie-break.
    #[must_use]
    pub fn inbox_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_transitions_are_monotonic() {
        use MessageStatus::*;

        assert!(Pending.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Seen));

        // No skips, no backward moves, no self-loops.
        assert!(!Pending.can_transition_to(Seen));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Delivered));
        assert!(!Seen.can_transition_to(Pending));
        assert!(!Seen.can_transition_to(Delivered));
        assert!(!Seen.can_transition_to(Seen));
    }

    #[test]
    fn test_status_ordering_matches_lifecycle() {
        assert!(MessageStatus::Pending < MessageStatus::Delivered);
        assert!(MessageStatus::Delivered < MessageStatus::Seen);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&MessageStatus::Delivered).unwrap(),
            "\"delivered\""
        );
        assert_eq!(
            serde_json::to_string(&MessageStatus::Seen).unwrap(),
            "\"seen\""
        );
    }

    #[test]
    fn test_account_new_assigns_distinct_ids() {
        let a = Account::new("alice", "digest-a");
        let b = Account::new("alice", "digest-a");
        assert_ne!(a.id, b.id);
        assert_eq!(a.username, "alice");
    }

    #[test]
    fn test_inbox_key_orders_by_timestamp_then_id() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();

        let mk = |id, created_at| Message {
            id,
            sender: Uuid::new_v4(),
            recipient: Uuid::new_v4(),
            body: String::new(),
            status: MessageStatus::Pending,
            created_at,
            status_changed_at: created_at,
        };

        let early = mk(7, t0);
        let late = mk(2, t1);
        let tied = mk(8, t0);

        assert!(early.inbox_key() < late.inbox_key());
        assert!(early.inbox_key() < tied.inbox_key());
    }
}
