//! Durable account and message storage.
//!
//! [`MessageStore`] is the persistence seam: the dispatcher and delivery
//! engine speak only this trait, so a durable backend can replace
//! [`MemoryStore`] without touching protocol or connection code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use missive_core::{Account, AccountId, Message, MessageId, MessageStatus};

pub mod memory;

pub use memory::MemoryStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from store operations.
///
/// The first three have wire representations; `InvalidTransition` marks a
/// lifecycle invariant break and never leaves the server.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Username already registered.
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    /// Account or message does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Requester does not own the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Message status may only move forward one step at a time.
    #[error("message {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: MessageId,
        from: MessageStatus,
        to: MessageStatus,
    },
}

/// Account and message persistence operations.
///
/// Implementations must keep usernames unique and message statuses on the
/// one-way `pending -> delivered -> seen` track.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Looks up an account by exact username.
    async fn find_account_by_username(&self, username: &str) -> StoreResult<Option<Account>>;

    /// Looks up an account by id.
    async fn find_account(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Creates an account, failing with [`StoreError::UsernameTaken`] on a
    /// duplicate username.
    async fn create_account(&self, username: &str, password_hash: &str) -> StoreResult<Account>;

    /// Compares the supplied digest against the stored one.
    async fn verify_password(&self, id: AccountId, password_hash: &str) -> StoreResult<bool>;

    /// Accounts whose username contains `search`, ordered by username,
    /// windowed by `offset`/`limit`. Also returns the total match count so
    /// clients can page.
    async fn list_accounts(
        &self,
        search: &str,
        offset: u32,
        limit: u32,
    ) -> StoreResult<(Vec<Account>, u64)>;

    /// Deletes an account and every message it sent or received.
    async fn delete_account(&self, id: AccountId) -> StoreResult<()>;

    /// Creates a message in `pending` status.
    async fn create_message(
        &self,
        sender: AccountId,
        recipient: AccountId,
        body: String,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Message>;

    /// Advances a message's status, rejecting skips and backward moves.
    /// Returns the updated message.
    async fn set_message_status(
        &self,
        id: MessageId,
        status: MessageStatus,
    ) -> StoreResult<Message>;

    /// A recipient's messages in inbox order (created timestamp, then id),
    /// optionally filtered by status, at most `limit`.
    async fn list_messages(
        &self,
        recipient: AccountId,
        status: Option<MessageStatus>,
        limit: u32,
    ) -> StoreResult<Vec<Message>>;

    /// Deletes a message; only its recipient may do so.
    async fn delete_message(&self, id: MessageId, requester: AccountId) -> StoreResult<()>;

    /// Number of a recipient's messages, optionally filtered by status.
    async fn count_messages(
        &self,
        recipient: AccountId,
        status: Option<MessageStatus>,
    ) -> StoreResult<u64>;
}
