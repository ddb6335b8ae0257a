//! In-memory store used by the server binary and tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use missive_core::{Account, AccountId, Message, MessageId, MessageStatus};

use super::{MessageStore, StoreError, StoreResult};

/// Non-durable [`MessageStore`] backed by maps behind one lock.
///
/// State is lost on restart. Mutations take the lock exclusively, which
/// also serializes the username uniqueness check with the insert.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    by_username: HashMap<String, AccountId>,
    messages: BTreeMap<MessageId, Message>,
    last_message_id: MessageId,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn inbox<'a>(
        &'a self,
        recipient: AccountId,
        status: Option<MessageStatus>,
    ) -> impl Iterator<Item = &'a Message> {
        self.messages
            .values()
            .filter(move |m| m.recipient == recipient && status.is_none_or(|s| m.status == s))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn find_account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let state = self.inner.read().await;
        let account = state
            .by_username
            .get(username)
            .and_then(|id| state.accounts.get(id))
            .cloned();
        Ok(account)
    }

    async fn find_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let state = self.inner.read().await;
        Ok(state.accounts.get(&id).cloned())
    }

    async fn create_account(&self, username: &str, password_hash: &str) -> StoreResult<Account> {
        let mut state = self.inner.write().await;
        if state.by_username.contains_key(username) {
            return Err(StoreError::UsernameTaken(username.to_string()));
        }
        let account = Account::new(username, password_hash);
        state.by_username.insert(username.to_string(), account.id);
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn verify_password(&self, id: AccountId, password_hash: &str) -> StoreResult<bool> {
        let state = self.inner.read().await;
        let account = state
            .accounts
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        Ok(account.password_hash == password_hash)
    }

    async fn list_accounts(
        &self,
        search: &str,
        offset: u32,
        limit: u32,
    ) -> StoreResult<(Vec<Account>, u64)> {
        let state = self.inner.read().await;
        let mut matches: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.username.contains(search))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.username.cmp(&b.username));
        let total = matches.len() as u64;
        let page = matches
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn delete_account(&self, id: AccountId) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        let account = state
            .accounts
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        state.by_username.remove(&account.username);
        state
            .messages
            .retain(|_, m| m.sender != id && m.recipient != id);
        Ok(())
    }

    async fn create_message(
        &self,
        sender: AccountId,
        recipient: AccountId,
        body: String,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Message> {
        let mut state = self.inner.write().await;
        if !state.accounts.contains_key(&recipient) {
            return Err(StoreError::NotFound(format!("account {recipient}")));
        }
        state.last_message_id += 1;
        let message = Message {
            id: state.last_message_id,
            sender,
            recipient,
            body,
            status: MessageStatus::Pending,
            created_at,
            status_changed_at: Utc::now(),
        };
        state.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn set_message_status(
        &self,
        id: MessageId,
        status: MessageStatus,
    ) -> StoreResult<Message> {
        let mut state = self.inner.write().await;
        let message = state
            .messages
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        if !message.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: message.status,
                to: status,
            });
        }
        message.status = status;
        message.status_changed_at = Utc::now();
        Ok(message.clone())
    }

    async fn list_messages(
        &self,
        recipient: AccountId,
        status: Option<MessageStatus>,
        limit: u32,
    ) -> StoreResult<Vec<Message>> {
        let state = self.inner.read().await;
        let mut messages: Vec<Message> = state.inbox(recipient, status).cloned().collect();
        messages.sort_by_key(Message::inbox_key);
        messages.truncate(limit as usize);
        Ok(messages)
    }

    async fn delete_message(&self, id: MessageId, requester: AccountId) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        let message = state
            .messages
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        if message.recipient != requester {
            return Err(StoreError::Forbidden(format!(
                "message {id} belongs to another inbox"
            )));
        }
        state.messages.remove(&id);
        Ok(())
    }

    async fn count_messages(
        &self,
        recipient: AccountId,
        status: Option<MessageStatus>,
    ) -> StoreResult<u64> {
        let state = self.inner.read().await;
        Ok(state.inbox(recipient, status).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 20, 12, 0, second).unwrap()
    }

    async fn seeded() -> (MemoryStore, Account, Account) {
        let store = MemoryStore::new();
        let alice = store.create_account("alice", "hash-a").await.unwrap();
        let bob = store.create_account("bob", "hash-b").await.unwrap();
        (store, alice, bob)
    }

    #[tokio::test]
    async fn create_and_find_account() {
        let (store, alice, bob) = seeded().await;
        assert_ne!(alice.id, bob.id);

        let found = store
            .find_account_by_username("alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, alice.id);
        assert_eq!(found.password_hash, "hash-a");

        let by_id = store.find_account(bob.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "bob");

        assert!(store.find_account_by_username("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_rejected() {
        let (store, _, _) = seeded().await;
        let result = store.create_account("alice", "other-hash").await;
        assert!(matches!(result, Err(StoreError::UsernameTaken(name)) if name == "alice"));
    }

    #[tokio::test]
    async fn verify_password_compares_digests() {
        let (store, alice, _) = seeded().await;
        assert!(store.verify_password(alice.id, "hash-a").await.unwrap());
        assert!(!store.verify_password(alice.id, "wrong").await.unwrap());

        let ghost = store.verify_password(uuid::Uuid::new_v4(), "hash-a").await;
        assert!(matches!(ghost, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_accounts_pages_are_disjoint_and_ordered() {
        let store = MemoryStore::new();
        for name in ["user3", "user1", "other", "user2"] {
            store.create_account(name, "h").await.unwrap();
        }

        let (first, total) = store.list_accounts("user", 0, 2).await.unwrap();
        let (second, total2) = store.list_accounts("user", 2, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(total2, 3);

        let first: Vec<_> = first.into_iter().map(|a| a.username).collect();
        let second: Vec<_> = second.into_iter().map(|a| a.username).collect();
        assert_eq!(first, ["user1", "user2"]);
        assert_eq!(second, ["user3"]);
    }

    #[tokio::test]
    async fn list_accounts_empty_search_matches_all() {
        let (store, _, _) = seeded().await;
        let (page, total) = store.list_accounts("", 0, 10).await.unwrap();
        assert_eq!(total, 2);
        let names: Vec<_> = page.into_iter().map(|a| a.username).collect();
        assert_eq!(names, ["alice", "bob"]);
    }

    #[tokio::test]
    async fn list_accounts_offset_past_end_is_empty() {
        let (store, _, _) = seeded().await;
        let (page, total) = store.list_accounts("", 5, 10).await.unwrap();
        assert_eq!(total, 2);
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn message_status_moves_forward_one_step_at_a_time() {
        let (store, alice, bob) = seeded().await;
        let message = store
            .create_message(alice.id, bob.id, "hi".into(), at(0))
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Pending);

        // pending -> seen skips a step
        let skip = store
            .set_message_status(message.id, MessageStatus::Seen)
            .await;
        assert!(matches!(skip, Err(StoreError::InvalidTransition { .. })));

        let delivered = store
            .set_message_status(message.id, MessageStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.status, MessageStatus::Delivered);

        // no going back
        let regress = store
            .set_message_status(message.id, MessageStatus::Pending)
            .await;
        assert!(matches!(regress, Err(StoreError::InvalidTransition { .. })));

        let seen = store
            .set_message_status(message.id, MessageStatus::Seen)
            .await
            .unwrap();
        assert_eq!(seen.status, MessageStatus::Seen);
    }

    #[tokio::test]
    async fn set_status_on_missing_message_is_not_found() {
        let (store, _, _) = seeded().await;
        let result = store.set_message_status(42, MessageStatus::Delivered).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn inbox_orders_by_created_then_id() {
        let (store, alice, bob) = seeded().await;
        // Arrival order differs from creation-time order.
        let late = store
            .create_message(alice.id, bob.id, "late".into(), at(30))
            .await
            .unwrap();
        let early = store
            .create_message(alice.id, bob.id, "early".into(), at(10))
            .await
            .unwrap();
        let tie = store
            .create_message(alice.id, bob.id, "tie".into(), at(30))
            .await
            .unwrap();

        let inbox = store.list_messages(bob.id, None, 10).await.unwrap();
        let ids: Vec<_> = inbox.iter().map(|m| m.id).collect();
        assert_eq!(ids, [early.id, late.id, tie.id]);
    }

    #[tokio::test]
    async fn list_messages_filters_status_and_limits() {
        let (store, alice, bob) = seeded().await;
        for second in 0..3 {
            store
                .create_message(alice.id, bob.id, format!("m{second}"), at(second))
                .await
                .unwrap();
        }
        let first = store.list_messages(bob.id, None, 10).await.unwrap()[0].id;
        store
            .set_message_status(first, MessageStatus::Delivered)
            .await
            .unwrap();

        let pending = store
            .list_messages(bob.id, Some(MessageStatus::Pending), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);

        let limited = store.list_messages(bob.id, None, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, first);

        assert_eq!(store.count_messages(bob.id, None).await.unwrap(), 3);
        assert_eq!(
            store
                .count_messages(bob.id, Some(MessageStatus::Pending))
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn only_the_recipient_may_delete() {
        let (store, alice, bob) = seeded().await;
        let message = store
            .create_message(alice.id, bob.id, "hi".into(), at(0))
            .await
            .unwrap();

        let as_sender = store.delete_message(message.id, alice.id).await;
        assert!(matches!(as_sender, Err(StoreError::Forbidden(_))));

        store.delete_message(message.id, bob.id).await.unwrap();
        assert_eq!(store.count_messages(bob.id, None).await.unwrap(), 0);

        let gone = store.delete_message(message.id, bob.id).await;
        assert!(matches!(gone, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn send_to_missing_account_is_not_found() {
        let (store, alice, _) = seeded().await;
        let result = store
            .create_message(alice.id, uuid::Uuid::new_v4(), "hi".into(), at(0))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_account_cascades_both_directions() {
        let (store, alice, bob) = seeded().await;
        let carol = store.create_account("carol", "hash-c").await.unwrap();

        store
            .create_message(alice.id, bob.id, "a to b".into(), at(0))
            .await
            .unwrap();
        store
            .create_message(bob.id, alice.id, "b to a".into(), at(1))
            .await
            .unwrap();
        store
            .create_message(carol.id, bob.id, "c to b".into(), at(2))
            .await
            .unwrap();

        store.delete_account(alice.id).await.unwrap();

        assert!(store.find_account(alice.id).await.unwrap().is_none());
        assert!(store.find_account_by_username("alice").await.unwrap().is_none());
        // Only the message not touching alice survives.
        let remaining = store.list_messages(bob.id, None, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].body, "c to b");
        assert_eq!(store.count_messages(alice.id, None).await.unwrap(), 0);

        let again = store.delete_account(alice.id).await;
        assert!(matches!(again, Err(StoreError::NotFound(_))));

        // The freed username can be registered again.
        store.create_account("alice", "new-hash").await.unwrap();
    }
}
