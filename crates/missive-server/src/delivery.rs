//! Message delivery: push to live connections, queue for everyone else.
//!
//! The engine owns the roster mapping each account to its one live
//! connection. Connections bind on login and unbind on teardown; the
//! engine never discovers connections on its own. All message status
//! changes funnel through here so the `pending -> delivered -> seen`
//! lifecycle advances in single forward steps.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use missive_core::{Account, AccountId, Message, MessageStatus};
use missive_protocol::MessageView;

use crate::store::{MessageStore, StoreError, StoreResult};

/// Command pushed to a connection task over its roster channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushCommand {
    /// Deliver a message to the connected client as an unsolicited frame.
    Deliver(MessageView),
    /// A newer login took over the account; the connection must close.
    Evicted,
}

/// Sending half of a connection's push channel.
pub type PushHandle = mpsc::UnboundedSender<PushCommand>;

struct RosterEntry {
    conn_id: u64,
    handle: PushHandle,
}

/// Decides between immediate push and offline queueing, and walks each
/// message through its status lifecycle.
pub struct DeliveryEngine {
    store: Arc<dyn MessageStore>,
    roster: RwLock<HashMap<AccountId, RosterEntry>>,
}

impl DeliveryEngine {
    /// Creates an engine with an empty roster.
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            roster: RwLock::new(HashMap::new()),
        }
    }

    /// Binds an account to a live connection, superseding any previous one.
    ///
    /// The superseded connection is told to close; its own guarded unbind
    /// can then no longer evict the newcomer.
    pub async fn bind(&self, account_id: AccountId, conn_id: u64, handle: PushHandle) {
        let previous = {
            let mut roster = self.roster.write().await;
            roster.insert(account_id, RosterEntry { conn_id, handle })
        };
        if let Some(old) = previous {
            debug!(
                %account_id,
                old_conn = old.conn_id,
                new_conn = conn_id,
                "login superseded an existing connection"
            );
            let _ = old.handle.send(PushCommand::Evicted);
        }
    }

    /// Unbinds an account, but only while the roster entry still belongs
    /// to `conn_id`.
    pub async fn unbind(&self, account_id: AccountId, conn_id: u64) {
        let mut roster = self.roster.write().await;
        if roster
            .get(&account_id)
            .is_some_and(|entry| entry.conn_id == conn_id)
        {
            roster.remove(&account_id);
        }
    }

    /// True when the account has a live bound connection.
    pub async fn is_online(&self, account_id: AccountId) -> bool {
        self.roster.read().await.contains_key(&account_id)
    }

    /// Creates the message and attempts immediate delivery.
    ///
    /// Returns the stored message and whether it was pushed. A push counts
    /// as delivery once the frame is handed to the recipient's connection;
    /// a dead handle means the recipient is offline and the message stays
    /// pending.
    pub async fn send(
        &self,
        sender: &Account,
        recipient: AccountId,
        body: String,
        created_at: DateTime<Utc>,
    ) -> StoreResult<(Message, bool)> {
        let message = self
            .store
            .create_message(sender.id, recipient, body, created_at)
            .await?;

        // Clone the handle out so no store call runs under the roster lock.
        let handle = {
            let roster = self.roster.read().await;
            roster.get(&recipient).map(|entry| entry.handle.clone())
        };
        let Some(handle) = handle else {
            debug!(message_id = message.id, "recipient offline, message queued");
            return Ok((message, false));
        };

        let view = render(&message, MessageStatus::Delivered, &sender.username);
        if handle.send(PushCommand::Deliver(view)).is_err() {
            debug!(message_id = message.id, "push handle dead, message queued");
            return Ok((message, false));
        }
        let delivered = self
            .store
            .set_message_status(message.id, MessageStatus::Delivered)
            .await?;
        debug!(message_id = delivered.id, "message pushed to live connection");
        Ok((delivered, true))
    }

    /// Releases up to `limit` pending messages to `recipient`, oldest
    /// first, marking each delivered.
    ///
    /// Inbox retrieval is the delivery event for messages that arrived
    /// while the recipient was offline.
    pub async fn release_pending(
        &self,
        recipient: AccountId,
        limit: u32,
    ) -> StoreResult<Vec<MessageView>> {
        let pending = self
            .store
            .list_messages(recipient, Some(MessageStatus::Pending), limit)
            .await?;
        self.advance(pending, MessageStatus::Delivered).await
    }

    /// Marks up to `limit` delivered messages seen, oldest first, and
    /// returns them for display.
    ///
    /// Messages still pending are untouched; they become visible here only
    /// after an inbox check or a live push has delivered them.
    pub async fn mark_read(
        &self,
        recipient: AccountId,
        limit: u32,
    ) -> StoreResult<Vec<MessageView>> {
        let delivered = self
            .store
            .list_messages(recipient, Some(MessageStatus::Delivered), limit)
            .await?;
        self.advance(delivered, MessageStatus::Seen).await
    }

    /// Pending-message count reported at login.
    pub async fn pending_count(&self, recipient: AccountId) -> StoreResult<u64> {
        self.store
            .count_messages(recipient, Some(MessageStatus::Pending))
            .await
    }

    async fn advance(
        &self,
        messages: Vec<Message>,
        status: MessageStatus,
    ) -> StoreResult<Vec<MessageView>> {
        let mut views = Vec::with_capacity(messages.len());
        for message in messages {
            let updated = self.store.set_message_status(message.id, status).await?;
            views.push(self.view_of(&updated).await?);
        }
        Ok(views)
    }

    async fn view_of(&self, message: &Message) -> StoreResult<MessageView> {
        // Cascade deletion removes a sender's messages with the account,
        // so the sender is still resolvable here.
        let sender = self
            .store
            .find_account(message.sender)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("account {}", message.sender)))?;
        Ok(render(message, message.status, &sender.username))
    }
}

fn render(message: &Message, status: MessageStatus, sender_name: &str) -> MessageView {
    MessageView {
        message_id: message.id,
        sender: sender_name.to_string(),
        body: message.body.clone(),
        status,
        created_at: message.created_at,
    }
}
