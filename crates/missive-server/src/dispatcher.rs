//! Request dispatch.
//!
//! One handler per action. Every request produces exactly one response
//! envelope: business failures ride inside the envelope and leave the
//! connection open, transport failures propagate to the connection driver
//! and close it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use missive_core::Account;
use missive_protocol::{
    AccountPage, AccountSummary, Action, CheckInboxRequest, CheckUsernameRequest,
    DeleteAccountRequest, DeleteMessageRequest, Envelope, ErrorKind, InboxPage,
    ListAccountsRequest, LoginOk, LoginRequest, RawFrame, ReadMessagesRequest, Request,
    SendMessageOk, SendMessageRequest, UsernameStatus, WireMode,
};

use crate::connection::Session;
use crate::delivery::DeliveryEngine;
use crate::error::ServerResult;
use crate::store::{MessageStore, StoreError};

/// What the connection driver does with a handled request.
#[derive(Debug)]
pub struct Dispatch {
    /// Encoded response frame, ready to write.
    pub frame: Vec<u8>,
    /// Close the connection once the response is flushed.
    pub close_after: bool,
}

/// Routes decoded requests to their handlers.
pub struct Dispatcher {
    store: Arc<dyn MessageStore>,
    delivery: Arc<DeliveryEngine>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given store and delivery engine.
    pub fn new(store: Arc<dyn MessageStore>, delivery: Arc<DeliveryEngine>) -> Self {
        Self { store, delivery }
    }

    /// The delivery engine, for connection lifecycle calls.
    pub fn delivery(&self) -> &DeliveryEngine {
        &self.delivery
    }

    /// Handles a single request frame and returns the encoded response.
    #[tracing::instrument(
        skip(self, session, frame),
        fields(conn_id = session.conn_id, action = %frame.action, duration_ms)
    )]
    pub async fn dispatch(&self, session: &mut Session, frame: RawFrame) -> ServerResult<Dispatch> {
        use tracing::Span;

        let start = std::time::Instant::now();
        let mode = frame.mode;
        let action = frame.action;

        let request = match Request::decode_content(action, mode, &frame.content) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "failed to decode request content");
                return Err(err.into());
            }
        };

        let mut close_after = false;
        let frame = match (request, session.account.clone()) {
            (Request::CheckUsername(req), _) => self.check_username(mode, &req).await?,
            (Request::Login(req), _) => self.login(session, mode, req).await?,
            (Request::Ping, _) => {
                debug!("answering ping");
                Envelope::<()>::ok_empty().to_frame(mode, Action::Ping)?
            }
            (Request::ListAccounts(req), Some(_)) => self.list_accounts(mode, &req).await?,
            (Request::SendMessage(req), Some(account)) => {
                self.send_message(mode, &account, req).await?
            }
            (Request::CheckInbox(req), Some(account)) => {
                self.check_inbox(mode, &account, &req).await?
            }
            (Request::ReadMessages(req), Some(account)) => {
                self.read_messages(mode, &account, &req).await?
            }
            (Request::DeleteMessage(req), Some(account)) => {
                self.delete_message(mode, &account, &req).await?
            }
            (Request::DeleteAccount(req), Some(account)) => {
                let (frame, close) = self.delete_account(session, mode, &account, &req).await?;
                close_after = close;
                frame
            }
            (_, None) => {
                debug!("rejecting request from unauthenticated connection");
                failure(mode, action, ErrorKind::AuthenticationFailed, "log in first")?
            }
        };

        let duration = start.elapsed();
        if tracing::enabled!(tracing::Level::DEBUG) {
            Span::current().record("duration_ms", duration.as_millis());
            debug!(duration_ms = duration.as_millis(), "request handled");
        }

        Ok(Dispatch { frame, close_after })
    }

    async fn check_username(
        &self,
        mode: WireMode,
        request: &CheckUsernameRequest,
    ) -> ServerResult<Vec<u8>> {
        let available = self
            .store
            .find_account_by_username(&request.username)
            .await?
            .is_none();
        debug!(username = %request.username, available, "username checked");
        let body = UsernameStatus {
            username: request.username.clone(),
            available,
        };
        Ok(Envelope::ok(body).to_frame(mode, Action::CheckUsername)?)
    }

    /// Login-or-create: an unknown username registers a new account with
    /// the supplied digest; a known one must match it.
    async fn login(
        &self,
        session: &mut Session,
        mode: WireMode,
        request: LoginRequest,
    ) -> ServerResult<Vec<u8>> {
        let found = self
            .store
            .find_account_by_username(&request.username)
            .await?;
        let (account, created) = match found {
            Some(account) if account.password_hash == request.password_hash => (account, false),
            Some(_) => {
                debug!(username = %request.username, "password digest mismatch");
                return failure(
                    mode,
                    Action::Login,
                    ErrorKind::AuthenticationFailed,
                    "wrong password",
                );
            }
            None => {
                match self
                    .store
                    .create_account(&request.username, &request.password_hash)
                    .await
                {
                    Ok(account) => (account, true),
                    // Lost a create race; the username is taken after all.
                    Err(err @ StoreError::UsernameTaken(_)) => {
                        return failure(
                            mode,
                            Action::Login,
                            ErrorKind::UsernameTaken,
                            err.to_string(),
                        );
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        // A connection may re-login; the old binding goes first so at most
        // one account is ever bound to it.
        if let Some(previous) = session.account.take() {
            self.delivery.unbind(previous.id, session.conn_id).await;
        }

        let pending_count = self.delivery.pending_count(account.id).await?;
        self.delivery
            .bind(account.id, session.conn_id, session.push.clone())
            .await;
        info!(
            username = %account.username,
            account_id = %account.id,
            created,
            pending_count,
            "account bound to connection"
        );

        let body = LoginOk {
            account_id: account.id,
            username: account.username.clone(),
            created,
            pending_count,
        };
        session.account = Some(account);
        Ok(Envelope::ok(body).to_frame(mode, Action::Login)?)
    }

    async fn list_accounts(
        &self,
        mode: WireMode,
        request: &ListAccountsRequest,
    ) -> ServerResult<Vec<u8>> {
        let (accounts, total) = self
            .store
            .list_accounts(&request.search, request.offset, request.limit)
            .await?;
        debug!(
            search = %request.search,
            offset = request.offset,
            returned = accounts.len(),
            total,
            "account directory page"
        );
        let body = AccountPage {
            accounts: accounts
                .into_iter()
                .map(|account| AccountSummary {
                    account_id: account.id,
                    username: account.username,
                })
                .collect(),
            total,
        };
        Ok(Envelope::ok(body).to_frame(mode, Action::ListAccounts)?)
    }

    async fn send_message(
        &self,
        mode: WireMode,
        sender: &Account,
        request: SendMessageRequest,
    ) -> ServerResult<Vec<u8>> {
        let Some(recipient) = self
            .store
            .find_account_by_username(&request.recipient)
            .await?
        else {
            return failure(
                mode,
                Action::SendMessage,
                ErrorKind::NotFound,
                format!("no account named '{}'", request.recipient),
            );
        };

        match self
            .delivery
            .send(sender, recipient.id, request.body, request.created_at)
            .await
        {
            Ok((message, delivered)) => {
                debug!(
                    message_id = message.id,
                    recipient = %recipient.username,
                    delivered,
                    "message accepted"
                );
                let body = SendMessageOk {
                    message_id: message.id,
                    delivered,
                };
                Ok(Envelope::ok(body).to_frame(mode, Action::SendMessage)?)
            }
            Err(err) => business_failure(mode, Action::SendMessage, err),
        }
    }

    async fn check_inbox(
        &self,
        mode: WireMode,
        account: &Account,
        request: &CheckInboxRequest,
    ) -> ServerResult<Vec<u8>> {
        match self.delivery.release_pending(account.id, request.limit).await {
            Ok(messages) => {
                debug!(count = messages.len(), "inbox check released pending messages");
                Ok(Envelope::ok(InboxPage { messages }).to_frame(mode, Action::CheckInbox)?)
            }
            Err(err) => business_failure(mode, Action::CheckInbox, err),
        }
    }

    async fn read_messages(
        &self,
        mode: WireMode,
        account: &Account,
        request: &ReadMessagesRequest,
    ) -> ServerResult<Vec<u8>> {
        match self.delivery.mark_read(account.id, request.limit).await {
            Ok(messages) => {
                debug!(count = messages.len(), "delivered messages marked seen");
                Ok(Envelope::ok(InboxPage { messages }).to_frame(mode, Action::ReadMessages)?)
            }
            Err(err) => business_failure(mode, Action::ReadMessages, err),
        }
    }

    async fn delete_message(
        &self,
        mode: WireMode,
        account: &Account,
        request: &DeleteMessageRequest,
    ) -> ServerResult<Vec<u8>> {
        match self
            .store
            .delete_message(request.message_id, account.id)
            .await
        {
            Ok(()) => {
                info!(message_id = request.message_id, "message deleted");
                Ok(Envelope::<()>::ok_empty().to_frame(mode, Action::DeleteMessage)?)
            }
            Err(err) => business_failure(mode, Action::DeleteMessage, err),
        }
    }

    /// Verifies the password again, then deletes the account and its
    /// messages. The connection closes after the response is flushed.
    async fn delete_account(
        &self,
        session: &mut Session,
        mode: WireMode,
        account: &Account,
        request: &DeleteAccountRequest,
    ) -> ServerResult<(Vec<u8>, bool)> {
        let verified = match self
            .store
            .verify_password(account.id, &request.password_hash)
            .await
        {
            Ok(verified) => verified,
            Err(err) => return Ok((business_failure(mode, Action::DeleteAccount, err)?, false)),
        };
        if !verified {
            debug!("account deletion rejected: digest mismatch");
            let frame = failure(
                mode,
                Action::DeleteAccount,
                ErrorKind::AuthenticationFailed,
                "wrong password",
            )?;
            return Ok((frame, false));
        }

        match self.store.delete_account(account.id).await {
            Ok(()) => {
                self.delivery.unbind(account.id, session.conn_id).await;
                session.account = None;
                info!(username = %account.username, account_id = %account.id, "account deleted");
                let frame = Envelope::<()>::ok_empty().to_frame(mode, Action::DeleteAccount)?;
                Ok((frame, true))
            }
            Err(err) => Ok((business_failure(mode, Action::DeleteAccount, err)?, false)),
        }
    }
}

fn failure(
    mode: WireMode,
    action: Action,
    kind: ErrorKind,
    message: impl Into<String>,
) -> ServerResult<Vec<u8>> {
    Ok(Envelope::<()>::failure(kind, message).to_frame(mode, action)?)
}

/// Business failures become error envelopes; anything else propagates and
/// takes the connection down.
fn business_failure(mode: WireMode, action: Action, err: StoreError) -> ServerResult<Vec<u8>> {
    let kind = match &err {
        StoreError::UsernameTaken(_) => ErrorKind::UsernameTaken,
        StoreError::NotFound(_) => ErrorKind::NotFound,
        StoreError::Forbidden(_) => ErrorKind::Forbidden,
        StoreError::InvalidTransition { .. } => return Err(err.into()),
    };
    failure(mode, action, kind, err.to_string())
}
