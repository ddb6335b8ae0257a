//! Actions, payloads, and the response envelope.
//!
//! Every type here crosses the wire in both encodings, so the structs stay
//! flat and fully populated: no `flatten`, no `skip_serializing_if`, no
//! internally tagged enums. Positional (compact) decoding relies on every
//! field being present in declaration order.

use chrono::{DateTime, Utc};
use missive_core::{AccountId, MessageId, MessageStatus};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::codec::{self, WireMode};
use crate::error::{ProtocolError, ProtocolResult};
use crate::framing;

/// Everything a frame can ask for or announce.
///
/// Declaration order is the compact wire order; append only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Is a username taken? (pre-login probe)
    CheckUsername,
    /// Authenticate, creating the account if the username is free.
    Login,
    /// Search and page through accounts.
    ListAccounts,
    /// Send a message to another account.
    SendMessage,
    /// Release pending messages (the offline-delivery event).
    CheckInbox,
    /// Mark delivered messages seen and fetch them.
    ReadMessages,
    /// Permanently delete one received message.
    DeleteMessage,
    /// Delete the authenticated account.
    DeleteAccount,
    /// Server push: a message delivered while the recipient is online.
    DeliverMessage,
    /// Liveness probe with no payload.
    Ping,
}

impl Action {
    /// Wire/display name of the action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Action::CheckUsername => "check_username",
            Action::Login => "login",
            Action::ListAccounts => "list_accounts",
            Action::SendMessage => "send_message",
            Action::CheckInbox => "check_inbox",
            Action::ReadMessages => "read_messages",
            Action::DeleteMessage => "delete_message",
            Action::DeleteAccount => "delete_account",
            Action::DeliverMessage => "deliver_message",
            Action::Ping => "ping",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Request payloads ---

/// Payload of [`Action::CheckUsername`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckUsernameRequest {
    /// Username to probe.
    pub username: String,
}

/// Payload of [`Action::Login`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Case-sensitive username.
    pub username: String,
    /// SHA-256 hex digest of the password; plaintext never crosses the wire.
    pub password_hash: String,
}

/// Payload of [`Action::ListAccounts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListAccountsRequest {
    /// Substring filter; empty matches every account.
    pub search: String,
    /// Number of matching accounts to skip.
    pub offset: u32,
    /// Maximum number of accounts to return.
    pub limit: u32,
}

/// Payload of [`Action::SendMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Recipient username.
    pub recipient: String,
    /// Message text.
    pub body: String,
    /// Client-side creation time; the conversation ordering key.
    pub created_at: DateTime<Utc>,
}

/// Payload of [`Action::CheckInbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInboxRequest {
    /// How many pending messages to release in this call.
    pub limit: u32,
}

/// Payload of [`Action::ReadMessages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadMessagesRequest {
    /// How many delivered messages to mark seen and return.
    pub limit: u32,
}

/// Payload of [`Action::DeleteMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessageRequest {
    /// Message to delete; the caller must be its recipient.
    pub message_id: MessageId,
}

/// Payload of [`Action::DeleteAccount`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAccountRequest {
    /// Password digest, re-verified before deletion.
    pub password_hash: String,
}

// --- Response bodies ---

/// Body of a [`Action::CheckUsername`] response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameStatus {
    /// The probed username, echoed back.
    pub username: String,
    /// True when no account holds this username yet.
    pub available: bool,
}

/// Body of a successful [`Action::Login`] response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOk {
    /// The authenticated account.
    pub account_id: AccountId,
    /// Echo of the username.
    pub username: String,
    /// True when this login created the account.
    pub created: bool,
    /// Messages waiting in `pending` for this account.
    pub pending_count: u64,
}

/// One row of an account listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Account id.
    pub account_id: AccountId,
    /// Username.
    pub username: String,
}

/// Body of a [`Action::ListAccounts`] response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPage {
    /// The requested page, ordered by username.
    pub accounts: Vec<AccountSummary>,
    /// Total matches for the search term, across all pages.
    pub total: u64,
}

/// Body of a successful [`Action::SendMessage`] response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageOk {
    /// Id assigned to the stored message.
    pub message_id: MessageId,
    /// True when the recipient was online and the message was pushed
    /// immediately; false when it was queued as pending.
    pub delivered: bool,
}

/// A message as shown to its recipient.
///
/// Body of [`Action::DeliverMessage`] pushes and the element type of
/// [`InboxPage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    /// Message id (needed to delete it later).
    pub message_id: MessageId,
    /// Sender username.
    pub sender: String,
    /// Message text.
    pub body: String,
    /// Status after the operation that produced this view.
    pub status: MessageStatus,
    /// Client-supplied creation time.
    pub created_at: DateTime<Utc>,
}

/// Body of [`Action::CheckInbox`] and [`Action::ReadMessages`] responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxPage {
    /// Oldest first, by creation time then id.
    pub messages: Vec<MessageView>,
}

// --- Envelope ---

/// Business error kinds carried in a failure envelope.
///
/// These never close the connection; transport errors
/// ([`crate::ProtocolError`]) do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Username already registered (account creation race).
    UsernameTaken,
    /// Account or message does not exist.
    NotFound,
    /// Caller may not touch this resource.
    Forbidden,
    /// Wrong password, or the action requires a login.
    AuthenticationFailed,
}

impl ErrorKind {
    /// Returns a human-readable description of the error kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::UsernameTaken => "Username already taken",
            Self::NotFound => "Requested resource not found",
            Self::Forbidden => "Not allowed for this account",
            Self::AuthenticationFailed => "Authentication failed",
        }
    }
}

/// Structured error details in a failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error kind.
    pub kind: ErrorKind,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorInfo {
    /// Creates a new error info.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// Uniform result envelope for every response and push.
///
/// Success or failure, a request always gets exactly one of these back
/// under the same action it was sent with; unsolicited pushes arrive under
/// [`Action::DeliverMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// True when the request (or push) succeeded.
    pub success: bool,
    /// Set when `success` is false.
    pub error: Option<ErrorInfo>,
    /// Action-specific body; `None` for bodyless successes and failures.
    pub body: Option<T>,
}

impl<T> Envelope<T> {
    /// Creates a success envelope with a body.
    pub fn ok(body: T) -> Self {
        Self {
            success: true,
            error: None,
            body: Some(body),
        }
    }

    /// Creates a bodyless success envelope.
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            error: None,
            body: None,
        }
    }

    /// Creates a failure envelope.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(ErrorInfo::new(kind, message)),
            body: None,
        }
    }

    /// Returns the error details if this is a failure.
    pub fn as_error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encodes this envelope into a complete frame under `action`.
    pub fn to_frame(&self, mode: WireMode, action: Action) -> ProtocolResult<Vec<u8>> {
        let content = codec::encode_payload(mode, self)?;
        framing::encode_frame(mode, action, &content)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decodes an envelope from frame content.
    pub fn from_content(mode: WireMode, content: &[u8]) -> ProtocolResult<Self> {
        codec::decode_payload(mode, content)
    }
}

// --- Requests ---

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Probe a username.
    CheckUsername(CheckUsernameRequest),
    /// Authenticate or create an account.
    Login(LoginRequest),
    /// Search/page accounts.
    ListAccounts(ListAccountsRequest),
    /// Send a message.
    SendMessage(SendMessageRequest),
    /// Release pending messages.
    CheckInbox(CheckInboxRequest),
    /// Mark delivered messages seen.
    ReadMessages(ReadMessagesRequest),
    /// Delete one received message.
    DeleteMessage(DeleteMessageRequest),
    /// Delete the calling account.
    DeleteAccount(DeleteAccountRequest),
    /// Liveness probe.
    Ping,
}

impl Request {
    /// Creates a CheckUsername request.
    pub fn check_username(username: impl Into<String>) -> Self {
        Self::CheckUsername(CheckUsernameRequest {
            username: username.into(),
        })
    }

    /// Creates a Login request.
    pub fn login(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self::Login(LoginRequest {
            username: username.into(),
            password_hash: password_hash.into(),
        })
    }

    /// Creates a ListAccounts request.
    pub fn list_accounts(search: impl Into<String>, offset: u32, limit: u32) -> Self {
        Self::ListAccounts(ListAccountsRequest {
            search: search.into(),
            offset,
            limit,
        })
    }

    /// Creates a SendMessage request.
    pub fn send_message(
        recipient: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::SendMessage(SendMessageRequest {
            recipient: recipient.into(),
            body: body.into(),
            created_at,
        })
    }

    /// Creates a CheckInbox request.
    pub fn check_inbox(limit: u32) -> Self {
        Self::CheckInbox(CheckInboxRequest { limit })
    }

    /// Creates a ReadMessages request.
    pub fn read_messages(limit: u32) -> Self {
        Self::ReadMessages(ReadMessagesRequest { limit })
    }

    /// Creates a DeleteMessage request.
    pub fn delete_message(message_id: MessageId) -> Self {
        Self::DeleteMessage(DeleteMessageRequest { message_id })
    }

    /// Creates a DeleteAccount request.
    pub fn delete_account(password_hash: impl Into<String>) -> Self {
        Self::DeleteAccount(DeleteAccountRequest {
            password_hash: password_hash.into(),
        })
    }

    /// The action this request travels under.
    #[must_use]
    pub fn action(&self) -> Action {
        match self {
            Request::CheckUsername(_) => Action::CheckUsername,
            Request::Login(_) => Action::Login,
            Request::ListAccounts(_) => Action::ListAccounts,
            Request::SendMessage(_) => Action::SendMessage,
            Request::CheckInbox(_) => Action::CheckInbox,
            Request::ReadMessages(_) => Action::ReadMessages,
            Request::DeleteMessage(_) => Action::DeleteMessage,
            Request::DeleteAccount(_) => Action::DeleteAccount,
            Request::Ping => Action::Ping,
        }
    }

    /// Encodes just the content bytes for this request.
    ///
    /// Ping is the one payload-less action and encodes to zero bytes in
    /// both modes (no checksum either; there is nothing to protect).
    pub fn encode_content(&self, mode: WireMode) -> ProtocolResult<Vec<u8>> {
        match self {
            Request::CheckUsername(p) => codec::encode_payload(mode, p),
            Request::Login(p) => codec::encode_payload(mode, p),
            Request::ListAccounts(p) => codec::encode_payload(mode, p),
            Request::SendMessage(p) => codec::encode_payload(mode, p),
            Request::CheckInbox(p) => codec::encode_payload(mode, p),
            Request::ReadMessages(p) => codec::encode_payload(mode, p),
            Request::DeleteMessage(p) => codec::encode_payload(mode, p),
            Request::DeleteAccount(p) => codec::encode_payload(mode, p),
            Request::Ping => Ok(Vec::new()),
        }
    }

    /// Decodes frame content into a request for `action`.
    pub fn decode_content(
        action: Action,
        mode: WireMode,
        content: &[u8],
    ) -> ProtocolResult<Request> {
        match action {
            Action::CheckUsername => {
                Ok(Request::CheckUsername(codec::decode_payload(mode, content)?))
            }
            Action::Login => Ok(Request::Login(codec::decode_payload(mode, content)?)),
            Action::ListAccounts => {
                Ok(Request::ListAccounts(codec::decode_payload(mode, content)?))
            }
            Action::SendMessage => Ok(Request::SendMessage(codec::decode_payload(mode, content)?)),
            Action::CheckInbox => Ok(Request::CheckInbox(codec::decode_payload(mode, content)?)),
            Action::ReadMessages => {
                Ok(Request::ReadMessages(codec::decode_payload(mode, content)?))
            }
            Action::DeleteMessage => {
                Ok(Request::DeleteMessage(codec::decode_payload(mode, content)?))
            }
            Action::DeleteAccount => {
                Ok(Request::DeleteAccount(codec::decode_payload(mode, content)?))
            }
            Action::Ping => {
                if content.is_empty() {
                    Ok(Request::Ping)
                } else {
                    Err(ProtocolError::malformed("ping carries no payload"))
                }
            }
            Action::DeliverMessage => Err(ProtocolError::malformed(
                "deliver_message flows server to client only",
            )),
        }
    }

    /// Encodes this request into a complete frame.
    pub fn to_frame(&self, mode: WireMode) -> ProtocolResult<Vec<u8>> {
        framing::encode_frame(mode, self.action(), &self.encode_content(mode)?)
    }
}
