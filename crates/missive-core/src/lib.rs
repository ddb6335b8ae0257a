//! Core types: accounts, messages, delivery status, auth digest, tracing

pub mod auth;
pub mod tracing;
pub mod types;

pub use auth::{DIGEST_LEN, hash_password};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use types::{Account, AccountId, Message, MessageId, MessageStatus};
