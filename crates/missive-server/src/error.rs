//! Server error types.

use std::io;
use thiserror::Error;

use crate::store::StoreError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (socket, accept, read/write).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding, checksum); fatal to the connection.
    #[error("Protocol error: {0}")]
    Protocol(#[from] missive_protocol::ProtocolError),

    /// Store error that has no wire representation. Business failures
    /// (taken, not found, forbidden) never take this path; they become
    /// error envelopes in the dispatcher.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Listen address already in use.
    #[error("Address already in use: {addr}")]
    AddrInUse { addr: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an address in use error.
    pub fn addr_in_use(addr: impl Into<String>) -> Self {
        Self::AddrInUse { addr: addr.into() }
    }
}
