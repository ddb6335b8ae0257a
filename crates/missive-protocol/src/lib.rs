//! Wire framing and request/response types for missive.
//!
//! This crate defines Protocol v1 for communication between the missive
//! client and server over TCP.
//!
//! # Frame layout
//!
//! Every frame, in either direction, is a fixed preamble followed by a
//! mode-encoded header and the content bytes:
//!
//! ```text
//! +---------+---------+----------------+===============+===============+
//! | version |  mode   | header length  |    header     |    content    |
//! | (u8)    |  (u8)   | (u16, BE)      |  (per mode)   |  (per mode)   |
//! +---------+---------+----------------+===============+===============+
//! ```
//!
//! The preamble is always 4 bytes so it can be read deterministically before
//! anything mode-specific is decoded. The header carries the content byte
//! length and the action identifier.
//!
//! # Encodings
//!
//! Two encodings are supported, selected per connection by the first frame's
//! mode tag and fixed for the connection's lifetime:
//!
//! - [`WireMode::Structured`] (tag 0): JSON, self-describing, inspectable.
//! - [`WireMode::Compact`] (tag 1): bincode in declaration-order, followed by
//!   a 4-byte big-endian CRC32 of the payload bytes at the end of the content.
//!
//! # Example
//!
//! ```rust
//! use missive_protocol::{FrameAssembler, Request, WireMode};
//!
//! let frame = Request::check_username("alice")
//!     .to_frame(WireMode::Structured)
//!     .unwrap();
//!
//! let mut assembler = FrameAssembler::new();
//! assembler.feed(&frame);
//! let raw = assembler.next_frame().unwrap().unwrap();
//! let decoded = Request::decode_content(raw.action, WireMode::Structured, &raw.content).unwrap();
//! assert_eq!(decoded, Request::check_username("alice"));
//! ```

mod assembler;
mod codec;
mod error;
mod framing;
mod types;

pub use assembler::{FrameAssembler, RawFrame};
pub use codec::{WireMode, decode_payload, encode_payload};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{FrameHeader, Preamble, decode_header, encode_frame, encode_header};
pub use types::{
    AccountPage, AccountSummary, Action, CheckInboxRequest, CheckUsernameRequest,
    DeleteAccountRequest, DeleteMessageRequest, Envelope, ErrorInfo, ErrorKind, InboxPage,
    ListAccountsRequest, LoginOk, LoginRequest, MessageView, ReadMessagesRequest, Request,
    SendMessageOk, SendMessageRequest, UsernameStatus,
};

/// Protocol version carried in every preamble.
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the fixed preamble in bytes.
pub const PREAMBLE_SIZE: usize = 4;

/// Maximum encoded header size (1 KB).
pub const MAX_HEADER_SIZE: u16 = 1024;

/// Maximum content size (1 MB).
pub const MAX_CONTENT_SIZE: u32 = 1024 * 1024;
