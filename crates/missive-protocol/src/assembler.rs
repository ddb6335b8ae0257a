//! Incremental frame assembly from a byte stream.
//!
//! [`FrameAssembler`] is the read side of the connection state machine,
//! kept free of I/O so it can be driven by sockets and by tests alike.
//! Bytes go in via [`FrameAssembler::feed`] in whatever chunks the
//! transport produces; [`FrameAssembler::next_frame`] advances through the
//! phases (preamble, header, content) and yields a [`RawFrame`] once a
//! whole frame is buffered. Each phase consumes exactly its own bytes and
//! leaves the remainder for the next, so a frame split across any number
//! of reads decodes identically to one delivered whole.
//!
//! The first preamble fixes the connection's [`WireMode`]; any later frame
//! announcing a different mode is malformed. After any error the assembler
//! is spent and the connection must be closed; transport errors are never
//! recoverable mid-stream.

use crate::PREAMBLE_SIZE;
use crate::codec::WireMode;
use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{Preamble, decode_header};
use crate::types::Action;

/// A fully assembled frame, content still encoded.
///
/// Payload decoding is the caller's job: servers decode a request for the
/// action, clients decode a response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Encoding the frame arrived in; replies must use the same one.
    pub mode: WireMode,
    /// Action from the frame header.
    pub action: Action,
    /// Raw content bytes (possibly empty).
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingPreamble,
    AwaitingHeader {
        mode: WireMode,
        header_len: usize,
    },
    AwaitingContent {
        mode: WireMode,
        action: Action,
        content_len: usize,
    },
}

/// Reassembles frames from arbitrarily fragmented input.
#[derive(Debug)]
pub struct FrameAssembler {
    phase: Phase,
    buf: Vec<u8>,
    mode: Option<WireMode>,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Creates an assembler that adopts the mode of the first frame it sees.
    ///
    /// This is the server side of the mode handshake.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingPreamble,
            buf: Vec::new(),
            mode: None,
        }
    }

    /// Creates an assembler pinned to a known mode.
    ///
    /// Used by the client, which chose the mode itself and must not accept
    /// replies in any other encoding.
    #[must_use]
    pub fn with_mode(mode: WireMode) -> Self {
        Self {
            phase: Phase::AwaitingPreamble,
            buf: Vec::new(),
            mode: Some(mode),
        }
    }

    /// The negotiated mode, if any frame (or pin) has established one.
    #[must_use]
    pub fn mode(&self) -> Option<WireMode> {
        self.mode
    }

    /// Appends transport bytes to the read buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// True when no partial frame is buffered.
    ///
    /// An EOF in this state is a clean disconnect; an EOF mid-frame means
    /// the peer vanished with a request in flight.
    #[must_use]
    pub fn is_between_frames(&self) -> bool {
        self.phase == Phase::AwaitingPreamble && self.buf.is_empty()
    }

    /// Number of buffered, not yet consumed bytes.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Advances through the phases as far as the buffered bytes allow.
    ///
    /// Returns `Ok(Some(frame))` when a whole frame is ready, `Ok(None)`
    /// when more bytes are needed. Call repeatedly to drain back-to-back
    /// frames; each call yields at most one so the caller can respond to
    /// a request before looking at the next (no pipelining).
    pub fn next_frame(&mut self) -> ProtocolResult<Option<RawFrame>> {
        loop {
            match self.phase {
                Phase::AwaitingPreamble => {
                    if self.buf.len() < PREAMBLE_SIZE {
                        return Ok(None);
                    }
                    let bytes = self.take(PREAMBLE_SIZE);
                    let mut fixed = [0u8; PREAMBLE_SIZE];
                    fixed.copy_from_slice(&bytes);
                    let preamble = Preamble::parse(&fixed)?;

                    match self.mode {
                        None => self.mode = Some(preamble.mode),
                        Some(locked) if locked != preamble.mode => {
                            return Err(ProtocolError::malformed(format!(
                                "encoding changed mid-connection: {} then {}",
                                locked, preamble.mode
                            )));
                        }
                        Some(_) => {}
                    }

                    self.phase = Phase::AwaitingHeader {
                        mode: preamble.mode,
                        header_len: preamble.header_len as usize,
                    };
                }
                Phase::AwaitingHeader { mode, header_len } => {
                    if self.buf.len() < header_len {
                        return Ok(None);
                    }
                    let bytes = self.take(header_len);
                    // decode_header enforces the content size cap, so the
                    // buffer never grows toward a bogus declared length.
                    let header = decode_header(mode, &bytes)?;
                    self.phase = Phase::AwaitingContent {
                        mode,
                        action: header.action,
                        content_len: header.content_length as usize,
                    };
                }
                Phase::AwaitingContent {
                    mode,
                    action,
                    content_len,
                } => {
                    if self.buf.len() < content_len {
                        return Ok(None);
                    }
                    let content = self.take(content_len);
                    self.phase = Phase::AwaitingPreamble;
                    return Ok(Some(RawFrame {
                        mode,
                        action,
                        content,
                    }));
                }
            }
        }
    }

    /// Removes and returns the first `n` buffered bytes.
    fn take(&mut self, n: usize) -> Vec<u8> {
        let rest = self.buf.split_off(n);
        std::mem::replace(&mut self.buf, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::encode_frame;
    use crate::{MAX_CONTENT_SIZE, MAX_HEADER_SIZE};

    fn ping_frame(mode: WireMode) -> Vec<u8> {
        encode_frame(mode, Action::Ping, b"").unwrap()
    }

    fn content_frame(mode: WireMode, content: &[u8]) -> Vec<u8> {
        encode_frame(mode, Action::SendMessage, content).unwrap()
    }

    #[test]
    fn whole_frame_decodes() {
        for mode in [WireMode::Structured, WireMode::Compact] {
            let mut assembler = FrameAssembler::new();
            assembler.feed(&content_frame(mode, b"abc"));
            let frame = assembler.next_frame().unwrap().unwrap();
            assert_eq!(frame.action, Action::SendMessage);
            assert_eq!(frame.content, b"abc");
            assert_eq!(frame.mode, mode);
            assert_eq!(assembler.mode(), Some(mode));
            assert!(assembler.is_between_frames());
        }
    }

    #[test]
    fn split_at_every_boundary_decodes_identically() {
        for mode in [WireMode::Structured, WireMode::Compact] {
            let bytes = content_frame(mode, b"split me carefully");
            for split in 0..=bytes.len() {
                let mut assembler = FrameAssembler::new();
                assembler.feed(&bytes[..split]);
                if split < bytes.len() {
                    // Nothing complete yet unless the split sits exactly at
                    // the end of the frame.
                    assert!(assembler.next_frame().unwrap().is_none());
                }
                assembler.feed(&bytes[split..]);
                let frame = assembler.next_frame().unwrap().unwrap();
                assert_eq!(frame.content, b"split me carefully");
            }
        }
    }

    #[test]
    fn one_byte_at_a_time_decodes() {
        let bytes = content_frame(WireMode::Compact, b"drip");
        let mut assembler = FrameAssembler::new();
        for (i, byte) in bytes.iter().enumerate() {
            assembler.feed(&[*byte]);
            let result = assembler.next_frame().unwrap();
            if i + 1 < bytes.len() {
                assert!(result.is_none(), "frame complete too early at byte {i}");
            } else {
                assert_eq!(result.unwrap().content, b"drip");
            }
        }
    }

    #[test]
    fn back_to_back_frames_yield_one_per_call() {
        let mut bytes = content_frame(WireMode::Structured, b"first");
        bytes.extend(content_frame(WireMode::Structured, b"second"));

        let mut assembler = FrameAssembler::new();
        assembler.feed(&bytes);

        let first = assembler.next_frame().unwrap().unwrap();
        assert_eq!(first.content, b"first");
        assert!(!assembler.is_between_frames());

        let second = assembler.next_frame().unwrap().unwrap();
        assert_eq!(second.content, b"second");
        assert!(assembler.next_frame().unwrap().is_none());
        assert!(assembler.is_between_frames());
    }

    #[test]
    fn zero_length_content_is_valid() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(&ping_frame(WireMode::Compact));
        let frame = assembler.next_frame().unwrap().unwrap();
        assert_eq!(frame.action, Action::Ping);
        assert!(frame.content.is_empty());
    }

    #[test]
    fn mode_change_mid_connection_is_malformed() {
        let mut bytes = ping_frame(WireMode::Structured);
        bytes.extend(ping_frame(WireMode::Compact));

        let mut assembler = FrameAssembler::new();
        assembler.feed(&bytes);
        assert!(assembler.next_frame().unwrap().is_some());
        let result = assembler.next_frame();
        assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
    }

    #[test]
    fn pinned_mode_rejects_other_encoding() {
        let mut assembler = FrameAssembler::with_mode(WireMode::Compact);
        assembler.feed(&ping_frame(WireMode::Structured));
        let result = assembler.next_frame();
        assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
    }

    #[test]
    fn unsupported_version_fails_before_header() {
        // Version 2 frame with an otherwise absurd remainder; the version
        // check must fire without touching it.
        let mut assembler = FrameAssembler::new();
        assembler.feed(&[2, 0, 0xff, 0xff, 0xde, 0xad]);
        let result = assembler.next_frame();
        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedVersion { version: 2 })
        ));
    }

    #[test]
    fn oversized_declared_content_rejected_before_buffering() {
        // Hand-build a frame whose header declares more than the cap.
        let header = crate::framing::FrameHeader {
            content_length: MAX_CONTENT_SIZE + 1,
            action: Action::SendMessage,
        };
        let header_bytes = crate::framing::encode_header(WireMode::Structured, &header).unwrap();
        let preamble = Preamble::new(WireMode::Structured, header_bytes.len() as u16);

        let mut assembler = FrameAssembler::new();
        assembler.feed(&preamble.to_bytes());
        assembler.feed(&header_bytes);
        let result = assembler.next_frame();
        assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
        // The rejection happened with nothing but the header consumed.
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn oversized_header_length_rejected_at_preamble() {
        let too_big = (MAX_HEADER_SIZE + 1).to_be_bytes();
        let mut assembler = FrameAssembler::new();
        assembler.feed(&[1, 0, too_big[0], too_big[1]]);
        let result = assembler.next_frame();
        assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
    }

    #[test]
    fn incomplete_preamble_waits() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(&[1, 0, 0]);
        assert!(assembler.next_frame().unwrap().is_none());
        assert!(!assembler.is_between_frames());
    }
}
