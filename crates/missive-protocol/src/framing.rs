//! Two-stage frame header: fixed preamble plus mode-encoded header.
//!
//! The preamble is the only part of a frame with a fixed layout; everything
//! after it depends on the encoding mode the preamble announces. Version is
//! validated before anything else so that a peer speaking a future protocol
//! is rejected without guessing at its header layout.

use serde::{Deserialize, Serialize};

use crate::codec::{self, WireMode};
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::Action;
use crate::{MAX_CONTENT_SIZE, MAX_HEADER_SIZE, PREAMBLE_SIZE, PROTOCOL_VERSION};

/// The fixed 4-byte frame preamble.
///
/// Layout: `version (u8) | mode tag (u8) | header length (u16 BE)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    /// Protocol version, currently [`PROTOCOL_VERSION`].
    pub version: u8,
    /// Encoding mode for the rest of the frame.
    pub mode: WireMode,
    /// Byte length of the encoded header that follows.
    pub header_len: u16,
}

impl Preamble {
    /// Builds a v1 preamble for the given mode and header size.
    #[must_use]
    pub fn new(mode: WireMode, header_len: u16) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            mode,
            header_len,
        }
    }

    /// Serializes the preamble to its 4-byte wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; PREAMBLE_SIZE] {
        let len = self.header_len.to_be_bytes();
        [self.version, self.mode.tag(), len[0], len[1]]
    }

    /// Parses a preamble from exactly [`PREAMBLE_SIZE`] bytes.
    ///
    /// Checks run in order: version, then mode tag, then header length
    /// bounds. A version mismatch wins over everything else.
    pub fn parse(bytes: &[u8; PREAMBLE_SIZE]) -> ProtocolResult<Self> {
        let version = bytes[0];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion { version });
        }

        let mode = WireMode::from_tag(bytes[1])
            .ok_or_else(|| ProtocolError::malformed(format!("unknown encoding tag {}", bytes[1])))?;

        let header_len = u16::from_be_bytes([bytes[2], bytes[3]]);
        if header_len == 0 || header_len > MAX_HEADER_SIZE {
            return Err(ProtocolError::malformed(format!(
                "header length {header_len} outside 1..={MAX_HEADER_SIZE}"
            )));
        }

        Ok(Self {
            version,
            mode,
            header_len,
        })
    }
}

/// The mode-encoded frame header: content length and action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Byte length of the content that follows the header.
    pub content_length: u32,
    /// What the frame asks for (requests) or answers (responses/pushes).
    pub action: Action,
}

/// Encodes a header in the given mode.
pub fn encode_header(mode: WireMode, header: &FrameHeader) -> ProtocolResult<Vec<u8>> {
    match mode {
        WireMode::Structured => serde_json::to_vec(header)
            .map_err(|e| ProtocolError::malformed(format!("json header encode: {e}"))),
        // The header carries no checksum; only content is protected.
        WireMode::Compact => bincode::serialize(header)
            .map_err(|e| ProtocolError::malformed(format!("bincode header encode: {e}"))),
    }
}

/// Decodes a header in the given mode, enforcing the content size cap.
///
/// The cap check lives here so an implausible declared length is rejected
/// before a single content byte is buffered.
pub fn decode_header(mode: WireMode, bytes: &[u8]) -> ProtocolResult<FrameHeader> {
    let header: FrameHeader = match mode {
        WireMode::Structured => serde_json::from_slice(bytes)
            .map_err(|e| ProtocolError::malformed(format!("json header decode: {e}")))?,
        WireMode::Compact => bincode::deserialize(bytes)
            .map_err(|e| ProtocolError::malformed(format!("bincode header decode: {e}")))?,
    };

    if header.content_length > MAX_CONTENT_SIZE {
        return Err(ProtocolError::malformed(format!(
            "declared content length {} exceeds maximum {MAX_CONTENT_SIZE}",
            header.content_length
        )));
    }

    Ok(header)
}

/// Assembles a complete frame: preamble, header, content.
///
/// `content` must already be encoded for `mode` (see
/// [`crate::encode_payload`]); this function only wraps it.
pub fn encode_frame(mode: WireMode, action: Action, content: &[u8]) -> ProtocolResult<Vec<u8>> {
    if content.len() > MAX_CONTENT_SIZE as usize {
        return Err(ProtocolError::malformed(format!(
            "content of {} bytes exceeds maximum {MAX_CONTENT_SIZE}",
            content.len()
        )));
    }

    let header = FrameHeader {
        content_length: content.len() as u32,
        action,
    };
    let header_bytes = encode_header(mode, &header)?;
    if header_bytes.len() > MAX_HEADER_SIZE as usize {
        return Err(ProtocolError::malformed(format!(
            "encoded header of {} bytes exceeds maximum {MAX_HEADER_SIZE}",
            header_bytes.len()
        )));
    }

    let preamble = Preamble::new(mode, header_bytes.len() as u16);
    let mut frame = Vec::with_capacity(PREAMBLE_SIZE + header_bytes.len() + content.len());
    frame.extend_from_slice(&preamble.to_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(content);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_roundtrip() {
        for mode in [WireMode::Structured, WireMode::Compact] {
            let preamble = Preamble::new(mode, 37);
            let parsed = Preamble::parse(&preamble.to_bytes()).unwrap();
            assert_eq!(parsed, preamble);
        }
    }

    #[test]
    fn preamble_wire_layout() {
        let bytes = Preamble::new(WireMode::Compact, 0x0102).to_bytes();
        assert_eq!(bytes, [1, 1, 0x01, 0x02]);
    }

    #[test]
    fn preamble_rejects_unknown_version_first() {
        // Bad version AND bad tag: version must win, header stays unparsed.
        let result = Preamble::parse(&[7, 9, 0, 10]);
        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedVersion { version: 7 })
        ));
    }

    #[test]
    fn preamble_rejects_unknown_mode_tag() {
        let result = Preamble::parse(&[1, 5, 0, 10]);
        assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
    }

    #[test]
    fn preamble_rejects_header_length_out_of_bounds() {
        let zero = Preamble::parse(&[1, 0, 0, 0]);
        assert!(matches!(zero, Err(ProtocolError::MalformedFrame { .. })));

        let huge = Preamble::parse(&[1, 0, 0xff, 0xff]);
        assert!(matches!(huge, Err(ProtocolError::MalformedFrame { .. })));
    }

    #[test]
    fn header_roundtrip_both_modes() {
        let header = FrameHeader {
            content_length: 512,
            action: Action::SendMessage,
        };
        for mode in [WireMode::Structured, WireMode::Compact] {
            let bytes = encode_header(mode, &header).unwrap();
            assert_eq!(decode_header(mode, &bytes).unwrap(), header);
        }
    }

    #[test]
    fn structured_header_is_json() {
        let header = FrameHeader {
            content_length: 9,
            action: Action::Ping,
        };
        let bytes = encode_header(WireMode::Structured, &header).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"content_length":9,"action":"ping"}"#
        );
    }

    #[test]
    fn oversized_declared_content_rejected_at_header_decode() {
        let header = FrameHeader {
            content_length: MAX_CONTENT_SIZE + 1,
            action: Action::Ping,
        };
        for mode in [WireMode::Structured, WireMode::Compact] {
            let bytes = encode_header(mode, &header).unwrap();
            let result = decode_header(mode, &bytes);
            assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
        }
    }

    #[test]
    fn encode_frame_layout() {
        let frame = encode_frame(WireMode::Structured, Action::Ping, b"").unwrap();
        assert_eq!(frame[0], PROTOCOL_VERSION);
        assert_eq!(frame[1], 0);
        let header_len = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        assert_eq!(frame.len(), PREAMBLE_SIZE + header_len);

        let header =
            decode_header(WireMode::Structured, &frame[PREAMBLE_SIZE..]).unwrap();
        assert_eq!(header.content_length, 0);
        assert_eq!(header.action, Action::Ping);
    }

    #[test]
    fn encode_frame_rejects_oversized_content() {
        let content = vec![0u8; MAX_CONTENT_SIZE as usize + 1];
        let result = encode_frame(WireMode::Structured, Action::SendMessage, &content);
        assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
    }
}
