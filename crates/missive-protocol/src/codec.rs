//! Payload encoding strategies.
//!
//! A connection speaks exactly one [`WireMode`] for its whole lifetime,
//! fixed by the first frame's preamble tag. The structured mode is JSON;
//! the compact mode is positional bincode with a trailing CRC32 over the
//! payload bytes. Both modes share the serde derives on the payload types,
//! which is why those types avoid `flatten` and `skip_serializing_if`:
//! positional decoding needs every field present, every time.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{ProtocolError, ProtocolResult};

/// Width of the CRC32 trailer appended to compact-mode content.
const CHECKSUM_SIZE: usize = 4;

/// The two wire encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireMode {
    /// Self-describing JSON. Fields keyed by name, human-inspectable.
    Structured,
    /// Positional bincode plus a CRC32 trailer. Roughly a quarter smaller
    /// on the wire, unreadable without the schema.
    Compact,
}

impl WireMode {
    /// Preamble tag for this mode.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            WireMode::Structured => 0,
            WireMode::Compact => 1,
        }
    }

    /// Resolves a preamble tag, `None` for unknown tags.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(WireMode::Structured),
            1 => Some(WireMode::Compact),
            _ => None,
        }
    }

    /// Human/CLI name of the mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WireMode::Structured => "structured",
            WireMode::Compact => "compact",
        }
    }
}

impl std::fmt::Display for WireMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WireMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structured" => Ok(WireMode::Structured),
            "compact" => Ok(WireMode::Compact),
            other => Err(format!(
                "unknown encoding '{other}' (expected 'structured' or 'compact')"
            )),
        }
    }
}

/// Encodes a payload value into content bytes for the given mode.
///
/// In compact mode the CRC32 of the serialized payload is appended
/// big-endian, so the returned bytes are `payload ++ crc32`.
pub fn encode_payload<T: Serialize>(mode: WireMode, value: &T) -> ProtocolResult<Vec<u8>> {
    match mode {
        WireMode::Structured => serde_json::to_vec(value)
            .map_err(|e| ProtocolError::malformed(format!("json encode: {e}"))),
        WireMode::Compact => {
            let mut bytes = bincode::serialize(value)
                .map_err(|e| ProtocolError::malformed(format!("bincode encode: {e}")))?;
            let crc = crc32fast::hash(&bytes);
            bytes.extend_from_slice(&crc.to_be_bytes());
            Ok(bytes)
        }
    }
}

/// Decodes content bytes into a payload value for the given mode.
///
/// Compact mode verifies the CRC32 trailer before deserializing and fails
/// with [`ProtocolError::ChecksumMismatch`] on divergence. Corruption is
/// unrecoverable; callers close the connection.
pub fn decode_payload<T: DeserializeOwned>(mode: WireMode, content: &[u8]) -> ProtocolResult<T> {
    match mode {
        WireMode::Structured => serde_json::from_slice(content)
            .map_err(|e| ProtocolError::malformed(format!("json decode: {e}"))),
        WireMode::Compact => {
            // At least one payload byte plus the trailer. Zero-length content
            // never reaches this function; payload-less actions skip decoding.
            if content.len() <= CHECKSUM_SIZE {
                return Err(ProtocolError::malformed(format!(
                    "compact content of {} bytes cannot hold payload and checksum",
                    content.len()
                )));
            }
            let (payload, trailer) = content.split_at(content.len() - CHECKSUM_SIZE);
            let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
            let computed = crc32fast::hash(payload);
            if expected != computed {
                return Err(ProtocolError::ChecksumMismatch { expected, computed });
            }
            bincode::deserialize(payload)
                .map_err(|e| ProtocolError::malformed(format!("bincode decode: {e}")))
        }
    }
}
