//! # Edge Record Format
//!
//! Binary encoding of edge records for the persistent edge log.
//!
//! Format: Header (5 bytes) + postcard-serialized [`Edge`].
//! - 4 bytes: Magic ("RELE")
//! - 1 byte: Version
//!
//! Records are validated before payload parsing: size bounds first, then
//! the header, then postcard decoding.

use crate::graph::Edge;
use crate::{RelationError, primitives};

/// Maximum size of one encoded edge record.
///
/// Entity types and edge types are short names; anything above this is
/// corruption, and is rejected before allocation.
pub const MAX_EDGE_RECORD_SIZE: usize = 64 * 1024;

/// Header length in bytes.
const HEADER_LEN: usize = 5;

// =============================================================================
// RECORD HEADER
// =============================================================================

/// The header that precedes every encoded edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl RecordHeader {
    /// A header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), RelationError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(RelationError::Serialization(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(RelationError::Serialization(format!(
                "Unsupported record version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RelationError> {
        if bytes.len() < HEADER_LEN {
            return Err(RelationError::Serialization(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for RecordHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Encode an edge record (header + payload).
pub fn edge_to_bytes(edge: &Edge) -> Result<Vec<u8>, RelationError> {
    let payload =
        postcard::to_stdvec(edge).map_err(|e| RelationError::Serialization(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LEN + payload.len());
    result.extend_from_slice(&RecordHeader::new().to_bytes());
    result.extend_from_slice(&payload);

    if result.len() > MAX_EDGE_RECORD_SIZE {
        return Err(RelationError::Serialization(format!(
            "Edge record of {} bytes exceeds maximum {} bytes",
            result.len(),
            MAX_EDGE_RECORD_SIZE
        )));
    }
    Ok(result)
}

/// Decode an edge record.
pub fn edge_from_bytes(bytes: &[u8]) -> Result<Edge, RelationError> {
    if bytes.len() < HEADER_LEN {
        return Err(RelationError::Serialization(format!(
            "Record too short: minimum {} bytes required",
            HEADER_LEN
        )));
    }
    if bytes.len() > MAX_EDGE_RECORD_SIZE {
        return Err(RelationError::Serialization(format!(
            "Record size {} bytes exceeds maximum {} bytes",
            bytes.len(),
            MAX_EDGE_RECORD_SIZE
        )));
    }

    RecordHeader::from_bytes(bytes)?.validate()?;

    postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| {
        RelationError::Serialization(format!("Failed to decode edge record: {}", e))
    })
}

// =============================================================================
// TESTS
// =============================================================================
