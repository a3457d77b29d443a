//! # steg-png
//!
//! This library provides functionality to embed and extract arbitrary data
//! inside PNG image files using a private ancillary `stEG` chunk, along with
//! a structural inspector for the PNG chunk stream.
//!
//! The core concept is walking the length-prefixed, CRC-checked chunk
//! structure of a PNG file with a stateful cursor, then injecting payload
//! chunks immediately before the IEND chunk while preserving file validity
//! end-to-end. Because `stEG` is an unregistered ancillary chunk type,
//! standards-compliant PNG decoders ignore it safely.

// Public API exports
pub mod chunk;
pub mod embed;
pub mod extract;
pub mod inspect;
pub mod utils;

pub use chunk::iterator::ChunkIterator;
pub use embed::{embed, EmbedRequest, EmbedSummary, PayloadSource};
pub use extract::{extract, ExtractOutcome, ExtractRequest};
pub use inspect::{inspect, InspectFilter};

/// Result type alias for steg-png operations
pub type StegResult<T> = Result<T, StegError>;

/// Comprehensive error type for the steg-png tool
#[derive(Debug, thiserror::Error)]
pub enum StegError {
    #[error("input file is not a PNG (does not conform to RFC 2083)")]
    NotAPng,

    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    #[error("CRC mismatch in chunk {0}")]
    CrcMismatch(String),

    #[error("non-compliant PNG: {0}")]
    Conformance(String),

    #[error("no chunk is current; the iterator has not been advanced")]
    NoCurrentChunk,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StegError {
    /// Validate that a PNG chunk's CRC matches the expected value
    pub fn validate_chunk_crc(chunk_type: &[u8; 4], expected_crc: u32, actual_crc: u32)
        -> StegResult<()> {
        if expected_crc != actual_crc {
            let chunk_str = String::from_utf8_lossy(chunk_type);
            Err(StegError::CrcMismatch(chunk_str.to_string()))
        } else {
            Ok(())
        }
    }
}
