//! PNG chunk wire format: constants, chunk type classification and the
//! length/type/data/CRC record codec
//!
//! All multi-byte integers on the wire are big-endian (network byte order);
//! host-order conversion happens at every read/write boundary in this module
//! and nowhere else.

pub mod iterator;

use std::fmt;
use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};

use crate::utils::{calculate_crc32, crc32_update};
use crate::{StegError, StegResult};

/// The fixed 8-byte PNG file signature (RFC 2083)
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Length of the chunk type field in bytes
pub const CHUNK_TYPE_LENGTH: usize = 4;

/// Byte overhead of a chunk on the wire: length (4) + type (4) + CRC (4)
pub const CHUNK_OVERHEAD: u64 = 12;

pub const IHDR: ChunkType = ChunkType(*b"IHDR");
pub const PLTE: ChunkType = ChunkType(*b"PLTE");
pub const IDAT: ChunkType = ChunkType(*b"IDAT");
pub const IEND: ChunkType = ChunkType(*b"IEND");

/// The private ancillary chunk type carrying embedded payload bytes
pub const STEG: ChunkType = ChunkType(*b"stEG");

/// A 4-byte ASCII PNG chunk type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkType(pub [u8; 4]);

/// Chunk classification per the PNG specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkClass {
    /// Required for image decoding: IHDR, PLTE, IDAT or IEND
    Critical,
    /// Safely ignorable by decoders
    Ancillary,
}

impl ChunkType {
    /// Construct a chunk type from raw bytes, rejecting any byte that is not
    /// printable ASCII.
    pub fn from_bytes(bytes: [u8; 4]) -> StegResult<Self> {
        if bytes.iter().any(|b| !b.is_ascii() || b.is_ascii_control()) {
            return Err(StegError::CorruptChunk(format!(
                "chunk type {:02x?} contains non-ASCII bytes",
                bytes
            )));
        }
        Ok(ChunkType(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn classify(&self) -> ChunkClass {
        match *self {
            IHDR | PLTE | IDAT | IEND => ChunkClass::Critical,
            _ => ChunkClass::Ancillary,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.classify() == ChunkClass::Critical
    }

    pub fn is_ancillary(&self) -> bool {
        !self.is_critical()
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Decoded fixed fields of a PNG chunk record. The data segment itself is
/// not held here; it is read through the iterator in bounded pieces.
#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    /// Byte count of the data field only
    pub data_length: u32,
    pub chunk_type: ChunkType,
    /// CRC32 over type + data, as recorded in the file (not yet verified)
    pub crc: u32,
}

/// Compute the CRC field value for a chunk: CRC32 over type then data
pub fn chunk_crc(chunk_type: ChunkType, data: &[u8]) -> u32 {
    let crc = calculate_crc32(chunk_type.as_bytes());
    crc32_update(crc, data)
}

/// Serialize a complete well-formed chunk record to `writer`, computing the
/// CRC over type + data.
pub fn write_chunk<W: Write>(writer: &mut W, chunk_type: ChunkType, data: &[u8])
    -> StegResult<()> {
    writer.write_u32::<BigEndian>(data.len() as u32)?;
    writer.write_all(chunk_type.as_bytes())?;
    writer.write_all(data)?;
    writer.write_u32::<BigEndian>(chunk_crc(chunk_type, data))?;
    Ok(())
}

/// Serialize only the length and type fields of a chunk, for callers that
/// stream the data segment and write the CRC themselves.
pub fn write_chunk_prefix<W: Write>(writer: &mut W, chunk_type: ChunkType, data_length: u32)
    -> StegResult<()> {
    writer.write_u32::<BigEndian>(data_length)?;
    writer.write_all(chunk_type.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_type_classification() {
        assert!(IHDR.is_critical());
        assert!(PLTE.is_critical());
        assert!(IDAT.is_critical());
        assert!(IEND.is_critical());

        assert!(STEG.is_ancillary());
        assert!(ChunkType(*b"tEXt").is_ancillary());
        assert_eq!(STEG.classify(), ChunkClass::Ancillary);
    }

    #[test]
    fn test_chunk_type_rejects_non_ascii() {
        let result = ChunkType::from_bytes([0x89, b'H', b'D', b'R']);
        assert!(matches!(result, Err(crate::StegError::CorruptChunk(_))));

        let result = ChunkType::from_bytes([b'\n', b'E', b'X', b't']);
        assert!(matches!(result, Err(crate::StegError::CorruptChunk(_))));

        assert!(ChunkType::from_bytes(*b"stEG").is_ok());
    }

    #[test]
    fn test_write_chunk_wire_layout() {
        let mut buf = Vec::new();
        write_chunk(&mut buf, IEND, &[]).unwrap();

        // 4-byte zero length, "IEND", 4-byte CRC (well-known reference value)
        assert_eq!(buf.len(), 12);
        assert_eq!(&buf[0..4], &[0, 0, 0, 0]);
        assert_eq!(&buf[4..8], b"IEND");
        assert_eq!(&buf[8..12], &0xAE426082u32.to_be_bytes());
    }

    #[test]
    fn test_chunk_crc_covers_type_and_data() {
        let data = b"some payload";
        let mut concat = Vec::new();
        concat.extend_from_slice(STEG.as_bytes());
        concat.extend_from_slice(data);
        assert_eq!(chunk_crc(STEG, data), calculate_crc32(&concat));
    }

    #[test]
    fn test_write_chunk_length_is_data_only() {
        let mut buf = Vec::new();
        write_chunk(&mut buf, STEG, b"hi").unwrap();
        assert_eq!(&buf[0..4], &2u32.to_be_bytes());
        assert_eq!(buf.len(), 12 + 2);
    }
}
