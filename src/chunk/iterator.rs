//! Forward-only cursor over the chunk stream of an open PNG file
//!
//! The iterator owns the decoded header of the current chunk and recomputes
//! every seek target from that header rather than tracking a running "next
//! offset". Callers may therefore read as much or as little of a chunk's
//! data as they like; `advance` always derives the next boundary from the
//! authoritative previous-chunk metadata.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt};

use super::{ChunkClass, ChunkHeader, ChunkType, CHUNK_OVERHEAD, PNG_SIGNATURE};
use crate::{StegError, StegResult};

/// Stateful cursor over a seekable PNG byte source.
///
/// Created by [`ChunkIterator::new`], which validates the 8-byte signature.
/// The cursor does not own the lifetime of the underlying source beyond the
/// borrow/move semantics of `R`; callers open and close files.
pub struct ChunkIterator<R> {
    reader: R,
    /// Offset of the current chunk's length field; meaningless until the
    /// first advance
    header_offset: u64,
    current: Option<ChunkHeader>,
    /// Bytes of the current chunk's data segment already consumed through
    /// `read_data`
    data_read: u64,
}

impl<R: Read + Seek> ChunkIterator<R> {
    /// Read and verify the PNG signature at the start of the stream.
    ///
    /// A signature mismatch yields [`StegError::NotAPng`], distinct from an
    /// I/O failure, so callers can report format non-conformance separately
    /// from unreadable files.
    pub fn new(mut reader: R) -> StegResult<Self> {
        reader.seek(SeekFrom::Start(0))?;

        let mut signature = [0u8; 8];
        match reader.read_exact(&mut signature) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(StegError::NotAPng),
            Err(e) => return Err(StegError::Io(e)),
        }

        if signature != PNG_SIGNATURE {
            return Err(StegError::NotAPng);
        }

        Ok(ChunkIterator {
            reader,
            header_offset: 0,
            current: None,
            data_read: 0,
        })
    }

    /// Byte offset where the next chunk's length field must begin
    fn next_header_offset(&self) -> u64 {
        match self.current {
            None => PNG_SIGNATURE.len() as u64,
            Some(header) => self.header_offset + CHUNK_OVERHEAD + header.data_length as u64,
        }
    }

    /// Decode the fixed chunk fields at `offset`. Leaves the reader
    /// positioned immediately after the CRC field.
    fn decode_header_at(&mut self, offset: u64) -> StegResult<ChunkHeader> {
        let file_len = self.reader.seek(SeekFrom::End(0))?;
        if offset + 8 > file_len {
            return Err(StegError::CorruptChunk(format!(
                "truncated chunk header at offset {}",
                offset
            )));
        }

        self.reader.seek(SeekFrom::Start(offset))?;
        let data_length = self.reader.read_u32::<BigEndian>()?;

        let mut type_bytes = [0u8; 4];
        self.reader.read_exact(&mut type_bytes)?;
        let chunk_type = ChunkType::from_bytes(type_bytes)?;

        // The CRC field must land within the file
        let crc_offset = offset + 8 + data_length as u64;
        if crc_offset + 4 > file_len {
            return Err(StegError::CorruptChunk(format!(
                "chunk {} data length {} exceeds file size",
                chunk_type, data_length
            )));
        }

        self.reader.seek(SeekFrom::Start(crc_offset))?;
        let crc = self.reader.read_u32::<BigEndian>()?;

        Ok(ChunkHeader {
            data_length,
            chunk_type,
            crc,
        })
    }

    /// Non-destructively check whether a further well-formed chunk exists at
    /// the next boundary. Visible cursor state is unchanged; the underlying
    /// file position is restored before returning.
    pub fn has_next(&mut self) -> StegResult<bool> {
        let saved_pos = self.reader.stream_position()?;
        let next_offset = self.next_header_offset();
        let file_len = self.reader.seek(SeekFrom::End(0))?;

        let result = if next_offset == file_len {
            Ok(false)
        } else if next_offset > file_len {
            Err(StegError::CorruptChunk(
                "previous chunk extends beyond end of file".to_string(),
            ))
        } else {
            self.decode_header_at(next_offset).map(|_| true)
        };

        self.reader.seek(SeekFrom::Start(saved_pos))?;
        result
    }

    /// Move to the next chunk, eagerly decoding its length, type and CRC
    /// fields. The CRC is read but not verified here; data is consumed
    /// incrementally, so verification is the caller's responsibility while
    /// streaming. Leaves the file position at the start of the data segment.
    pub fn advance(&mut self) -> StegResult<()> {
        let next_offset = self.next_header_offset();
        let header = self.decode_header_at(next_offset)?;

        self.header_offset = next_offset;
        self.current = Some(header);
        self.data_read = 0;
        self.reader.seek(SeekFrom::Start(next_offset + 8))?;

        Ok(())
    }

    fn current_header(&self) -> StegResult<ChunkHeader> {
        self.current.ok_or(StegError::NoCurrentChunk)
    }

    /// Copy up to `buf.len()` bytes of the current chunk's remaining unread
    /// data into `buf`. Returns 0 at end-of-data. Reads never cross the
    /// chunk boundary. Calling this before the first advance is a contract
    /// violation reported as [`StegError::NoCurrentChunk`].
    pub fn read_data(&mut self, buf: &mut [u8]) -> StegResult<usize> {
        let header = self.current_header()?;

        let remaining = header.data_length as u64 - self.data_read;
        let to_read = buf.len().min(remaining as usize);
        if to_read == 0 {
            return Ok(0);
        }

        // Reposition from authoritative chunk metadata so interleaved seeks
        // by the caller cannot desynchronize the cursor
        self.reader
            .seek(SeekFrom::Start(self.header_offset + 8 + self.data_read))?;

        match self.reader.read_exact(&mut buf[..to_read]) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(StegError::CorruptChunk(format!(
                    "chunk {} truncated mid-data",
                    header.chunk_type
                )));
            }
            Err(e) => return Err(StegError::Io(e)),
        }

        self.data_read += to_read as u64;
        Ok(to_read)
    }

    /// Type code of the current chunk
    pub fn chunk_type(&self) -> StegResult<ChunkType> {
        Ok(self.current_header()?.chunk_type)
    }

    /// Data length of the current chunk (data field only)
    pub fn data_length(&self) -> StegResult<u32> {
        Ok(self.current_header()?.data_length)
    }

    /// CRC field of the current chunk as recorded in the file
    pub fn crc(&self) -> StegResult<u32> {
        Ok(self.current_header()?.crc)
    }

    /// File offset of the current chunk's length field
    pub fn chunk_offset(&self) -> StegResult<u64> {
        self.current_header()?;
        Ok(self.header_offset)
    }

    /// Critical/ancillary classification of the current chunk
    pub fn classify(&self) -> StegResult<ChunkClass> {
        Ok(self.current_header()?.chunk_type.classify())
    }

    /// Give the underlying byte source back to the caller
    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::chunk::{write_chunk, IDAT, IEND, IHDR, STEG};
    use crate::testutil::minimal_png;

    #[test]
    fn test_init_rejects_bad_signature() {
        let data = vec![0x00, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let result = ChunkIterator::new(Cursor::new(data));
        assert!(matches!(result, Err(StegError::NotAPng)));
    }

    #[test]
    fn test_init_rejects_short_file() {
        let result = ChunkIterator::new(Cursor::new(vec![0x89, 0x50]));
        assert!(matches!(result, Err(StegError::NotAPng)));
    }

    #[test]
    fn test_walks_all_chunks_in_order() {
        let png = minimal_png();
        let mut it = ChunkIterator::new(Cursor::new(png)).unwrap();

        let mut types = Vec::new();
        while it.has_next().unwrap() {
            it.advance().unwrap();
            types.push(it.chunk_type().unwrap());
        }
        assert_eq!(types, vec![IHDR, IDAT, IEND]);
    }

    #[test]
    fn test_accessors_fail_before_advance() {
        let mut it = ChunkIterator::new(Cursor::new(minimal_png())).unwrap();
        assert!(matches!(it.chunk_type(), Err(StegError::NoCurrentChunk)));
        assert!(matches!(it.data_length(), Err(StegError::NoCurrentChunk)));
        assert!(matches!(it.crc(), Err(StegError::NoCurrentChunk)));
        assert!(matches!(it.classify(), Err(StegError::NoCurrentChunk)));
        assert!(matches!(
            it.read_data(&mut [0u8; 8]),
            Err(StegError::NoCurrentChunk)
        ));
    }

    #[test]
    fn test_has_next_preserves_cursor_state() {
        let mut it = ChunkIterator::new(Cursor::new(minimal_png())).unwrap();
        it.advance().unwrap();
        let type_before = it.chunk_type().unwrap();

        assert!(it.has_next().unwrap());
        assert!(it.has_next().unwrap());
        assert_eq!(it.chunk_type().unwrap(), type_before);

        // Partial data reads still work after peeking
        let mut buf = [0u8; 4];
        let n = it.read_data(&mut buf).unwrap();
        assert_eq!(n, 4);
    }

    #[test]
    fn test_read_data_is_bounded_and_partial() {
        let mut it = ChunkIterator::new(Cursor::new(minimal_png())).unwrap();
        it.advance().unwrap(); // IHDR, 13 data bytes

        let mut buf = [0u8; 8];
        assert_eq!(it.read_data(&mut buf).unwrap(), 8);
        assert_eq!(it.read_data(&mut buf).unwrap(), 5);
        assert_eq!(it.read_data(&mut buf).unwrap(), 0);
        assert_eq!(it.read_data(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_advance_after_partial_read_lands_on_next_boundary() {
        let mut it = ChunkIterator::new(Cursor::new(minimal_png())).unwrap();
        it.advance().unwrap();

        // Consume only 3 of IHDR's 13 bytes, then advance
        let mut buf = [0u8; 3];
        it.read_data(&mut buf).unwrap();
        it.advance().unwrap();
        assert_eq!(it.chunk_type().unwrap(), IDAT);
    }

    #[test]
    fn test_rejects_non_ascii_chunk_type() {
        let mut png = Vec::new();
        png.extend_from_slice(&PNG_SIGNATURE);
        png.extend_from_slice(&0u32.to_be_bytes());
        png.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        png.extend_from_slice(&0u32.to_be_bytes());

        let mut it = ChunkIterator::new(Cursor::new(png)).unwrap();
        assert!(matches!(it.advance(), Err(StegError::CorruptChunk(_))));
    }

    #[test]
    fn test_rejects_length_past_end_of_file() {
        let mut png = Vec::new();
        png.extend_from_slice(&PNG_SIGNATURE);
        png.extend_from_slice(&4096u32.to_be_bytes());
        png.extend_from_slice(b"IDAT");
        png.extend_from_slice(&[0u8; 10]);

        let mut it = ChunkIterator::new(Cursor::new(png)).unwrap();
        assert!(matches!(it.advance(), Err(StegError::CorruptChunk(_))));
    }

    #[test]
    fn test_truncated_header_is_corrupt_not_end() {
        let mut png = Vec::new();
        png.extend_from_slice(&PNG_SIGNATURE);
        png.extend_from_slice(&[0x00, 0x00]); // two stray bytes

        let mut it = ChunkIterator::new(Cursor::new(png)).unwrap();
        assert!(matches!(it.has_next(), Err(StegError::CorruptChunk(_))));
    }

    #[test]
    fn test_has_next_false_at_clean_end() {
        let mut it = ChunkIterator::new(Cursor::new(minimal_png())).unwrap();
        for _ in 0..3 {
            assert!(it.has_next().unwrap());
            it.advance().unwrap();
        }
        assert!(!it.has_next().unwrap());
    }

    #[test]
    fn test_crc_accessor_matches_recorded_field() {
        let mut png = Vec::new();
        png.extend_from_slice(&PNG_SIGNATURE);
        write_chunk(&mut png, IHDR, &[0u8; 13]).unwrap();
        write_chunk(&mut png, STEG, b"payload").unwrap();
        write_chunk(&mut png, IEND, &[]).unwrap();

        let mut it = ChunkIterator::new(Cursor::new(png)).unwrap();
        it.advance().unwrap();
        it.advance().unwrap();
        assert_eq!(it.chunk_type().unwrap(), STEG);
        assert_eq!(it.crc().unwrap(), crate::chunk::chunk_crc(STEG, b"payload"));
        assert_eq!(it.data_length().unwrap(), 7);
    }
}
