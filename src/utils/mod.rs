//! Utility functions shared by the embed, extract and inspect engines

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crc32fast::Hasher;

/// Calculate CRC32 checksum for given data
pub fn calculate_crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Incrementally update a running CRC32 with more data. Seed with 0 for a
/// fresh computation; the result matches [`calculate_crc32`] over the
/// concatenated input bit-for-bit.
pub fn crc32_update(running: u32, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new_with_initial(running);
    hasher.update(data);
    hasher.finalize()
}

/// Validate PNG signature
pub fn is_png_signature(data: &[u8]) -> bool {
    data.len() >= 8 && data[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
}

/// Write a canonical hex+ASCII dump of `data` to `out`, sixteen bytes per
/// row, starting the printed offsets at `base_offset`. The format mirrors
/// the hexdump tool.
pub fn hex_dump<W: Write>(out: &mut W, base_offset: u64, data: &[u8]) -> io::Result<()> {
    for (row, line) in data.chunks(16).enumerate() {
        write!(out, "{:08x}  ", base_offset + (row as u64) * 16)?;

        for byte in line {
            write!(out, "{:02x} ", byte)?;
        }
        for _ in line.len()..16 {
            write!(out, "   ")?;
        }

        write!(out, " |")?;
        for byte in line {
            let c = *byte as char;
            write!(out, "{}", if c.is_ascii_graphic() || c == ' ' { c } else { '.' })?;
        }
        writeln!(out, "|")?;
    }

    Ok(())
}

/// Stream the full contents of an open file through [`hex_dump`], starting
/// from the file's current position.
pub fn hex_dump_file<W: Write>(out: &mut W, file: &mut File) -> io::Result<()> {
    let mut buffer = [0u8; 4096];
    let mut offset = 0u64;

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hex_dump(out, offset, &buffer[..bytes_read])?;
        offset += bytes_read as u64;
    }

    Ok(())
}

/// Publish the contents of a scratch file to its final destination.
///
/// Rewinds `scratch` and copies its full contents into a freshly truncated
/// file at `dest`, then applies the permission bits of `perms_from` to the
/// destination. The scratch file is never renamed into place; its directory
/// entry does not exist (it was unlinked at creation), so a crash mid-copy
/// leaves at worst a truncated `dest` that the caller reported as failed.
pub fn publish_scratch_file(scratch: &mut File, dest: &Path, perms_from: &Path) -> io::Result<u64> {
    scratch.seek(SeekFrom::Start(0))?;

    let mut out = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dest)?;

    let bytes_copied = io::copy(scratch, &mut out)?;
    out.flush()?;

    let perms = std::fs::metadata(perms_from)?.permissions();
    std::fs::set_permissions(dest, perms)?;

    Ok(bytes_copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_calculation() {
        let data = b"Hello, World!";
        let crc = calculate_crc32(data);
        assert_eq!(crc, 0xEC4AC3D0);
    }

    #[test]
    fn test_crc32_matches_png_reference() {
        // Reference value for the IEND chunk: CRC32 over the bytes "IEND"
        assert_eq!(calculate_crc32(b"IEND"), 0xAE426082);
    }

    #[test]
    fn test_crc32_incremental_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let one_shot = calculate_crc32(data);

        let mut running = 0;
        for piece in data.chunks(7) {
            running = crc32_update(running, piece);
        }
        assert_eq!(running, one_shot);
    }

    #[test]
    fn test_png_signature_validation() {
        let valid_sig = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert!(is_png_signature(&valid_sig));

        let invalid_sig = [0x00, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert!(!is_png_signature(&invalid_sig));

        assert!(!is_png_signature(&valid_sig[..7]));
    }

    #[test]
    fn test_hex_dump_row_format() {
        let mut out = Vec::new();
        hex_dump(&mut out, 0, b"hi").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("00000000  68 69 "));
        assert!(text.trim_end().ends_with("|hi|"));
    }

    #[test]
    fn test_hex_dump_nonprintable_bytes() {
        let mut out = Vec::new();
        hex_dump(&mut out, 16, &[0x00, 0x41, 0xff]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("00000010  00 41 ff"));
        assert!(text.contains("|.A.|"));
    }
}
