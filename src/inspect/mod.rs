//! Read-only PNG structural inspector
//!
//! Walks the chunk stream twice: once to tally a chunk-type histogram in
//! first-seen order, and once to print per-chunk detail, applying the
//! caller's type and criticality filters. Never mutates the source file.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::chunk::iterator::ChunkIterator;
use crate::chunk::{chunk_crc, ChunkType, IEND, IHDR, STEG};
use crate::utils::{crc32_update, hex_dump};
use crate::{StegError, StegResult};

const READ_BUFFER_LEN: usize = 4096;

/// Chunk selection for the detail pass. An empty type list with both class
/// flags clear shows every chunk.
#[derive(Debug, Clone, Default)]
pub struct InspectFilter {
    /// Show only chunks whose type appears in this list (union with the
    /// class flags below)
    pub types: Vec<String>,
    /// Show critical chunks
    pub critical: bool,
    /// Show ancillary chunks
    pub ancillary: bool,
    /// Hex-dump each surviving chunk's data segment
    pub hexdump: bool,
}

impl InspectFilter {
    fn admits(&self, chunk_type: ChunkType) -> bool {
        let mut filtered = !self.types.is_empty();
        for wanted in &self.types {
            if wanted.as_bytes() == chunk_type.as_bytes() {
                filtered = false;
            }
        }

        if self.critical || self.ancillary {
            if !self.ancillary && chunk_type.is_ancillary() {
                filtered = true;
            }
            if !self.critical && chunk_type.is_critical() {
                filtered = true;
            }
        }

        !filtered
    }
}

/// Print a structural summary of `source` to `out`.
pub fn inspect<W: Write>(out: &mut W, source: &Path, filter: &InspectFilter) -> StegResult<()> {
    let mut file = File::open(source)?;
    let file_size = file.metadata()?.len();

    writeln!(out, "png file summary:")?;
    writeln!(out, "{} {} bytes", source.display(), file_size)?;

    let histogram = chunk_histogram(&mut file)?;
    write!(out, "chunks: ")?;
    for (i, (chunk_type, count)) in histogram.iter().enumerate() {
        write!(out, "{} ({})", chunk_type, count)?;
        if i != histogram.len() - 1 {
            write!(out, ", ")?;
        }
    }
    writeln!(out)?;
    writeln!(out)?;

    write_filter_summary(out, filter)?;
    writeln!(out)?;

    print_chunk_details(out, &mut file, filter)?;

    Ok(())
}

/// Tally chunk types in first-seen order, enforcing the IHDR/IEND
/// multiplicity invariant over the full stream.
fn chunk_histogram(file: &mut File) -> StegResult<Vec<(ChunkType, u32)>> {
    let mut iter = ChunkIterator::new(&mut *file)?;
    let mut histogram: Vec<(ChunkType, u32)> = Vec::new();

    while iter.has_next()? {
        iter.advance()?;
        let chunk_type = iter.chunk_type()?;

        match histogram.iter_mut().find(|(t, _)| *t == chunk_type) {
            Some((_, count)) => *count += 1,
            None => histogram.push((chunk_type, 1)),
        }
    }

    for (required, name) in [(IHDR, "IHDR"), (IEND, "IEND")] {
        match histogram.iter().find(|(t, _)| *t == required) {
            None => {
                return Err(StegError::Conformance(format!(
                    "input file missing {} chunk",
                    name
                )));
            }
            Some((_, count)) if *count > 1 => {
                return Err(StegError::Conformance(format!(
                    "{} chunk found twice in input file",
                    name
                )));
            }
            Some(_) => {}
        }
    }

    Ok(histogram)
}

fn write_filter_summary<W: Write>(out: &mut W, filter: &InspectFilter) -> StegResult<()> {
    write!(out, "showing all chunks")?;
    if !filter.types.is_empty() {
        write!(out, " that have the type ({})", filter.types.join(", "))?;
    }

    if filter.critical && filter.ancillary {
        write!(out, " that are critical or ancillary")?;
    } else if filter.critical {
        write!(out, " that are critical")?;
    } else if filter.ancillary {
        write!(out, " that are ancillary")?;
    }

    writeln!(out, ":")?;
    Ok(())
}

fn print_chunk_details<W: Write>(out: &mut W, file: &mut File, filter: &InspectFilter)
    -> StegResult<()> {
    let mut iter = ChunkIterator::new(&mut *file)?;

    while iter.has_next()? {
        iter.advance()?;
        let chunk_type = iter.chunk_type()?;

        if !filter.admits(chunk_type) {
            continue;
        }

        let offset = iter.chunk_offset()?;
        let data_length = iter.data_length()?;
        let recorded_crc = iter.crc()?;

        writeln!(
            out,
            "chunk type: {}{}",
            chunk_type,
            if chunk_type == STEG { " (steg-png recognized)" } else { "" }
        )?;
        writeln!(out, "file offset: {}", offset)?;
        writeln!(out, "data length: {}", data_length)?;

        // Stream the data once: verify the CRC, and dump it if requested
        let mut computed_crc = chunk_crc(chunk_type, &[]);
        let mut dump_offset = 0u64;
        let mut buffer = [0u8; READ_BUFFER_LEN];
        let mut dumped = Vec::new();
        loop {
            let bytes_read = iter.read_data(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            computed_crc = crc32_update(computed_crc, &buffer[..bytes_read]);
            if filter.hexdump {
                hex_dump(&mut dumped, dump_offset, &buffer[..bytes_read])?;
                dump_offset += bytes_read as u64;
            }
        }

        writeln!(
            out,
            "cyclic redundancy check: {} ({})",
            recorded_crc,
            if recorded_crc == computed_crc { "valid" } else { "MISMATCH" }
        )?;

        if filter.hexdump {
            writeln!(out, "data:")?;
            out.write_all(&dumped)?;
        }

        writeln!(out)?;
    }

    Ok(())
}
