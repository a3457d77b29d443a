//! Payload embedding engine
//!
//! Walks every chunk of the source PNG, re-serializes each one unchanged
//! (re-verifying its CRC along the way), and injects one or more `stEG`
//! chunks carrying the payload immediately before IEND. All output goes to
//! an anonymous scratch file first; only after a fully successful pass is it
//! copied to the destination, so a failure mid-stream never publishes a
//! truncated image.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::chunk::iterator::ChunkIterator;
use crate::chunk::{write_chunk, write_chunk_prefix, IEND, IHDR, PNG_SIGNATURE, STEG};
use crate::utils::{calculate_crc32, crc32_update, publish_scratch_file};
use crate::{StegError, StegResult};

/// Maximum data length of a single `stEG` chunk in the compressing variant
pub const MAX_STEG_DATA_LEN: usize = 8192;

/// Marker token that follows the timestamp in the stored-variant header
pub const STORED_MARKER: u8 = 0x01;

/// Byte length of the stored-variant header: 8-byte timestamp + marker
pub const STORED_HEADER_LEN: usize = 9;

const COPY_BUFFER_LEN: usize = 4096;

/// Where the payload bytes come from. Modeled as a tagged variant so the
/// "both a literal and a file" and "neither" states cannot be constructed.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// Literal message bytes supplied on the command line
    Message(Vec<u8>),
    /// A file whose contents are embedded
    File(PathBuf),
    /// Read the payload from standard input
    Stdin,
}

/// Parameters for one embed operation. The compression level is threaded
/// through explicitly; there is no process-wide mutable configuration.
#[derive(Debug, Clone)]
pub struct EmbedRequest {
    /// Path to the source PNG
    pub source: PathBuf,
    /// Destination path; defaults to `<source>.steg`
    pub output: Option<PathBuf>,
    pub payload: PayloadSource,
    /// `Some(level)` compresses with DEFLATE at level 0-9; `None` selects
    /// the stored variant (timestamp header + raw payload, single chunk)
    pub compression: Option<u32>,
    /// Suppress advisory output on stderr
    pub quiet: bool,
}

/// Accounting for a completed embed operation, consumed by summary printing
#[derive(Debug, Clone)]
pub struct EmbedSummary {
    pub output: PathBuf,
    pub source_size: u64,
    pub output_size: u64,
    /// Payload bytes before compression
    pub bytes_in: u64,
    /// Bytes actually written into `stEG` chunk data fields
    pub bytes_out: u64,
    pub chunks_written: u32,
    /// File offset of the first injected chunk's length field
    pub first_chunk_offset: u64,
    /// Embedding timestamp recorded in the stored-variant header
    pub timestamp: Option<u64>,
}

impl EmbedSummary {
    /// bytes_out / bytes_in, or 0.0 when no payload bytes were consumed
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_in == 0 {
            0.0
        } else {
            self.bytes_out as f64 / self.bytes_in as f64
        }
    }
}

/// Embed a payload into a PNG file, producing a new file with the payload
/// carried in `stEG` chunk(s) directly before IEND.
pub fn embed(request: &EmbedRequest) -> StegResult<EmbedSummary> {
    if let Some(level) = request.compression {
        if level > 9 {
            return Err(StegError::InvalidInput(format!(
                "compression level {} out of range (0-9)",
                level
            )));
        }
        if level == 0 && !request.quiet {
            eprintln!("advisory: compression level 0 stores the payload without obfuscation");
        }
    }

    let payload = read_payload(&request.payload)?;
    let steg_data = prepare_steg_data(&payload, request.compression)?;

    // Compressed streams are split at the chunk cap; the stored variant is
    // always a single chunk so its header stays attached to the payload
    let pieces: Vec<&[u8]> = match request.compression {
        Some(_) => steg_data.chunks(MAX_STEG_DATA_LEN).collect(),
        None => vec![steg_data.as_slice()],
    };

    let output_path = match &request.output {
        Some(path) => path.clone(),
        None => default_output_path(&request.source),
    };

    let source_file = File::open(&request.source)?;
    let source_size = source_file.metadata()?.len();
    let mut iter = ChunkIterator::new(source_file)?;

    // Anonymous scratch file: created and immediately unlinked, so a crash
    // never leaves a visible partial file
    let mut scratch = tempfile::tempfile()?;
    scratch.write_all(&PNG_SIGNATURE)?;

    let mut ihdr_count = 0u32;
    let mut iend_found = false;
    let mut first_chunk_offset = 0u64;

    while iter.has_next()? {
        iter.advance()?;
        let chunk_type = iter.chunk_type()?;

        if chunk_type == IHDR {
            ihdr_count += 1;
            if ihdr_count > 1 {
                return Err(StegError::Conformance(
                    "IHDR chunk found twice in input file".to_string(),
                ));
            }
        }

        if chunk_type == IEND {
            if iend_found {
                return Err(StegError::Conformance(
                    "IEND chunk found twice in input file".to_string(),
                ));
            }
            iend_found = true;

            // Inject the payload chunks ahead of IEND
            first_chunk_offset = scratch.stream_position()?;
            for piece in &pieces {
                write_chunk(&mut scratch, STEG, piece)?;
            }
        }

        copy_chunk_through(&mut iter, &mut scratch, request.quiet)?;
    }

    if !iend_found {
        return Err(StegError::Conformance(
            "input file missing IEND chunk".to_string(),
        ));
    }
    if ihdr_count == 0 {
        return Err(StegError::Conformance(
            "input file missing IHDR chunk".to_string(),
        ));
    }

    let output_size = publish_scratch_file(&mut scratch, &output_path, &request.source)?;

    let chunks_written = pieces.len() as u32;
    Ok(EmbedSummary {
        output: output_path,
        source_size,
        output_size,
        bytes_in: payload.len() as u64,
        bytes_out: steg_data.len() as u64,
        chunks_written,
        first_chunk_offset,
        timestamp: match request.compression {
            None => Some(parse_stored_timestamp(&steg_data)),
            Some(_) => None,
        },
    })
}

/// Default destination for an embed operation
pub fn default_output_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".steg");
    PathBuf::from(name)
}

fn read_payload(source: &PayloadSource) -> StegResult<Vec<u8>> {
    match source {
        PayloadSource::Message(bytes) => Ok(bytes.clone()),
        PayloadSource::File(path) => Ok(std::fs::read(path)?),
        PayloadSource::Stdin => {
            let mut bytes = Vec::new();
            std::io::stdin().read_to_end(&mut bytes)?;
            Ok(bytes)
        }
    }
}

/// Produce the full byte stream destined for `stEG` chunk data fields:
/// either a DEFLATE stream of the payload, or the stored-variant layout
/// `{8-byte BE timestamp}{marker}{payload}`.
fn prepare_steg_data(payload: &[u8], compression: Option<u32>) -> StegResult<Vec<u8>> {
    match compression {
        Some(level) => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
            encoder.write_all(payload)?;
            Ok(encoder.finish()?)
        }
        None => {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);

            let mut data = Vec::with_capacity(STORED_HEADER_LEN + payload.len());
            data.write_u64::<BigEndian>(timestamp)?;
            data.push(STORED_MARKER);
            data.extend_from_slice(payload);
            Ok(data)
        }
    }
}

fn parse_stored_timestamp(steg_data: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&steg_data[..8]);
    u64::from_be_bytes(bytes)
}

/// Re-serialize the iterator's current chunk unchanged into `out`, streaming
/// the data segment and recomputing the CRC on the way through. A mismatch
/// against the recorded CRC is reported as a warning and passed through
/// untouched; already-damaged inputs stay inspectable and are not silently
/// "fixed".
fn copy_chunk_through<R: Read + Seek, W: Write>(
    iter: &mut ChunkIterator<R>,
    out: &mut W,
    quiet: bool,
) -> StegResult<()> {
    let chunk_type = iter.chunk_type()?;
    let data_length = iter.data_length()?;
    let recorded_crc = iter.crc()?;

    write_chunk_prefix(out, chunk_type, data_length)?;

    let mut computed_crc = calculate_crc32(chunk_type.as_bytes());
    let mut buffer = [0u8; COPY_BUFFER_LEN];
    loop {
        let bytes_read = iter.read_data(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        computed_crc = crc32_update(computed_crc, &buffer[..bytes_read]);
        out.write_all(&buffer[..bytes_read])?;
    }

    out.write_u32::<BigEndian>(recorded_crc)?;

    if computed_crc != recorded_crc && !quiet {
        eprintln!(
            "warning: CRC mismatch in chunk {} (recorded {:#010x}, computed {:#010x})",
            chunk_type, recorded_crc, computed_crc
        );
    }

    Ok(())
}
