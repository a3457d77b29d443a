//! Payload extraction engine
//!
//! Scans the chunk stream for `stEG` chunks, concatenates their fragments in
//! file order and recovers the payload into an anonymous scratch file,
//! inflating on the fly when the fragments carry a DEFLATE stream. A file
//! with no `stEG` chunks is a clean negative outcome, not a corruption; the
//! destination path is left untouched in that case.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::ZlibDecoder;

use crate::chunk::iterator::ChunkIterator;
use crate::chunk::{IEND, IHDR, STEG};
use crate::embed::{STORED_HEADER_LEN, STORED_MARKER};
use crate::utils::{hex_dump_file, publish_scratch_file};
use crate::{StegError, StegResult};

const READ_BUFFER_LEN: usize = 8192;

/// Parameters for one extract operation
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// Path to the PNG suspected of carrying embedded data
    pub source: PathBuf,
    /// Destination path; defaults to `<source>.out`
    pub output: Option<PathBuf>,
    /// Print a canonical hex+ASCII dump of the recovered bytes instead of
    /// (or in addition to, when `output` is set) writing them out
    pub hexdump: bool,
}

/// Result of a completed extract operation
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    /// Payload bytes were recovered
    Recovered {
        bytes: u64,
        /// Where the bytes were written, if a copy-out was requested
        output: Option<PathBuf>,
        /// Embedding timestamp, when the stored-variant header carried one
        timestamp: Option<u64>,
    },
    /// The file walked cleanly but carried no `stEG` chunks
    NoEmbeddedData,
}

/// Sink for recovered payload bytes. The compressed variant feeds a
/// streaming INFLATE; the stored variant appends raw bytes.
enum PayloadSink {
    Inflate(ZlibDecoder<File>),
    Stored(File),
}

impl PayloadSink {
    fn write(&mut self, data: &[u8]) -> StegResult<()> {
        match self {
            PayloadSink::Inflate(decoder) => decoder.write_all(data).map_err(|e| {
                StegError::CorruptChunk(format!("zlib INFLATE failed: {}", e))
            }),
            PayloadSink::Stored(file) => Ok(file.write_all(data)?),
        }
    }

    fn finish(self) -> StegResult<File> {
        match self {
            PayloadSink::Inflate(decoder) => decoder.finish().map_err(|e| {
                StegError::CorruptChunk(format!("zlib INFLATE stream incomplete: {}", e))
            }),
            PayloadSink::Stored(file) => Ok(file),
        }
    }
}

/// First two bytes of a zlib stream: compression method 8 and a header
/// checksum divisible by 31. The stored-variant header starts with a
/// big-endian timestamp whose leading byte fails this check for any
/// realistic clock value.
fn looks_like_zlib(data: &[u8]) -> bool {
    data.len() >= 2
        && data[0] & 0x0f == 8
        && u16::from_be_bytes([data[0], data[1]]) % 31 == 0
}

/// Recover embedded data from a PNG file.
pub fn extract(request: &ExtractRequest) -> StegResult<ExtractOutcome> {
    let source_file = File::open(&request.source)?;
    let mut iter = ChunkIterator::new(source_file)?;

    let scratch = tempfile::tempfile()?;
    let mut sink: Option<PayloadSink> = None;
    let mut timestamp = None;

    let mut ihdr_count = 0u32;
    let mut iend_found = false;

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
        }

        if chunk_type != STEG {
            continue;
        }

        let mut buffer = [0u8; READ_BUFFER_LEN];
        loop {
            let bytes_read = iter.read_data(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            let mut fragment = &buffer[..bytes_read];

            if sink.is_none() {
                if looks_like_zlib(fragment) {
                    sink = Some(PayloadSink::Inflate(ZlibDecoder::new(scratch.try_clone()?)));
                } else {
                    // Stored variant: strip the timestamp+marker header
                    if fragment.len() < STORED_HEADER_LEN {
                        return Err(StegError::CorruptChunk(
                            "stEG chunk too short for stored payload header".to_string(),
                        ));
                    }
                    if fragment[8] != STORED_MARKER {
                        return Err(StegError::CorruptChunk(format!(
                            "unrecognized stEG payload marker {:#04x}",
                            fragment[8]
                        )));
                    }

                    let mut ts = [0u8; 8];
                    ts.copy_from_slice(&fragment[..8]);
                    timestamp = Some(u64::from_be_bytes(ts));

                    fragment = &fragment[STORED_HEADER_LEN..];
                    sink = Some(PayloadSink::Stored(scratch.try_clone()?));
                }
            }

            if let Some(sink) = sink.as_mut() {
                sink.write(fragment)?;
            }
        }
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

    let mut recovered = match sink {
        Some(sink) => sink.finish()?,
        None => return Ok(ExtractOutcome::NoEmbeddedData),
    };
    recovered.flush()?;

    let bytes = recovered.metadata()?.len();
    if bytes == 0 {
        return Ok(ExtractOutcome::NoEmbeddedData);
    }

    if request.hexdump {
        recovered.seek(SeekFrom::Start(0))?;
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        hex_dump_file(&mut lock, &mut recovered)?;
    }

    // Write to the final destination unless the caller only wanted a dump
    let mut output = None;
    if !request.hexdump || request.output.is_some() {
        let output_path = match &request.output {
            Some(path) => path.clone(),
            None => default_output_path(&request.source),
        };
        publish_scratch_file(&mut recovered, &output_path, &request.source)?;
        output = Some(output_path);
    }

    Ok(ExtractOutcome::Recovered {
        bytes,
        output,
        timestamp,
    })
}

/// Default destination for an extract operation
pub fn default_output_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".out");
    PathBuf::from(name)
}
