//! SIO controller framed binary format
//!
//! SIO shore-side controllers concatenate instrument data into framed
//! blocks: an ASCII header between `0x01` and `0x02` markers declaring
//! payload length, type, timestamp and an additive checksum, then the
//! binary payload, then a `0x03` trailer. One block wraps a whole number
//! of fixed-width data records, so a block is the unit of framing while
//! records are the unit of emission.

use std::ops::Range;

use tracing::debug;

use super::{ChunkOutput, additive_checksum, be_i16, be_u16, be_u32};
use crate::app::models::{FieldValue, Particle, Provenance, TimestampKind, utc_from_posix};
use crate::app::services::chunker::{Chunk, Sieve};
use crate::app::services::parse_state::ParseState;
use crate::app::services::particle_builder::parse_hex_u32;
use crate::constants::sio;
use crate::{Recoverable, Result};

/// Parsed SIO block header
#[derive(Debug, Clone, PartialEq)]
pub struct SioHeader {
    /// Two-letter instrument identifier
    pub instrument: String,

    /// Seven-digit controller identifier
    pub controller: String,

    /// Declared payload length in bytes
    pub payload_len: usize,

    /// Record type letter
    pub record_type: char,

    /// Block creation time, POSIX seconds
    pub posix_time: u32,

    /// Controller block sequence number
    pub block_number: u8,

    /// Declared additive checksum over the payload
    pub checksum: u16,
}

/// Parse a fixed-width SIO header window
///
/// Total on any input: a window that is too short or malformed in any
/// byte is simply not a header.
pub fn parse_header(window: &[u8]) -> Option<SioHeader> {
    if window.len() < sio::HEADER_LEN {
        return None;
    }

    if window[0] != sio::HEADER_MARKER
        || window[10] != b'_'
        || window[24] != b'_'
        || window[27] != b'_'
        || window[32] != sio::PAYLOAD_MARKER
    {
        return None;
    }

    if !window[1..3].iter().all(u8::is_ascii_uppercase)
        || !window[3..10].iter().all(u8::is_ascii_digit)
        || !window[15].is_ascii_alphabetic()
    {
        return None;
    }

    let hex_field = |range: Range<usize>| -> Option<u32> {
        let text = std::str::from_utf8(&window[range]).ok()?;
        parse_hex_u32(text).ok()
    };

    Some(SioHeader {
        instrument: String::from_utf8_lossy(&window[1..3]).into_owned(),
        controller: String::from_utf8_lossy(&window[3..10]).into_owned(),
        payload_len: hex_field(11..15)? as usize,
        record_type: window[15] as char,
        posix_time: hex_field(16..24)?,
        block_number: hex_field(25..27)? as u8,
        checksum: hex_field(28..32)? as u16,
    })
}

/// Sieve claiming complete SIO blocks
#[derive(Debug)]
pub struct SioSieve;

impl Sieve for SioSieve {
    fn name(&self) -> &'static str {
        "sio_block"
    }

    fn scan(&self, window: &[u8]) -> Vec<Range<usize>> {
        let mut claims = Vec::new();
        let mut from = 0;

        while let Some(found) = window[from..].iter().position(|b| *b == sio::HEADER_MARKER) {
            let at = from + found;

            if at + sio::HEADER_LEN > window.len() {
                // Header may still be arriving.
                break;
            }

            let header = match parse_header(&window[at..]) {
                Some(header) => header,
                None => {
                    from = at + 1;
                    continue;
                }
            };

            let total = sio::HEADER_LEN + header.payload_len + 1;
            if at + total > window.len() {
                // Declared length exceeds what has arrived: wait, do not
                // treat as corruption.
                break;
            }

            if window[at + total - 1] != sio::TRAILER_MARKER {
                from = at + 1;
                continue;
            }

            claims.push(at..at + total);
            from = at + total;
        }

        claims
    }
}

/// SIO format handler
#[derive(Debug)]
pub struct SioFormat;

impl SioFormat {
    /// Create the handler
    pub fn new() -> Self {
        Self
    }

    /// One sieve: complete framed blocks
    pub fn sieves(&self) -> Result<Vec<Box<dyn Sieve>>> {
        Ok(vec![Box::new(SioSieve)])
    }

    /// Decode one framed block into metadata and science records
    pub fn handle_chunk(
        &self,
        chunk: &Chunk,
        state: &mut ParseState,
        stream_id: &str,
    ) -> Result<ChunkOutput> {
        let header = match parse_header(&chunk.data) {
            Some(header) => header,
            None => {
                return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                    offset: chunk.start,
                    reason: "Block header failed to re-parse".to_string(),
                }));
            }
        };

        let payload = &chunk.data[sio::HEADER_LEN..sio::HEADER_LEN + header.payload_len];
        let computed = additive_checksum(payload);
        if computed != header.checksum {
            return Ok(ChunkOutput::exception(Recoverable::BadChecksum {
                offset: chunk.start,
                declared: header.checksum,
                computed,
            }));
        }

        if header.payload_len % sio::RECORD_LEN != 0 {
            return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                offset: chunk.start,
                reason: format!(
                    "Payload length {} is not a multiple of the {}-byte record",
                    header.payload_len,
                    sio::RECORD_LEN
                ),
            }));
        }

        let mut output = ChunkOutput::default();

        if !state.metadata_sent() {
            output.metadata = Some(self.build_metadata(&header, chunk, stream_id)?);
        }

        let record_count = header.payload_len / sio::RECORD_LEN;
        debug!(
            "SIO block {} at offset {}: {} records",
            header.block_number, chunk.start, record_count
        );

        for index in 0..record_count {
            let offset = index * sio::RECORD_LEN;
            let record = &payload[offset..offset + sio::RECORD_LEN];
            let record_start = chunk.start + (sio::HEADER_LEN + offset) as u64;

            let sample_time = be_u32(record, 0) as f64;
            let internal = match utc_from_posix(sample_time) {
                Some(internal) => internal,
                None => {
                    output.exceptions.push(Recoverable::SampleDecode {
                        offset: record_start,
                        reason: format!("Sample time {} is out of range", sample_time),
                    });
                    continue;
                }
            };

            let values = vec![
                ("sample_time".to_string(), FieldValue::Float(sample_time)),
                (
                    "temperature".to_string(),
                    FieldValue::Float(be_i16(record, 4) as f64 / 100.0),
                ),
                (
                    "conductivity".to_string(),
                    FieldValue::Float(be_u16(record, 6) as f64 / 1000.0),
                ),
                (
                    "pressure".to_string(),
                    FieldValue::Float(be_u16(record, 8) as f64 / 10.0),
                ),
                (
                    "battery".to_string(),
                    FieldValue::Float(be_u16(record, 10) as f64 / 1000.0),
                ),
            ];

            output.records.push(Particle::new(
                stream_id.to_string(),
                "sio_science".to_string(),
                Some(internal),
                chunk.arrival,
                TimestampKind::Internal,
                Provenance {
                    start: record_start,
                    end: record_start + sio::RECORD_LEN as u64,
                },
                values,
            )?);
        }

        Ok(output)
    }

    /// Build the one-shot controller metadata particle
    fn build_metadata(
        &self,
        header: &SioHeader,
        chunk: &Chunk,
        stream_id: &str,
    ) -> Result<Particle> {
        let values = vec![
            (
                "instrument_id".to_string(),
                FieldValue::Text(header.instrument.clone()),
            ),
            (
                "controller_id".to_string(),
                FieldValue::Text(header.controller.clone()),
            ),
            (
                "block_number".to_string(),
                FieldValue::Integer(header.block_number as i64),
            ),
        ];

        Particle::new(
            stream_id.to_string(),
            "sio_metadata".to_string(),
            utc_from_posix(header.posix_time as f64),
            chunk.arrival,
            TimestampKind::Internal,
            Provenance {
                start: chunk.start,
                end: chunk.start + sio::HEADER_LEN as u64,
            },
            values,
        )
    }
}

impl Default for SioFormat {
    fn default() -> Self {
        Self::new()
    }
}
