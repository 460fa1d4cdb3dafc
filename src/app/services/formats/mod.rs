//! Instrument format families
//!
//! Each family is a configuration of the generic core: a sieve that finds
//! its record boundaries, a fixed particle field table, and a builder that
//! decodes one matched chunk. The family is resolved once at stream
//! construction into a tagged handler; there is no runtime registry.

pub mod cspp;
pub mod glider;
pub mod packet;
pub mod sio;

#[cfg(test)]
mod tests;

use crate::app::models::Particle;
use crate::app::services::chunker::{Chunk, Sieve};
use crate::app::services::parse_state::ParseState;
use crate::config::{FormatKind, ParserConfig};
use crate::{Recoverable, Result};

/// Everything decoding one chunk produced
///
/// The one-shot metadata particle travels separately from data records so
/// the engine can gate it on the `metadata_sent` flag and keep the
/// multi-record block bookkeeping purely about data records.
#[derive(Debug, Default)]
pub struct ChunkOutput {
    /// One-shot metadata candidate; ignored once `metadata_sent` is set
    pub metadata: Option<Particle>,

    /// Data particles decoded from the chunk, in stream order
    pub records: Vec<Particle>,

    /// Recoverable conditions encountered while decoding
    pub exceptions: Vec<Recoverable>,
}

impl ChunkOutput {
    /// Output carrying a single recoverable exception and nothing else
    pub fn exception(exception: Recoverable) -> Self {
        Self {
            metadata: None,
            records: Vec::new(),
            exceptions: vec![exception],
        }
    }
}

/// Format handler resolved at stream construction
#[derive(Debug)]
pub enum FormatHandler {
    /// Glider ASCII telemetry tables
    Glider(glider::GliderFormat),
    /// SIO controller framed binary blocks
    Sio(sio::SioFormat),
    /// CSPP profiler tab-delimited files
    Cspp(cspp::CsppFormat),
    /// Live telemetry packet envelopes
    Packet(packet::PacketFormat),
}

impl FormatHandler {
    /// Resolve the handler for a validated configuration
    pub fn for_config(config: &ParserConfig) -> Result<Self> {
        Ok(match config.format {
            FormatKind::Glider => FormatHandler::Glider(glider::GliderFormat::new()),
            FormatKind::Sio => FormatHandler::Sio(sio::SioFormat::new()),
            FormatKind::Cspp => FormatHandler::Cspp(cspp::CsppFormat::new()?),
            FormatKind::Packet => FormatHandler::Packet(packet::PacketFormat::new(
                config.timer.clone(),
            )),
        })
    }

    /// The sieve predicates this format registers with the chunker
    pub fn sieves(&self) -> Result<Vec<Box<dyn Sieve>>> {
        match self {
            FormatHandler::Glider(format) => format.sieves(),
            FormatHandler::Sio(format) => format.sieves(),
            FormatHandler::Cspp(format) => format.sieves(),
            FormatHandler::Packet(format) => format.sieves(),
        }
    }

    /// Decode one matched chunk
    ///
    /// Recoverable trouble lands inside the returned output; an `Err`
    /// here is fatal for the stream (unreadable preamble, broken config).
    pub fn handle_chunk(
        &self,
        chunk: &Chunk,
        state: &mut ParseState,
        stream_id: &str,
    ) -> Result<ChunkOutput> {
        match self {
            FormatHandler::Glider(format) => format.handle_chunk(chunk, state, stream_id),
            FormatHandler::Sio(format) => format.handle_chunk(chunk, state, stream_id),
            FormatHandler::Cspp(format) => format.handle_chunk(chunk, state, stream_id),
            FormatHandler::Packet(format) => format.handle_chunk(chunk, state, stream_id),
        }
    }
}

/// 16-bit additive checksum used by the framed binary families
pub fn additive_checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, byte| acc.wrapping_add(*byte as u16))
}

/// Read a big-endian u16 at `offset`
///
/// Callers validate lengths before slicing; this helper keeps the
/// bounds arithmetic in one place.
pub(crate) fn be_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

/// Read a big-endian u32 at `offset`
pub(crate) fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Read a big-endian i16 at `offset`
pub(crate) fn be_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}
