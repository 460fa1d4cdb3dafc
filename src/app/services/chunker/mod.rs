//! Incremental chunk extraction from fragmented byte streams
//!
//! This module provides the bounded buffer that accepts arbitrarily split
//! byte fragments and carves them into record-shaped chunks and the
//! non-data spans between them, using caller-supplied sieve predicates.

pub mod sieve;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::ops::Range;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{Error, Result};
pub use sieve::{RegexSieve, Sieve};

/// A byte range recognized by a sieve as one complete candidate record
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Stream offset of the first byte
    pub start: u64,

    /// Stream offset one past the last byte
    pub end: u64,

    /// Arrival time of the fragment containing the first byte
    pub arrival: DateTime<Utc>,

    /// The chunk bytes, copied out of the buffer
    pub data: Vec<u8>,
}

/// Bytes between chunks that matched no known record shape
#[derive(Debug, Clone, PartialEq)]
pub struct NonDataSpan {
    /// Stream offset of the first byte
    pub start: u64,

    /// Stream offset one past the last byte
    pub end: u64,

    /// The span bytes, copied out of the buffer
    pub data: Vec<u8>,
}

impl NonDataSpan {
    /// A short printable excerpt for exception reports
    pub fn preview(&self) -> String {
        let head: Vec<u8> = self.data.iter().take(16).copied().collect();
        let text: String = head
            .iter()
            .map(|b| {
                if b.is_ascii_graphic() || *b == b' ' {
                    *b as char
                } else {
                    '.'
                }
            })
            .collect();
        format!("{} bytes, starts {:?}", self.data.len(), text)
    }
}

/// Bounded buffer that yields chunks and non-data spans in stream order
///
/// Extraction ordering contract: a chunk is only handed out once every
/// byte before it has been drained, so callers must pull pending non-data
/// (via [`Chunker::next_non_data`]) before the next chunk becomes
/// available. Concatenating everything yielded, in order, reproduces the
/// input byte stream exactly.
pub struct Chunker {
    buffer: Vec<u8>,
    base: u64,
    arrivals: VecDeque<(u64, DateTime<Utc>)>,
    sieves: Vec<Box<dyn Sieve>>,
    limit: usize,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("base", &self.base)
            .field("buffered", &self.buffer.len())
            .field("sieves", &self.sieves.len())
            .field("limit", &self.limit)
            .finish()
    }
}

impl Chunker {
    /// Create a chunker starting at stream offset zero
    pub fn new(sieves: Vec<Box<dyn Sieve>>, limit: usize) -> Self {
        Self::with_base(sieves, limit, 0)
    }

    /// Create a chunker whose empty buffer begins at `base` (resume path)
    pub fn with_base(sieves: Vec<Box<dyn Sieve>>, limit: usize, base: u64) -> Self {
        Self {
            buffer: Vec::new(),
            base,
            arrivals: VecDeque::new(),
            sieves,
            limit,
        }
    }

    /// Stream offset of the first buffered (not yet yielded) byte
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Number of bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append a fragment of the stream, stamped with its arrival time
    pub fn add_data(&mut self, data: &[u8], arrival: DateTime<Utc>) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let buffered = self.buffer.len() + data.len();
        if buffered > self.limit {
            return Err(Error::BufferOverflow {
                buffered,
                limit: self.limit,
            });
        }

        let fragment_offset = self.base + self.buffer.len() as u64;
        self.arrivals.push_back((fragment_offset, arrival));
        self.buffer.extend_from_slice(data);
        debug!(
            "Buffered {} bytes at offset {} ({} total)",
            data.len(),
            fragment_offset,
            self.buffer.len()
        );
        Ok(())
    }

    /// Return the earliest available chunk, or `None` to wait for bytes
    ///
    /// Returns `None` both when no sieve matched and when a pending
    /// non-data span still precedes the earliest match.
    pub fn next_data(&mut self) -> Result<Option<Chunk>> {
        let claims = self.claims()?;
        let claim = match claims.first() {
            Some(claim) => claim.clone(),
            None => return Ok(None),
        };

        if claim.start > self.base {
            // Non-data precedes; caller must drain it first.
            return Ok(None);
        }

        let len = (claim.end - claim.start) as usize;
        let data = self.buffer[..len].to_vec();
        let arrival = self.arrival_for(claim.start);
        self.drain_to(claim.end);

        Ok(Some(Chunk {
            start: claim.start,
            end: claim.end,
            arrival,
            data,
        }))
    }

    /// Return the non-data span preceding the earliest chunk, if any
    ///
    /// With `clean` the span is discarded from the buffer; without it the
    /// same span is returned again on the next call.
    pub fn next_non_data(&mut self, clean: bool) -> Result<Option<NonDataSpan>> {
        let claims = self.claims()?;
        let claim = match claims.first() {
            Some(claim) => claim.clone(),
            None => return Ok(None),
        };

        if claim.start == self.base {
            return Ok(None);
        }

        let len = (claim.start - self.base) as usize;
        let span = NonDataSpan {
            start: self.base,
            end: claim.start,
            data: self.buffer[..len].to_vec(),
        };

        if clean {
            warn!(
                "Discarding {} non-data bytes at offset {}",
                len, span.start
            );
            self.drain_to(claim.start);
        }

        Ok(Some(span))
    }

    /// Drain whatever remains in the buffer as one trailing span
    ///
    /// Used at stream close: remaining bytes can no longer become a chunk
    /// and must be surfaced rather than silently dropped.
    pub fn take_remaining(&mut self) -> Option<NonDataSpan> {
        if self.buffer.is_empty() {
            return None;
        }

        let span = NonDataSpan {
            start: self.base,
            end: self.base + self.buffer.len() as u64,
            data: std::mem::take(&mut self.buffer),
        };
        self.base = span.end;
        self.arrivals.clear();
        Some(span)
    }

    /// Run every sieve over the buffer and merge their claims
    ///
    /// Claims are absolute stream ranges, sorted by start. Overlapping
    /// claims indicate ambiguous framing configuration and are fatal.
    fn claims(&self) -> Result<Vec<Range<u64>>> {
        let mut claims: Vec<Range<u64>> = Vec::new();

        for sieve in &self.sieves {
            for range in sieve.scan(&self.buffer) {
                if range.start >= range.end || range.end > self.buffer.len() {
                    return Err(Error::configuration(format!(
                        "Sieve '{}' produced invalid range [{}, {}) over {} buffered bytes",
                        sieve.name(),
                        range.start,
                        range.end,
                        self.buffer.len()
                    )));
                }
                claims.push(self.base + range.start as u64..self.base + range.end as u64);
            }
        }

        claims.sort_by_key(|range| (range.start, range.end));

        for pair in claims.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(Error::AmbiguousFraming {
                    first_start: pair[0].start,
                    first_end: pair[0].end,
                    second_start: pair[1].start,
                    second_end: pair[1].end,
                });
            }
        }

        Ok(claims)
    }

    /// Arrival stamp of the fragment containing `offset`
    ///
    /// The arrival list always covers the buffered window; the epoch
    /// fallback is unreachable in practice.
    fn arrival_for(&self, offset: u64) -> DateTime<Utc> {
        self.arrivals
            .iter()
            .rev()
            .find(|(fragment_offset, _)| *fragment_offset <= offset)
            .or_else(|| self.arrivals.front())
            .map(|(_, arrival)| *arrival)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Discard the buffer prefix up to absolute offset `to`
    fn drain_to(&mut self, to: u64) {
        let len = (to - self.base) as usize;
        self.buffer.drain(..len);
        self.base = to;

        // Keep the newest arrival entry at or before the new base so the
        // remaining window stays covered.
        while self.arrivals.len() > 1 {
            if self.arrivals[1].0 <= self.base {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
        if self.buffer.is_empty() {
            self.arrivals.clear();
        }
    }
}
