//! Test utilities for format-family testing
//!
//! Builders for synthetic blocks, envelopes and chunks used by the
//! per-format test modules.

use chrono::{DateTime, TimeZone, Utc};

use super::additive_checksum;
use crate::app::services::chunker::Chunk;
use crate::constants::{packet, sio};


/// Fixed arrival stamp for deterministic particle comparisons
pub fn arrival() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 6, 2, 12, 30, 0).unwrap()
}

/// Wrap raw bytes as a chunk starting at `start`
pub fn make_chunk(data: &[u8], start: u64) -> Chunk {
    Chunk {
        start,
        end: start + data.len() as u64,
        arrival: arrival(),
        data: data.to_vec(),
    }
}

/// One fixed-width SIO science record
pub fn sio_record(posix: u32, temp_cc: i16, cond_mspcm: u16, pres_ddbar: u16, batt_mv: u16) -> [u8; 12] {
    let mut record = [0u8; 12];
    record[0..4].copy_from_slice(&posix.to_be_bytes());
    record[4..6].copy_from_slice(&temp_cc.to_be_bytes());
    record[6..8].copy_from_slice(&cond_mspcm.to_be_bytes());
    record[8..10].copy_from_slice(&pres_ddbar.to_be_bytes());
    record[10..12].copy_from_slice(&batt_mv.to_be_bytes());
    record
}

/// One complete SIO framed block
pub fn sio_block(block_number: u8, posix: u32, records: &[[u8; 12]], corrupt_checksum: bool) -> Vec<u8> {
    let payload: Vec<u8> = records.iter().flatten().copied().collect();
    let mut checksum = additive_checksum(&payload);
    if corrupt_checksum {
        checksum = checksum.wrapping_add(1);
    }

    let mut block = Vec::with_capacity(sio::HEADER_LEN + payload.len() + 1);
    block.push(sio::HEADER_MARKER);
    block.extend_from_slice(b"CT");
    block.extend_from_slice(b"1234567");
    block.push(b'_');
    block.extend_from_slice(format!("{:04x}", payload.len()).as_bytes());
    block.push(b'D');
    block.extend_from_slice(format!("{:08x}", posix).as_bytes());
    block.push(b'_');
    block.extend_from_slice(format!("{:02x}", block_number).as_bytes());
    block.push(b'_');
    block.extend_from_slice(format!("{:04x}", checksum).as_bytes());
    block.push(sio::PAYLOAD_MARKER);
    block.extend_from_slice(&payload);
    block.push(sio::TRAILER_MARKER);
    block
}

/// One complete packet envelope carrying four velocity samples
pub fn packet_envelope(channel: u16, ticks: u32, samples: [i16; 4], corrupt_checksum: bool) -> Vec<u8> {
    let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
    let mut checksum = additive_checksum(&payload);
    if corrupt_checksum {
        checksum = checksum.wrapping_add(1);
    }

    let mut envelope = Vec::with_capacity(packet::HEADER_LEN + payload.len() + 2);
    envelope.extend_from_slice(&packet::SYNC);
    envelope.extend_from_slice(&channel.to_be_bytes());
    envelope.extend_from_slice(&ticks.to_be_bytes());
    envelope.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    envelope.extend_from_slice(&payload);
    envelope.extend_from_slice(&checksum.to_be_bytes());
    envelope
}
