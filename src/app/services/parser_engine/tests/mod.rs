//! Test utilities for driver-loop testing
//!
//! Provides a collecting sink that records every event in arrival order,
//! plus builders for synthetic streams of each instrument family.

use chrono::{DateTime, TimeZone, Utc};

use crate::Recoverable;
use crate::app::models::Particle;
use crate::app::services::formats::additive_checksum;
use crate::app::services::parse_state::ParseState;
use crate::app::services::parser_engine::ParticleSink;
use crate::constants::{packet, sio};

mod engine_tests;

/// One recorded sink event, in arrival order
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Sample(Particle),
    State(ParseState, bool),
    Exception(Recoverable),
}

/// Sink that records every event for later assertions
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Vec<SinkEvent>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn particles(&self) -> Vec<&Particle> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Sample(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<(&ParseState, bool)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::State(s, fully) => Some((s, *fully)),
                _ => None,
            })
            .collect()
    }

    pub fn exceptions(&self) -> Vec<&Recoverable> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Exception(x) => Some(x),
                _ => None,
            })
            .collect()
    }
}

impl ParticleSink for CollectingSink {
    fn on_sample(&mut self, particle: Particle) {
        self.events.push(SinkEvent::Sample(particle));
    }

    fn on_state(&mut self, state: ParseState, stream_fully_ingested: bool) {
        self.events.push(SinkEvent::State(state, stream_fully_ingested));
    }

    fn on_exception(&mut self, exception: Recoverable) {
        self.events.push(SinkEvent::Exception(exception));
    }
}

/// Fixed arrival stamp so one-shot and resumed runs compare equal
pub fn arrival() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 6, 2, 12, 30, 0).unwrap()
}

// =============================================================================
// Stream Builders
// =============================================================================

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
pub fn sio_block(
    instrument: &str,
    controller: &str,
    block_number: u8,
    posix: u32,
    records: &[[u8; 12]],
    corrupt_checksum: bool,
) -> Vec<u8> {
    let payload: Vec<u8> = records.iter().flatten().copied().collect();
    let mut checksum = additive_checksum(&payload);
    if corrupt_checksum {
        checksum = checksum.wrapping_add(1);
    }

    let mut block = Vec::with_capacity(sio::HEADER_LEN + payload.len() + 1);
    block.push(sio::HEADER_MARKER);
    block.extend_from_slice(instrument.as_bytes());
    block.extend_from_slice(controller.as_bytes());
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
pub fn packet_envelope(
    channel: u16,
    ticks: u32,
    samples: [i16; 4],
    corrupt_checksum: bool,
) -> Vec<u8> {
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

/// A complete glider segment file with three data rows
pub fn glider_content() -> String {
    [
        "glider_label: unit_363",
        "mission_name: TRANS63",
        "fileopen_time: Tue_Jun_02_11:45:23_2015",
        "sensor_count: 4",
        "label_lines: 3",
        "segment_name: unit_363-2015-153-0-0",
        "m_present_time m_depth sci_water_temp sci_water_cond",
        "sec m degC S_m",
        "8 4 4 4",
        "1433245201.5 10.25 11.02 3.521",
        "1433245231.5 NaN NaN NaN",
        "1433245261.5 12.75 10.98 NaN",
    ]
    .join("\n")
        + "\n"
}

/// A complete CSPP uplink file with two data rows
pub fn cspp_content() -> String {
    [
        "Source File: 11079364_PPB_OPT.txt",
        "Processed: 2015-06-02 12:00:00",
        "1433245201.25\t10.54\tn\t312.25",
        "1433245211.25\t11.02\ty\t318.50",
    ]
    .join("\n")
        + "\n"
}
