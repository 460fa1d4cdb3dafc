//! Tests for the parser driver loop

use super::super::{EngineStatus, ParserEngine};
use super::{CollectingSink, arrival, cspp_content, glider_content, packet_envelope, sio_block, sio_record};
use crate::app::models::{FieldValue, QualityFlag};
use crate::config::{FormatKind, ParserConfig};
use crate::{Error, Recoverable};

fn engine(format: FormatKind) -> ParserEngine {
    ParserEngine::new(ParserConfig::new(format), "test_stream").unwrap()
}

#[test]
fn test_glider_stream_end_to_end() {
    let mut engine = engine(FormatKind::Glider);
    let mut sink = CollectingSink::new();

    engine
        .add_data(glider_content().as_bytes(), arrival())
        .unwrap();
    let summary = engine.poll(&mut sink).unwrap();

    assert_eq!(summary.status, EngineStatus::AwaitingChunk);
    let particles = sink.particles();
    // Metadata once, then two science rows; the all-NaN row yields nothing.
    assert_eq!(particles.len(), 3);
    assert_eq!(particles[0].particle_type, "glider_metadata");
    assert_eq!(
        particles[0].get("glider_label"),
        Some(&FieldValue::Text("unit_363".to_string()))
    );
    assert_eq!(particles[1].particle_type, "glider_science");
    assert_eq!(particles[1].get("m_depth"), Some(&FieldValue::Float(10.25)));
    // Sparse row: conductivity was NaN, slot emitted as absent.
    assert_eq!(particles[2].get("sci_water_cond"), Some(&FieldValue::Absent));
    assert!(sink.exceptions().is_empty());
}

#[test]
fn test_metadata_emitted_at_most_once() {
    let mut engine = engine(FormatKind::Sio);
    let mut sink = CollectingSink::new();

    // Two headers, each wrapping one data record; metadata must come out
    // exactly once, before the first data record.
    let mut stream = sio_block(
        "CT",
        "1234567",
        1,
        1_433_245_200,
        &[sio_record(1_433_245_200, 1102, 3521, 105, 14900)],
        false,
    );
    stream.extend(sio_block(
        "CT",
        "1234567",
        2,
        1_433_245_260,
        &[sio_record(1_433_245_260, 1099, 3519, 107, 14895)],
        false,
    ));

    engine.add_data(&stream, arrival()).unwrap();
    engine.poll(&mut sink).unwrap();

    let types: Vec<&str> = sink
        .particles()
        .iter()
        .map(|p| p.particle_type.as_str())
        .collect();
    assert_eq!(types, vec!["sio_metadata", "sio_science", "sio_science"]);

    let (last_state, _) = *sink.states().last().unwrap();
    assert!(last_state.metadata_sent());
    assert_eq!(last_state.position(), stream.len() as u64);
}

#[test]
fn test_bad_checksum_record_is_skipped_not_fatal() {
    let mut engine = engine(FormatKind::Packet);
    let mut sink = CollectingSink::new();

    // Six packets; the third has a corrupted checksum.
    let mut stream = Vec::new();
    for index in 0..6u32 {
        stream.extend(packet_envelope(
            7,
            1000 + index * 64,
            [10, -20, 5, 120],
            index == 2,
        ));
    }

    engine.add_data(&stream, arrival()).unwrap();
    let summary = engine.poll(&mut sink).unwrap();

    assert_eq!(summary.particles_emitted, 5);
    assert_eq!(sink.particles().len(), 5);

    let exceptions = sink.exceptions();
    assert_eq!(exceptions.len(), 1);
    assert!(matches!(exceptions[0], Recoverable::BadChecksum { .. }));

    // The corrupt record's bytes are still consumed.
    assert_eq!(engine.state().position(), stream.len() as u64);
}

#[test]
fn test_non_data_reported_and_consumed() {
    let mut engine = engine(FormatKind::Packet);
    let mut sink = CollectingSink::new();

    let mut stream = packet_envelope(7, 100, [1, 2, 3, 4], false);
    stream.extend_from_slice(&[0x00, 0x11, 0x22]);
    stream.extend(packet_envelope(7, 164, [5, 6, 7, 8], false));

    engine.add_data(&stream, arrival()).unwrap();
    engine.poll(&mut sink).unwrap();

    assert_eq!(sink.particles().len(), 2);
    let exceptions = sink.exceptions();
    assert_eq!(exceptions.len(), 1);
    match exceptions[0] {
        Recoverable::UnexpectedNonData { start, end, .. } => {
            assert_eq!(*start, 20);
            assert_eq!(*end, 23);
        }
        other => panic!("expected UnexpectedNonData, got {:?}", other),
    }
    assert_eq!(engine.state().position(), stream.len() as u64);
}

#[test]
fn test_partial_record_suspends_then_resumes() {
    let mut engine = engine(FormatKind::Packet);
    let mut sink = CollectingSink::new();

    let envelope = packet_envelope(3, 500, [1, 1, 1, 1], false);
    let split = envelope.len() / 2;

    engine.add_data(&envelope[..split], arrival()).unwrap();
    let summary = engine.poll(&mut sink).unwrap();
    assert_eq!(summary.particles_emitted, 0);
    assert_eq!(summary.status, EngineStatus::AwaitingChunk);

    engine.add_data(&envelope[split..], arrival()).unwrap();
    let summary = engine.poll(&mut sink).unwrap();
    assert_eq!(summary.particles_emitted, 1);
}

#[test]
fn test_close_surfaces_trailing_bytes() {
    let mut engine = engine(FormatKind::Packet);
    let mut sink = CollectingSink::new();

    let mut stream = packet_envelope(3, 500, [1, 1, 1, 1], false);
    stream.extend_from_slice(&[0xA3]); // lone half-sync, never completable
    engine.add_data(&stream, arrival()).unwrap();

    let summary = engine.close(&mut sink).unwrap();
    assert_eq!(summary.status, EngineStatus::Done);
    assert_eq!(sink.particles().len(), 1);

    let exceptions = sink.exceptions();
    assert!(matches!(
        exceptions.last().unwrap(),
        Recoverable::TrailingBytes { len: 1, .. }
    ));

    // The final state callback signals full ingestion.
    let (last_state, fully) = *sink.states().last().unwrap();
    assert!(fully);
    assert_eq!(last_state.position(), stream.len() as u64);
}

#[test]
fn test_closed_stream_rejects_data() {
    let mut engine = engine(FormatKind::Packet);
    let mut sink = CollectingSink::new();
    engine.close(&mut sink).unwrap();

    match engine.add_data(b"more", arrival()) {
        Err(Error::Configuration { .. }) => {}
        other => panic!("expected Configuration error, got {:?}", other),
    }
}

#[test]
fn test_position_is_monotonic_across_state_pushes() {
    let mut engine = engine(FormatKind::Cspp);
    let mut sink = CollectingSink::new();

    let content = cspp_content();
    // Feed one byte at a time to exercise every suspension point.
    for byte in content.as_bytes() {
        engine.add_data(std::slice::from_ref(byte), arrival()).unwrap();
        engine.poll(&mut sink).unwrap();
    }
    engine.close(&mut sink).unwrap();

    let positions: Vec<u64> = sink.states().iter().map(|(s, _)| s.position()).collect();
    assert!(positions.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(*positions.last().unwrap(), content.len() as u64);
}

#[test]
fn test_cspp_suspect_row_is_flagged() {
    let mut engine = engine(FormatKind::Cspp);
    let mut sink = CollectingSink::new();

    engine.add_data(cspp_content().as_bytes(), arrival()).unwrap();
    engine.poll(&mut sink).unwrap();

    let particles = sink.particles();
    assert_eq!(particles.len(), 3);
    assert_eq!(particles[0].particle_type, "cspp_metadata");
    assert_eq!(particles[1].quality, QualityFlag::Ok);
    assert_eq!(particles[2].quality, QualityFlag::Flagged);
    assert_eq!(
        particles[2].get("par"),
        Some(&FieldValue::Float(318.50))
    );
}

#[test]
fn test_multi_record_block_state_progression() {
    let mut engine = engine(FormatKind::Sio);
    let mut sink = CollectingSink::new();

    let block = sio_block(
        "CT",
        "1234567",
        1,
        1_433_245_200,
        &[
            sio_record(1_433_245_200, 1100, 3500, 100, 14900),
            sio_record(1_433_245_210, 1101, 3501, 101, 14899),
            sio_record(1_433_245_220, 1102, 3502, 102, 14898),
        ],
        false,
    );

    engine.add_data(&block, arrival()).unwrap();
    engine.poll(&mut sink).unwrap();

    // Metadata + three science records.
    assert_eq!(sink.particles().len(), 4);

    // Per-record snapshots carry block progress; the final one is clean.
    let states = sink.states();
    let with_blocks = states
        .iter()
        .filter(|(s, _)| !s.in_process().is_empty())
        .count();
    assert_eq!(with_blocks, 3);

    let (last_state, _) = *states.last().unwrap();
    assert!(last_state.in_process().is_empty());
    assert_eq!(last_state.position(), block.len() as u64);
}

#[test]
fn test_glider_broken_preamble_is_fatal() {
    let mut engine = engine(FormatKind::Glider);
    let mut sink = CollectingSink::new();

    engine
        .add_data(b"not a preamble at all\n", arrival())
        .unwrap();
    match engine.poll(&mut sink) {
        Err(Error::MissingPreamble { .. }) => {}
        other => panic!("expected MissingPreamble, got {:?}", other.map(|s| s.status)),
    }
}

#[test]
fn test_stats_track_emissions_and_errors() {
    let mut engine = engine(FormatKind::Packet);
    let mut sink = CollectingSink::new();

    let mut stream = packet_envelope(1, 100, [1, 2, 3, 4], false);
    stream.extend(packet_envelope(1, 164, [1, 2, 3, 4], true));

    engine.add_data(&stream, arrival()).unwrap();
    engine.poll(&mut sink).unwrap();

    let stats = engine.stats();
    assert_eq!(stats.chunks_matched, 2);
    assert_eq!(stats.particles_emitted, 1);
    assert_eq!(stats.recoverable_errors, 1);
    assert_eq!(stats.success_rate(), 50.0);
}
