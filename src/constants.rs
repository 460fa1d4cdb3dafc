//! Application constants for particle ingestion
//!
//! This module contains configuration constants, default values, and the
//! fixed framing layouts of the supported instrument families.

// =============================================================================
// Engine Defaults
// =============================================================================

/// Maximum unconsumed bytes the chunker will hold before declaring overflow
pub const DEFAULT_BUFFER_LIMIT: usize = 1024 * 1024;

/// Bytes read per delta when harvesting a file
pub const READ_BLOCK_SIZE: usize = 4096;

/// Poll interval between delta reads when tail-following a growing file
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Version stamp written into serialized parse-state snapshots
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Sentinel token instruments use for a value absent in this row
pub const NAN_TOKEN: &str = "NaN";

/// Suffix appended to the input path for the sidecar state file
pub const STATE_FILE_SUFFIX: &str = ".ingest-state.json";

// =============================================================================
// SIO Framed Binary Layout
// =============================================================================

/// SIO controller block framing
///
/// A block is `0x01`, a two-letter instrument id, a 7-digit controller id,
/// `_`, 4 hex digits of payload length, one type letter, 8 hex digits of
/// POSIX seconds, `_`, 2 hex digits of block number, `_`, 4 hex digits of
/// additive payload checksum, `0x02`, the payload, `0x03`.
pub mod sio {
    /// Start-of-header marker
    pub const HEADER_MARKER: u8 = 0x01;

    /// End-of-header / start-of-payload marker
    pub const PAYLOAD_MARKER: u8 = 0x02;

    /// End-of-block marker
    pub const TRAILER_MARKER: u8 = 0x03;

    /// Fixed header length including both markers
    pub const HEADER_LEN: usize = 33;

    /// Fixed width of one binary data record inside a payload
    pub const RECORD_LEN: usize = 12;
}

// =============================================================================
// Live Packet Envelope Layout
// =============================================================================

/// Length-prefixed telemetry packet envelope from live feeds
///
/// An envelope is 2 sync bytes, u16 channel, u32 hardware tick counter,
/// u16 payload length, the payload, and a u16 additive payload checksum.
/// All multi-byte fields are big-endian.
pub mod packet {
    /// Envelope synchronization bytes
    pub const SYNC: [u8; 2] = [0xA3, 0x9D];

    /// Fixed envelope header length (sync + channel + ticks + length)
    pub const HEADER_LEN: usize = 10;

    /// Expected payload length for velocity sample packets
    pub const PAYLOAD_LEN: usize = 8;

    /// Declared payload lengths above this mark a false sync, not a wait
    pub const MAX_PAYLOAD_LEN: usize = 4096;

    /// Trailing checksum length
    pub const CHECKSUM_LEN: usize = 2;

    /// Hardware tick counter period (wraps at 2^32)
    pub const DEFAULT_TICK_PERIOD: f64 = 4_294_967_296.0;

    /// Default tick rate of the hardware counter
    pub const DEFAULT_TICK_RATE_HZ: f64 = 64.0;

    /// Default rollover slack, in ticks (half the counter period)
    pub const DEFAULT_ROLLOVER_SLACK: f64 = DEFAULT_TICK_PERIOD / 2.0;
}

// =============================================================================
// Glider ASCII Layout
// =============================================================================

/// Self-describing glider telemetry files
pub mod glider {
    /// Preamble keys that must all appear, one per line, at stream open
    pub const REQUIRED_PREAMBLE_KEYS: &[&str] = &[
        "glider_label",
        "mission_name",
        "fileopen_time",
        "sensor_count",
        "label_lines",
        "segment_name",
    ];

    /// Label lines following the preamble: column names, units, byte sizes
    pub const LABEL_LINE_COUNT: u32 = 3;

    /// chrono format of the `fileopen_time` preamble value
    pub const FILEOPEN_TIME_FORMAT: &str = "%a_%b_%d_%H:%M:%S_%Y";

    /// Column carrying mission time (fractional POSIX seconds)
    pub const TIMESTAMP_COLUMN: &str = "m_present_time";

    /// Science fields a glider data particle declares
    pub const SCIENCE_COLUMNS: &[&str] = &[
        "sci_water_temp",
        "sci_water_cond",
        "sci_water_pressure",
        "m_depth",
        "m_lat",
        "m_lon",
    ];
}

// =============================================================================
// CSPP Profiler Layout
// =============================================================================

/// CSPP profiler uplink files: `key: value` header lines, then
/// tab-delimited rows of timestamp, depth, suspect flag, and measurements.
pub mod cspp {
    /// Header key whose value names the instrument source file
    pub const SOURCE_FILE_KEY: &str = "Source File";

    /// Suspect-flag token marking a row the profiler distrusts
    pub const SUSPECT_FLAG: &str = "y";

    /// Measurement columns a CSPP data particle declares
    pub const VALUE_COLUMNS: &[&str] = &["par", "beam_attenuation"];
}
