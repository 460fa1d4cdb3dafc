//! Resume entry point
//!
//! Re-seeds a chunker/parse-state pair from a previously serialized
//! snapshot so parsing continues without re-emitting delivered records
//! and without skipping unread bytes. The byte source itself is owned by
//! the harvester, which seeks to [`ParserEngine::state`]'s position
//! before feeding the first resumed fragment.

use tracing::info;

use super::{EngineStatus, IngestStats, ParserEngine};
use crate::app::services::chunker::Chunker;
use crate::app::services::formats::FormatHandler;
use crate::app::services::parse_state::ParseState;
use crate::config::ParserConfig;
use crate::{Error, Result};

impl ParserEngine {
    /// Reopen a stream from a serialized parse-state snapshot
    ///
    /// A corrupt or foreign blob fails here rather than silently parsing
    /// from byte zero, which would duplicate already-delivered records
    /// downstream.
    pub fn resume(
        config: ParserConfig,
        stream_id: impl Into<String>,
        snapshot: &str,
    ) -> Result<Self> {
        config.validate()?;
        let stream_id = stream_id.into();
        let state = ParseState::from_json(snapshot)?;
        let format = FormatHandler::for_config(&config)?;
        let chunker = Chunker::with_base(format.sieves()?, config.buffer_limit, state.position());

        info!(
            "Resumed stream '{}' at position {} ({} in-progress blocks)",
            stream_id,
            state.position(),
            state.in_process().len()
        );

        Ok(Self {
            config,
            stream_id,
            chunker,
            state,
            format,
            status: EngineStatus::AwaitingChunk,
            stats: IngestStats::new(),
        })
    }

    /// Validate a resume position against the known stream length
    ///
    /// Harvesters call this before seeking; a position beyond the end of
    /// the stream means the snapshot belongs to some other (or truncated)
    /// source and resuming would be meaningless.
    pub fn check_resume_bounds(&self, stream_length: u64) -> Result<()> {
        let position = self.state.position();
        if position > stream_length {
            return Err(Error::ResumeBounds {
                position,
                stream_length,
            });
        }
        Ok(())
    }
}
