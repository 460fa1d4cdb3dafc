//! File harvesting adapter
//!
//! Bridges a file on disk to the parser engine: seeks to the restored
//! parse position, feeds delta reads into the engine, persists a state
//! snapshot to a sidecar file on every state event, and optionally
//! tail-follows a file that is still growing.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::models::Particle;
use crate::app::services::parse_state::ParseState;
use crate::app::services::parser_engine::{IngestStats, ParserEngine, ParticleSink};
use crate::config::ParserConfig;
use crate::constants::{DEFAULT_POLL_INTERVAL_MS, READ_BLOCK_SIZE, STATE_FILE_SUFFIX};
use crate::{Error, Recoverable, Result};

/// Sink wrapper that checkpoints every state snapshot to a sidecar file
///
/// The snapshot is written to a temporary file in the same directory and
/// renamed into place, so a crash mid-write can never leave a truncated
/// checkpoint behind.
struct PersistingSink<'a> {
    inner: &'a mut dyn ParticleSink,
    state_path: &'a Path,
    persist_error: Option<std::io::Error>,
}

impl PersistingSink<'_> {
    fn write_snapshot(&mut self, state: &ParseState) {
        if self.persist_error.is_some() {
            return;
        }

        let result = (|| -> std::io::Result<()> {
            let blob = state
                .to_json()
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            let directory = self.state_path.parent().unwrap_or(Path::new("."));
            let mut temp = tempfile::NamedTempFile::new_in(directory)?;
            temp.write_all(blob.as_bytes())?;
            temp.persist(self.state_path).map_err(|e| e.error)?;
            Ok(())
        })();

        if let Err(error) = result {
            warn!("Failed to persist parse state: {}", error);
            self.persist_error = Some(error);
        }
    }
}

impl ParticleSink for PersistingSink<'_> {
    fn on_sample(&mut self, particle: Particle) {
        self.inner.on_sample(particle);
    }

    fn on_state(&mut self, state: ParseState, stream_fully_ingested: bool) {
        self.write_snapshot(&state);
        self.inner.on_state(state, stream_fully_ingested);
    }

    fn on_exception(&mut self, exception: Recoverable) {
        self.inner.on_exception(exception);
    }
}

/// Harvester for one instrument data file
#[derive(Debug, Clone)]
pub struct FileHarvester {
    path: PathBuf,
    state_path: PathBuf,
    config: ParserConfig,
    follow: bool,
    poll_interval: Duration,
}

impl FileHarvester {
    /// Create a harvester for `path`, with its sidecar state file beside it
    pub fn new(path: impl Into<PathBuf>, config: ParserConfig) -> Self {
        let path = path.into();
        let mut state_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "stream".to_string());
        state_name.push_str(STATE_FILE_SUFFIX);
        let state_path = path.with_file_name(state_name);

        Self {
            path,
            state_path,
            config,
            follow: false,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Tail-follow the file instead of stopping at EOF
    pub fn with_follow(mut self, follow: bool, poll_interval: Duration) -> Self {
        self.follow = follow;
        self.poll_interval = poll_interval;
        self
    }

    /// Sidecar path where snapshots are checkpointed
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Open the engine, resuming from the sidecar snapshot when present
    fn open_engine(&self) -> Result<ParserEngine> {
        let stream_id = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());

        if self.state_path.exists() {
            let blob = std::fs::read_to_string(&self.state_path).map_err(|e| {
                Error::io(
                    format!("Failed to read state file {}", self.state_path.display()),
                    e,
                )
            })?;
            ParserEngine::resume(self.config.clone(), stream_id, &blob)
        } else {
            ParserEngine::new(self.config.clone(), stream_id)
        }
    }

    /// Harvest the file until EOF (or until cancelled when following)
    ///
    /// Emits particles and exceptions into `sink`; every state snapshot
    /// is checkpointed to the sidecar before being forwarded.
    pub async fn run(
        &self,
        sink: &mut dyn ParticleSink,
        cancel: CancellationToken,
    ) -> Result<IngestStats> {
        let mut engine = self.open_engine()?;

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| Error::io(format!("Failed to open {}", self.path.display()), e))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| Error::io("Failed to stat input file", e))?
            .len();
        engine.check_resume_bounds(length)?;

        let position = engine.state().position();
        file.seek(std::io::SeekFrom::Start(position))
            .await
            .map_err(|e| Error::io("Failed to seek to resume position", e))?;
        info!(
            "Harvesting {} from offset {} ({} bytes on disk)",
            self.path.display(),
            position,
            length
        );

        let mut sink = PersistingSink {
            inner: sink,
            state_path: &self.state_path,
            persist_error: None,
        };
        let mut buffer = vec![0u8; READ_BLOCK_SIZE];
        let mut closed = false;

        loop {
            if cancel.is_cancelled() {
                debug!("Harvest of {} cancelled", self.path.display());
                break;
            }

            let read = file
                .read(&mut buffer)
                .await
                .map_err(|e| Error::io("Failed to read input file", e))?;

            if read == 0 {
                if !self.follow {
                    engine.close(&mut sink)?;
                    closed = true;
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => continue,
                    _ = cancel.cancelled() => break,
                }
            }

            engine.add_data(&buffer[..read], Utc::now())?;
            engine.poll(&mut sink)?;
        }

        if let Some(error) = sink.persist_error.take() {
            return Err(Error::io("Parse state checkpoint failed", error));
        }
        if !closed {
            debug!(
                "Harvest of {} stopped without close; state remains resumable",
                self.path.display()
            );
        }
        Ok(engine.stats().clone())
    }
}
