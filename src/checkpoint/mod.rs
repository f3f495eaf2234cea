//! Durable crawl checkpoints
//!
//! A checkpoint is one JSON document holding the frontier, the dedup index, the host
//! table and the run counters. It is replaced atomically: the new document is written
//! to a temporary file in the same directory, synced, then renamed over the old one, so
//! a crash leaves either the previous checkpoint or the new one, never a torn file.

use crate::frontier::FrontierSnapshot;
use crate::output::RunStats;
use crate::state::HostSnapshot;
use crate::url::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Layout version written into every checkpoint
pub const FORMAT_VERSION: u32 = 1;

/// Errors that can occur while reading or writing checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed checkpoint: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Checkpoint was taken under a different crawl configuration (expected {expected}, found {found})")]
    Incompatible { expected: String, found: String },

    #[error("Unsupported checkpoint format version {0}")]
    UnsupportedVersion(u32),
}

/// Full crawl state at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub config_fingerprint: String,
    pub taken_at: DateTime<Utc>,
    pub frontier: FrontierSnapshot,
    pub dedup: Vec<Fingerprint>,
    pub hosts: Vec<HostSnapshot>,
    pub stats: RunStats,
}

/// The fields checked before the body is trusted
#[derive(Deserialize)]
struct Header {
    format_version: u32,
    config_fingerprint: String,
}

/// Reads and writes the checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the checkpoint if one exists
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - No checkpoint file
    /// * `Ok(Some(_))` - A checkpoint taken under `expected_fingerprint`
    /// * `Err(_)` - Unreadable, malformed, of another format version, or taken under a
    ///   different crawl configuration; nothing of it is used
    pub fn load(&self, expected_fingerprint: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let header: Header = serde_json::from_str(&content)?;
        if header.format_version != FORMAT_VERSION {
            return Err(CheckpointError::UnsupportedVersion(header.format_version));
        }
        if header.config_fingerprint != expected_fingerprint {
            return Err(CheckpointError::Incompatible {
                expected: expected_fingerprint.to_string(),
                found: header.config_fingerprint,
            });
        }

        let checkpoint: Checkpoint = serde_json::from_str(&content)?;
        tracing::info!(
            "Loaded checkpoint from {} (taken {}, {} pending, {} resolved)",
            self.path.display(),
            checkpoint.taken_at,
            checkpoint.frontier.pending.len(),
            checkpoint.dedup.len()
        );
        Ok(Some(checkpoint))
    }

    /// Atomically replaces the checkpoint file
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, checkpoint)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(
            "Checkpoint written to {} ({} pending, {} resolved)",
            self.path.display(),
            checkpoint.frontier.pending.len(),
            checkpoint.dedup.len()
        );
        Ok(())
    }
}
