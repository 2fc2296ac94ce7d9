//! Durable dictation history: one Markdown file per utterance.
//!
//! Entries land in the history directory named by UTC timestamp
//! (`2026-08-30T14-05-31Z.md`) with a small metadata header followed by the
//! final text, so history survives restarts and is greppable with ordinary
//! tools.  No database, by design.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use super::OutputError;

// ---------------------------------------------------------------------------
// HistoryMetadata
// ---------------------------------------------------------------------------

/// Metadata recorded alongside each history entry.
#[derive(Debug, Clone)]
pub struct HistoryMetadata {
    /// When the entry was created.
    pub created: DateTime<Utc>,
    /// Detected (or configured) speech language.
    pub language: String,
    /// Identifier of the transcription model used.
    pub model: String,
    /// Length of the recorded audio.
    pub audio_duration: Duration,
    /// Whether the text went through refinement.
    pub post_processed: bool,
}

// ---------------------------------------------------------------------------
// HistorySink trait
// ---------------------------------------------------------------------------

/// Seam over durable history storage.
pub trait HistorySink: Send + Sync {
    /// Persist `text` with `meta`; returns the path of the written entry.
    fn write(&self, text: &str, meta: &HistoryMetadata) -> Result<PathBuf, OutputError>;
}

// ---------------------------------------------------------------------------
// FileHistory
// ---------------------------------------------------------------------------

/// Flat-file [`HistorySink`] writing into one directory.
#[derive(Debug, Clone)]
pub struct FileHistory {
    dir: PathBuf,
}

impl FileHistory {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn entry_path(&self, created: &DateTime<Utc>) -> PathBuf {
        // Colons are not portable in file names; keep the Z suffix.
        let stamp = created
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .replace(':', "-");
        self.dir.join(format!("{stamp}.md"))
    }
}

impl HistorySink for FileHistory {
    fn write(&self, text: &str, meta: &HistoryMetadata) -> Result<PathBuf, OutputError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| OutputError::HistoryWrite(format!("{}: {e}", self.dir.display())))?;

        let path = self.entry_path(&meta.created);
        let content = format!(
            "---\n\
             created: {}\n\
             language: {}\n\
             model: {}\n\
             audio_seconds: {:.1}\n\
             post_processed: {}\n\
             ---\n\n\
             {}\n",
            meta.created.to_rfc3339_opts(SecondsFormat::Secs, true),
            meta.language,
            meta.model,
            meta.audio_duration.as_secs_f64(),
            meta.post_processed,
            text
        );

        std::fs::write(&path, content)
            .map_err(|e| OutputError::HistoryWrite(format!("{}: {e}", path.display())))?;

        log::debug!("history: wrote {}", path.display());
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
