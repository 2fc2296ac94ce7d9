//! Output sinks: clipboard and durable flat-file history.
//!
//! The two sinks are mutually independent — the orchestrator attempts both
//! and a failure of one never prevents the other.  Both are soft failures:
//! reported, never aborting the pipeline.

pub mod clipboard;
pub mod history;

pub use clipboard::{ClipboardSink, SystemClipboard};
pub use history::{FileHistory, HistoryMetadata, HistorySink};

use thiserror::Error;

// ---------------------------------------------------------------------------
// OutputError
// ---------------------------------------------------------------------------

/// All errors that can surface from the output sinks.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The OS clipboard is held by another application.
    #[error("clipboard is locked by another application: {0}")]
    ClipboardLocked(String),

    /// Could not open or write the system clipboard.
    #[error("cannot access clipboard: {0}")]
    ClipboardAccess(String),

    /// Could not write the history entry.
    #[error("cannot write history entry: {0}")]
    HistoryWrite(String),
}
