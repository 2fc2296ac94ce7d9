//! Clipboard sink backed by the `arboard` crate.
//!
//! A short-lived [`arboard::Clipboard`] handle is created per call rather
//! than shared, because `arboard::Clipboard` is not `Send` on all platforms
//! and the handle is cheap to create.
//!
//! Writes are blocking; the orchestrator calls them via `spawn_blocking`.

use arboard::Clipboard;

use super::OutputError;

// ---------------------------------------------------------------------------
// ClipboardSink trait
// ---------------------------------------------------------------------------

/// Seam over the system clipboard so the orchestrator can be tested with
/// in-process fakes.
pub trait ClipboardSink: Send + Sync {
    /// Replace the clipboard content with `text`.
    fn write(&self, text: &str) -> Result<(), OutputError>;
}

// ---------------------------------------------------------------------------
// SystemClipboard
// ---------------------------------------------------------------------------

/// The real OS clipboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn new() -> Self {
        Self
    }
}

impl ClipboardSink for SystemClipboard {
    fn write(&self, text: &str) -> Result<(), OutputError> {
        let mut clipboard =
            Clipboard::new().map_err(|e| OutputError::ClipboardAccess(e.to_string()))?;
        clipboard.set_text(text).map_err(|e| match e {
            // Another application holds the clipboard open.
            arboard::Error::ClipboardOccupied => OutputError::ClipboardLocked(e.to_string()),
            other => OutputError::ClipboardAccess(other.to_string()),
        })
    }
}
