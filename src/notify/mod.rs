//! Operator-facing notifications.
//!
//! Fire-and-forget, best-effort: a notifier failure is never observed by the
//! pipeline.  Policy (enforced by the orchestrator): every terminal error
//! yields exactly one notification, soft failures yield an advisory one, and
//! a completed transcription is never silently dropped.

// ---------------------------------------------------------------------------
// NoticeKind / Notifier
// ---------------------------------------------------------------------------

/// Severity of an operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The session produced text.
    Success,
    /// Something went wrong — terminal error or soft degradation.
    Warning,
}

/// Seam over the notification mechanism (desktop toast, bell, test
/// recorder).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, kind: NoticeKind);
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Default notifier: routes messages to the log sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, kind: NoticeKind) {
        match kind {
            NoticeKind::Success => log::info!("notify: {message}"),
            NoticeKind::Warning => log::warn!("notify: {message}"),
        }
    }
}
