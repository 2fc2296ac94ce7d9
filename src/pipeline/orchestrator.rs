//! Pipeline orchestrator — drives the full capture → STT → refine → output
//! loop.
//!
//! [`PipelineOrchestrator`] owns the [`SessionStateMachine`], the
//! single-flight guard, and every collaborator seam, and responds to
//! [`ChordEvent`]s received over a `tokio::sync::mpsc` channel.
//!
//! # Pipeline flow
//!
//! ```text
//! ChordEvent::Activated
//!   └─▶ acquire single-flight permit (or drop the gesture)
//!         └─▶ Idle → Recording, start capture
//!
//! ChordEvent::Deactivated
//!   └─▶ finish capture, validate artifact        [Recording]
//!         └─▶ transcribe (T_stt)                 [Processing]
//!               ├─ empty → "no speech", Idle — no output stages
//!               └─▶ refine (T_llm), if configured [PostProcessing]
//!                     ├─ Ok  → refined text, post_processed = true
//!                     └─ Err → raw text,     post_processed = false
//!                   └─▶ clipboard (1 retry) ∥ history  (independent)
//!                         └─▶ PipelineOutcome, notify, Idle
//! ```
//!
//! # Failure semantics
//!
//! | Stage | On failure | Stops pipeline? |
//! |---|---|---|
//! | Capture / artifact validation | Idle + warning | yes |
//! | Transcription | Idle + classified warning | yes |
//! | Transcription empty | Idle + soft notice | yes |
//! | Refinement | fall back to raw text | no |
//! | Clipboard | continue, advisory | no |
//! | History | continue, log only | no |
//!
//! The single-flight permit and an idle guard travel through every path, so
//! the guard is released and the state machine is back at `Idle` before
//! control returns — even on an unexpected panic unwind.
//!
//! Blocking work (clipboard, history file writes) is pushed onto
//! `tokio::task::spawn_blocking` so the async runtime never stalls.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::capture::{validate_artifact, CaptureDevice, CaptureHandle};
use crate::exec::{Refiner, Transcriber, TranscriptionResult};
use crate::hotkey::ChordEvent;
use crate::notify::{NoticeKind, Notifier};
use crate::output::{ClipboardSink, HistoryMetadata, HistorySink};
use crate::session::{SessionStateMachine, Trigger};

// ---------------------------------------------------------------------------
// PipelineOutcome
// ---------------------------------------------------------------------------

/// Result of one completed dictation session.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// The delivered text: refined when refinement succeeded, otherwise the
    /// raw transcript.
    pub final_text: String,
    /// `true` only when refinement ran and succeeded.
    pub post_processed: bool,
    /// Whether the clipboard write (including its single retry) succeeded.
    pub clipboard_ok: bool,
    /// Path of the history entry, when the history write succeeded.
    pub history_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// PipelineOptions
// ---------------------------------------------------------------------------

/// Orchestrator tuning knobs derived from [`crate::config::AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Backoff before the single clipboard retry.
    pub clipboard_retry: Duration,
    /// Model identifier recorded in history metadata.
    pub stt_model_label: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            clipboard_retry: Duration::from_millis(150),
            stt_model_label: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// A recording in progress: the single-flight permit plus the capture
/// handle.  Dropping it (on any path) releases the guard.
struct InFlight {
    _permit: OwnedSemaphorePermit,
    handle: CaptureHandle,
}

/// Drives the complete dictation pipeline.
///
/// Create with [`PipelineOrchestrator::new`], then either call
/// [`run`](Self::run) inside a tokio task or feed events directly through
/// [`handle_event`](Self::handle_event) (the explicit per-gesture future —
/// nothing in the pipeline is fire-and-forget).
pub struct PipelineOrchestrator {
    session: SessionStateMachine,
    /// Binary semaphore: at most one session in flight system-wide.
    single_flight: Arc<Semaphore>,
    in_flight: Mutex<Option<InFlight>>,
    capture: Arc<dyn CaptureDevice>,
    transcriber: Arc<dyn Transcriber>,
    /// `None` when refinement is disabled; the PostProcessing sub-phase is
    /// then never entered.
    refiner: Option<Arc<dyn Refiner>>,
    clipboard: Arc<dyn ClipboardSink>,
    history: Arc<dyn HistorySink>,
    notifier: Arc<dyn Notifier>,
    opts: PipelineOptions,
}

impl PipelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: SessionStateMachine,
        capture: Arc<dyn CaptureDevice>,
        transcriber: Arc<dyn Transcriber>,
        refiner: Option<Arc<dyn Refiner>>,
        clipboard: Arc<dyn ClipboardSink>,
        history: Arc<dyn HistorySink>,
        notifier: Arc<dyn Notifier>,
        opts: PipelineOptions,
    ) -> Self {
        Self {
            session,
            single_flight: Arc::new(Semaphore::new(1)),
            in_flight: Mutex::new(None),
            capture,
            transcriber,
            refiner,
            clipboard,
            history,
            notifier,
            opts,
        }
    }

    /// The state machine, for subscribers (logging, status display).
    pub fn session(&self) -> &SessionStateMachine {
        &self.session
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run the orchestrator until `rx` is closed.  Outcomes are awaited and
    /// logged here; callers that need them use [`handle_event`](Self::handle_event)
    /// directly.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ChordEvent>) {
        while let Some(event) = rx.recv().await {
            if let Some(outcome) = self.handle_event(event).await {
                log::info!(
                    "pipeline: session complete ({} chars, post_processed={}, clipboard_ok={}, history={:?})",
                    outcome.final_text.len(),
                    outcome.post_processed,
                    outcome.clipboard_ok,
                    outcome.history_path
                );
            }
        }
        log::info!("pipeline: event channel closed, orchestrator shutting down");
    }

    /// Handle one chord event to completion.
    ///
    /// Returns a [`PipelineOutcome`] only when a full session ran its output
    /// stages; dropped gestures, aborted sessions and the empty-transcript
    /// short-circuit all return `None`.
    pub async fn handle_event(&self, event: ChordEvent) -> Option<PipelineOutcome> {
        match event {
            ChordEvent::Activated => {
                self.handle_activated();
                None
            }
            ChordEvent::Deactivated => self.handle_deactivated().await,
        }
    }

    // -----------------------------------------------------------------------
    // Activation
    // -----------------------------------------------------------------------

    /// Chord down: acquire the single-flight guard and start recording.
    ///
    /// A second activation while a session is in flight is dropped with a
    /// warning — never queued, never interrupting the running session.
    fn handle_activated(&self) {
        let permit = match Arc::clone(&self.single_flight).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                log::warn!("pipeline: session already in flight, dropping activation");
                return;
            }
            Err(TryAcquireError::Closed) => {
                log::error!("pipeline: single-flight semaphore closed");
                return;
            }
        };

        if let Err(e) = self.session.transition(Trigger::Activate) {
            // Defect: the permit was free but the machine is not Idle.
            log::error!("pipeline: {e}");
            debug_assert!(false, "{e}");
            return;
        }

        match self.capture.start() {
            Ok(handle) => {
                log::debug!("pipeline: recording started");
                *self.in_flight.lock().expect("in_flight mutex poisoned") = Some(InFlight {
                    _permit: permit,
                    handle,
                });
            }
            Err(e) => {
                self.must_transition(Trigger::CaptureError);
                self.notifier
                    .notify(&format!("Recording failed: {e}"), NoticeKind::Warning);
                // permit drops here, releasing the guard
            }
        }
    }

    // -----------------------------------------------------------------------
    // Deactivation — the session pipeline
    // -----------------------------------------------------------------------

    /// Chord up: run the capture → STT → refine → output pipeline.
    async fn handle_deactivated(&self) -> Option<PipelineOutcome> {
        let Some(in_flight) = self
            .in_flight
            .lock()
            .expect("in_flight mutex poisoned")
            .take()
        else {
            // The matching activation was dropped (guard held) or failed.
            log::debug!("pipeline: deactivation without a recording, ignoring");
            return None;
        };

        // The guard travels with `in_flight` and is released when it drops,
        // on every path out of this function.  The idle guard covers the
        // state machine the same way, including panic unwinds.
        let _idle = IdleGuard {
            session: &self.session,
        };

        self.run_session(in_flight.handle).await
    }

    async fn run_session(&self, handle: CaptureHandle) -> Option<PipelineOutcome> {
        // ── 1. Finalise capture (still Recording) ─────────────────────────
        let artifact = match self.capture.finish(handle).await {
            Ok(artifact) => artifact,
            Err(e) => {
                self.must_transition(Trigger::CaptureError);
                self.notifier
                    .notify(&format!("Recording failed: {e}"), NoticeKind::Warning);
                return None;
            }
        };

        // ── 2. Validate the artifact ──────────────────────────────────────
        if let Err(e) = validate_artifact(&artifact) {
            self.must_transition(Trigger::CaptureError);
            self.notifier
                .notify(&format!("Recording unusable: {e}"), NoticeKind::Warning);
            return None;
        }

        self.must_transition(Trigger::Deactivate);

        // ── 3. Transcription ──────────────────────────────────────────────
        let transcript = match self.transcriber.transcribe(&artifact).await {
            Ok(transcript) => transcript,
            Err(e) => {
                self.must_transition(Trigger::Failed);
                self.notifier
                    .notify(&format!("Transcription failed: {e}"), NoticeKind::Warning);
                return None;
            }
        };

        // ── 4. Empty-transcript short-circuit ─────────────────────────────
        if transcript.is_empty() {
            log::info!("pipeline: no speech recognised, skipping output stages");
            self.must_transition(Trigger::Completed);
            self.notifier.notify("No speech detected", NoticeKind::Warning);
            return None;
        }

        // ── 5. Refinement (optional; failure falls back to raw text) ──────
        let (final_text, post_processed) = self.refine_stage(&transcript).await;

        // ── 6+7. Clipboard and history, mutually independent ──────────────
        let meta = HistoryMetadata {
            created: chrono::Utc::now(),
            language: transcript.language.clone(),
            model: self.opts.stt_model_label.clone(),
            audio_duration: artifact.duration,
            post_processed,
        };
        let (clipboard_ok, history_path) = tokio::join!(
            self.clipboard_stage(final_text.clone()),
            self.history_stage(final_text.clone(), meta),
        );

        if !clipboard_ok {
            self.notifier
                .notify("Text could not be copied to the clipboard", NoticeKind::Warning);
        }

        // ── 8. Outcome + completion signal ────────────────────────────────
        let outcome = PipelineOutcome {
            final_text,
            post_processed,
            clipboard_ok,
            history_path,
        };
        self.notifier.notify(
            &format!("Dictated {} characters", outcome.final_text.chars().count()),
            NoticeKind::Success,
        );

        self.must_transition(Trigger::Completed);
        Some(outcome)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Run refinement when configured.  Never escalates: on any error the
    /// raw transcript is kept and `post_processed` stays `false`.
    async fn refine_stage(&self, transcript: &TranscriptionResult) -> (String, bool) {
        let Some(refiner) = &self.refiner else {
            return (transcript.text.clone(), false);
        };

        self.must_transition(Trigger::Refine);
        match refiner.refine(&transcript.text).await {
            Ok(refined) => (refined, true),
            Err(e) => {
                log::warn!("pipeline: refinement failed ({e}), keeping raw transcript");
                self.notifier.notify(
                    "Refinement unavailable, delivering raw transcript",
                    NoticeKind::Warning,
                );
                (transcript.text.clone(), false)
            }
        }
    }

    /// Clipboard write with exactly one retry after a fixed backoff.
    async fn clipboard_stage(&self, text: String) -> bool {
        if self.try_clipboard(text.clone()).await {
            return true;
        }
        tokio::time::sleep(self.opts.clipboard_retry).await;
        self.try_clipboard(text).await
    }

    async fn try_clipboard(&self, text: String) -> bool {
        let sink = Arc::clone(&self.clipboard);
        match tokio::task::spawn_blocking(move || sink.write(&text)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::warn!("pipeline: clipboard write failed: {e}");
                false
            }
            Err(e) => {
                log::warn!("pipeline: clipboard task panicked: {e}");
                false
            }
        }
    }

    /// History write; failure is soft and log-only.
    async fn history_stage(&self, text: String, meta: HistoryMetadata) -> Option<PathBuf> {
        let sink = Arc::clone(&self.history);
        match tokio::task::spawn_blocking(move || sink.write(&text, &meta)).await {
            Ok(Ok(path)) => Some(path),
            Ok(Err(e)) => {
                log::warn!("pipeline: history write failed: {e}");
                None
            }
            Err(e) => {
                log::warn!("pipeline: history task panicked: {e}");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Apply a transition that the pipeline's own sequencing guarantees is
    /// valid.  A rejection here is a defect, surfaced loudly in every build.
    fn must_transition(&self, trigger: Trigger) {
        if let Err(e) = self.session.transition(trigger) {
            log::error!("pipeline: {e}");
            debug_assert!(false, "{e}");
        }
    }
}

/// Returns the state machine to `Idle` when the session path exits without
/// completing its own transitions (including panic unwinds).  A no-op when
/// the machine already reached `Idle`.
struct IdleGuard<'a> {
    session: &'a SessionStateMachine,
}

impl Drop for IdleGuard<'_> {
    fn drop(&mut self) {
        self.session.reset();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{AudioArtifact, CaptureError, MIN_ARTIFACT_DURATION};
    use crate::exec::{RefineError, TranscribeError};
    use crate::session::SessionState;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Capture device producing a real (minimal) WAV file in a tempdir.
    struct FakeCapture {
        dir: tempfile::TempDir,
        duration: Duration,
        fail_finish: bool,
        invalid_artifact: bool,
    }

    impl FakeCapture {
        fn ok(duration: Duration) -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                duration,
                fail_finish: false,
                invalid_artifact: false,
            }
        }

        fn failing() -> Self {
            let mut c = Self::ok(Duration::from_secs(1));
            c.fail_finish = true;
            c
        }

        fn invalid() -> Self {
            let mut c = Self::ok(Duration::from_secs(1));
            c.invalid_artifact = true;
            c
        }
    }

    #[async_trait]
    impl CaptureDevice for FakeCapture {
        fn start(&self) -> Result<CaptureHandle, CaptureError> {
            Ok(CaptureHandle(1))
        }

        async fn finish(&self, _handle: CaptureHandle) -> Result<AudioArtifact, CaptureError> {
            if self.fail_finish {
                return Err(CaptureError::Finalize("device vanished".into()));
            }
            let path = self.dir.path().join("utterance.wav");
            if self.invalid_artifact {
                std::fs::write(&path, b"not audio").unwrap();
            } else {
                let mut bytes = Vec::new();
                bytes.extend_from_slice(b"RIFF");
                bytes.extend_from_slice(&36u32.to_le_bytes());
                bytes.extend_from_slice(b"WAVE");
                bytes.resize(44, 0);
                std::fs::write(&path, bytes).unwrap();
            }
            Ok(AudioArtifact {
                path,
                duration: self.duration,
            })
        }
    }

    /// Transcriber returning a fixed result, counting invocations.
    struct FakeTranscriber {
        result: Result<TranscriptionResult, fn() -> TranscribeError>,
        calls: AtomicUsize,
    }

    impl FakeTranscriber {
        fn text(text: &str) -> Self {
            Self {
                result: Ok(TranscriptionResult {
                    text: text.into(),
                    language: "en".into(),
                    duration_sec: 5.0,
                    segments: None,
                }),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(make: fn() -> TranscribeError) -> Self {
            Self {
                result: Err(make),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(
            &self,
            _artifact: &AudioArtifact,
        ) -> Result<TranscriptionResult, TranscribeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(r) => Ok(r.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    /// Refiner with a fixed reply or error, counting invocations.
    struct FakeRefiner {
        reply: Result<String, fn() -> RefineError>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeRefiner {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.into()),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(make: fn() -> RefineError) -> Self {
            Self {
                reply: Err(make),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Refiner for FakeRefiner {
        async fn refine(&self, _text: &str) -> Result<String, RefineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    /// Clipboard recording writes; optionally always failing.
    struct FakeClipboard {
        fail: bool,
        writes: Arc<AtomicUsize>,
    }

    impl FakeClipboard {
        fn ok() -> Self {
            Self {
                fail: false,
                writes: Arc::new(AtomicUsize::new(0)),
            }
        }
        fn failing() -> Self {
            Self {
                fail: true,
                writes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ClipboardSink for FakeClipboard {
        fn write(&self, _text: &str) -> Result<(), crate::output::OutputError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::output::OutputError::ClipboardLocked("busy".into()))
            } else {
                Ok(())
            }
        }
    }

    /// History sink writing into a tempdir; optionally always failing.
    struct FakeHistory {
        dir: Option<tempfile::TempDir>,
        writes: Arc<AtomicUsize>,
    }

    impl FakeHistory {
        fn ok() -> Self {
            Self {
                dir: Some(tempfile::tempdir().unwrap()),
                writes: Arc::new(AtomicUsize::new(0)),
            }
        }
        fn failing() -> Self {
            Self {
                dir: None,
                writes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl HistorySink for FakeHistory {
        fn write(
            &self,
            text: &str,
            meta: &HistoryMetadata,
        ) -> Result<PathBuf, crate::output::OutputError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let Some(dir) = &self.dir else {
                return Err(crate::output::OutputError::HistoryWrite("disk full".into()));
            };
            let path = dir.path().join("entry.md");
            std::fs::write(&path, format!("{text} ({})", meta.language)).unwrap();
            Ok(path)
        }
    }

    /// Notifier recording every message.
    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<(String, NoticeKind)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, message: &str, kind: NoticeKind) {
            self.messages
                .lock()
                .unwrap()
                .push((message.to_string(), kind));
        }
    }

    impl RecordingNotifier {
        fn warnings(&self) -> usize {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, k)| *k == NoticeKind::Warning)
                .count()
        }
    }

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    struct Harness {
        orchestrator: Arc<PipelineOrchestrator>,
        notifier: Arc<RecordingNotifier>,
        refiner_calls: Option<Arc<AtomicUsize>>,
        clipboard_writes: Arc<AtomicUsize>,
        history_writes: Arc<AtomicUsize>,
    }

    fn build(
        capture: FakeCapture,
        transcriber: FakeTranscriber,
        refiner: Option<FakeRefiner>,
        clipboard: FakeClipboard,
        history: FakeHistory,
    ) -> Harness {
        let notifier = Arc::new(RecordingNotifier::default());
        let refiner_calls = refiner.as_ref().map(|r| Arc::clone(&r.calls));
        let clipboard_writes = Arc::clone(&clipboard.writes);
        let history_writes = Arc::clone(&history.writes);

        let opts = PipelineOptions {
            clipboard_retry: Duration::from_millis(1),
            stt_model_label: "ggml-base.bin".into(),
        };
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            SessionStateMachine::new(),
            Arc::new(capture),
            Arc::new(transcriber),
            refiner.map(|r| Arc::new(r) as Arc<dyn Refiner>),
            Arc::new(clipboard),
            Arc::new(history),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            opts,
        ));

        Harness {
            orchestrator,
            notifier,
            refiner_calls,
            clipboard_writes,
            history_writes,
        }
    }

    async fn full_gesture(h: &Harness) -> Option<PipelineOutcome> {
        assert!(h.orchestrator.handle_event(ChordEvent::Activated).await.is_none());
        h.orchestrator.handle_event(ChordEvent::Deactivated).await
    }

    fn idle(h: &Harness) -> bool {
        h.orchestrator.session().current() == SessionState::Idle
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    /// Scenario A: 5 s artifact, transcription "hello world", refinement
    /// disabled.
    #[tokio::test]
    async fn scenario_a_plain_transcription() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::text("hello world"),
            None,
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        let outcome = full_gesture(&h).await.expect("outcome");
        assert_eq!(outcome.final_text, "hello world");
        assert!(!outcome.post_processed);
        assert!(outcome.clipboard_ok);
        assert!(outcome.history_path.is_some());
        assert!(idle(&h));
    }

    /// Scenario B: refinement enabled and succeeding.
    #[tokio::test]
    async fn scenario_b_refined_transcription() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::text("hello world"),
            Some(FakeRefiner::ok("Hello, world.")),
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        let outcome = full_gesture(&h).await.expect("outcome");
        assert_eq!(outcome.final_text, "Hello, world.");
        assert!(outcome.post_processed);
        assert!(idle(&h));
    }

    /// Scenario C: refinement exits non-zero → raw text plus one recorded
    /// soft warning.
    #[tokio::test]
    async fn scenario_c_refinement_failure_falls_back() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::text("hello world"),
            Some(FakeRefiner::failing(|| RefineError::Backend {
                code: Some(1),
                message: "boom".into(),
            })),
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        let outcome = full_gesture(&h).await.expect("outcome");
        assert_eq!(outcome.final_text, "hello world");
        assert!(!outcome.post_processed);
        assert_eq!(h.notifier.warnings(), 1);
        assert!(idle(&h));
    }

    /// A refinement backend that always times out must not prevent delivery
    /// of the raw transcript.
    #[tokio::test]
    async fn refinement_timeout_falls_back_to_raw_text() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::text("some dictated words"),
            Some(FakeRefiner::failing(|| {
                RefineError::Timeout(Duration::from_secs(30))
            })),
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        let outcome = full_gesture(&h).await.expect("outcome");
        assert_eq!(outcome.final_text, "some dictated words");
        assert!(!outcome.post_processed);
        assert!(outcome.clipboard_ok);
        assert!(idle(&h));
    }

    // -----------------------------------------------------------------------
    // Short-circuits and terminal failures
    // -----------------------------------------------------------------------

    /// Empty transcription: zero refinement/clipboard/history calls, soft
    /// notification, back to Idle.
    #[tokio::test]
    async fn empty_transcription_short_circuits() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::text("   "),
            Some(FakeRefiner::ok("never called")),
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        let outcome = full_gesture(&h).await;
        assert!(outcome.is_none());
        assert_eq!(h.refiner_calls.as_ref().unwrap().load(Ordering::SeqCst), 0);
        assert_eq!(h.clipboard_writes.load(Ordering::SeqCst), 0);
        assert_eq!(h.history_writes.load(Ordering::SeqCst), 0);
        assert_eq!(h.notifier.warnings(), 1);
        assert!(idle(&h));
    }

    #[tokio::test]
    async fn capture_failure_aborts_to_idle() {
        let h = build(
            FakeCapture::failing(),
            FakeTranscriber::text("never"),
            None,
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        assert!(full_gesture(&h).await.is_none());
        assert_eq!(h.clipboard_writes.load(Ordering::SeqCst), 0);
        assert_eq!(h.notifier.warnings(), 1);
        assert!(idle(&h));
    }

    #[tokio::test]
    async fn invalid_artifact_aborts_to_idle() {
        let h = build(
            FakeCapture::invalid(),
            FakeTranscriber::text("never"),
            None,
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        assert!(full_gesture(&h).await.is_none());
        assert_eq!(h.notifier.warnings(), 1);
        assert!(idle(&h));
    }

    #[tokio::test]
    async fn too_short_artifact_aborts_to_idle() {
        let h = build(
            FakeCapture::ok(MIN_ARTIFACT_DURATION / 2),
            FakeTranscriber::text("never"),
            None,
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        assert!(full_gesture(&h).await.is_none());
        assert!(idle(&h));
    }

    #[tokio::test]
    async fn transcription_failure_aborts_to_idle_with_one_warning() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::failing(|| TranscribeError::Timeout(Duration::from_secs(60))),
            Some(FakeRefiner::ok("never")),
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        assert!(full_gesture(&h).await.is_none());
        assert_eq!(h.refiner_calls.as_ref().unwrap().load(Ordering::SeqCst), 0);
        assert_eq!(h.clipboard_writes.load(Ordering::SeqCst), 0);
        assert_eq!(h.notifier.warnings(), 1);
        assert!(idle(&h));
    }

    // -----------------------------------------------------------------------
    // Sink independence
    // -----------------------------------------------------------------------

    /// Clipboard always fails, history succeeds: history path still
    /// populated, clipboard retried exactly once.
    #[tokio::test]
    async fn clipboard_failure_does_not_block_history() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::text("hello world"),
            None,
            FakeClipboard::failing(),
            FakeHistory::ok(),
        );

        let outcome = full_gesture(&h).await.expect("outcome");
        assert!(!outcome.clipboard_ok);
        assert!(outcome.history_path.is_some());
        // Initial attempt + exactly one retry.
        assert_eq!(h.clipboard_writes.load(Ordering::SeqCst), 2);
        assert!(idle(&h));
    }

    /// History always fails, clipboard succeeds: outcome still delivered.
    #[tokio::test]
    async fn history_failure_does_not_block_clipboard() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::text("hello world"),
            None,
            FakeClipboard::ok(),
            FakeHistory::failing(),
        );

        let outcome = full_gesture(&h).await.expect("outcome");
        assert!(outcome.clipboard_ok);
        assert!(outcome.history_path.is_none());
        assert!(idle(&h));
    }

    // -----------------------------------------------------------------------
    // Single-flight
    // -----------------------------------------------------------------------

    /// With a session in flight, concurrent activations are dropped: exactly
    /// one pipeline execution completes.
    #[tokio::test]
    async fn single_flight_drops_concurrent_activations() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::text("hello world"),
            None,
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        // Storm of concurrent activations.
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let orc = Arc::clone(&h.orchestrator);
                tokio::spawn(async move { orc.handle_event(ChordEvent::Activated).await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        // Exactly one activation won the guard and started recording.
        assert_eq!(h.orchestrator.session().current(), SessionState::Recording);

        // One deactivation completes the single session; further
        // deactivations find nothing in flight.
        let outcome = h.orchestrator.handle_event(ChordEvent::Deactivated).await;
        assert!(outcome.is_some());
        assert!(h
            .orchestrator
            .handle_event(ChordEvent::Deactivated)
            .await
            .is_none());

        assert_eq!(h.history_writes.load(Ordering::SeqCst), 1);
        assert!(idle(&h));
    }

    /// After a completed session the guard is released and a new gesture
    /// runs a fresh pipeline.
    #[tokio::test]
    async fn guard_is_released_after_each_session() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::text("hello world"),
            None,
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        assert!(full_gesture(&h).await.is_some());
        assert!(full_gesture(&h).await.is_some());
        assert_eq!(h.history_writes.load(Ordering::SeqCst), 2);
    }

    /// The guard is released even when the session aborts mid-pipeline.
    #[tokio::test]
    async fn guard_is_released_after_aborted_session() {
        let h = build(
            FakeCapture::failing(),
            FakeTranscriber::text("never"),
            None,
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        assert!(full_gesture(&h).await.is_none());
        // A second gesture must be able to acquire the guard again.
        assert!(h.orchestrator.handle_event(ChordEvent::Activated).await.is_none());
        assert_eq!(h.orchestrator.session().current(), SessionState::Recording);
    }

    // -----------------------------------------------------------------------
    // run() loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn run_consumes_events_until_channel_closes() {
        let h = build(
            FakeCapture::ok(Duration::from_secs(5)),
            FakeTranscriber::text("hello world"),
            None,
            FakeClipboard::ok(),
            FakeHistory::ok(),
        );

        let (tx, rx) = mpsc::channel(4);
        tx.send(ChordEvent::Activated).await.unwrap();
        tx.send(ChordEvent::Deactivated).await.unwrap();
        drop(tx);

        Arc::clone(&h.orchestrator).run(rx).await;

        assert_eq!(h.history_writes.load(Ordering::SeqCst), 1);
        assert!(idle(&h));
    }
}
