//! hotkey-dictate — hands-free dictation on a push-to-talk chord.
//!
//! Hold the configured chord to record, release to transcribe: the captured
//! audio goes through an external speech-to-text backend, optionally through
//! an external language-model refinement backend, and the resulting text
//! lands on the clipboard and in a flat-file history with a completion
//! notification.
//!
//! # Architecture
//!
//! ```text
//! rdev hook thread          tokio runtime
//! ┌───────────────┐   mpsc   ┌──────────────────────────────┐
//! │ ChordTracker  │ ───────▶ │   PipelineOrchestrator       │
//! │ (correlator)  │  events  │   ├─ SessionStateMachine     │
//! └───────────────┘          │   ├─ CaptureDevice           │
//!                            │   ├─ TranscriptionAdapter ───┼──▶ stt subprocess
//!                            │   ├─ RefinementAdapter ──────┼──▶ llm subprocess
//!                            │   ├─ ClipboardSink ∥ History │
//!                            │   └─ Notifier                │
//!                            └──────────────────────────────┘
//! ```
//!
//! Every collaborator sits behind a trait so the orchestrator — the part
//! that carries all of the failure-handling policy — is tested entirely
//! in-process.

pub mod capture;
pub mod config;
pub mod exec;
pub mod hotkey;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod session;
