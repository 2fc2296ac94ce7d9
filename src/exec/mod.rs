//! Subprocess adapters for the external transcription and refinement
//! backends.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    ProcessRunner                            │
//! │  spawn in own process group → drain stdio → wait w/timeout  │
//! │  on expiry: kill the whole group (descendants included)     │
//! └──────────────┬────────────────────────────┬────────────────┘
//!                │                            │
//!     ┌──────────▼──────────┐     ┌──────────▼──────────┐
//!     │ TranscriptionAdapter │     │  RefinementAdapter   │
//!     │ argv + JSON payload  │     │ stdin text + stdout  │
//!     │ rich classification  │     │ coarse classification│
//!     └─────────────────────┘     └─────────────────────┘
//! ```
//!
//! The adapters never let backend misbehaviour propagate as an unstructured
//! crash: every outcome maps to a typed error.  Every invocation is logged
//! with its full argument vector, duration and exit classification; the
//! transcribed/generated text itself is logged only at trace level.

pub mod refine;
pub mod runner;
pub mod transcribe;

pub use refine::{RefineError, RefinementAdapter, Refiner};
pub use runner::{ExecError, ExecOutput, Invocation, ProcessRunner};
pub use transcribe::{
    Segment, TranscribeError, Transcriber, TranscriptionAdapter, TranscriptionResult,
};
