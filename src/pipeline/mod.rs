//! Pipeline orchestration: the conductor that turns chord events into
//! completed dictation sessions.

pub mod orchestrator;

pub use orchestrator::{PipelineOptions, PipelineOrchestrator, PipelineOutcome};
