//! Transcription backend adapter.
//!
//! Runs the external speech-to-text executable against a captured audio
//! artifact and parses its structured JSON payload from a side-channel file
//! (passed as `--output-json`) rather than stdout, which backends pollute
//! with banner and progress noise.
//!
//! # Exit classification
//!
//! The transcription adapter uses a richer table than the refinement one:
//!
//! | Signal | Classification |
//! |---|---|
//! | exit 0 | Success (payload is then parsed) |
//! | stderr mentions a model that failed to load | `ModelNotFound` |
//! | stderr mentions CUDA / GPU / device failure | `Device` |
//! | exit 2 or stderr mentions invalid/unsupported input | `InvalidInput` |
//! | runner timeout | `Timeout` |
//! | anything else | `Backend` |

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::capture::AudioArtifact;
use crate::config::SttConfig;

use super::runner::{ExecError, ExecOutput, Invocation, ProcessRunner};

// ---------------------------------------------------------------------------
// TranscriptionResult
// ---------------------------------------------------------------------------

/// Per-segment timing, when the backend provides it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Segment {
    /// Segment start offset in seconds.
    pub start: f64,
    /// Segment end offset in seconds.
    pub end: f64,
    pub text: String,
}

/// Structured transcription output.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    pub text: String,
    /// Detected (or configured) language code.
    pub language: String,
    /// Audio duration in seconds, as reported by the backend.
    pub duration_sec: f64,
    /// Optional per-segment timestamps.
    pub segments: Option<Vec<Segment>>,
}

impl TranscriptionResult {
    /// `true` when no speech was recognised.  The pipeline short-circuits to
    /// Idle on empty results without invoking refinement or outputs.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// TranscribeError
// ---------------------------------------------------------------------------

/// Classified transcription failures.  All are terminal for the session.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// The backend could not load its acoustic model.
    #[error("transcription model not available: {0}")]
    ModelNotFound(String),

    /// GPU / compute-device failure.
    #[error("transcription device error: {0}")]
    Device(String),

    /// The backend exceeded its wall-clock budget and was killed.
    #[error("transcription timed out after {0:?}")]
    Timeout(Duration),

    /// The backend rejected the audio artifact.
    #[error("transcription rejected the input: {0}")]
    InvalidInput(String),

    /// The side-channel payload was missing, unparsable, or lacked a text
    /// field.
    #[error("malformed transcription output: {0}")]
    MalformedOutput(String),

    /// Unclassified backend failure.
    #[error("transcription backend failed (exit {code:?}): {message}")]
    Backend { code: Option<i32>, message: String },
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Async seam over the transcription backend so the orchestrator can be
/// tested with in-process mocks.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, artifact: &AudioArtifact)
        -> Result<TranscriptionResult, TranscribeError>;
}

// ---------------------------------------------------------------------------
// TranscriptionAdapter
// ---------------------------------------------------------------------------

/// Subprocess-backed [`Transcriber`].
pub struct TranscriptionAdapter {
    config: SttConfig,
    runner: ProcessRunner,
}

impl TranscriptionAdapter {
    pub fn new(config: SttConfig) -> Self {
        Self {
            config,
            runner: ProcessRunner::new(),
        }
    }

    fn invocation(&self, artifact: &AudioArtifact) -> Invocation {
        let payload_path = artifact.path.with_extension("json");
        Invocation {
            program: self.config.backend.clone(),
            args: vec![
                "--model".into(),
                self.config.model.display().to_string(),
                "--language".into(),
                self.config.language.clone(),
                "--output-json".into(),
                payload_path.display().to_string(),
                artifact.path.display().to_string(),
            ],
            stdin: None,
            timeout: Duration::from_secs(self.config.timeout_secs),
        }
    }
}

#[async_trait]
impl Transcriber for TranscriptionAdapter {
    async fn transcribe(
        &self,
        artifact: &AudioArtifact,
    ) -> Result<TranscriptionResult, TranscribeError> {
        let inv = self.invocation(artifact);
        log::info!(
            "stt: invoking {} on {} ({:.1}s of audio)",
            inv.program.display(),
            artifact.path.display(),
            artifact.duration.as_secs_f64()
        );

        // The artifact path is stable across sessions, so a payload left by
        // an earlier run must go before the backend starts: a backend that
        // exits 0 without writing one must surface as MalformedOutput, not
        // replay the previous transcript.
        let payload_path = artifact.path.with_extension("json");
        if let Err(e) = tokio::fs::remove_file(&payload_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "stt: cannot clear stale payload {}: {e}",
                    payload_path.display()
                );
            }
        }

        let output = match self.runner.run(&inv).await {
            Ok(output) => output,
            Err(ExecError::Timeout { .. }) => {
                return Err(TranscribeError::Timeout(inv.timeout));
            }
            Err(e) => {
                return Err(TranscribeError::Backend {
                    code: None,
                    message: e.to_string(),
                });
            }
        };

        if !output.success() {
            return Err(classify_failure(&output));
        }

        let raw = tokio::fs::read_to_string(&payload_path).await.map_err(|e| {
            TranscribeError::MalformedOutput(format!(
                "cannot read payload {}: {e}",
                payload_path.display()
            ))
        })?;

        let result = parse_payload(&raw)?;
        log::debug!(
            "stt: classified Success in {:?} (language {}, {:.1}s)",
            output.elapsed,
            result.language,
            result.duration_sec
        );
        log::trace!("stt: text = {:?}", result.text);
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Classification & payload parsing
// ---------------------------------------------------------------------------

/// Map a non-zero exit to a typed error using the stderr signature table.
fn classify_failure(output: &ExecOutput) -> TranscribeError {
    let stderr = output.stderr.to_lowercase();
    let summary = first_stderr_line(&output.stderr);

    if stderr.contains("model") && (stderr.contains("not found") || stderr.contains("failed to load"))
    {
        return TranscribeError::ModelNotFound(summary);
    }
    if stderr.contains("cuda") || stderr.contains("gpu") || stderr.contains("device") {
        return TranscribeError::Device(summary);
    }
    if output.code == Some(2) || stderr.contains("invalid") || stderr.contains("unsupported") {
        return TranscribeError::InvalidInput(summary);
    }
    TranscribeError::Backend {
        code: output.code,
        message: summary,
    }
}

fn first_stderr_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no diagnostic output")
        .to_string()
}

/// Raw side-channel payload; `text` is optional here so its absence maps to
/// a classified error instead of a generic parse failure.
#[derive(Deserialize)]
struct RawPayload {
    text: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration_sec: Option<f64>,
    #[serde(default)]
    segments: Option<Vec<Segment>>,
}

fn parse_payload(raw: &str) -> Result<TranscriptionResult, TranscribeError> {
    let payload: RawPayload = serde_json::from_str(raw)
        .map_err(|e| TranscribeError::MalformedOutput(e.to_string()))?;

    let text = payload
        .text
        .ok_or_else(|| TranscribeError::MalformedOutput("payload lacks a text field".into()))?;

    Ok(TranscriptionResult {
        text,
        language: payload.language.unwrap_or_else(|| "unknown".into()),
        duration_sec: payload.duration_sec.unwrap_or(0.0),
        segments: payload.segments,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
