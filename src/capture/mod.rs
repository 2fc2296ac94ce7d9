//! Capture collaborator contract.
//!
//! The actual recorder lives outside the core: the pipeline only needs a
//! [`CaptureDevice`] that starts on chord press and, on release, finalises
//! into an [`AudioArtifact`] — a WAV file on disk plus its duration.
//!
//! The core's responsibility here is the *contract*: artifact validation
//! ([`validate_artifact`]) rejects files that are missing, are not RIFF/WAVE,
//! or are too short to contain speech, before any backend is invoked.
//! [`WavFileCapture`] is a thin adapter over a recorder that drops WAV files
//! at a known path; tests use mock devices.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioArtifact
// ---------------------------------------------------------------------------

/// The captured audio unit handed to the transcription backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    /// WAV file on disk.
    pub path: PathBuf,
    /// Recorded duration as reported by the capture collaborator.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures while starting or finalising a capture.  Terminal for the
/// session.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The capture device could not start recording.
    #[error("cannot start capture: {0}")]
    Start(String),

    /// Finalising the recording failed.
    #[error("cannot finalise capture: {0}")]
    Finalize(String),
}

/// The finalised artifact failed validation.  Terminal for the session.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact missing or unreadable: {0}")]
    Unreadable(String),

    #[error("artifact is not a RIFF/WAVE file: {0}")]
    NotWave(String),

    #[error("artifact too short ({0:?}) to contain speech")]
    TooShort(Duration),
}

// ---------------------------------------------------------------------------
// CaptureDevice trait
// ---------------------------------------------------------------------------

/// Opaque token for an in-progress recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureHandle(pub u64);

/// Async seam over the recorder.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Begin recording.  Called on chord press; must return quickly.
    fn start(&self) -> Result<CaptureHandle, CaptureError>;

    /// Stop recording and finalise the artifact.  Called on chord release.
    async fn finish(&self, handle: CaptureHandle) -> Result<AudioArtifact, CaptureError>;
}

// ---------------------------------------------------------------------------
// Artifact validation
// ---------------------------------------------------------------------------

/// Minimum duration below which an artifact cannot plausibly contain speech.
pub const MIN_ARTIFACT_DURATION: Duration = Duration::from_millis(300);

/// Validate the finalised artifact before invoking the transcription
/// backend: the file must exist, carry a RIFF/WAVE header, and be longer
/// than [`MIN_ARTIFACT_DURATION`].
pub fn validate_artifact(artifact: &AudioArtifact) -> Result<(), ArtifactError> {
    let header = std::fs::read(&artifact.path)
        .map_err(|e| ArtifactError::Unreadable(format!("{}: {e}", artifact.path.display())))?;

    // 12-byte RIFF chunk descriptor: "RIFF" <size> "WAVE".
    if header.len() < 12 || &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        return Err(ArtifactError::NotWave(artifact.path.display().to_string()));
    }

    if artifact.duration < MIN_ARTIFACT_DURATION {
        return Err(ArtifactError::TooShort(artifact.duration));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// WavFileCapture
// ---------------------------------------------------------------------------

/// Adapter over an external recorder that drops a WAV file at a fixed path
/// per session (e.g. a PipeWire/SoX wrapper script managed outside the
/// core).  `start` is a no-op — recording is driven externally and the
/// orchestrator's single-flight guard already serialises sessions; `finish`
/// stats the file and derives the duration from the data-chunk size.
pub struct WavFileCapture {
    path: PathBuf,
    /// Bytes per second of audio, from the recorder's fixed format
    /// (e.g. 32 000 for 16 kHz mono s16le).
    byte_rate: u32,
}

impl WavFileCapture {
    pub fn new(path: PathBuf, byte_rate: u32) -> Self {
        Self { path, byte_rate }
    }
}

#[async_trait]
impl CaptureDevice for WavFileCapture {
    fn start(&self) -> Result<CaptureHandle, CaptureError> {
        // Recording is driven externally; nothing to arm here.
        Ok(CaptureHandle(0))
    }

    async fn finish(&self, _handle: CaptureHandle) -> Result<AudioArtifact, CaptureError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| CaptureError::Finalize(format!("{}: {e}", self.path.display())))?;

        let data_bytes = meta.len().saturating_sub(44); // canonical WAV header
        let duration = Duration::from_secs_f64(data_bytes as f64 / self.byte_rate.max(1) as f64);

        Ok(AudioArtifact {
            path: self.path.clone(),
            duration,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
