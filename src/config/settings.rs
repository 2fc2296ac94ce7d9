//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Push-to-talk chord binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Chord string, modifiers joined with `+` and the main key last
    /// (e.g. `"Ctrl+Alt+Space"` or just `"F9"`).
    pub chord: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            chord: "Ctrl+Alt+Space".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the external transcription backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Path to the transcription executable.
    pub backend: PathBuf,
    /// Path to the acoustic model file passed as `--model`.
    pub model: PathBuf,
    /// Primary speech language as an ISO-639-1 code, or `"auto"` for the
    /// backend's built-in language detection.
    pub language: String,
    /// Maximum seconds the backend may run before it is killed.
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: PathBuf::from("whisper-cli"),
            model: PathBuf::from("ggml-base.bin"),
            language: "en".into(),
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// RefineMode
// ---------------------------------------------------------------------------

/// Output format requested from the refinement backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefineMode {
    /// Plain prose, punctuation and casing fixed.
    Plain,
    /// Markdown formatting (lists, headings) where the dictation implies it.
    Markdown,
}

impl Default for RefineMode {
    fn default() -> Self {
        Self::Plain
    }
}

// ---------------------------------------------------------------------------
// RefineConfig
// ---------------------------------------------------------------------------

/// Settings for the optional language-model refinement step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Whether refinement runs at all.  Disabled means the raw transcript is
    /// delivered as-is.
    pub enabled: bool,
    /// Path to the refinement executable.
    pub backend: PathBuf,
    /// Path to the language-model file passed as `--model`.
    pub model: PathBuf,
    /// System prompt sent to the backend.
    pub system_prompt: String,
    /// Requested output format.
    pub mode: RefineMode,
    /// Attempt GPU-accelerated inference first.
    pub use_gpu: bool,
    /// stderr signatures that identify a GPU out-of-memory failure and
    /// trigger the single CPU-fallback retry.  Kept in configuration because
    /// the exact wording varies between backend versions.
    pub gpu_oom_patterns: Vec<String>,
    /// Maximum seconds the backend may run before it is killed.
    pub timeout_secs: u64,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: PathBuf::from("llama-cli"),
            model: PathBuf::from("model.gguf"),
            system_prompt: "Fix punctuation, casing and obvious transcription \
                            errors. Output only the corrected text."
                .into(),
            mode: RefineMode::default(),
            use_gpu: true,
            gpu_oom_patterns: vec![
                "out of memory".into(),
                "CUDA error".into(),
                "cudaMalloc failed".into(),
            ],
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

/// Settings for the clipboard and history outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// History directory override — `None` means the platform data dir.
    pub history_dir: Option<PathBuf>,
    /// Milliseconds to wait before the single clipboard retry.
    pub clipboard_retry_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            history_dir: None,
            clipboard_retry_ms: 150,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use hotkey_dictate::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Push-to-talk chord binding.
    pub hotkey: HotkeyConfig,
    /// Transcription backend settings.
    pub stt: SttConfig,
    /// Refinement backend settings.
    pub refine: RefineConfig,
    /// Clipboard / history output settings.
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
