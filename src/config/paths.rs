//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings + glossary):
//!   Windows: %APPDATA%\hotkey-dictate\
//!   macOS:   ~/Library/Application Support/hotkey-dictate/
//!   Linux:   ~/.config/hotkey-dictate/
//!
//! Data dir (dictation history):
//!   Windows: %LOCALAPPDATA%\hotkey-dictate\
//!   macOS:   ~/Library/Application Support/hotkey-dictate/
//!   Linux:   ~/.local/share/hotkey-dictate/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml` and `glossary.json`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Full path to `glossary.json`.
    pub glossary_file: PathBuf,
    /// Directory where history entries are written, one file per utterance.
    pub history_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "hotkey-dictate";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let glossary_file = config_dir.join("glossary.json");
        let history_dir = data_dir.join("history");

        Self {
            config_dir,
            settings_file,
            glossary_file,
            history_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
