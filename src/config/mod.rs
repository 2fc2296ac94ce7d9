//! Configuration: settings persistence, platform paths, user glossary.

pub mod glossary;
pub mod paths;
pub mod settings;

pub use glossary::Glossary;
pub use paths::AppPaths;
pub use settings::{AppConfig, HotkeyConfig, OutputConfig, RefineConfig, RefineMode, SttConfig};
