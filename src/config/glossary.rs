//! User glossary for refinement prompts.
//!
//! [`Glossary`] is a flat `term -> preferred spelling` map persisted as JSON
//! in the platform-appropriate config directory:
//!
//! | Platform | Path |
//! |----------|------|
//! | Windows  | `%APPDATA%\hotkey-dictate\glossary.json` |
//! | macOS    | `~/Library/Application Support/hotkey-dictate/glossary.json` |
//! | Linux    | `~/.config/hotkey-dictate/glossary.json` |
//!
//! The glossary is loaded once at startup and read-only afterwards, so it is
//! shared across the pipeline as a plain `Arc<Glossary>` without locking.

use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Glossary
// ---------------------------------------------------------------------------

/// Read-only map of domain terms fed to the refinement backend so it spells
/// names, acronyms and jargon the way the user wants.
#[derive(Debug, Clone, Default)]
pub struct Glossary {
    terms: BTreeMap<String, String>,
}

impl Glossary {
    /// Load the glossary from `path`, or return an empty glossary when the
    /// file does not exist yet.  A malformed file is treated as empty with a
    /// warning rather than failing startup.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let data = std::fs::read_to_string(path).unwrap_or_default();
        match serde_json::from_str::<BTreeMap<String, String>>(&data) {
            Ok(terms) => Self { terms },
            Err(e) => {
                log::warn!(
                    "glossary: ignoring malformed {} ({e})",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Build a glossary directly from pairs (useful for tests).
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self {
            terms: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Total number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Returns `true` when there are no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Render the glossary as a prompt fragment, one `spoken -> written`
    /// line per term, or `None` when empty.
    pub fn prompt_section(&self) -> Option<String> {
        if self.terms.is_empty() {
            return None;
        }
        let mut out = String::from("Preferred spellings:\n");
        for (term, preferred) in &self.terms {
            out.push_str(term);
            out.push_str(" -> ");
            out.push_str(preferred);
            out.push('\n');
        }
        Some(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
