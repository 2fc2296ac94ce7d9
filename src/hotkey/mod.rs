//! Push-to-talk chord handling, backed by `rdev`.
//!
//! Split in two layers:
//!
//! * [`ChordTracker`] (in [`correlator`]) — pure press/release correlation
//!   logic that turns a raw key-state feed into [`ChordEvent`]s.  No OS
//!   dependency, fully unit-testable.
//! * [`HotkeyService`] (in [`service`]) — the dedicated OS thread running
//!   `rdev::listen`, feeding the tracker and forwarding its events over a
//!   `tokio::sync::mpsc` channel.
//!
//! The tracker runs inside the OS keyboard-hook callback and must never
//! block; it only updates its key-state set and enqueues events.

pub mod correlator;
pub mod service;

pub use correlator::ChordTracker;
pub use service::HotkeyService;

use thiserror::Error;

// ---------------------------------------------------------------------------
// ChordEvent
// ---------------------------------------------------------------------------

/// Logical edges derived from the configured chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordEvent {
    /// The full chord went down — start recording.
    Activated,
    /// The chord was broken — stop recording and run the pipeline.
    Deactivated,
}

// ---------------------------------------------------------------------------
// HotkeyError
// ---------------------------------------------------------------------------

/// Errors surfacing from chord parsing or listener registration.
///
/// Registration failure is non-fatal for the application: the daemon keeps
/// running without an active chord and warns the operator once.
#[derive(Debug, Error)]
pub enum HotkeyError {
    /// The chord string could not be parsed.
    #[error("cannot parse chord {0:?}")]
    UnparsableChord(String),

    /// The chord is already owned elsewhere in the OS environment.
    ///
    /// `rdev::listen` observes raw key events and has no registration step
    /// that could detect this; the variant is reserved for hook backends
    /// that can report ownership conflicts.
    #[error("chord already registered by another application: {0}")]
    Conflict(String),

    /// The OS keyboard listener could not be started.
    #[error("cannot start keyboard listener: {0}")]
    Listener(String),
}

// ---------------------------------------------------------------------------
// Chord
// ---------------------------------------------------------------------------

/// A hotkey combination: zero or more modifiers plus one main key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    /// Required modifier keys, in the order they appear in the config string.
    pub modifiers: Vec<rdev::Key>,
    /// The main (non-modifier) key.
    pub key: rdev::Key,
}

/// Parse a chord from a config string such as `"Ctrl+Alt+Space"` or `"F9"`.
///
/// Modifiers come first, joined with `+`; the last token is the main key.
/// The left-hand variant is used for each modifier (`Ctrl` means
/// `ControlLeft`, and so on).
///
/// # Examples
///
/// ```
/// use hotkey_dictate::hotkey::parse_chord;
///
/// let chord = parse_chord("Ctrl+Alt+Space").unwrap();
/// assert_eq!(chord.modifiers, vec![rdev::Key::ControlLeft, rdev::Key::Alt]);
/// assert_eq!(chord.key, rdev::Key::Space);
///
/// assert!(parse_chord("Ctrl+").is_err());
/// ```
pub fn parse_chord(s: &str) -> Result<Chord, HotkeyError> {
    let tokens: Vec<&str> = s.split('+').map(str::trim).collect();
    if tokens.is_empty() || tokens.iter().any(|t| t.is_empty()) {
        return Err(HotkeyError::UnparsableChord(s.into()));
    }

    let (&key_token, modifier_tokens) = tokens
        .split_last()
        .ok_or_else(|| HotkeyError::UnparsableChord(s.into()))?;

    let mut modifiers = Vec::with_capacity(modifier_tokens.len());
    for token in modifier_tokens {
        let m = parse_modifier(token).ok_or_else(|| HotkeyError::UnparsableChord(s.into()))?;
        modifiers.push(m);
    }

    let key = parse_key(key_token).ok_or_else(|| HotkeyError::UnparsableChord(s.into()))?;
    Ok(Chord { modifiers, key })
}

fn parse_modifier(token: &str) -> Option<rdev::Key> {
    match token {
        "Ctrl" | "Control" => Some(rdev::Key::ControlLeft),
        "Shift" => Some(rdev::Key::ShiftLeft),
        "Alt" => Some(rdev::Key::Alt),
        "Super" | "Meta" | "Win" | "Cmd" => Some(rdev::Key::MetaLeft),
        _ => None,
    }
}

/// Parse a main-key name into an [`rdev::Key`].
///
/// Supports F1–F12, common named keys, and single ASCII letters.  Returns
/// `None` for unrecognised names so callers can surface a config error.
pub fn parse_key(key_str: &str) -> Option<rdev::Key> {
    match key_str {
        // Function keys
        "F1" => Some(rdev::Key::F1),
        "F2" => Some(rdev::Key::F2),
        "F3" => Some(rdev::Key::F3),
        "F4" => Some(rdev::Key::F4),
        "F5" => Some(rdev::Key::F5),
        "F6" => Some(rdev::Key::F6),
        "F7" => Some(rdev::Key::F7),
        "F8" => Some(rdev::Key::F8),
        "F9" => Some(rdev::Key::F9),
        "F10" => Some(rdev::Key::F10),
        "F11" => Some(rdev::Key::F11),
        "F12" => Some(rdev::Key::F12),

        // Navigation / control
        "Escape" | "Esc" => Some(rdev::Key::Escape),
        "Space" => Some(rdev::Key::Space),
        "Return" | "Enter" => Some(rdev::Key::Return),
        "Tab" => Some(rdev::Key::Tab),
        "Backspace" => Some(rdev::Key::Backspace),
        "Delete" | "Del" => Some(rdev::Key::Delete),
        "Home" => Some(rdev::Key::Home),
        "End" => Some(rdev::Key::End),
        "PageUp" => Some(rdev::Key::PageUp),
        "PageDown" => Some(rdev::Key::PageDown),

        // Lock / special
        "CapsLock" => Some(rdev::Key::CapsLock),
        "ScrollLock" => Some(rdev::Key::ScrollLock),
        "Pause" => Some(rdev::Key::Pause),

        other => {
            // Single ASCII letter, case-insensitive.
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => letter_key(c.to_ascii_uppercase()),
                _ => None,
            }
        }
    }
}

fn letter_key(c: char) -> Option<rdev::Key> {
    match c {
        'A' => Some(rdev::Key::KeyA),
        'B' => Some(rdev::Key::KeyB),
        'C' => Some(rdev::Key::KeyC),
        'D' => Some(rdev::Key::KeyD),
        'E' => Some(rdev::Key::KeyE),
        'F' => Some(rdev::Key::KeyF),
        'G' => Some(rdev::Key::KeyG),
        'H' => Some(rdev::Key::KeyH),
        'I' => Some(rdev::Key::KeyI),
        'J' => Some(rdev::Key::KeyJ),
        'K' => Some(rdev::Key::KeyK),
        'L' => Some(rdev::Key::KeyL),
        'M' => Some(rdev::Key::KeyM),
        'N' => Some(rdev::Key::KeyN),
        'O' => Some(rdev::Key::KeyO),
        'P' => Some(rdev::Key::KeyP),
        'Q' => Some(rdev::Key::KeyQ),
        'R' => Some(rdev::Key::KeyR),
        'S' => Some(rdev::Key::KeyS),
        'T' => Some(rdev::Key::KeyT),
        'U' => Some(rdev::Key::KeyU),
        'V' => Some(rdev::Key::KeyV),
        'W' => Some(rdev::Key::KeyW),
        'X' => Some(rdev::Key::KeyX),
        'Y' => Some(rdev::Key::KeyY),
        'Z' => Some(rdev::Key::KeyZ),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
