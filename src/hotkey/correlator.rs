//! Press/release correlation for one configured chord.
//!
//! [`ChordTracker`] is fed every raw key press/release the OS hook reports
//! and derives the two logical edges the pipeline cares about:
//!
//! * `Activated` — exactly once per physical press-and-hold gesture, when
//!   the main key goes down while every required modifier is held.  OS
//!   key-repeat (the same key reported down again while already held) is
//!   filtered via the pressed-key set.
//! * `Deactivated` — exactly once per gesture, when the main key **or** any
//!   required modifier is released, whichever happens first.  Releasing a
//!   modifier early therefore ends the gesture even while the main key is
//!   still held; this is the documented heuristic, kept deliberately (see
//!   the early-release tests below).
//!
//! `Deactivated` never fires without a preceding `Activated` and never fires
//! twice for one gesture — the `armed` flag guarantees idempotence.
//!
//! The tracker is pure state, no I/O: it is called from the low-latency
//! keyboard-hook callback and must never block.

use std::collections::HashSet;

use super::{Chord, ChordEvent};

// ---------------------------------------------------------------------------
// ChordTracker
// ---------------------------------------------------------------------------

/// Correlates raw key edges into [`ChordEvent`]s for one chord.
#[derive(Debug)]
pub struct ChordTracker {
    chord: Chord,
    /// Keys currently held, as reported by the hook.  Used both to check
    /// modifier state and to filter key-repeat.
    down: HashSet<rdev::Key>,
    /// `true` between `Activated` and `Deactivated`.
    armed: bool,
}

impl ChordTracker {
    pub fn new(chord: Chord) -> Self {
        Self {
            chord,
            down: HashSet::new(),
            armed: false,
        }
    }

    /// Feed one raw key press.  Returns `Some(Activated)` when this press
    /// completes the chord.
    pub fn key_pressed(&mut self, key: rdev::Key) -> Option<ChordEvent> {
        // OS key-repeat reports the held key down again; the set insert
        // returning false identifies and drops those.
        if !self.down.insert(key) {
            return None;
        }

        if !self.armed && key == self.chord.key && self.modifiers_held() {
            self.armed = true;
            return Some(ChordEvent::Activated);
        }
        None
    }

    /// Feed one raw key release.  Returns `Some(Deactivated)` when this
    /// release breaks an armed chord.
    pub fn key_released(&mut self, key: rdev::Key) -> Option<ChordEvent> {
        self.down.remove(&key);

        if self.armed && (key == self.chord.key || self.chord.modifiers.contains(&key)) {
            self.armed = false;
            return Some(ChordEvent::Deactivated);
        }
        None
    }

    /// `true` while a gesture is in progress.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    fn modifiers_held(&self) -> bool {
        self.chord.modifiers.iter().all(|m| self.down.contains(m))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::parse_chord;
    use rdev::Key;

    fn tracker(chord: &str) -> ChordTracker {
        ChordTracker::new(parse_chord(chord).unwrap())
    }

    #[test]
    fn simple_press_and_release() {
        let mut t = tracker("F9");
        assert_eq!(t.key_pressed(Key::F9), Some(ChordEvent::Activated));
        assert!(t.is_armed());
        assert_eq!(t.key_released(Key::F9), Some(ChordEvent::Deactivated));
        assert!(!t.is_armed());
    }

    #[test]
    fn chord_requires_all_modifiers() {
        let mut t = tracker("Ctrl+Alt+Space");

        // Space without modifiers: nothing.
        assert_eq!(t.key_pressed(Key::Space), None);
        assert_eq!(t.key_released(Key::Space), None);

        // Only one modifier held: still nothing.
        assert_eq!(t.key_pressed(Key::ControlLeft), None);
        assert_eq!(t.key_pressed(Key::Space), None);
        assert_eq!(t.key_released(Key::Space), None);

        // Both modifiers held: activates.
        assert_eq!(t.key_pressed(Key::Alt), None);
        assert_eq!(t.key_pressed(Key::Space), Some(ChordEvent::Activated));
    }

    /// OS key-repeat delivers the held key down over and over; only the
    /// first edge may activate.
    #[test]
    fn key_repeat_is_filtered() {
        let mut t = tracker("F9");
        assert_eq!(t.key_pressed(Key::F9), Some(ChordEvent::Activated));
        for _ in 0..10 {
            assert_eq!(t.key_pressed(Key::F9), None);
        }
        assert_eq!(t.key_released(Key::F9), Some(ChordEvent::Deactivated));
    }

    #[test]
    fn exactly_one_activate_deactivate_pair_per_gesture() {
        let mut t = tracker("Ctrl+D");
        let mut events = Vec::new();

        for ev in [
            t.key_pressed(Key::ControlLeft),
            t.key_pressed(Key::KeyD),
            t.key_pressed(Key::KeyD), // repeat
            t.key_released(Key::KeyD),
            t.key_released(Key::ControlLeft),
        ]
        .into_iter()
        .flatten()
        {
            events.push(ev);
        }

        assert_eq!(events, vec![ChordEvent::Activated, ChordEvent::Deactivated]);
    }

    /// The documented heuristic: releasing a required modifier before the
    /// main key ends the gesture early.
    #[test]
    fn deactivates_when_first_modifier_released_early() {
        let mut t = tracker("Ctrl+Alt+Space");
        t.key_pressed(Key::ControlLeft);
        t.key_pressed(Key::Alt);
        assert_eq!(t.key_pressed(Key::Space), Some(ChordEvent::Activated));

        // Fingers leave Ctrl while Space is still held.
        assert_eq!(
            t.key_released(Key::ControlLeft),
            Some(ChordEvent::Deactivated)
        );

        // The lagging releases produce no further events.
        assert_eq!(t.key_released(Key::Alt), None);
        assert_eq!(t.key_released(Key::Space), None);
    }

    #[test]
    fn deactivate_never_fires_unarmed() {
        let mut t = tracker("Ctrl+Space");
        // Releases with no preceding activation.
        assert_eq!(t.key_released(Key::Space), None);
        assert_eq!(t.key_released(Key::ControlLeft), None);
    }

    #[test]
    fn deactivate_never_fires_twice() {
        let mut t = tracker("Ctrl+Space");
        t.key_pressed(Key::ControlLeft);
        assert_eq!(t.key_pressed(Key::Space), Some(ChordEvent::Activated));

        assert_eq!(t.key_released(Key::Space), Some(ChordEvent::Deactivated));
        // Modifier release after the gesture already ended: nothing.
        assert_eq!(t.key_released(Key::ControlLeft), None);
    }

    #[test]
    fn gesture_can_repeat_after_full_release() {
        let mut t = tracker("Ctrl+Space");
        for _ in 0..3 {
            t.key_pressed(Key::ControlLeft);
            assert_eq!(t.key_pressed(Key::Space), Some(ChordEvent::Activated));
            assert_eq!(t.key_released(Key::Space), Some(ChordEvent::Deactivated));
            t.key_released(Key::ControlLeft);
        }
    }

    /// Unrelated keys never disturb an armed gesture.
    #[test]
    fn unrelated_keys_are_ignored() {
        let mut t = tracker("Ctrl+Space");
        t.key_pressed(Key::ControlLeft);
        assert_eq!(t.key_pressed(Key::Space), Some(ChordEvent::Activated));

        assert_eq!(t.key_pressed(Key::KeyQ), None);
        assert_eq!(t.key_released(Key::KeyQ), None);
        assert!(t.is_armed());
    }
}
