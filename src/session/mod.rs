//! Session state machine — the single source of truth for pipeline phase.
//!
//! The dictation session cycles through four states:
//!
//! ```text
//! Idle ──Activate──▶ Recording ──Deactivate──▶ Processing ──Completed──▶ Idle
//!                        │                        │    └──Refine──▶ PostProcessing
//!                        │                        └──Failed──▶ Idle      │
//!                        └──CaptureError──▶ Idle        Completed/Failed─┘
//! ```
//!
//! Anything not in the table is rejected with [`InvalidTransition`] and
//! leaves the state unchanged.  An invalid transition indicates a programming
//! defect in the orchestrator, never a runtime condition, so it is logged at
//! error level wherever it surfaces.
//!
//! All mutation happens under one mutex inside [`SessionStateMachine`];
//! [`transition`](SessionStateMachine::transition) is safe from any thread.
//! Subscribers are notified synchronously, in registration order, while the
//! lock is held — callbacks must be quick and must not call back into the
//! machine.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// States of the dictation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Waiting for the push-to-talk chord.
    Idle,
    /// Chord held; the capture collaborator is recording.
    Recording,
    /// Chord released; transcription is running.
    Processing,
    /// Transcription done; the refinement backend is running.  Entered only
    /// when refinement is configured.
    PostProcessing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Recording => write!(f, "Recording"),
            SessionState::Processing => write!(f, "Processing"),
            SessionState::PostProcessing => write!(f, "PostProcessing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Events that drive state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Chord pressed — start recording.
    Activate,
    /// Chord released — begin transcription.
    Deactivate,
    /// Capture failed or produced an unusable artifact.
    CaptureError,
    /// Transcription succeeded and refinement is configured.
    Refine,
    /// The session finished (successfully or via a soft fallback).
    Completed,
    /// A terminal stage error aborted the session.
    Failed,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Activate => write!(f, "Activate"),
            Trigger::Deactivate => write!(f, "Deactivate"),
            Trigger::CaptureError => write!(f, "CaptureError"),
            Trigger::Refine => write!(f, "Refine"),
            Trigger::Completed => write!(f, "Completed"),
            Trigger::Failed => write!(f, "Failed"),
        }
    }
}

/// The transition table as a total function: `Some(next)` when `trigger` is
/// valid in `from`, `None` otherwise.
fn next_state(from: SessionState, trigger: Trigger) -> Option<SessionState> {
    use SessionState::*;
    use Trigger::*;
    match (from, trigger) {
        (Idle, Activate) => Some(Recording),
        (Recording, Deactivate) => Some(Processing),
        (Recording, CaptureError) => Some(Idle),
        (Processing, Refine) => Some(PostProcessing),
        (Processing, Completed) => Some(Idle),
        (Processing, Failed) => Some(Idle),
        (PostProcessing, Completed) => Some(Idle),
        (PostProcessing, Failed) => Some(Idle),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Transition record
// ---------------------------------------------------------------------------

/// A recorded state change, passed to subscribers.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub trigger: Trigger,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// InvalidTransition
// ---------------------------------------------------------------------------

/// Rejected state transition.  Indicates an orchestrator bug, not a runtime
/// condition — treat every occurrence as a defect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid session transition: {trigger} while {from}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub trigger: Trigger,
}

// ---------------------------------------------------------------------------
// SessionStateMachine
// ---------------------------------------------------------------------------

type Subscriber = Box<dyn Fn(&Transition) + Send>;

struct Inner {
    state: SessionState,
    last_transition: Option<Transition>,
    subscribers: Vec<Subscriber>,
}

/// Thread-safe session state machine.
///
/// Cheap to clone (`Arc` inside); created once at startup, mutated only by
/// the pipeline orchestrator, destroyed only at shutdown.
#[derive(Clone)]
pub struct SessionStateMachine {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    /// Create a new state machine initialised to `Idle`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                last_transition: None,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> SessionState {
        self.inner.lock().expect("session mutex poisoned").state
    }

    /// Returns a copy of the most recent transition, if any.
    pub fn last_transition(&self) -> Option<Transition> {
        self.inner
            .lock()
            .expect("session mutex poisoned")
            .last_transition
            .clone()
    }

    /// Register a synchronous subscriber, notified on every successful
    /// transition while the machine's lock is held.
    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn(&Transition) + Send + 'static,
    {
        self.inner
            .lock()
            .expect("session mutex poisoned")
            .subscribers
            .push(Box::new(f));
    }

    /// Apply `trigger` to the current state.
    ///
    /// On success records the transition, notifies subscribers in order, and
    /// returns the new state.  On rejection the state is left unchanged and
    /// [`InvalidTransition`] is returned.
    pub fn transition(&self, trigger: Trigger) -> Result<SessionState, InvalidTransition> {
        let mut inner = self.inner.lock().expect("session mutex poisoned");
        let from = inner.state;

        let Some(to) = next_state(from, trigger) else {
            return Err(InvalidTransition { from, trigger });
        };

        log::debug!("session: {from} --{trigger}--> {to}");
        inner.state = to;
        let record = Transition {
            from,
            to,
            trigger,
            at: Utc::now(),
        };
        inner.last_transition = Some(record.clone());
        for sub in &inner.subscribers {
            sub(&record);
        }
        Ok(to)
    }

    /// Force the machine back to `Idle`.
    ///
    /// Error-recovery escape hatch for the orchestrator's terminal guard;
    /// bypasses the table and notifies no subscribers.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("session mutex poisoned");
        if inner.state != SessionState::Idle {
            log::warn!("session: reset to Idle from {}", inner.state);
            inner.state = SessionState::Idle;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn starts_idle() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.current(), SessionState::Idle);
        assert!(sm.last_transition().is_none());
    }

    #[test]
    fn full_cycle_without_refinement() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.transition(Trigger::Activate).unwrap(), SessionState::Recording);
        assert_eq!(sm.transition(Trigger::Deactivate).unwrap(), SessionState::Processing);
        assert_eq!(sm.transition(Trigger::Completed).unwrap(), SessionState::Idle);
    }

    #[test]
    fn full_cycle_with_refinement() {
        let sm = SessionStateMachine::new();
        sm.transition(Trigger::Activate).unwrap();
        sm.transition(Trigger::Deactivate).unwrap();
        assert_eq!(
            sm.transition(Trigger::Refine).unwrap(),
            SessionState::PostProcessing
        );
        assert_eq!(sm.transition(Trigger::Completed).unwrap(), SessionState::Idle);
    }

    #[test]
    fn capture_error_returns_to_idle() {
        let sm = SessionStateMachine::new();
        sm.transition(Trigger::Activate).unwrap();
        assert_eq!(
            sm.transition(Trigger::CaptureError).unwrap(),
            SessionState::Idle
        );
    }

    #[test]
    fn failed_returns_to_idle_from_both_processing_states() {
        let sm = SessionStateMachine::new();
        sm.transition(Trigger::Activate).unwrap();
        sm.transition(Trigger::Deactivate).unwrap();
        assert_eq!(sm.transition(Trigger::Failed).unwrap(), SessionState::Idle);

        sm.transition(Trigger::Activate).unwrap();
        sm.transition(Trigger::Deactivate).unwrap();
        sm.transition(Trigger::Refine).unwrap();
        assert_eq!(sm.transition(Trigger::Failed).unwrap(), SessionState::Idle);
    }

    /// Any transition not in the table is rejected and leaves the state
    /// exactly as it was.
    #[test]
    fn invalid_transitions_leave_state_unchanged() {
        let sm = SessionStateMachine::new();

        // Deactivate while Idle.
        let err = sm.transition(Trigger::Deactivate).unwrap_err();
        assert_eq!(err.from, SessionState::Idle);
        assert_eq!(err.trigger, Trigger::Deactivate);
        assert_eq!(sm.current(), SessionState::Idle);

        // Activate while already Recording.
        sm.transition(Trigger::Activate).unwrap();
        assert!(sm.transition(Trigger::Activate).is_err());
        assert_eq!(sm.current(), SessionState::Recording);

        // Completed while Recording.
        assert!(sm.transition(Trigger::Completed).is_err());
        assert_eq!(sm.current(), SessionState::Recording);

        // Refine while PostProcessing (no double refine).
        sm.transition(Trigger::Deactivate).unwrap();
        sm.transition(Trigger::Refine).unwrap();
        assert!(sm.transition(Trigger::Refine).is_err());
        assert_eq!(sm.current(), SessionState::PostProcessing);
    }

    #[test]
    fn transition_records_from_to_and_trigger() {
        let sm = SessionStateMachine::new();
        sm.transition(Trigger::Activate).unwrap();

        let record = sm.last_transition().expect("record present");
        assert_eq!(record.from, SessionState::Idle);
        assert_eq!(record.to, SessionState::Recording);
        assert_eq!(record.trigger, Trigger::Activate);
        assert!(record.at <= Utc::now());
    }

    #[test]
    fn subscribers_are_notified_synchronously_in_order() {
        let sm = SessionStateMachine::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        sm.subscribe(move |t| {
            assert_eq!(t.to, SessionState::Recording);
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&count);
        sm.subscribe(move |_| {
            // Second subscriber must run after the first.
            assert_eq!(c2.fetch_add(1, Ordering::SeqCst), 1);
        });

        sm.transition(Trigger::Activate).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_transition_notifies_nobody() {
        let sm = SessionStateMachine::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        sm.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sm.transition(Trigger::Completed).is_err());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reset_forces_idle() {
        let sm = SessionStateMachine::new();
        sm.transition(Trigger::Activate).unwrap();
        sm.transition(Trigger::Deactivate).unwrap();
        sm.reset();
        assert_eq!(sm.current(), SessionState::Idle);
    }

    /// Transitions are totally ordered under the mutex: hammering the machine
    /// from many threads never observes a torn state and each thread sees a
    /// coherent accept/reject.
    #[test]
    fn concurrent_transitions_are_serialised() {
        let sm = SessionStateMachine::new();
        let accepted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sm = sm.clone();
                let accepted = Arc::clone(&accepted);
                std::thread::spawn(move || {
                    if sm.transition(Trigger::Activate).is_ok() {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Exactly one Activate can win from Idle.
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(sm.current(), SessionState::Recording);
    }
}
