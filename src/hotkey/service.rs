//! Dedicated OS-thread keyboard listener using `rdev::listen`.
//!
//! `rdev::listen` is a blocking call that must live on its own OS thread —
//! it cannot run inside a tokio task.  [`HotkeyService::register`] spawns
//! that thread, wires a [`ChordTracker`] into the callback, and forwards
//! the tracker's [`ChordEvent`]s over a `tokio::sync::mpsc` channel.
//!
//! The callback path only mutates the tracker's key set and enqueues events
//! with `blocking_send`; it performs no other work and never blocks on the
//! pipeline.
//!
//! # Shutdown caveat
//!
//! `rdev::listen` has no graceful shutdown API.  Dropping the service sets a
//! stop flag so the callback silently discards further events; the OS thread
//! itself remains blocked in the rdev event loop until the process exits,
//! holding no resources that need cleanup.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use tokio::sync::mpsc;

use super::{Chord, ChordEvent, ChordTracker, HotkeyError};

// ---------------------------------------------------------------------------
// HotkeyService
// ---------------------------------------------------------------------------

/// Handle to a running chord listener thread.
///
/// Construct with [`HotkeyService::register`].  Drop it to stop forwarding
/// events.
pub struct HotkeyService {
    /// Shared stop flag — set `true` on [`Drop`].
    stop: Arc<AtomicBool>,
    /// Kept so the thread is not detached prematurely; never joined because
    /// `rdev::listen` never returns.
    _thread: std::thread::JoinHandle<()>,
}

impl HotkeyService {
    /// Register `chord` and spawn the listener thread feeding `tx`.
    ///
    /// Errors here (including a chord owned by another application) are
    /// non-fatal for the caller: the daemon runs without an active chord and
    /// surfaces one warning to the operator.
    pub fn register(chord: Chord, tx: mpsc::Sender<ChordEvent>) -> Result<Self, HotkeyError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        // The rdev callback is Fn, not FnMut, so the tracker state lives
        // behind a mutex.  Contention is nil — only the hook thread touches it.
        let tracker = Mutex::new(ChordTracker::new(chord));

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let result = rdev::listen(move |event| {
                    if stop_clone.load(Ordering::Relaxed) {
                        return;
                    }

                    let emitted = {
                        let mut tracker = tracker.lock().expect("tracker mutex poisoned");
                        match event.event_type {
                            rdev::EventType::KeyPress(k) => tracker.key_pressed(k),
                            rdev::EventType::KeyRelease(k) => tracker.key_released(k),
                            _ => None,
                        }
                    };

                    if let Some(ev) = emitted {
                        // A full channel means the orchestrator is wedged; the
                        // event is dropped rather than blocking the OS hook.
                        if let Err(e) = tx.try_send(ev) {
                            log::warn!("hotkey: dropping {ev:?} ({e})");
                        }
                    }
                });

                if let Err(e) = result {
                    log::error!("hotkey-listener: rdev::listen exited with error: {e:?}");
                }
            })
            .map_err(|e| HotkeyError::Listener(e.to_string()))?;

        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for HotkeyService {
    /// Set the stop flag so the rdev callback stops forwarding events.
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
