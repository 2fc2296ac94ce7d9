//! Application entry point — hotkey-dictate.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run) and the
//!    glossary.
//! 3. Build the subprocess adapters and output sinks from config.
//! 4. Spawn the pipeline orchestrator on the tokio runtime.
//! 5. Register the push-to-talk chord (warn and keep running on failure so
//!    a broken binding is fixable without the process dying).
//! 6. Park on Ctrl-C.

use std::sync::Arc;

use tokio::sync::mpsc;

use hotkey_dictate::{
    capture::WavFileCapture,
    config::{AppConfig, AppPaths, Glossary},
    exec::{Refiner, RefinementAdapter, TranscriptionAdapter},
    hotkey::{parse_chord, ChordEvent, HotkeyService},
    notify::LogNotifier,
    output::{FileHistory, SystemClipboard},
    pipeline::{PipelineOptions, PipelineOrchestrator},
    session::SessionStateMachine,
};

/// Bytes per second of the recorder's fixed format (16 kHz mono s16le).
const CAPTURE_BYTE_RATE: u32 = 32_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("hotkey-dictate starting up");

    // 2. Configuration + glossary
    let paths = AppPaths::new();
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    let glossary = Arc::new(Glossary::load_from(&paths.glossary_file));
    if !glossary.is_empty() {
        log::info!("Glossary loaded: {} terms", glossary.len());
    }

    // 3. Adapters and sinks
    let capture = Arc::new(WavFileCapture::new(
        std::env::temp_dir().join("hotkey-dictate-capture.wav"),
        CAPTURE_BYTE_RATE,
    ));
    let transcriber = Arc::new(TranscriptionAdapter::new(config.stt.clone()));
    let refiner: Option<Arc<dyn Refiner>> = if config.refine.enabled {
        Some(Arc::new(RefinementAdapter::new(
            config.refine.clone(),
            Arc::clone(&glossary),
        )))
    } else {
        log::info!("Refinement disabled; raw transcripts will be delivered");
        None
    };
    let history_dir = config
        .output
        .history_dir
        .clone()
        .unwrap_or_else(|| paths.history_dir.clone());
    let history = Arc::new(FileHistory::new(history_dir));
    let clipboard = Arc::new(SystemClipboard::new());
    let notifier = Arc::new(LogNotifier::new());

    let session = SessionStateMachine::new();
    session.subscribe(|t| log::debug!("session: {:?} -> {:?} on {:?}", t.from, t.to, t.trigger));

    let opts = PipelineOptions {
        clipboard_retry: std::time::Duration::from_millis(config.output.clipboard_retry_ms),
        stt_model_label: config.stt.model.display().to_string(),
    };

    // 4. Orchestrator
    let (event_tx, event_rx) = mpsc::channel::<ChordEvent>(16);
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        session, capture, transcriber, refiner, clipboard, history, notifier, opts,
    ));
    let _pipeline = tokio::spawn(Arc::clone(&orchestrator).run(event_rx));

    // 5. Hotkey registration.  The service owns the OS hook thread; we keep
    //    our own sender alive so the orchestrator loop survives a failed
    //    registration.
    let _hotkey = match parse_chord(&config.hotkey.chord) {
        Ok(chord) => match HotkeyService::register(chord, event_tx.clone()) {
            Ok(service) => {
                log::info!("Push-to-talk chord registered: {}", config.hotkey.chord);
                Some(service)
            }
            Err(e) => {
                log::warn!("Hotkey registration failed ({e}); dictation unavailable");
                None
            }
        },
        Err(e) => {
            log::warn!("Invalid chord {:?} ({e}); dictation unavailable", config.hotkey.chord);
            None
        }
    };

    // 6. Park until Ctrl-C.  The OS hook thread cannot be joined, so exit
    //    ends the process once the signal arrives.
    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");

    Ok(())
}
