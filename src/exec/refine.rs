//! Refinement backend adapter.
//!
//! Runs the external language-model executable over the raw transcript.  The
//! user text goes in on stdin; the refined text comes back on stdout after
//! engine banner/timing lines are stripped.
//!
//! Classification is deliberately coarse — Success, Timeout, or Error — and
//! every refinement failure is recoverable: the orchestrator falls back to
//! the raw transcript rather than aborting the session.
//!
//! # GPU fallback
//!
//! When a failing run's stderr matches one of the *configured* out-of-memory
//! patterns (`RefineConfig::gpu_oom_patterns`), the adapter retries exactly
//! once with GPU acceleration disabled.  This is the only automatic retry in
//! the whole system; every other failure surfaces immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Glossary, RefineConfig, RefineMode};

use super::runner::{ExecError, Invocation, ProcessRunner};

// ---------------------------------------------------------------------------
// RefineError
// ---------------------------------------------------------------------------

/// Classified refinement failures.  None of these abort the pipeline.
#[derive(Debug, Error)]
pub enum RefineError {
    /// The backend exceeded its wall-clock budget and was killed.
    #[error("refinement timed out after {0:?}")]
    Timeout(Duration),

    /// Nothing remained on stdout after preamble stripping.
    #[error("refinement produced no output")]
    EmptyOutput,

    /// Any other backend failure (non-zero exit, spawn failure, ...).
    #[error("refinement backend failed (exit {code:?}): {message}")]
    Backend { code: Option<i32>, message: String },
}

// ---------------------------------------------------------------------------
// Refiner trait
// ---------------------------------------------------------------------------

/// Async seam over the refinement backend so the orchestrator can be tested
/// with in-process mocks.
#[async_trait]
pub trait Refiner: Send + Sync {
    async fn refine(&self, text: &str) -> Result<String, RefineError>;
}

// ---------------------------------------------------------------------------
// RefinementAdapter
// ---------------------------------------------------------------------------

/// Subprocess-backed [`Refiner`].
pub struct RefinementAdapter {
    config: RefineConfig,
    /// Read-only after startup; appended to the system prompt.
    glossary: Arc<Glossary>,
    runner: ProcessRunner,
}

impl RefinementAdapter {
    pub fn new(config: RefineConfig, glossary: Arc<Glossary>) -> Self {
        Self {
            config,
            glossary,
            runner: ProcessRunner::new(),
        }
    }

    fn system_prompt(&self) -> String {
        match self.glossary.prompt_section() {
            Some(section) => format!("{}\n\n{}", self.config.system_prompt, section),
            None => self.config.system_prompt.clone(),
        }
    }

    fn invocation(&self, text: &str, gpu: bool) -> Invocation {
        let mut args = vec![
            "--model".into(),
            self.config.model.display().to_string(),
            "--system-prompt".into(),
            self.system_prompt(),
        ];
        if self.config.mode == RefineMode::Markdown {
            args.push("--markdown".into());
        }
        if gpu {
            args.push("--gpu".into());
        }

        Invocation {
            program: self.config.backend.clone(),
            args,
            stdin: Some(text.to_string()),
            timeout: Duration::from_secs(self.config.timeout_secs),
        }
    }

    /// Single invocation attempt; `gpu` selects the acceleration flag.
    async fn attempt(&self, text: &str, gpu: bool) -> Result<String, RefineError> {
        let inv = self.invocation(text, gpu);
        log::info!(
            "refine: invoking {} (gpu={gpu}, {} chars in)",
            inv.program.display(),
            text.len()
        );

        let output = match self.runner.run(&inv).await {
            Ok(output) => output,
            Err(ExecError::Timeout { .. }) => return Err(RefineError::Timeout(inv.timeout)),
            Err(e) => {
                return Err(RefineError::Backend {
                    code: None,
                    message: e.to_string(),
                })
            }
        };

        if !output.success() {
            return Err(RefineError::Backend {
                code: output.code,
                message: output.stderr.trim().to_string(),
            });
        }

        let refined = strip_preamble(&output.stdout);
        if refined.is_empty() {
            return Err(RefineError::EmptyOutput);
        }

        log::debug!("refine: classified Success in {:?}", output.elapsed);
        log::trace!("refine: text = {refined:?}");
        Ok(refined)
    }

    fn is_gpu_oom(&self, err: &RefineError) -> bool {
        let RefineError::Backend { message, .. } = err else {
            return false;
        };
        let lower = message.to_lowercase();
        self.config
            .gpu_oom_patterns
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
    }
}

#[async_trait]
impl Refiner for RefinementAdapter {
    async fn refine(&self, text: &str) -> Result<String, RefineError> {
        match self.attempt(text, self.config.use_gpu).await {
            Err(err) if self.config.use_gpu && self.is_gpu_oom(&err) => {
                log::warn!("refine: GPU out of memory ({err}), retrying once on CPU");
                self.attempt(text, false).await
            }
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Preamble stripping
// ---------------------------------------------------------------------------

/// Line prefixes the known engines print before (and after) the actual
/// completion: loader banners, system info, sampling and timing summaries.
const PREAMBLE_PREFIXES: &[&str] = &[
    "llama_",
    "ggml_",
    "llm_load",
    "main:",
    "system_info:",
    "sampling:",
    "build:",
    "load time",
    "total time",
];

/// Drop known non-content lines from backend stdout and trim the rest.
pub fn strip_preamble(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !PREAMBLE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
