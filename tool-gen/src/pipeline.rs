//! The generate, validate and publish loop.
//!
//! A session moves through a small state machine:
//!
//! ```text
//! WriteCode ──► TestAndSave ──► Succeeded
//!     ▲              │
//!     └── retry ─────┤
//!                    └──► Failed (retries exhausted)
//! ```
//!
//! Retries are bounded by `max_retries`; every failed attempt's reason is
//! fed into the next prompt.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use toolsmith_registry::DEFAULT_UNIT_EXTENSION;
use tracing::{error, info, warn};

use crate::error::{GenerationError, Result};
use crate::llm::TextGenerator;
use crate::naming::NameSynthesizer;
use crate::prompt::{code_prompt, extract_code};
use crate::sandbox::{SandboxRunner, Trial, Validation};
use crate::session::{SessionStatus, SynthesisSession};

/// Default bound on attempts per session.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// States of a synthesis session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Generate the next candidate.
    WriteCode,

    /// Validate the latest candidate and publish it if it passes.
    TestAndSave,

    /// A candidate was published.
    Succeeded,

    /// The session gave up.
    Failed,
}

impl PipelineState {
    /// Whether the state ends the session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Produces new tools from natural-language requests.
pub struct CodeSynthesisPipeline {
    /// Source of names and candidates.
    generator: Arc<dyn TextGenerator>,

    /// Name derivation.
    names: NameSynthesizer,

    /// Candidate validation.
    sandbox: SandboxRunner,

    /// Where validated tools are published.
    hot_dir: PathBuf,

    /// Extension of published units.
    extension: String,

    /// Maximum attempts per session.
    max_retries: usize,
}

impl CodeSynthesisPipeline {
    /// Create a pipeline publishing into `hot_dir` and validating under
    /// `sandbox_dir`.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        hot_dir: impl Into<PathBuf>,
        sandbox_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            names: NameSynthesizer::new(Arc::clone(&generator)),
            generator,
            sandbox: SandboxRunner::new(sandbox_dir),
            hot_dir: hot_dir.into(),
            extension: DEFAULT_UNIT_EXTENSION.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set the maximum number of attempts. At least one attempt is always
    /// made.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the unit extension used for candidates and published files.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.sandbox = self.sandbox.with_extension(extension.clone());
        self.extension = extension;
        self
    }

    /// Directory validated tools are written to.
    pub fn hot_dir(&self) -> &Path {
        &self.hot_dir
    }

    /// Maximum attempts per session.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Run a session to completion and return its transcript.
    pub async fn synthesize(&self, request: &str) -> String {
        self.run(request).await.report()
    }

    /// Run a session to completion.
    pub async fn run(&self, request: &str) -> SynthesisSession {
        let mut session = SynthesisSession::new(request, self.max_retries);
        info!("Synthesizing a tool for: {request}");

        if !self.generator.is_available() {
            let reason = format!("text generator `{}` is not configured", self.generator.name());
            warn!("Synthesis unavailable: {reason}");
            session.mark_unavailable(reason);
            return session;
        }

        let mut state = PipelineState::WriteCode;
        while !state.is_terminal() {
            state = match state {
                PipelineState::WriteCode => self.write_code(&mut session).await,
                PipelineState::TestAndSave => self.test_and_save(&mut session).await,
                PipelineState::Succeeded | PipelineState::Failed => state,
            };
        }

        session
    }

    async fn write_code(&self, session: &mut SynthesisSession) -> PipelineState {
        let name = match &session.name {
            Some(name) => name.clone(),
            None => {
                let name = self.names.synthesize(&session.request).await;
                info!("Tool will be named `{name}`");
                session.name = Some(name.clone());
                name
            }
        };

        let index = session.attempts.len() + 1;
        info!("Writing `{name}` (attempt {index}/{})", session.max_retries);
        let prompt = code_prompt(&name, &session.request, session.last_failure());

        match self.generator.generate(prompt).await {
            Ok(response) => {
                session.begin_attempt(extract_code(&response));
                PipelineState::TestAndSave
            }
            Err(e) => {
                let reason = format!("Text generation failed: {e}");
                warn!("Attempt {index} for `{name}`: {reason}");
                let attempt = session.begin_attempt(String::new());
                attempt.message = format!("Attempt {index}: {reason}");
                attempt.validation = Some(Validation::Invalid(reason));
                Self::after_failure(session)
            }
        }
    }

    async fn test_and_save(&self, session: &mut SynthesisSession) -> PipelineState {
        let (Some(name), Some(source)) = (
            session.name.clone(),
            session.attempts.last().map(|a| a.candidate_source.clone()),
        ) else {
            return PipelineState::Failed;
        };
        let index = session.attempts.len();

        let sandbox = self.sandbox.clone();
        let candidate = source.clone();
        let expected = name.clone();
        let trial = tokio::task::spawn_blocking(move || sandbox.trial(&candidate, &expected))
            .await
            .unwrap_or_else(|e| Trial {
                validation: Validation::Invalid(format!("sandbox task failed: {e}")),
                registered: false,
            });

        if let Validation::Invalid(reason) = trial.validation {
            warn!("Attempt {index} for `{name}` failed validation: {reason}");
            if let Some(attempt) = session.current_attempt() {
                attempt.message =
                    format!("Attempt {index}: candidate for `{name}` failed validation: {reason}");
                attempt.validation = Some(Validation::Invalid(reason));
            }
            return Self::after_failure(session);
        }

        let message = if trial.registered {
            format!("Attempt {index}: candidate for `{name}` passed validation.")
        } else {
            warn!("Candidate for `{name}` never calls `register_tool(\"{name}\", ...)`");
            format!(
                "Attempt {index}: candidate for `{name}` passed validation, but it is defined \
                 without `register_tool(\"{name}\", ...)` and will not appear as a tool."
            )
        };
        if let Some(attempt) = session.current_attempt() {
            attempt.message = message;
            attempt.validation = Some(Validation::Valid);
        }

        let hot_dir = self.hot_dir.clone();
        let extension = self.extension.clone();
        let target = name.clone();
        let published =
            tokio::task::spawn_blocking(move || publish(&hot_dir, &target, &extension, &source))
                .await
                .unwrap_or_else(|e| {
                    Err(GenerationError::Io(std::io::Error::other(e.to_string())))
                });

        match published {
            Ok(path) => {
                info!("Published `{name}` to {}", path.display());
                session.status = SessionStatus::Published { name, path };
                PipelineState::Succeeded
            }
            Err(e) => {
                error!("Failed to publish `{name}`: {e}");
                session.status = SessionStatus::PublishFailed {
                    name,
                    reason: e.to_string(),
                };
                PipelineState::Failed
            }
        }
    }

    fn after_failure(session: &mut SynthesisSession) -> PipelineState {
        if session.has_retries_left() {
            return PipelineState::WriteCode;
        }

        warn!(
            "Giving up on `{}` after {} attempts",
            session.name.as_deref().unwrap_or_default(),
            session.attempts.len()
        );
        session.status = SessionStatus::Exhausted;
        PipelineState::Failed
    }
}

/// Write `source` to `<hot_dir>/<name>.<extension>`.
///
/// The file is staged under a hidden name and renamed into place, so a
/// watcher never sees a partially written unit.
pub fn publish(hot_dir: &Path, name: &str, extension: &str, source: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(hot_dir)?;
    let target = hot_dir.join(format!("{name}.{extension}"));

    let mut staged = tempfile::Builder::new()
        .prefix(".publish_")
        .tempfile_in(hot_dir)?;
    staged.write_all(source.as_bytes())?;
    staged.flush()?;
    staged.persist(&target).map_err(|e| GenerationError::Publish {
        path: target.clone(),
        message: e.error.to_string(),
    })?;

    Ok(target)
}
