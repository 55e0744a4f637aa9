//! Synthesis session records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sandbox::Validation;

/// One generate-and-validate cycle.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationAttempt {
    /// 1-based attempt number.
    pub index: usize,

    /// Tool name the attempt was generated for.
    pub requested_name: Option<String>,

    /// Candidate source text.
    pub candidate_source: String,

    /// Validation outcome; `None` until the candidate has been tested.
    pub validation: Option<Validation>,

    /// Human-readable outcome of the attempt.
    pub message: String,

    /// When the attempt started.
    pub started_at: DateTime<Utc>,
}

/// Where a session ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    /// Still generating or validating.
    InProgress,

    /// A validated candidate was written to the hot directory.
    Published { name: String, path: PathBuf },

    /// Every attempt failed validation.
    Exhausted,

    /// The text generator could not be used at all.
    Unavailable { reason: String },

    /// A candidate passed validation but could not be written.
    PublishFailed { name: String, reason: String },
}

impl SessionStatus {
    /// Whether the session has finished.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// The record of one synthesis request.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisSession {
    /// The request as submitted.
    pub request: String,

    /// Tool name, fixed once assigned.
    pub name: Option<String>,

    /// Attempts in order.
    pub attempts: Vec<GenerationAttempt>,

    /// Maximum number of attempts.
    pub max_retries: usize,

    /// Current status.
    pub status: SessionStatus,
}

impl SynthesisSession {
    /// Start a session.
    pub fn new(request: impl Into<String>, max_retries: usize) -> Self {
        Self {
            request: request.into(),
            name: None,
            attempts: Vec::new(),
            max_retries,
            status: SessionStatus::InProgress,
        }
    }

    /// Whether the session has finished.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether another attempt may be made.
    pub fn has_retries_left(&self) -> bool {
        self.attempts.len() < self.max_retries
    }

    /// Failure reason of the most recent attempt, fed back into the next one.
    pub fn last_failure(&self) -> Option<&str> {
        self.attempts
            .last()
            .and_then(|attempt| attempt.validation.as_ref())
            .and_then(Validation::reason)
    }

    /// Start a new attempt and return it.
    pub fn begin_attempt(&mut self, candidate_source: String) -> &mut GenerationAttempt {
        let index = self.attempts.len() + 1;
        self.attempts.push(GenerationAttempt {
            index,
            requested_name: self.name.clone(),
            candidate_source,
            validation: None,
            message: String::new(),
            started_at: Utc::now(),
        });
        let last = self.attempts.len() - 1;
        &mut self.attempts[last]
    }

    /// The attempt currently being worked on.
    pub fn current_attempt(&mut self) -> Option<&mut GenerationAttempt> {
        self.attempts.last_mut()
    }

    /// Finish without any attempts: the generator cannot be used.
    pub fn mark_unavailable(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        let attempt = self.begin_attempt(String::new());
        attempt.validation = Some(Validation::Invalid(reason.clone()));
        attempt.message = format!("Cannot synthesize tools: {reason}");
        self.status = SessionStatus::Unavailable { reason };
    }

    /// Human-readable transcript: every attempt's outcome in order, then the
    /// final status.
    pub fn report(&self) -> String {
        let mut lines: Vec<String> = self
            .attempts
            .iter()
            .map(|attempt| attempt.message.clone())
            .collect();

        match &self.status {
            SessionStatus::InProgress => {}
            SessionStatus::Published { name, path } => lines.push(format!(
                "New tool `{name}` was published to {}; \
                 the hot directory reloads it automatically.",
                path.display()
            )),
            SessionStatus::Exhausted => lines.push(format!(
                "Giving up after {} failed attempts.",
                self.attempts.len()
            )),
            SessionStatus::Unavailable { .. } => {}
            SessionStatus::PublishFailed { name, reason } => lines.push(format!(
                "Tool `{name}` passed validation but was not published: {reason}"
            )),
        }

        lines.join("\n")
    }
}
