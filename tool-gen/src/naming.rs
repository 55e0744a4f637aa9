//! Deriving tool names from free-text requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use toolsmith_registry::is_valid_tool_name;
use tracing::{debug, warn};

use crate::llm::{Prompt, TextGenerator};

/// Prefix of fallback names.
pub const FALLBACK_PREFIX: &str = "generated_";

static LAST_FALLBACK_MICROS: AtomicU64 = AtomicU64::new(0);

const NAMING_INSTRUCTIONS: &str = "You name tools. Reply with one function name for the tool \
described below and nothing else: only lowercase letters, digits and underscores, starting with \
a letter, at most 30 characters, no spaces, and no placeholder words such as test, tmp or demo.";

/// Turns a request into a valid tool name.
#[derive(Clone)]
pub struct NameSynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl NameSynthesizer {
    /// Create a synthesizer backed by `generator`.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Build the naming prompt for a request.
    pub fn prompt(request: &str) -> Prompt {
        Prompt::new().system(NAMING_INSTRUCTIONS).user(request)
    }

    /// Ask the generator for a name. Always returns a valid name, falling
    /// back to [`fallback_name`] when the generator fails or answers with
    /// something unusable.
    pub async fn synthesize(&self, request: &str) -> String {
        match self.generator.generate(Self::prompt(request)).await {
            Ok(response) => match normalize(&response) {
                Some(name) => {
                    debug!("Named tool `{name}`");
                    name
                }
                None => {
                    let name = fallback_name();
                    warn!("Unusable tool name {response:?}; using `{name}`");
                    name
                }
            },
            Err(e) => {
                let name = fallback_name();
                warn!("Tool naming failed: {e}; using `{name}`");
                name
            }
        }
    }
}

/// Normalize a generator response into a tool name.
///
/// Keeps the first line, drops every character outside `[A-Za-z0-9_]` and
/// lowercases the rest. Returns `None` if the result is not a valid name.
pub fn normalize(response: &str) -> Option<String> {
    let first_line = response.trim().lines().next().unwrap_or_default();
    let name: String = first_line
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();

    is_valid_tool_name(&name).then_some(name)
}

/// A name that is unique within this process: the fallback prefix followed
/// by a strictly increasing 16-digit microsecond timestamp.
pub fn fallback_name() -> String {
    let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
    let previous = LAST_FALLBACK_MICROS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or(now);
    let micros = now.max(previous + 1);

    format!("{FALLBACK_PREFIX}{micros:016}")
}
