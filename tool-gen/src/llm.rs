//! Text-generation collaborators.
//!
//! The pipeline treats text generation as an opaque, fallible function from
//! a prompt to candidate text. [`OpenAiCompatibleGenerator`] talks to any
//! OpenAI-compatible chat completions endpoint; [`ScriptedGenerator`] replays
//! canned responses for tests and offline runs.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GenerationError, Result};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Who a prompt message is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// An ordered list of messages sent to a text generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub messages: Vec<Message>,
}

impl Prompt {
    /// Create an empty prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a system message.
    pub fn system(self, content: impl Into<String>) -> Self {
        self.push(Role::System, content)
    }

    /// Append a user message.
    pub fn user(self, content: impl Into<String>) -> Self {
        self.push(Role::User, content)
    }

    fn push(mut self, role: Role, content: impl Into<String>) -> Self {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
        self
    }

    /// All message contents joined by blank lines.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Trait for text-generation providers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Check if the provider is usable (API key set, etc.).
    fn is_available(&self) -> bool;

    /// Generate a completion for the prompt.
    async fn generate(&self, prompt: Prompt) -> Result<String>;
}

/// Generator backed by an OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleGenerator {
    /// API key.
    api_key: Option<String>,

    /// API base URL, without a trailing `/chat/completions`.
    base_url: String,

    /// Model name.
    model: String,

    /// Sampling temperature.
    temperature: f32,

    /// HTTP client.
    client: reqwest::Client,
}

impl OpenAiCompatibleGenerator {
    /// Create a generator with no API key.
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            client: reqwest::Client::new(),
        }
    }

    /// Set the API key. An empty key leaves the generator unconfigured.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// The configured model.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Default for OpenAiCompatibleGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, prompt: Prompt) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(GenerationError::ProviderNotConfigured)?;

        debug!(
            "Requesting completion from {} with model {} ({} messages)",
            self.base_url,
            self.model,
            prompt.messages.len()
        );

        let body = serde_json::json!({
            "model": self.model,
            "messages": prompt.messages,
            "temperature": self.temperature
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(GenerationError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        let result: ChatCompletionResponse = response.json().await?;
        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationError::InvalidResponse("No completion in response".to_string())
            })?;

        info!("Received completion of {} characters", content.len());
        Ok(content)
    }
}

/// Chat completions response format.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// A queued scripted reply: the text, or an error message.
type ScriptedResponse = std::result::Result<String, String>;

/// Generator that replays a fixed queue of responses.
///
/// Each call to [`TextGenerator::generate`] pops the next entry; `Err`
/// entries surface as [`GenerationError::ApiRequest`]. Every prompt is
/// recorded so callers can inspect what was asked.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    prompts: Mutex<Vec<Prompt>>,
    unavailable: bool,
}

impl ScriptedGenerator {
    /// Create a generator replaying `responses` in order.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            ..Default::default()
        }
    }

    /// A generator that reports itself as unavailable.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    /// Queue a successful response.
    pub fn push_response(&self, response: impl Into<String>) {
        self.lock_responses().push_back(Ok(response.into()));
    }

    /// Queue a failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.lock_responses().push_back(Err(message.into()));
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of queued responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock_responses().len()
    }

    fn lock_responses(&self) -> MutexGuard<'_, VecDeque<ScriptedResponse>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        !self.unavailable
    }

    async fn generate(&self, prompt: Prompt) -> Result<String> {
        if self.unavailable {
            return Err(GenerationError::ProviderNotConfigured);
        }

        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt);

        match self.lock_responses().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(GenerationError::ApiRequest(message)),
            None => Err(GenerationError::ApiRequest(
                "scripted generator has no responses left".to_string(),
            )),
        }
    }
}
