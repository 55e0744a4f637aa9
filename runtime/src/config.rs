//! Configuration for the tool runtime.
//!
//! Values are layered: defaults, then an optional TOML file, then the
//! environment (including a `.env` file loaded by the binary), then CLI
//! flags applied through the `with_*` builders.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use toolsmith_directory_watcher::WatchConfig;
use toolsmith_registry::DEFAULT_UNIT_EXTENSION;
use toolsmith_tool_gen::{
    DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_MODEL, OpenAiCompatibleGenerator,
};

use crate::error::{Result, RuntimeError};

/// Environment variables read for the API key, in order of preference.
pub const API_KEY_VARS: [&str; 2] = ["TOOLSMITH_API_KEY", "OPENAI_API_KEY"];

/// Environment variable naming the generation model.
pub const MODEL_VAR: &str = "LLM_MODEL";

/// Environment variable overriding the generation API base URL.
pub const BASE_URL_VAR: &str = "TOOLSMITH_BASE_URL";

/// Configuration for the tool runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory loaded once at startup and never watched.
    pub static_dir: PathBuf,

    /// Directory watched for changes and targeted by synthesized tools.
    pub hot_dir: PathBuf,

    /// Extension of source units, without the dot.
    pub unit_extension: String,

    /// Debounce window for hot reloads, in milliseconds.
    pub debounce_ms: u64,

    /// Maximum attempts per synthesis session.
    pub max_retries: usize,

    /// Scratch directory for candidate validation.
    pub sandbox_dir: PathBuf,

    /// Directory for the rolling debug log, if any.
    pub log_dir: Option<PathBuf>,

    /// Text generation settings.
    pub generator: GeneratorConfig,
}

impl RuntimeConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            static_dir: PathBuf::from("static_tools"),
            hot_dir: PathBuf::from("tools"),
            unit_extension: DEFAULT_UNIT_EXTENSION.to_string(),
            debounce_ms: 500,
            max_retries: DEFAULT_MAX_RETRIES,
            sandbox_dir: std::env::temp_dir().join("toolsmith-sandbox"),
            log_dir: None,
            generator: GeneratorConfig::default(),
        }
    }

    /// Read a TOML file. Keys it leaves out keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Defaults, overlaid with `path` when given, then with the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::new(),
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    /// Overlay values found through `lookup`. Empty values are ignored.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = API_KEY_VARS.iter().find_map(|var| lookup(*var)) {
            self.generator.api_key = Some(key);
        }
        if let Some(model) = lookup(MODEL_VAR) {
            self.generator.model = model;
        }
        if let Some(url) = lookup(BASE_URL_VAR) {
            self.generator.base_url = url;
        }
        self
    }

    /// Set the static directory.
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    /// Set the hot directory.
    pub fn with_hot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.hot_dir = dir.into();
        self
    }

    /// Set the sandbox directory.
    pub fn with_sandbox_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sandbox_dir = dir.into();
        self
    }

    /// Set the unit extension.
    pub fn with_unit_extension(mut self, extension: impl Into<String>) -> Self {
        self.unit_extension = extension.into();
        self
    }

    /// Set the debounce window in milliseconds.
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Set the synthesis attempt bound.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the log directory.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Set the generator configuration.
    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    /// The debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Watch settings for the hot directory.
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig::new(&self.hot_dir)
            .with_extension(self.unit_extension.clone())
            .with_debounce(self.debounce())
    }

    /// Reject configurations the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.unit_extension.is_empty() || self.unit_extension.starts_with('.') {
            return Err(RuntimeError::Config(format!(
                "invalid unit extension: `{}`",
                self.unit_extension
            )));
        }
        if self.static_dir == self.hot_dir {
            return Err(RuntimeError::Config(format!(
                "static and hot directories must differ (both are {})",
                self.hot_dir.display()
            )));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for the OpenAI-compatible text generator.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// API base URL.
    pub base_url: String,

    /// Model name.
    pub model: String,

    /// API key. Without one, synthesis reports itself unavailable.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl GeneratorConfig {
    /// Build the generator these settings describe.
    pub fn build(&self) -> Result<OpenAiCompatibleGenerator> {
        let mut generator = OpenAiCompatibleGenerator::new()
            .with_base_url(self.base_url.clone())
            .with_model(self.model.clone())
            .with_temperature(self.temperature)
            .with_timeout(Duration::from_secs(self.timeout_secs))?;
        if let Some(key) = &self.api_key {
            generator = generator.with_api_key(key.clone());
        }
        Ok(generator)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: 0.1,
            timeout_secs: 120,
        }
    }
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
