//! The tool runtime: registry, loaders, hot reload and self-extension.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use toolsmith_registry::{
    DirectoryId, DirectoryLoader, InvocationResult, SnapshotBuilder, ToolDefinition, ToolEntry,
    ToolRegistry,
};
use toolsmith_tool_gen::{CodeSynthesisPipeline, SynthesisSession, TextGenerator};
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::reload::{ChangeWatcher, ReloadOutcome, Reloader};

/// Layer holding tools implemented by the runtime itself.
pub const BUILTIN_DIRECTORY: &str = "builtin";

/// Layer loaded from the static directory.
pub const STATIC_DIRECTORY: &str = "static";

/// Layer loaded from the hot directory.
pub const HOT_DIRECTORY: &str = "hot";

/// Name of the built-in synthesis tool.
pub const CREATE_TOOL: &str = "create_tool";

/// Argument carrying the request for [`CREATE_TOOL`].
pub const CREATE_TOOL_ARG: &str = "tool_description_request";

/// Hosts the tool registry and keeps it in sync with the tool directories.
///
/// Layers, lowest precedence first: built-in tools, the static directory,
/// the hot directory.
pub struct ToolRuntime {
    config: RuntimeConfig,
    registry: Arc<ToolRegistry>,
    loader: DirectoryLoader,
    pipeline: Arc<CodeSynthesisPipeline>,
}

impl ToolRuntime {
    /// Create a runtime whose generator is built from `config`.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let generator = Arc::new(config.generator.build()?);
        if !generator.is_available() {
            warn!("No API key configured; `{CREATE_TOOL}` will report itself unavailable");
        }
        Self::with_generator(config, generator)
    }

    /// Create a runtime that synthesizes tools with `generator`.
    pub fn with_generator(
        config: RuntimeConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self> {
        config.validate()?;

        let pipeline = CodeSynthesisPipeline::new(generator, &config.hot_dir, &config.sandbox_dir)
            .with_max_retries(config.max_retries)
            .with_extension(config.unit_extension.clone());
        let runtime = Self {
            loader: DirectoryLoader::new().with_extension(config.unit_extension.clone()),
            registry: Arc::new(ToolRegistry::new()),
            pipeline: Arc::new(pipeline),
            config,
        };
        runtime.install_builtins()?;
        Ok(runtime)
    }

    fn install_builtins(&self) -> Result<()> {
        let directory = DirectoryId::new(BUILTIN_DIRECTORY);
        let mut builder = SnapshotBuilder::new(directory.clone());
        builder.register(create_tool_definition(Arc::clone(&self.pipeline)))?;
        self.registry.replace(&directory, builder.build());
        Ok(())
    }

    /// The runtime's configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The live registry.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// The synthesis pipeline behind [`CREATE_TOOL`].
    pub fn pipeline(&self) -> &Arc<CodeSynthesisPipeline> {
        &self.pipeline
    }

    /// Reloader for the static directory.
    pub fn static_reloader(&self) -> Reloader {
        Reloader::new(
            Arc::clone(&self.registry),
            self.loader.clone(),
            DirectoryId::new(STATIC_DIRECTORY),
            &self.config.static_dir,
        )
    }

    /// Reloader for the hot directory.
    pub fn hot_reloader(&self) -> Reloader {
        Reloader::new(
            Arc::clone(&self.registry),
            self.loader.clone(),
            DirectoryId::new(HOT_DIRECTORY),
            &self.config.hot_dir,
        )
    }

    /// Load the static directory, then the hot directory.
    ///
    /// A missing directory is logged and contributes no tools. Blocks while
    /// units execute; call from a blocking context or at startup.
    pub fn load_all(&self) -> Vec<ReloadOutcome> {
        let outcomes = vec![self.static_reloader().reload(), self.hot_reloader().reload()];
        for outcome in &outcomes {
            info!(
                "{}: {} tools loaded, {} units failed",
                outcome.directory,
                outcome.registered.len(),
                outcome.failures.len()
            );
        }
        info!("{} tools available", self.registry.stats().total_tools);
        outcomes
    }

    /// Start hot reloading the hot directory.
    ///
    /// The directory is created if it does not exist yet, so synthesized
    /// tools have somewhere to land.
    pub fn watch(&self) -> Result<ChangeWatcher> {
        std::fs::create_dir_all(&self.config.hot_dir)?;
        ChangeWatcher::start(self.config.watch_config(), self.hot_reloader())
    }

    /// Invoke a tool by name.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        Ok(self.registry.invoke(name, args).await?)
    }

    /// All visible tools, sorted by name.
    pub fn list(&self) -> Vec<Arc<ToolDefinition>> {
        self.registry.list()
    }

    /// Run one synthesis session. On success the tool appears in the
    /// registry once the hot directory reloads.
    pub async fn synthesize(&self, request: &str) -> SynthesisSession {
        self.pipeline.run(request).await
    }
}

impl std::fmt::Debug for ToolRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRuntime")
            .field("config", &self.config)
            .field("tools", &self.registry.stats().total_tools)
            .finish()
    }
}

/// The pipeline exposed as a tool.
struct CreateTool {
    pipeline: Arc<CodeSynthesisPipeline>,
}

impl std::fmt::Debug for CreateTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateTool")
            .field("hot_dir", &self.pipeline.hot_dir())
            .finish()
    }
}

#[async_trait]
impl ToolEntry for CreateTool {
    async fn call(&self, args: Value) -> InvocationResult {
        let request = match &args {
            Value::String(request) => request.as_str(),
            Value::Object(map) => match map.get(CREATE_TOOL_ARG) {
                Some(Value::String(request)) => request.as_str(),
                _ => return Err(format!("`{CREATE_TOOL_ARG}` must be a string")),
            },
            Value::Array(items) => match items.as_slice() {
                [Value::String(request)] => request.as_str(),
                _ => return Err(format!("expected a single `{CREATE_TOOL_ARG}` string")),
            },
            _ => return Err(format!("expected `{CREATE_TOOL_ARG}`")),
        };
        if request.trim().is_empty() {
            return Err("the tool request is empty".to_string());
        }

        Ok(Value::String(self.pipeline.synthesize(request).await))
    }
}

fn create_tool_definition(pipeline: Arc<CodeSynthesisPipeline>) -> ToolDefinition {
    let schema = json!({
        "type": "object",
        "properties": {
            CREATE_TOOL_ARG: {
                "type": "string",
                "description": "What the new tool should do."
            }
        },
        "required": [CREATE_TOOL_ARG]
    });

    ToolDefinition::new(
        CREATE_TOOL,
        "Write a new tool from a natural-language request, validate it and publish it \
         into the hot directory. Returns a report of every attempt.",
        schema,
        Arc::new(CreateTool { pipeline }),
    )
    .with_origin(BUILTIN_DIRECTORY, format!("{BUILTIN_DIRECTORY}.{CREATE_TOOL}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;
    use toolsmith_tool_gen::ScriptedGenerator;

    fn config(root: &Path) -> RuntimeConfig {
        RuntimeConfig::new()
            .with_static_dir(root.join("static_tools"))
            .with_hot_dir(root.join("tools"))
            .with_sandbox_dir(root.join("sandbox"))
    }

    fn write(dir: &Path, file: &str, source: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(file), source).unwrap();
    }

    #[test]
    fn test_builtin_tool_is_registered_first() {
        let root = TempDir::new().unwrap();
        let runtime = ToolRuntime::with_generator(
            config(root.path()),
            Arc::new(ScriptedGenerator::unavailable()),
        )
        .unwrap();

        let tool = runtime.registry().lookup(CREATE_TOOL).unwrap();
        assert_eq!(tool.schema["required"], json!([CREATE_TOOL_ARG]));
        let layers: Vec<_> = runtime.registry().current().directories().cloned().collect();
        assert_eq!(layers, vec![DirectoryId::new(BUILTIN_DIRECTORY)]);
    }

    #[test]
    fn test_load_all_stacks_static_below_hot() {
        let root = TempDir::new().unwrap();
        let config = config(root.path());
        write(
            &config.static_dir,
            "shared.rhai",
            "fn which() { \"static\" }\nregister_tool(\"which\", \"static copy\");\n",
        );
        write(
            &config.hot_dir,
            "shared.rhai",
            "fn which() { \"hot\" }\nregister_tool(\"which\", \"hot copy\");\n",
        );
        let generator = Arc::new(ScriptedGenerator::unavailable());
        let runtime = ToolRuntime::with_generator(config, generator).unwrap();

        let outcomes = runtime.load_all();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(runtime.registry().lookup("which").unwrap().description, "hot copy");

        let names: Vec<_> = runtime.list().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec![CREATE_TOOL, "which"]);
    }

    #[test]
    fn test_missing_directories_are_empty() {
        let root = TempDir::new().unwrap();
        let runtime = ToolRuntime::with_generator(
            config(root.path()),
            Arc::new(ScriptedGenerator::unavailable()),
        )
        .unwrap();

        let outcomes = runtime.load_all();
        assert!(outcomes.iter().all(|o| o.registered.is_empty() && o.failures.is_empty()));
        assert_eq!(runtime.list().len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let root = TempDir::new().unwrap();
        let config = config(root.path()).with_hot_dir(root.path().join("static_tools"));
        let generator = Arc::new(ScriptedGenerator::unavailable());
        let result = ToolRuntime::with_generator(config, generator);
        tokio_test::assert_err!(result);
    }

    #[tokio::test]
    async fn test_create_tool_reports_unavailable_generator() {
        let root = TempDir::new().unwrap();
        let runtime = ToolRuntime::with_generator(
            config(root.path()),
            Arc::new(ScriptedGenerator::unavailable()),
        )
        .unwrap();

        let args = json!({ CREATE_TOOL_ARG: "add two numbers" });
        let report = tokio_test::assert_ok!(runtime.invoke(CREATE_TOOL, args).await);
        assert!(report.as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn test_create_tool_rejects_bad_arguments() {
        let root = TempDir::new().unwrap();
        let runtime = ToolRuntime::with_generator(
            config(root.path()),
            Arc::new(ScriptedGenerator::unavailable()),
        )
        .unwrap();

        assert!(runtime.invoke(CREATE_TOOL, json!({ "request": "x" })).await.is_err());
        assert!(runtime.invoke(CREATE_TOOL, json!(42)).await.is_err());
        assert!(runtime.invoke(CREATE_TOOL, json!("   ")).await.is_err());
    }

    #[tokio::test]
    async fn test_create_tool_publishes_into_hot_dir() {
        let root = TempDir::new().unwrap();
        let config = config(root.path());
        let hot_dir = config.hot_dir.clone();
        let generator = ScriptedGenerator::new([
            "double_it",
            concat!(
                "```rhai\n",
                "fn double_it(x) { x * 2 }\n",
                "register_tool(\"double_it\", \"Doubles a number.\");\n",
                "```",
            ),
        ]);
        let runtime = ToolRuntime::with_generator(config, Arc::new(generator)).unwrap();

        let report = runtime
            .invoke(CREATE_TOOL, json!("double a number"))
            .await
            .unwrap();
        assert!(report.as_str().unwrap().contains("double_it"));
        assert!(hot_dir.join("double_it.rhai").is_file());

        // Not visible until the hot directory reloads.
        assert!(runtime.registry().lookup("double_it").is_err());
        runtime.hot_reloader().reload();
        assert_eq!(runtime.invoke("double_it", json!([21])).await.unwrap(), json!(42));
    }
}
