use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use toolsmith_runtime::{RuntimeConfig, SessionStatus, ToolDefinition, ToolRuntime, logging};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "toolsmith")]
#[command(about = "Hot-reloading tool host that can write its own tools")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "TOOLSMITH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Directory loaded once at startup
    #[arg(long, env = "TOOLSMITH_STATIC_DIR", global = true)]
    static_dir: Option<PathBuf>,

    /// Directory watched for changes
    #[arg(long, env = "TOOLSMITH_HOT_DIR", global = true)]
    hot_dir: Option<PathBuf>,

    /// Debounce window for hot reloads, in milliseconds
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,

    /// Maximum attempts per synthesis request
    #[arg(long, global = true)]
    max_retries: Option<usize>,

    /// Directory for the rolling debug log
    #[arg(long, env = "TOOLSMITH_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the tool directories and hot reload until Ctrl-C (default)
    Serve,

    /// List the available tools
    List {
        /// Print the full definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Invoke a tool
    Invoke {
        /// Tool name
        name: String,

        /// Arguments as JSON: an object by parameter name or an array by position
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Synthesize a new tool from a description
    Synthesize {
        /// What the tool should do
        request: String,

        /// Print the session record as JSON instead of the report
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = RuntimeConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.static_dir {
            config = config.with_static_dir(dir);
        }
        if let Some(dir) = &self.hot_dir {
            config = config.with_hot_dir(dir);
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config = config.with_debounce_ms(debounce_ms);
        }
        if let Some(max_retries) = self.max_retries {
            config = config.with_max_retries(max_retries);
        }
        if let Some(dir) = &self.log_dir {
            config = config.with_log_dir(dir);
        }
        Ok(config)
    }
}

async fn serve(runtime: ToolRuntime) -> Result<()> {
    let runtime = Arc::new(runtime);
    let loader = Arc::clone(&runtime);
    tokio::task::spawn_blocking(move || loader.load_all()).await?;

    let watcher = match runtime.watch() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            error!("Hot reload unavailable: {e}");
            None
        }
    };

    info!("Serving {} tools; press Ctrl-C to stop", runtime.list().len());
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    if let Some(watcher) = watcher {
        info!("Hot reload status at shutdown: {:?}", watcher.status());
        watcher.stop().await;
    }
    Ok(())
}

fn list(runtime: &ToolRuntime, json: bool) -> Result<()> {
    runtime.load_all();
    let tools = runtime.list();
    if json {
        let definitions: Vec<&ToolDefinition> = tools.iter().map(Arc::as_ref).collect();
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    for tool in tools {
        let summary = tool.description.lines().next().unwrap_or_default();
        println!("{:<30} {summary}", tool.name);
    }
    Ok(())
}

async fn invoke(runtime: &ToolRuntime, name: &str, args: &str) -> Result<()> {
    let args: serde_json::Value =
        serde_json::from_str(args).with_context(|| format!("--args is not valid JSON: {args}"))?;
    runtime.load_all();
    let output = runtime.invoke(name, args).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn synthesize(runtime: &ToolRuntime, request: &str, json: bool) -> Result<()> {
    let session = runtime.synthesize(request).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        println!("{}", session.report());
    }

    match session.status {
        SessionStatus::Published { .. } => Ok(()),
        status => bail!("no tool was published ({status:?})"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = cli.runtime_config()?;
    let _log_guard = logging::init(config.log_dir.as_deref())?;

    let runtime = ToolRuntime::new(config)?;
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(runtime).await,
        Commands::List { json } => list(&runtime, json),
        Commands::Invoke { name, args } => invoke(&runtime, &name, &args).await,
        Commands::Synthesize { request, json } => synthesize(&runtime, &request, json).await,
    }
}
