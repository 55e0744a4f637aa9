//! Hot reload through the OS file watcher.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use toolsmith_runtime::{CREATE_TOOL, RuntimeConfig, ToolRuntime, WatcherStatus};
use toolsmith_tool_gen::ScriptedGenerator;

const DEBOUNCE_MS: u64 = 100;

/// Write a unit the way an editor with atomic saves does, so the watcher
/// sees one complete file instead of a truncate followed by writes.
fn install(dir: &Path, file: &str, source: &str) {
    let staged = dir.join(format!("{file}.partial"));
    std::fs::write(&staged, source).unwrap();
    std::fs::rename(&staged, dir.join(file)).unwrap();
}

fn adder(description: &str) -> String {
    format!("fn adder(a, b) {{ a + b }}\nregister_tool(\"adder\", \"{description}\");\n")
}

async fn eventually(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS * 3)).await;
}

fn runtime(root: &Path, generator: ScriptedGenerator) -> ToolRuntime {
    let config = RuntimeConfig::new()
        .with_static_dir(root.join("static_tools"))
        .with_hot_dir(root.join("tools"))
        .with_sandbox_dir(root.join("sandbox"))
        .with_debounce_ms(DEBOUNCE_MS);
    ToolRuntime::with_generator(config, Arc::new(generator)).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_add_modify_and_delete_are_picked_up() {
    let root = TempDir::new().unwrap();
    let runtime = runtime(root.path(), ScriptedGenerator::unavailable());
    let hot = runtime.config().hot_dir.clone();
    runtime.load_all();
    let watcher = runtime.watch().unwrap();
    let registry = Arc::clone(runtime.registry());

    install(&hot, "adder.rhai", &adder("v1"));
    eventually("adder to load", || registry.lookup("adder").is_ok()).await;
    assert_eq!(runtime.invoke("adder", json!([2, 3])).await.unwrap(), json!(5));

    settle().await;
    install(&hot, "adder.rhai", &adder("v2"));
    eventually("adder to be replaced", || {
        registry.lookup("adder").is_ok_and(|tool| tool.description == "v2")
    })
    .await;

    settle().await;
    std::fs::remove_file(hot.join("adder.rhai")).unwrap();
    eventually("adder to disappear", || registry.lookup("adder").is_err()).await;

    // The built-in layer is untouched by hot reloads.
    assert!(registry.lookup(CREATE_TOOL).is_ok());
    assert_eq!(watcher.status(), WatcherStatus::Running);
    assert!(watcher.reload_count() >= 3);
    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unit_written_after_create_is_loaded() {
    let root = TempDir::new().unwrap();
    let runtime = runtime(root.path(), ScriptedGenerator::unavailable());
    let hot = runtime.config().hot_dir.clone();
    runtime.load_all();
    let watcher = runtime.watch().unwrap();
    let registry = Arc::clone(runtime.registry());

    // An empty file first, its contents half a window later.
    let mut file = std::fs::File::create(hot.join("adder.rhai")).unwrap();
    tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS / 2)).await;
    file.write_all(adder("late").as_bytes()).unwrap();
    file.sync_all().unwrap();
    drop(file);

    eventually("adder to load", || {
        registry.lookup("adder").is_ok_and(|tool| tool.description == "late")
    })
    .await;
    assert_eq!(runtime.invoke("adder", json!([20, 22])).await.unwrap(), json!(42));
    assert_eq!(watcher.status(), WatcherStatus::Running);
    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broken_unit_does_not_take_down_siblings() {
    let root = TempDir::new().unwrap();
    let runtime = runtime(root.path(), ScriptedGenerator::unavailable());
    let hot = runtime.config().hot_dir.clone();
    std::fs::create_dir_all(&hot).unwrap();
    install(&hot, "adder.rhai", &adder("v1"));
    runtime.load_all();
    let watcher = runtime.watch().unwrap();

    install(&hot, "broken.rhai", "fn broken( {");
    eventually("a reload", || watcher.reload_count() >= 1).await;

    assert!(runtime.registry().lookup("adder").is_ok());
    assert!(runtime.registry().lookup("broken").is_err());
    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_synthesized_tool_goes_live() {
    let root = TempDir::new().unwrap();
    let generator = ScriptedGenerator::new([
        "square",
        "```rhai\nfn square(x) { x * x }\nregister_tool(\"square\", \"Squares a number.\");\n```",
    ]);
    let runtime = runtime(root.path(), generator);
    runtime.load_all();
    let watcher = runtime.watch().unwrap();

    let report = runtime
        .invoke(CREATE_TOOL, json!({ "tool_description_request": "square a number" }))
        .await
        .unwrap();
    assert!(report.as_str().unwrap().contains("`square` was published"));

    let registry = Arc::clone(runtime.registry());
    eventually("square to load", || registry.lookup("square").is_ok()).await;
    assert_eq!(runtime.invoke("square", json!({ "x": 9 })).await.unwrap(), json!(81));

    // Nothing was left behind in the sandbox.
    let leftovers = std::fs::read_dir(root.path().join("sandbox")).unwrap().count();
    assert_eq!(leftovers, 0);
    watcher.stop().await;
}
