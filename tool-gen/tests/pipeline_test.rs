//! End-to-end synthesis sessions against a scripted text generator.

use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use toolsmith_registry::{DirectoryId, DirectoryLoader, ToolRegistry};
use toolsmith_tool_gen::{CodeSynthesisPipeline, ScriptedGenerator, SessionStatus, Validation};

const REQUEST: &str = "a tool that adds two numbers";

const SYNTAX_ERROR: &str = "```rhai\nfn add_numbers(a, b { a + b }\n```";

const WRONG_NAME: &str = "```rhai\nfn sum(a, b) { a + b }\nregister_tool(\"sum\", \"Adds\");\n```";

const GOOD: &str = concat!(
    "Sure!\n```rhai\n",
    "fn add_numbers(a, b) {\n    a + b\n}\n\n",
    "register_tool(\"add_numbers\", \"Adds two numbers.\");\n",
    "```",
);

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|e| e.count()).unwrap_or(0)
}

struct Fixture {
    _root: TempDir,
    hot: std::path::PathBuf,
    sandbox: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    Fixture {
        hot: root.path().join("tools"),
        sandbox: root.path().join("sandbox"),
        _root: root,
    }
}

#[tokio::test]
async fn test_publishes_after_two_failures() {
    let fx = fixture();
    let generator = Arc::new(ScriptedGenerator::new([
        "add_numbers",
        SYNTAX_ERROR,
        WRONG_NAME,
        GOOD,
    ]));
    let pipeline =
        CodeSynthesisPipeline::new(generator.clone(), &fx.hot, &fx.sandbox).with_max_retries(3);

    let session = pipeline.run(REQUEST).await;

    assert_eq!(session.attempts.len(), 3);
    assert_eq!(session.name.as_deref(), Some("add_numbers"));
    assert_eq!(
        session.status,
        SessionStatus::Published {
            name: "add_numbers".to_string(),
            path: fx.hot.join("add_numbers.rhai"),
        }
    );
    assert!(!session.attempts[0].validation.as_ref().unwrap().is_valid());
    assert!(!session.attempts[1].validation.as_ref().unwrap().is_valid());
    assert_eq!(session.attempts[2].validation, Some(Validation::Valid));
    for attempt in &session.attempts {
        assert_eq!(attempt.requested_name.as_deref(), Some("add_numbers"));
    }

    // The failure reason of attempt 2 is fed into the prompt for attempt 3.
    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 4);
    let wrong_name_reason = session.attempts[1].validation.as_ref().unwrap().reason().unwrap();
    assert!(prompts[3].text().contains(wrong_name_reason));
    assert_eq!(prompts[1].messages.len(), 2);

    let published = std::fs::read_to_string(fx.hot.join("add_numbers.rhai")).unwrap();
    assert!(published.starts_with("fn add_numbers(a, b)"));
    assert_eq!(entries(&fx.hot), 1);
    assert_eq!(entries(&fx.sandbox), 0);
}

#[tokio::test]
async fn test_report_lists_every_attempt() {
    let fx = fixture();
    let generator = Arc::new(ScriptedGenerator::new(["add_numbers", SYNTAX_ERROR, GOOD]));
    let pipeline = CodeSynthesisPipeline::new(generator, &fx.hot, &fx.sandbox);

    let report = pipeline.synthesize(REQUEST).await;
    let lines: Vec<_> = report.lines().collect();

    assert!(lines[0].starts_with("Attempt 1: candidate for `add_numbers` failed validation"));
    assert!(report.contains("Attempt 2: candidate for `add_numbers` passed validation."));
    assert!(report.trim_end().ends_with("the hot directory reloads it automatically."));
}

#[tokio::test]
async fn test_exhausts_without_writing() {
    let fx = fixture();
    let generator = Arc::new(ScriptedGenerator::new([
        "add_numbers",
        SYNTAX_ERROR,
        WRONG_NAME,
        SYNTAX_ERROR,
        GOOD,
    ]));
    let pipeline =
        CodeSynthesisPipeline::new(generator.clone(), &fx.hot, &fx.sandbox).with_max_retries(3);

    let session = pipeline.run(REQUEST).await;

    assert_eq!(session.status, SessionStatus::Exhausted);
    assert_eq!(session.attempts.len(), 3);
    assert!(session.attempts.iter().all(|a| !a.validation.as_ref().unwrap().is_valid()));
    assert!(!fx.hot.join("add_numbers.rhai").exists());
    assert_eq!(entries(&fx.hot), 0);
    assert_eq!(entries(&fx.sandbox), 0);
    // The fourth candidate was never requested.
    assert_eq!(generator.remaining(), 1);
    assert!(session.report().ends_with("Giving up after 3 failed attempts."));
}

#[tokio::test]
async fn test_unavailable_generator_short_circuits() {
    let fx = fixture();
    let generator = Arc::new(ScriptedGenerator::unavailable());
    let pipeline = CodeSynthesisPipeline::new(generator.clone(), &fx.hot, &fx.sandbox);

    let session = pipeline.run(REQUEST).await;

    assert!(matches!(session.status, SessionStatus::Unavailable { .. }));
    assert_eq!(session.attempts.len(), 1);
    assert!(session.name.is_none());
    assert!(generator.prompts().is_empty());
    assert!(session.report().contains("not configured"));
}

#[tokio::test]
async fn test_garbage_name_falls_back() {
    let fx = fixture();
    let generator = Arc::new(ScriptedGenerator::new(["请输入名称"]));
    let pipeline = CodeSynthesisPipeline::new(generator.clone(), &fx.hot, &fx.sandbox);

    // Naming falls back; the generator then has nothing left to offer.
    let session = pipeline.run(REQUEST).await;
    let name = session.name.clone().unwrap();
    assert!(name.starts_with("generated_"));
    assert_eq!(session.status, SessionStatus::Exhausted);
}

#[tokio::test]
async fn test_published_tool_loads_into_registry() {
    let fx = fixture();
    let generator = Arc::new(ScriptedGenerator::new(["add_numbers", GOOD]));
    let pipeline = CodeSynthesisPipeline::new(generator, &fx.hot, &fx.sandbox);
    let session = pipeline.run(REQUEST).await;
    assert!(matches!(session.status, SessionStatus::Published { .. }));

    let registry = ToolRegistry::new();
    let hot = DirectoryId::new("hot");
    registry.replace(&hot, DirectoryLoader::new().load(&hot, &fx.hot).snapshot);

    let sum = registry
        .invoke("add_numbers", serde_json::json!({ "a": 19, "b": 23 }))
        .await
        .unwrap();
    assert_eq!(sum, serde_json::json!(42));
}
