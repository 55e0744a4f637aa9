//! The units shipped in `tools/` and `static_tools/`.

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use serde_json::json;
use toolsmith_registry::{DirectoryId, DirectoryLoader, ToolRegistry};

fn load(dir: &str) -> ToolRegistry {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(dir);
    let id = DirectoryId::new(dir);
    let report = DirectoryLoader::new().load(&id, &path);
    assert!(report.is_clean(), "{:?}", report.failures);

    let registry = ToolRegistry::new();
    registry.replace(&id, report.snapshot);
    registry
}

#[test]
fn test_sample_units_register_every_tool() {
    let registry = load("tools");
    let names: Vec<_> = registry.list().iter().map(|t| t.name.clone()).collect();
    assert_eq!(
        names,
        vec![
            "compare_values",
            "fibonacci_sum",
            "generate_fibonacci",
            "greet_user",
            "hanoi_tower_solver",
            "quick_sort",
        ]
    );

    let compare = registry.lookup("compare_values").unwrap();
    assert_eq!(compare.schema["properties"]["value1"]["type"], "number");
    let sort = registry.lookup("quick_sort").unwrap();
    assert_eq!(sort.schema["required"], json!(["arr"]));
}

#[tokio::test]
async fn test_quick_sort() {
    let registry = load("tools");

    let sorted = registry
        .invoke("quick_sort", json!({ "arr": [5, 3, 9, 1, 3] }))
        .await
        .unwrap();
    assert_eq!(sorted, json!([1, 3, 3, 5, 9]));

    let sorted = registry
        .invoke("quick_sort", json!([["pear", "apple", "fig"]]))
        .await
        .unwrap();
    assert_eq!(sorted, json!(["apple", "fig", "pear"]));

    let empty = registry.invoke("quick_sort", json!({ "arr": [] })).await.unwrap();
    assert_eq!(empty, json!([]));
}

#[tokio::test]
async fn test_greet_and_compare() {
    let registry = load("tools");

    let greeting = registry.invoke("greet_user", json!({ "name": "Ada" })).await.unwrap();
    assert_eq!(greeting, json!({ "message": "Hello, Ada! Welcome!" }));

    let less = registry
        .invoke("compare_values", json!({ "value1": 3, "value2": 7 }))
        .await
        .unwrap();
    assert_eq!(less["comparison_result"], "3 is less than 7.");

    let equal = registry.invoke("compare_values", json!([4, 4])).await.unwrap();
    assert_eq!(equal["comparison_result"], "4 is equal to 4.");
}

#[tokio::test]
async fn test_fibonacci() {
    let registry = load("tools");

    let sequence = registry.invoke("generate_fibonacci", json!({ "n": 6 })).await.unwrap();
    assert_eq!(sequence, json!([1, 1, 2, 3, 5, 8]));
    let sum = registry.invoke("fibonacci_sum", json!({ "n": 6 })).await.unwrap();
    assert_eq!(sum, json!(20));

    assert_eq!(registry.invoke("generate_fibonacci", json!({ "n": 0 })).await.unwrap(), json!([]));
    assert_eq!(registry.invoke("fibonacci_sum", json!({ "n": -3 })).await.unwrap(), json!(0));
}

#[tokio::test]
async fn test_hanoi() {
    let registry = load("tools");

    let moves = registry
        .invoke("hanoi_tower_solver", json!({ "num_disks": 2 }))
        .await
        .unwrap();
    assert_eq!(
        moves,
        json!("Move disk 1 from A to B\nMove disk 2 from A to C\nMove disk 1 from B to C")
    );

    let moves = registry
        .invoke("hanoi_tower_solver", json!({ "num_disks": 3 }))
        .await
        .unwrap();
    assert_eq!(moves.as_str().unwrap().lines().count(), 7);

    let refused = registry
        .invoke("hanoi_tower_solver", json!({ "num_disks": 0 }))
        .await
        .unwrap();
    assert!(refused.as_str().unwrap().starts_with("Enter a whole number"));
}

#[tokio::test]
async fn test_static_text_stats() {
    let registry = load("static_tools");

    let stats = registry
        .invoke("text_stats", json!({ "text": "hello world\nsecond  line" }))
        .await
        .unwrap();
    assert_eq!(stats, json!({ "characters": 24, "words": 4, "lines": 2 }));

    let empty = registry.invoke("text_stats", json!({ "text": "" })).await.unwrap();
    assert_eq!(empty, json!({ "characters": 0, "words": 0, "lines": 0 }));
}

#[tokio::test]
async fn test_wrong_arguments_are_invocation_errors() {
    let registry = load("tools");

    let err = registry
        .invoke("greet_user", json!({ "nickname": "Ada" }))
        .await
        .unwrap_err();
    assert!(matches!(err, toolsmith_registry::RegistryError::Invocation { .. }));
}
