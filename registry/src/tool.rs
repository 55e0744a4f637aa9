//! Core tool types.
//!
//! A [`ToolDefinition`] is created by the loader when a source unit registers
//! a tool, and is never mutated afterwards: a reload produces new definitions
//! in a new snapshot instead.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum length of a tool name.
pub const MAX_TOOL_NAME_LEN: usize = 30;

/// Outcome of calling a tool entry.
pub type InvocationResult = std::result::Result<serde_json::Value, String>;

/// Check a name against `^[a-z][a-z0-9_]{0,29}$`.
pub fn is_valid_tool_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    name.len() <= MAX_TOOL_NAME_LEN
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// The callable behind a tool.
///
/// Script units provide [`crate::unit::ScriptFunction`]; the runtime also
/// implements this for built-in tools.
#[async_trait]
pub trait ToolEntry: Send + Sync + fmt::Debug {
    /// Call the tool with JSON arguments.
    async fn call(&self, args: serde_json::Value) -> InvocationResult;
}

/// A registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description, shown to callers.
    pub description: String,

    /// JSON Schema describing the accepted arguments.
    pub schema: serde_json::Value,

    /// The file the tool was loaded from.
    pub source_path: PathBuf,

    /// Load-time identifier of the unit that registered the tool.
    pub module_id: String,

    /// When the tool was loaded.
    pub loaded_at: DateTime<Utc>,

    /// The loaded callable.
    #[serde(skip)]
    pub entry: Arc<dyn ToolEntry>,
}

impl ToolDefinition {
    /// Create a new definition stamped with the current time.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        entry: Arc<dyn ToolEntry>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            source_path: PathBuf::new(),
            module_id: String::new(),
            loaded_at: Utc::now(),
            entry,
        }
    }

    /// Record where the tool came from.
    pub fn with_origin(
        mut self,
        source_path: impl Into<PathBuf>,
        module_id: impl Into<String>,
    ) -> Self {
        self.source_path = source_path.into();
        self.module_id = module_id.into();
        self
    }
}

/// Build an object schema whose properties are the given parameter names.
///
/// Script parameters are untyped, so every property accepts any JSON value
/// and all of them are required.
pub fn schema_from_params<S: AsRef<str>>(params: &[S]) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = params
        .iter()
        .map(|p| (p.as_ref().to_string(), serde_json::json!({})))
        .collect();
    let required: Vec<&str> = params.iter().map(AsRef::as_ref).collect();

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_tool_names() {
        assert!(is_valid_tool_name("quick_sort"));
        assert!(is_valid_tool_name("a"));
        assert!(is_valid_tool_name("tool_2"));
        assert!(is_valid_tool_name(&"a".repeat(30)));
    }

    #[test]
    fn test_invalid_tool_names() {
        assert!(!is_valid_tool_name(""));
        assert!(!is_valid_tool_name("2tool"));
        assert!(!is_valid_tool_name("_tool"));
        assert!(!is_valid_tool_name("QuickSort"));
        assert!(!is_valid_tool_name("quick-sort"));
        assert!(!is_valid_tool_name("排序"));
        assert!(!is_valid_tool_name(&"a".repeat(31)));
    }

    #[test]
    fn test_schema_from_params() {
        let schema = schema_from_params(&["value1", "value2"]);
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["value1"].is_object());
        assert_eq!(schema["required"], serde_json::json!(["value1", "value2"]));
    }
}
