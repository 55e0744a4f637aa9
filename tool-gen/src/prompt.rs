//! Code-generation prompts and response parsing.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::llm::Prompt;

/// First fenced block of any language. The opening fence line may carry a
/// language tag.
static FENCED_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\n(.*?)```").ok());

/// System instructions for writing a tool unit named `name`.
pub fn system_instructions(name: &str) -> String {
    format!(
        r#"You write tools as Rhai scripts. Reply with the complete script inside a single fenced code block and no other text.

Rules:
1. Define the tool as a script function: `fn {name}(...) {{ ... }}`.
2. After the function, register it exactly once: `register_tool("{name}", "<one sentence describing the tool>");`.
3. Parameters are plain values decoded from JSON: numbers, strings, booleans, arrays and object maps.
4. Return the result as a value (a number, string, array or object map). Do not call `print` or `debug`.
5. The script must not read files, open network connections or depend on anything outside itself.
6. Helper functions are allowed, but only `{name}` may be registered."#
    )
}

/// Build the prompt for one generation attempt.
///
/// On a retry, `feedback` carries the previous attempt's failure reason
/// verbatim.
pub fn code_prompt(name: &str, request: &str, feedback: Option<&str>) -> Prompt {
    let prompt = Prompt::new()
        .system(system_instructions(name))
        .user(format!("Create a new tool named `{name}` that does the following: {request}"));

    match feedback {
        Some(reason) => prompt.user(format!(
            "The previous attempt failed validation. Fix the following problem and \
             regenerate the complete script:\n```\n{reason}\n```"
        )),
        None => prompt,
    }
}

/// Extract the candidate source from a response: the first fenced block if
/// there is one, otherwise the whole response.
pub fn extract_code(response: &str) -> String {
    FENCED_BLOCK
        .as_ref()
        .and_then(|re| re.captures(response))
        .and_then(|captures| captures.get(1))
        .map_or_else(|| response.trim(), |block| block.as_str().trim())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_tagged_block() {
        let response = "Here you go:\n```rhai\nfn adder(a, b) { a + b }\n```\nEnjoy.";
        assert_eq!(extract_code(response), "fn adder(a, b) { a + b }");
    }

    #[test]
    fn test_extract_first_of_many_blocks() {
        let response = "```\nfirst()\n```\n\n```rust\nsecond()\n```";
        assert_eq!(extract_code(response), "first()");
    }

    #[test]
    fn test_extract_without_fence() {
        assert_eq!(extract_code("  fn adder(a, b) { a + b }\n"), "fn adder(a, b) { a + b }");
    }

    #[test]
    fn test_code_prompt_carries_feedback() {
        let first = code_prompt("adder", "add two numbers", None);
        assert_eq!(first.messages.len(), 2);
        assert!(first.messages[0].content.contains("fn adder(...)"));
        assert!(first.messages[0].content.contains(r#"register_tool("adder""#));
        assert!(first.messages[1].content.contains("add two numbers"));

        let retry = code_prompt("adder", "add two numbers", Some("Syntax error at line 1"));
        assert_eq!(retry.messages.len(), 3);
        assert!(retry.messages[2].content.contains("```\nSyntax error at line 1\n```"));
    }
}
