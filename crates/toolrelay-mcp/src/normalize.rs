//! Defensive shaping of tool arguments and tool results.
//!
//! Models do not always produce a clean argument object, and providers do not
//! agree on the shape of a call result. Both directions go through total
//! functions here so the registry never has to guess.

use crate::error::McpError;
use crate::tool::ToolResult;
use serde_json::{Map, Value};

/// A known argument alias for a specific tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentFixup {
    pub tool: &'static str,
    /// Key models commonly use by mistake.
    pub alias: &'static str,
    /// Key the provider requires.
    pub canonical: &'static str,
}

/// Known-provider argument fixups. The canonical key is required once the
/// alias has been applied.
pub const ARGUMENT_FIXUPS: &[ArgumentFixup] = &[ArgumentFixup {
    tool: "brave_web_search",
    alias: "q",
    canonical: "query",
}];

/// Coerce whatever the model sent as arguments into a key/value map.
///
/// Objects pass through, `null` becomes an empty map, a string holding a JSON
/// object is parsed, and an array of `[key, value]` pairs is folded. Anything
/// else is rejected with a description of what was received.
pub fn coerce_arguments(arguments: Value) -> Result<Map<String, Value>, String> {
    match arguments {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(format!("Invalid arguments format: string {text:?}")),
        },
        Value::Array(items) => {
            let mut map = Map::new();
            for item in items {
                match item {
                    Value::Array(pair) if pair.len() == 2 => {
                        let mut pair = pair.into_iter();
                        let (Some(Value::String(key)), Some(value)) = (pair.next(), pair.next())
                        else {
                            return Err("Invalid arguments format: array entry key is not a string"
                                .to_string());
                        };
                        map.insert(key, value);
                    }
                    other => {
                        return Err(format!(
                            "Invalid arguments format: array entry {other} is not a [key, value] pair"
                        ));
                    }
                }
            }
            Ok(map)
        }
        other => Err(format!("Invalid arguments format: {other}")),
    }
}

/// Apply the fixup table for `tool` in place.
///
/// Fails with [`McpError::MissingArgument`] when a fixed-up tool still lacks
/// its canonical key.
pub fn apply_fixups(tool: &str, arguments: &mut Map<String, Value>) -> Result<(), McpError> {
    for fixup in ARGUMENT_FIXUPS.iter().filter(|f| f.tool == tool) {
        if !arguments.contains_key(fixup.canonical) {
            if let Some(value) = arguments.remove(fixup.alias) {
                tracing::info!(
                    "Renamed argument '{}' to '{}' for tool '{}'",
                    fixup.alias,
                    fixup.canonical,
                    tool
                );
                arguments.insert(fixup.canonical.to_string(), value);
            }
        }
        if !arguments.contains_key(fixup.canonical) {
            return Err(McpError::MissingArgument {
                tool: tool.to_string(),
                argument: fixup.canonical.to_string(),
            });
        }
    }
    Ok(())
}

/// Reduce a raw provider response to a [`ToolResult`].
///
/// Precedence: a `content` wrapper (first textual element of a list), then a
/// bare `result` field, then the raw payload. An MCP `isError: true` flag or a
/// lone `error` field marks the result as a provider-reported failure.
pub fn normalize_result(raw: Value) -> ToolResult {
    let Value::Object(mut object) = raw else {
        return ToolResult::success(raw);
    };

    let is_error = object
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if let Some(content) = object.remove("content") {
        let payload = unwrap_content(content);
        let error = is_error.then(|| text_of(&payload));
        return ToolResult { payload, error };
    }

    if let Some(result) = object.remove("result") {
        let error = is_error.then(|| text_of(&result));
        return ToolResult {
            payload: result,
            error,
        };
    }

    if let Some(error) = object.get("error") {
        let message = text_of(error);
        return ToolResult {
            payload: Value::Object(object),
            error: Some(message),
        };
    }

    ToolResult::success(Value::Object(object))
}

fn unwrap_content(content: Value) -> Value {
    match content {
        Value::Array(items) => {
            let first_text = items
                .iter()
                .find_map(|item| item.get("text").and_then(Value::as_str));
            match first_text {
                Some(text) => Value::String(text.to_string()),
                None => match items.into_iter().next() {
                    Some(Value::String(s)) => Value::String(s),
                    Some(other) => Value::String(other.to_string()),
                    None => Value::String(String::new()),
                },
            }
        }
        other => other,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_arguments_pass_through() {
        let map = coerce_arguments(json!({"path": "/tmp"})).unwrap();
        assert_eq!(map["path"], "/tmp");
    }

    #[test]
    fn null_arguments_become_empty_map() {
        assert!(coerce_arguments(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn stringified_object_is_parsed() {
        let map = coerce_arguments(json!(r#"{"query": "rust"}"#)).unwrap();
        assert_eq!(map["query"], "rust");
    }

    #[test]
    fn pair_list_is_folded() {
        let map = coerce_arguments(json!([["query", "rust"], ["count", 3]])).unwrap();
        assert_eq!(map["query"], "rust");
        assert_eq!(map["count"], 3);
    }

    #[test]
    fn scalar_arguments_are_rejected() {
        let err = coerce_arguments(json!(42)).unwrap_err();
        assert!(err.starts_with("Invalid arguments format"));
        assert!(coerce_arguments(json!("plain text")).is_err());
        assert!(coerce_arguments(json!([1, 2])).is_err());
    }

    #[test]
    fn search_alias_is_renamed() {
        let mut args = coerce_arguments(json!({"q": "x"})).unwrap();
        apply_fixups("brave_web_search", &mut args).unwrap();
        assert_eq!(args, coerce_arguments(json!({"query": "x"})).unwrap());
    }

    #[test]
    fn canonical_key_wins_over_alias() {
        let mut args = coerce_arguments(json!({"q": "alias", "query": "real"})).unwrap();
        apply_fixups("brave_web_search", &mut args).unwrap();
        assert_eq!(args["query"], "real");
        assert_eq!(args["q"], "alias");
    }

    #[test]
    fn search_without_query_is_missing_argument() {
        let mut args = Map::new();
        match apply_fixups("brave_web_search", &mut args) {
            Err(McpError::MissingArgument { tool, argument }) => {
                assert_eq!(tool, "brave_web_search");
                assert_eq!(argument, "query");
            }
            other => panic!("Expected MissingArgument, got {other:?}"),
        }
    }

    #[test]
    fn other_tools_are_untouched() {
        let mut args = coerce_arguments(json!({"q": "x"})).unwrap();
        apply_fixups("brave_local_search", &mut args).unwrap();
        assert_eq!(args["q"], "x");
        assert!(!args.contains_key("query"));
    }

    #[test]
    fn content_list_yields_first_text() {
        let result = normalize_result(json!({
            "content": [{"type": "text", "text": "hello"}, {"type": "text", "text": "world"}]
        }));
        assert_eq!(result, ToolResult::success("hello"));
    }

    #[test]
    fn content_list_skips_non_text_items() {
        let result = normalize_result(json!({
            "content": [{"type": "image", "data": "..."}, {"type": "text", "text": "caption"}]
        }));
        assert_eq!(result.payload, "caption");
    }

    #[test]
    fn content_without_text_is_stringified() {
        let result = normalize_result(json!({"content": [{"type": "image", "data": "abc"}]}));
        assert_eq!(result.payload, r#"{"data":"abc","type":"image"}"#);
    }

    #[test]
    fn content_string_is_kept() {
        let result = normalize_result(json!({"content": "plain"}));
        assert_eq!(result.payload, "plain");
    }

    #[test]
    fn is_error_flag_sets_error() {
        let result = normalize_result(json!({
            "content": [{"type": "text", "text": "rate limited"}],
            "isError": true
        }));
        assert_eq!(result.error.as_deref(), Some("rate limited"));
    }

    #[test]
    fn result_field_is_returned_unchanged() {
        let result = normalize_result(json!({"result": {"items": [1, 2]}}));
        assert_eq!(result.payload, json!({"items": [1, 2]}));
        assert!(!result.is_error());
    }

    #[test]
    fn content_takes_precedence_over_result() {
        let result = normalize_result(json!({
            "result": "ignored",
            "content": [{"type": "text", "text": "used"}]
        }));
        assert_eq!(result.payload, "used");
    }

    #[test]
    fn bare_error_body_is_a_failure() {
        let result = normalize_result(json!({"error": "boom"}));
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn other_payloads_are_wrapped() {
        assert_eq!(normalize_result(json!({"a": 1})).payload, json!({"a": 1}));
        assert_eq!(normalize_result(json!([1, 2])).payload, json!([1, 2]));
        assert_eq!(normalize_result(json!("text")).payload, "text");
        assert!(normalize_result(Value::Null).payload.is_null());
    }
}
