//! Prompt text for the orchestration loop, plus the plain-text tool-call
//! convention for models without native tool calling.

use crate::generator::Generation;
use serde_json::Value;
use toolrelay_mcp::{ToolCall, ToolInfo};

/// Appended to tool output cut at the character limit.
pub const TRUNCATION_NOTICE: &str = "\n[output truncated]";

/// Render the catalog and the `{"tool_call": ...}` reply convention.
pub fn tool_catalog_prompt(tools: &[ToolInfo]) -> String {
    let listing = if tools.is_empty() {
        "(none)".to_string()
    } else {
        tools.iter().map(render_tool).collect::<Vec<_>>().join("\n")
    };
    format!(
        "Available tools:\n\
         {listing}\n\n\
         To use a tool, reply with only a JSON object of the form:\n\
         {{\"tool_call\": {{\"provider_name\": \"...\", \"tool_name\": \"...\", \"arguments\": {{...}}}}}}\n\n\
         Example, searching the web:\n\
         {{\"tool_call\": {{\"provider_name\": \"brave-search\", \"tool_name\": \"brave_web_search\", \"arguments\": {{\"query\": \"latest news\"}}}}}}\n\n\
         Example, listing every available tool:\n\
         {{\"tool_call\": {{\"provider_name\": \"meta\", \"tool_name\": \"list_mcp_tools\", \"arguments\": {{}}}}}}\n\n\
         Otherwise, reply with plain text."
    )
}

fn render_tool(tool: &ToolInfo) -> String {
    format!(
        "- Provider: {}, Tool: {}\n  Description: {}\n  Input schema: {}",
        tool.provider_name, tool.tool_name, tool.description, tool.input_schema
    )
}

/// Recognize a `{"tool_call": {...}}` reply.
///
/// The object may be the whole reply, sit inside a fenced code block, or be
/// wrapped in prose. `server_name` is accepted for `provider_name`.
pub fn parse_text_tool_call(text: &str) -> Option<ToolCall> {
    let trimmed = text.trim();
    let mut candidates = vec![trimmed];
    if let Some(fenced) = fenced_block(trimmed) {
        candidates.push(fenced);
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            candidates.push(&trimmed[start..=end]);
        }
    }
    candidates.into_iter().find_map(parse_candidate)
}

/// Classify a plain-text model reply.
pub fn parse_generation(text: &str) -> Generation {
    match parse_text_tool_call(text) {
        Some(call) => Generation::ToolCall(call),
        None => Generation::Text(text.to_string()),
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip the language tag, if any.
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

fn parse_candidate(candidate: &str) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let call = value.get("tool_call")?;
    let provider = call
        .get("provider_name")
        .or_else(|| call.get("server_name"))?
        .as_str()?;
    let tool = call.get("tool_name")?.as_str()?;
    let arguments = call
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    Some(ToolCall::new(provider, tool, arguments))
}

/// Cut `text` to at most `max_chars` characters, appending
/// [`TRUNCATION_NOTICE`] when anything was removed.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{TRUNCATION_NOTICE}", &text[..cut]),
    }
}

/// Next prompt after a tool ran.
pub fn tool_output_prompt(request: &str, call: &ToolCall, output: &str) -> String {
    format!(
        "User request: {request}\n\n\
         The tool {} returned:\n{output}\n\n\
         Given this tool output, call another tool if you still need one, \
         or give the final answer to the user.",
        call.qualified_name()
    )
}

/// Next prompt after a tool call failed.
pub fn tool_failure_prompt(request: &str, call: &ToolCall, error: &str) -> String {
    format!(
        "User request: {request}\n\n\
         The previous tool call {} failed with: {error}\n\n\
         Retry with different arguments, try another tool, \
         or answer the user directly.",
        call.qualified_name()
    )
}
