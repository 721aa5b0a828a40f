//! Plain-text rendering for command output.

use std::collections::HashMap;
use toolrelay_core::OrchestratorEvent;
use toolrelay_mcp::{ClientState, ToolInfo};

/// One line per tool: `provider/tool  description`.
pub fn format_tools(tools: &[ToolInfo]) -> String {
    let width = tools
        .iter()
        .map(|t| t.qualified_name().chars().count())
        .max()
        .unwrap_or(0);
    tools
        .iter()
        .map(|tool| {
            let description = tool.description.lines().next().unwrap_or("");
            format!("{:<width$}  {description}\n", tool.qualified_name())
        })
        .collect()
}

/// `uri  name`, falling back to the raw JSON for unrecognized shapes.
pub fn format_resource(resource: &serde_json::Value) -> String {
    match resource.get("uri").and_then(|u| u.as_str()) {
        Some(uri) => match resource.get("name").and_then(|n| n.as_str()) {
            Some(name) => format!("{uri}  {name}"),
            None => uri.to_string(),
        },
        None => resource.to_string(),
    }
}

/// `name  state  ready|degraded` per provider.
pub fn format_status(states: &[(String, ClientState)], readiness: &[(String, bool)]) -> String {
    if states.is_empty() {
        return "No providers configured.\n".to_string();
    }
    let ready: HashMap<&str, bool> = readiness
        .iter()
        .map(|(name, ok)| (name.as_str(), *ok))
        .collect();
    let width = states.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
    states
        .iter()
        .map(|(name, state)| {
            let health = match ready.get(name.as_str()) {
                Some(false) => "degraded",
                _ => "ready",
            };
            format!("{name:<width$}  {state:<13}  {health}\n")
        })
        .collect()
}

/// A progress line for a loop event, if it warrants one.
pub fn format_event(event: &OrchestratorEvent) -> Option<String> {
    match event {
        OrchestratorEvent::ToolStart {
            provider,
            tool,
            arguments,
        } => Some(format!("  [tool: {provider}/{tool} {arguments}]")),
        OrchestratorEvent::ToolEnd {
            provider,
            tool,
            output,
        } => Some(format!(
            "  [tool {provider}/{tool} done: {} chars]",
            output.chars().count()
        )),
        OrchestratorEvent::ToolFailed {
            provider,
            tool,
            error,
        } => Some(format!("  [tool {provider}/{tool} error: {error}]")),
        OrchestratorEvent::IterationLimit { iterations } => {
            Some(format!("  [no answer after {iterations} round trip(s)]"))
        }
        OrchestratorEvent::Done => None,
    }
}
