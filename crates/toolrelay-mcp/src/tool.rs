//! Tool catalog and invocation types shared by the registry and its callers.

use serde::{Deserialize, Serialize};

/// Provider name of the synthetic catalog-listing tool.
pub const META_PROVIDER: &str = "meta";

/// Tool name of the synthetic catalog-listing tool.
pub const META_TOOL: &str = "list_mcp_tools";

/// A tool in the aggregated catalog, tagged with the provider that owns it.
///
/// Uniquely identified by `(provider_name, tool_name)`. The input schema is
/// opaque and handed to the model verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub provider_name: String,
    pub tool_name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolInfo {
    /// The synthetic tool that lists every other tool in the catalog.
    pub fn meta() -> Self {
        Self {
            provider_name: META_PROVIDER.to_string(),
            tool_name: META_TOOL.to_string(),
            description: "Lists every available tool with its provider, description and input schema."
                .to_string(),
            input_schema: serde_json::json!({}),
        }
    }

    pub fn is_meta(&self) -> bool {
        is_meta_tool(&self.provider_name, &self.tool_name)
    }

    /// `provider/tool`, for logs and prompts.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.provider_name, self.tool_name)
    }
}

/// Whether `(provider, tool)` addresses the synthetic catalog-listing tool.
pub fn is_meta_tool(provider: &str, tool: &str) -> bool {
    provider == META_PROVIDER && tool == META_TOOL
}

/// A tool as advertised by one provider, before it is tagged with the
/// provider's name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema", alias = "input_schema")]
    pub input_schema: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ToolDescriptor {
    pub fn into_info(self, provider_name: &str) -> ToolInfo {
        ToolInfo {
            provider_name: provider_name.to_string(),
            tool_name: self.name,
            description: self.description.unwrap_or_default(),
            input_schema: self.input_schema,
        }
    }
}

/// A model's request to invoke a tool.
///
/// `arguments` is kept as raw JSON: models do not always return an object,
/// and the registry coerces it before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub provider_name: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        provider_name: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.provider_name, self.tool_name)
    }
}

/// Normalized outcome of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(payload: impl Into<serde_json::Value>) -> Self {
        Self {
            payload: payload.into(),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The payload as display text: strings verbatim, anything else as
    /// compact JSON.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
