//! Error types for tool-provider operations.

use thiserror::Error;

/// Errors from tool-provider communication and registry dispatch.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn tool provider '{name}': {source}")]
    SpawnFailed {
        name: String,
        source: std::io::Error,
    },

    #[error("Invalid configuration for tool provider '{name}': {message}")]
    InvalidConfig { name: String, message: String },

    #[error("Transport error talking to '{name}': {message}")]
    Transport { name: String, message: String },

    #[error("HTTP {status} from '{name}': {body}")]
    Http {
        name: String,
        status: u16,
        body: String,
    },

    #[error("JSON-RPC error from '{server}' (code {code}): {message}")]
    JsonRpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("Request '{method}' to '{name}' timed out after {timeout_ms}ms")]
    Timeout {
        name: String,
        method: String,
        timeout_ms: u64,
    },

    #[error("Tool provider '{name}' is closed")]
    Closed { name: String },

    #[error("Tool provider '{name}' is not registered")]
    UnknownProvider { name: String },

    #[error("Missing required argument '{argument}' for tool '{tool}'")]
    MissingArgument { tool: String, argument: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Whether this error stems from a structurally invalid request by the
    /// caller rather than a runtime failure. The registry raises these instead
    /// of folding them into a tool result.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            McpError::UnknownProvider { .. } | McpError::MissingArgument { .. }
        )
    }

    pub(crate) fn transport(name: &str, message: impl std::fmt::Display) -> Self {
        McpError::Transport {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}
