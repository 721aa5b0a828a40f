//! The boundary to the language model.

use crate::error::GenerateError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use toolrelay_mcp::{ToolCall, ToolInfo};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One entry of the running exchange, including injected tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// What the model produced for one prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    /// A final answer for the user.
    Text(String),
    /// A request to run a tool before answering.
    ToolCall(ToolCall),
}

/// A language model that either answers or asks for a tool.
///
/// Adapters own prompt formatting, model selection and any translation of
/// the tool catalog into a vendor schema. Dyn-compatible so the orchestrator
/// works with `Arc<dyn Generator>`.
pub trait Generator: Send + Sync {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        tools: &'a [ToolInfo],
        history: &'a [ConversationTurn],
    ) -> Pin<Box<dyn Future<Output = Result<Generation, GenerateError>> + Send + 'a>>;

    /// Adapter name for logging (e.g., "ollama").
    fn name(&self) -> &str;
}
