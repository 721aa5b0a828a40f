//! Tool-calling orchestration for toolrelay.
//!
//! An [`Orchestrator`] alternates between asking a [`Generator`] for the next
//! step and running the tool it asks for through a
//! [`ToolManager`](toolrelay_mcp::ToolManager), bounded by an iteration
//! budget.

mod error;
mod generator;
mod orchestrator;
pub mod prompt;

pub use error::{GenerateError, OrchestratorError};
pub use generator::{ConversationTurn, Generation, Generator, Role};
pub use orchestrator::{
    Completion, FALLBACK_MESSAGE, MAX_ITERATIONS, MAX_TOOL_OUTPUT_CHARS, Orchestrator,
    OrchestratorEvent,
};
