//! Errors raised by the orchestration loop and the model boundary.

use thiserror::Error;

/// Failure reported by a [`Generator`](crate::Generator).
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Unusable model response: {0}")]
    InvalidResponse(String),
}

/// Errors that end an orchestration run without an answer.
///
/// Tool failures are never among them: those are fed back to the model.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Generator error: {0}")]
    Generator(#[from] GenerateError),

    #[error("Operation cancelled")]
    Cancelled,
}
