//! The bounded "ask model, maybe run tool, ask again" loop.

use crate::error::OrchestratorError;
use crate::generator::{ConversationTurn, Generation, Generator};
use crate::prompt::{tool_failure_prompt, tool_output_prompt, truncate_output};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolrelay_mcp::{ToolCall, ToolManager};

/// Model round trips allowed per request.
pub const MAX_ITERATIONS: usize = 3;

/// Tool output beyond this many characters is cut before it reaches the
/// next prompt.
pub const MAX_TOOL_OUTPUT_CHARS: usize = 2000;

/// Returned when the iteration budget runs out without a final answer.
pub const FALLBACK_MESSAGE: &str = "Sorry, I couldn't finish answering your request with the available tools. \
     Please try rephrasing it or asking something simpler.";

/// Events emitted while a request is being processed.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    /// A tool is about to run.
    ToolStart {
        provider: String,
        tool: String,
        arguments: serde_json::Value,
    },
    /// A tool ran; `output` is what the model will see.
    ToolEnd {
        provider: String,
        tool: String,
        output: String,
    },
    /// A tool call failed; the model is told and the loop continues.
    ToolFailed {
        provider: String,
        tool: String,
        error: String,
    },
    /// The iteration budget ran out and the fallback message was returned.
    IterationLimit { iterations: usize },
    /// The run finished (answer or fallback).
    Done,
}

/// Outcome of one orchestrated request.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Model round trips used.
    pub iterations: usize,
    /// Whether `text` is the fallback message.
    pub fell_back: bool,
    /// The request-scoped exchange: user prompt, tool calls, tool output and
    /// the final answer.
    pub turns: Vec<ConversationTurn>,
}

/// Drives a [`Generator`] and a [`ToolManager`] to a single answer.
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    tools: Arc<ToolManager>,
    max_iterations: usize,
    max_tool_output_chars: usize,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn Generator>, tools: Arc<ToolManager>) -> Self {
        Self {
            generator,
            tools,
            max_iterations: MAX_ITERATIONS,
            max_tool_output_chars: MAX_TOOL_OUTPUT_CHARS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_tool_output_chars(mut self, max_chars: usize) -> Self {
        self.max_tool_output_chars = max_chars;
        self
    }

    /// Answer `prompt`, running tools as the model requests them.
    ///
    /// `history` is shown to the model on the first iteration only. Tool
    /// failures consume an iteration but never end the run; exhausting the
    /// budget yields [`FALLBACK_MESSAGE`]. Only a generator failure or
    /// cancellation ends the run with an error.
    pub async fn run<F>(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
        cancel: CancellationToken,
        mut on_event: F,
    ) -> Result<Completion, OrchestratorError>
    where
        F: FnMut(OrchestratorEvent),
    {
        let tools = tokio::select! {
            _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            tools = self.tools.list_all_tools() => tools,
        };
        let mut turns = vec![ConversationTurn::user(prompt)];
        let mut next_prompt = prompt.to_string();

        for iteration in 1..=self.max_iterations {
            let context: &[ConversationTurn] = if iteration == 1 { history } else { &[] };
            tracing::debug!(
                "Iteration {iteration}/{} via {}",
                self.max_iterations,
                self.generator.name()
            );

            let generation = tokio::select! {
                _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
                generation = self.generator.generate(&next_prompt, &tools, context) => generation?,
            };

            let call = match generation {
                Generation::Text(text) => {
                    turns.push(ConversationTurn::assistant(text.clone()));
                    on_event(OrchestratorEvent::Done);
                    return Ok(Completion {
                        text,
                        iterations: iteration,
                        fell_back: false,
                        turns,
                    });
                }
                Generation::ToolCall(call) => call,
            };

            turns.push(ConversationTurn::assistant(describe_call(&call)));
            on_event(OrchestratorEvent::ToolStart {
                provider: call.provider_name.clone(),
                tool: call.tool_name.clone(),
                arguments: call.arguments.clone(),
            });

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
                outcome = self.tools.execute(
                    &call.provider_name,
                    &call.tool_name,
                    call.arguments.clone(),
                ) => outcome,
            };

            let failure = match outcome {
                Ok(result) if !result.is_error() => {
                    let output = self.render_output(&call, &result.payload_text());
                    turns.push(ConversationTurn::tool(output.clone()));
                    next_prompt = tool_output_prompt(prompt, &call, &output);
                    on_event(OrchestratorEvent::ToolEnd {
                        provider: call.provider_name,
                        tool: call.tool_name,
                        output,
                    });
                    continue;
                }
                Ok(result) => result.error.unwrap_or_default(),
                Err(e) => e.to_string(),
            };

            tracing::warn!("Tool {} failed: {failure}", call.qualified_name());
            let error = self.render_output(&call, &failure);
            turns.push(ConversationTurn::tool(format!("Error: {error}")));
            next_prompt = tool_failure_prompt(prompt, &call, &error);
            on_event(OrchestratorEvent::ToolFailed {
                provider: call.provider_name,
                tool: call.tool_name,
                error,
            });
        }

        tracing::warn!(
            "No final answer after {} iterations; returning fallback",
            self.max_iterations
        );
        turns.push(ConversationTurn::assistant(FALLBACK_MESSAGE));
        on_event(OrchestratorEvent::IterationLimit {
            iterations: self.max_iterations,
        });
        on_event(OrchestratorEvent::Done);
        Ok(Completion {
            text: FALLBACK_MESSAGE.to_string(),
            iterations: self.max_iterations,
            fell_back: true,
            turns,
        })
    }

    /// Truncate `text`, then append any stderr the provider produced.
    fn render_output(&self, call: &ToolCall, text: &str) -> String {
        let mut output = truncate_output(text, self.max_tool_output_chars);
        let stderr = self.tools.stderr_messages(&call.provider_name);
        if !stderr.is_empty() {
            output.push_str("\n\nProvider stderr:\n");
            output.push_str(&stderr.join("\n"));
        }
        output
    }
}

fn describe_call(call: &ToolCall) -> String {
    format!("Calling tool {} with {}", call.qualified_name(), call.arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn describe_call_names_tool_and_arguments() {
        let call = ToolCall::new("fs", "read", json!({"path": "/tmp"}));
        assert_eq!(
            describe_call(&call),
            r#"Calling tool fs/read with {"path":"/tmp"}"#
        );
    }

    #[test]
    fn output_without_stderr_is_only_truncated() {
        struct Never;
        impl Generator for Never {
            fn generate<'a>(
                &'a self,
                _prompt: &'a str,
                _tools: &'a [toolrelay_mcp::ToolInfo],
                _history: &'a [ConversationTurn],
            ) -> std::pin::Pin<
                Box<
                    dyn std::future::Future<
                            Output = Result<Generation, crate::error::GenerateError>,
                        > + Send
                        + 'a,
                >,
            > {
                Box::pin(std::future::pending())
            }

            fn name(&self) -> &str {
                "never"
            }
        }

        let orchestrator = Orchestrator::new(Arc::new(Never), Arc::new(ToolManager::new()))
            .with_max_tool_output_chars(5);
        let call = ToolCall::new("meta", "list_mcp_tools", json!({}));
        assert_eq!(
            orchestrator.render_output(&call, "abcdefgh"),
            format!("abcde{}", crate::prompt::TRUNCATION_NOTICE)
        );
        assert_eq!(orchestrator.render_output(&call, "abc"), "abc");
    }
}
