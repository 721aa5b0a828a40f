//! A generator whose replies are read line by line from an input stream.
//!
//! `toolrelay chat` uses it with stdin so a person (or a piped model) plays
//! the model: each prompt is shown on stderr and the next input line is the
//! reply, either plain text or a `{"tool_call": ...}` object.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Mutex;
use toolrelay_core::prompt::{parse_generation, tool_catalog_prompt};
use toolrelay_core::{ConversationTurn, GenerateError, Generation, Generator};
use toolrelay_mcp::ToolInfo;

pub struct ConsoleGenerator<R> {
    input: Mutex<R>,
    catalog_shown: AtomicBool,
}

impl<R> ConsoleGenerator<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
            catalog_shown: AtomicBool::new(false),
        }
    }
}

impl<R> Generator for ConsoleGenerator<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        tools: &'a [ToolInfo],
        history: &'a [ConversationTurn],
    ) -> Pin<Box<dyn Future<Output = Result<Generation, GenerateError>> + Send + 'a>> {
        Box::pin(async move {
            if !self.catalog_shown.swap(true, Ordering::SeqCst) {
                eprintln!("{}\n", tool_catalog_prompt(tools));
            }
            for turn in history {
                eprintln!("[{:?}] {}", turn.role, turn.content);
            }
            eprintln!("--- prompt ---\n{prompt}\n--- reply (one line) ---");

            let mut line = String::new();
            let read = self
                .input
                .lock()
                .await
                .read_line(&mut line)
                .await
                .map_err(|e| GenerateError::Request(format!("failed to read reply: {e}")))?;
            if read == 0 {
                return Err(GenerateError::Request("input closed before a reply".into()));
            }

            let reply = line.trim();
            if reply.is_empty() {
                return Err(GenerateError::InvalidResponse("empty reply".into()));
            }
            Ok(parse_generation(reply))
        })
    }

    fn name(&self) -> &str {
        "console"
    }
}
