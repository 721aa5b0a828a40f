//! Server-Sent Events parsing and the background push-event listener.
//!
//! Pushed events are observational: they are parsed, logged and recorded in a
//! bounded buffer, but never matched to an outstanding request. Requests to
//! an SSE provider travel over plain HTTP.

use crate::buffer::LineBuffer;
use futures_util::StreamExt;
use reqwest::Url;
use reqwest::header::ACCEPT;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A single SSE event parsed from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

/// Incremental SSE parser that processes bytes into events.
///
/// Bytes are buffered until they form valid UTF-8, so a code point split
/// across two network chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseParser {
    pending_bytes: Vec<u8>,
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw bytes and return any complete events.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending_bytes.extend_from_slice(chunk);
        let valid = match std::str::from_utf8(&self.pending_bytes) {
            Ok(_) => self.pending_bytes.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            // Genuinely invalid bytes: decode lossily rather than stall.
            Err(_) => self.pending_bytes.len(),
        };
        let text = String::from_utf8_lossy(&self.pending_bytes[..valid]).into_owned();
        self.pending_bytes.drain(..valid);
        self.feed(&text)
    }

    /// Feed a chunk of text and return any complete events.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        if self.buffer.contains('\r') {
            // A trailing CR may be the first half of a CRLF split across chunks.
            let held = self.buffer.ends_with('\r');
            if held {
                self.buffer.pop();
            }
            self.buffer = self.buffer.replace("\r\n", "\n").replace('\r', "\n");
            if held {
                self.buffer.push('\r');
            }
        }
        let mut events = Vec::new();

        // Process complete event blocks (separated by double newlines)
        while let Some(pos) = self.buffer.find("\n\n") {
            let block = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + 2);

            if let Some(event) = Self::parse_block(&block) {
                events.push(event);
            }
        }

        events
    }

    /// Parse a single SSE block (lines between double newlines) into an event.
    fn parse_block(block: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_lines = Vec::new();

        for line in block.lines() {
            if line.starts_with(':') {
                continue;
            }

            if let Some((field, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                match field {
                    "event" => event_type = Some(value.to_string()),
                    "data" => data_lines.push(value.to_string()),
                    _ => {}
                }
            } else if line == "data" {
                data_lines.push(String::new());
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
        })
    }
}

/// Background task consuming a provider's event stream.
pub struct SseListener {
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SseListener {
    /// Connect to `url` and start recording pushed events into `events`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(name: &str, http: reqwest::Client, url: Url, events: Arc<LineBuffer>) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listen(name.to_string(), http, url, events, cancel.clone()));
        Self {
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Whether the stream has ended, failed, or been stopped.
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Cancel the listener and wait for it to finish. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!("Event listener task failed: {e}");
                }
            }
        }
    }
}

async fn listen(
    name: String,
    http: reqwest::Client,
    url: Url,
    events: Arc<LineBuffer>,
    cancel: CancellationToken,
) {
    let request = http.get(url.clone()).header(ACCEPT, "text/event-stream").send();
    let response = tokio::select! {
        _ = cancel.cancelled() => return,
        response = request => response,
    };
    let response = match response {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            tracing::warn!("Event stream for '{name}' at {url} returned {}", r.status());
            return;
        }
        Err(e) => {
            tracing::warn!("Event stream connection for '{name}' failed: {e}");
            return;
        }
    };
    tracing::info!("Listening for pushed events from '{name}'");

    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = stream.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                for event in parser.feed_bytes(&bytes) {
                    record_event(&name, event, &events);
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Event stream for '{name}' failed: {e}");
                break;
            }
            None => {
                tracing::info!("Event stream for '{name}' ended");
                break;
            }
        }
    }
}

fn record_event(name: &str, event: SseEvent, events: &LineBuffer) {
    match serde_json::from_str::<serde_json::Value>(&event.data) {
        Ok(value) if value.get("jsonrpc").and_then(|v| v.as_str()) == Some("2.0") => {
            match value.get("id") {
                // Push responses are not correlated to requests.
                Some(id) if !id.is_null() => tracing::debug!(
                    "Uncorrelated JSON-RPC response from '{name}' (id {id}): {}",
                    event.data
                ),
                _ => tracing::debug!("JSON-RPC notification from '{name}': {}", event.data),
            }
        }
        Ok(_) => tracing::debug!("Event from '{name}': {}", event.data),
        Err(_) => tracing::debug!("Non-JSON event from '{name}': {}", event.data),
    }
    events.push(event.data);
}
