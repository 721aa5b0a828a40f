//! Byte-level bindings to tool providers.

pub mod http;
pub mod sse;
pub mod stdio;

pub use http::HttpTransport;
pub use sse::{SseEvent, SseListener, SseParser};
pub use stdio::{StdioTransport, spawn_provider_process};
