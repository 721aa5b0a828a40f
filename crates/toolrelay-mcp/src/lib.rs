//! Tool-provider client for toolrelay.
//!
//! Providers speak the Model Context Protocol over one of three transports:
//! newline-delimited JSON-RPC 2.0 on a child process's stdin/stdout, plain
//! HTTP request/response, or HTTP with a server-pushed event stream. The
//! [`ToolManager`] owns one client per provider, aggregates their tool
//! catalogs and routes invocations.

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod manager;
pub mod normalize;
pub mod tool;
pub mod transport;

pub use client::{ClientState, ProviderClient};
pub use config::{ProviderConfig, ProvidersConfig, ShutdownTimeouts, TransportKind};
pub use error::McpError;
pub use manager::ToolManager;
pub use tool::{ToolCall, ToolInfo, ToolResult};
pub use transport::spawn_provider_process;
