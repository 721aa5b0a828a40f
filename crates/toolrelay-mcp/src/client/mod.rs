//! Protocol clients, one per registered provider.
//!
//! [`ProviderClient`] is the closed set of transport variants behind one
//! capability surface. The variant is chosen once, by
//! [`ProviderClient::from_config`], from the provider's declared `type`.

pub mod http;
pub mod stdio;

pub use http::{HttpClient, SseClient};
pub use stdio::{PROTOCOL_VERSION, StdioClient};

use crate::config::{ProviderConfig, TransportKind};
use crate::error::McpError;
use crate::tool::ToolDescriptor;
use std::future::Future;
use std::time::Duration;
use tokio::process::Child;
use tokio::time::Instant;

/// Handshake lifecycle of a provider client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ClientState::Uninitialized => "uninitialized",
            ClientState::Initializing => "initializing",
            ClientState::Ready => "ready",
            ClientState::Closed => "closed",
        };
        f.pad(label)
    }
}

/// A client bound to one provider over one transport.
pub enum ProviderClient {
    Stdio(StdioClient),
    Http(HttpClient),
    Sse(SseClient),
}

impl ProviderClient {
    /// Build the client implied by `config`.
    ///
    /// `stdio` providers need the already-spawned `process`; `http` and
    /// `sse` providers need a `url`.
    pub fn from_config(
        name: &str,
        config: &ProviderConfig,
        process: Option<Child>,
    ) -> Result<Self, McpError> {
        match config.kind {
            TransportKind::Stdio => {
                let process = process.ok_or_else(|| McpError::InvalidConfig {
                    name: name.to_string(),
                    message: "stdio provider requires a running process".to_string(),
                })?;
                Ok(Self::Stdio(StdioClient::new(name, process, config)?))
            }
            TransportKind::Sse => {
                let url = require_url(name, config)?;
                Ok(Self::Sse(SseClient::new(name, url, config)?))
            }
            TransportKind::Http => {
                let url = require_url(name, config)?;
                Ok(Self::Http(HttpClient::new(name, url, config)?))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Stdio(c) => c.name(),
            Self::Http(c) => c.name(),
            Self::Sse(c) => c.name(),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::Http(_) => TransportKind::Http,
            Self::Sse(_) => TransportKind::Sse,
        }
    }

    pub async fn state(&self) -> ClientState {
        match self {
            Self::Stdio(c) => c.state().await,
            Self::Http(c) => c.state(),
            Self::Sse(c) => c.state(),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        match self {
            Self::Stdio(c) => c.list_tools().await,
            Self::Http(c) => c.list_tools().await,
            Self::Sse(c) => c.list_tools().await,
        }
    }

    pub async fn list_resources(&self) -> Result<Vec<serde_json::Value>, McpError> {
        match self {
            Self::Stdio(c) => c.list_resources().await,
            Self::Http(c) => c.list_resources().await,
            Self::Sse(c) => c.list_resources().await,
        }
    }

    pub async fn execute_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        match self {
            Self::Stdio(c) => c.execute_tool(tool_name, arguments).await,
            Self::Http(c) => c.execute_tool(tool_name, arguments).await,
            Self::Sse(c) => c.execute_tool(tool_name, arguments).await,
        }
    }

    pub async fn access_resource(&self, uri: &str) -> Result<serde_json::Value, McpError> {
        match self {
            Self::Stdio(c) => c.access_resource(uri).await,
            Self::Http(c) => c.access_resource(uri).await,
            Self::Sse(c) => c.access_resource(uri).await,
        }
    }

    /// Drain captured stderr lines. Always empty for network providers.
    pub fn get_stderr_messages(&self) -> Vec<String> {
        match self {
            Self::Stdio(c) => c.stderr_messages(),
            Self::Http(_) | Self::Sse(_) => Vec::new(),
        }
    }

    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        match self {
            Self::Stdio(c) => c.wait_until_ready(timeout).await,
            Self::Http(c) => c.wait_until_ready(timeout).await,
            Self::Sse(c) => c.wait_until_ready(timeout).await,
        }
    }

    /// Release the transport. Idempotent; never fails.
    pub async fn close(&self) {
        match self {
            Self::Stdio(c) => c.close().await,
            Self::Http(c) => c.close().await,
            Self::Sse(c) => c.close().await,
        }
    }
}

fn require_url<'a>(name: &str, config: &'a ProviderConfig) -> Result<&'a str, McpError> {
    match config.url.as_deref() {
        Some(url) if !url.trim().is_empty() => Ok(url),
        _ => Err(McpError::InvalidConfig {
            name: name.to_string(),
            message: "network provider requires a 'url'".to_string(),
        }),
    }
}

/// Retry `attempt` until it succeeds or `timeout` elapses.
///
/// Each attempt is bounded by the remaining deadline, and attempts are
/// separated by `interval`. Failures are logged, never returned.
pub(crate) async fn poll_until_ready<F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    mut attempt: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), McpError>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, attempt()).await {
            Ok(Ok(())) => {
                tracing::info!("Provider '{name}' ready after {attempts} attempt(s)");
                return true;
            }
            Ok(Err(e)) => tracing::debug!("Provider '{name}' not ready yet: {e}"),
            Err(_) => tracing::debug!("Provider '{name}' readiness attempt ran out of time"),
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(
                "Provider '{name}' did not become ready within {}ms",
                timeout.as_millis()
            );
            return false;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
