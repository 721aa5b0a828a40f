//! Protocol client for a provider reached over a pipe.
//!
//! Handles the handshake (`initialize` request + `initialized` notification),
//! tool discovery (`tools/list`), invocation (`tools/call`) and resource
//! access (`resources/list`, `resources/read`).

use super::{ClientState, poll_until_ready};
use crate::config::ProviderConfig;
use crate::error::McpError;
use crate::tool::ToolDescriptor;
use crate::transport::StdioTransport;
use serde::Deserialize;
use std::sync::PoisonError;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Mutex;

/// MCP protocol version we support.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name announced during the handshake.
pub const CLIENT_NAME: &str = "toolrelay";

#[derive(Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

#[derive(Deserialize)]
struct ResourcesListResult {
    #[serde(default)]
    resources: Vec<serde_json::Value>,
}

/// Client for a single pipe-connected provider.
pub struct StdioClient {
    name: String,
    transport: StdioTransport,
    /// Serializes handshake attempts; held across the `initialize` round trip.
    handshake: Mutex<()>,
    state: std::sync::Mutex<ClientState>,
    poll_interval: Duration,
}

impl StdioClient {
    /// Wrap an already-spawned provider process.
    pub fn new(name: &str, process: Child, config: &ProviderConfig) -> Result<Self, McpError> {
        let transport = StdioTransport::new(
            name,
            process,
            config.request_timeout(),
            config.shutdown_timeouts(),
        )?;
        Ok(Self {
            name: name.to_string(),
            transport,
            handshake: Mutex::new(()),
            state: std::sync::Mutex::new(ClientState::Uninitialized),
            poll_interval: config.poll_interval(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ClientState {
        if self.transport.is_closed() {
            return ClientState::Closed;
        }
        self.current_state()
    }

    fn current_state(&self) -> ClientState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ClientState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Run the handshake unless it already succeeded.
    ///
    /// Concurrent callers queue on the handshake lock behind a single
    /// attempt. A failed attempt leaves the client `Initializing` so the next
    /// caller retries. [`state`](Self::state) never waits on the handshake.
    pub async fn ensure_ready(&self) -> Result<(), McpError> {
        let _handshake = self.handshake.lock().await;
        if self.transport.is_closed() {
            return Err(McpError::Closed {
                name: self.name.clone(),
            });
        }
        if self.current_state() == ClientState::Ready {
            return Ok(());
        }
        self.set_state(ClientState::Initializing);

        let init_params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "roots": { "listChanged": true },
                "sampling": {}
            },
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let result = self
            .transport
            .send_request("initialize", Some(init_params))
            .await?;
        if !result.is_object() {
            return Err(McpError::Protocol(format!(
                "'{}' answered initialize with a non-object result: {result}",
                self.name
            )));
        }
        tracing::debug!(
            "Provider '{}' speaks protocol {} ({})",
            self.name,
            result["protocolVersion"].as_str().unwrap_or("unknown"),
            result["serverInfo"]["name"].as_str().unwrap_or("unnamed server")
        );

        self.transport
            .send_notification("initialized", Some(serde_json::json!({})))
            .await?;

        self.set_state(ClientState::Ready);
        tracing::info!("Provider '{}' initialized", self.name);
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        self.ensure_ready().await?;
        let result = self.transport.send_request("tools/list", None).await?;
        let list: ToolsListResult = serde_json::from_value(result).map_err(|e| {
            McpError::Protocol(format!("Failed to parse tools/list response: {e}"))
        })?;
        Ok(list.tools)
    }

    pub async fn list_resources(&self) -> Result<Vec<serde_json::Value>, McpError> {
        self.ensure_ready().await?;
        let result = self.transport.send_request("resources/list", None).await?;
        let list: ResourcesListResult = serde_json::from_value(result).map_err(|e| {
            McpError::Protocol(format!("Failed to parse resources/list response: {e}"))
        })?;
        Ok(list.resources)
    }

    /// Call a tool and return the raw result payload.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        self.ensure_ready().await?;
        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });
        self.transport.send_request("tools/call", Some(params)).await
    }

    pub async fn access_resource(&self, uri: &str) -> Result<serde_json::Value, McpError> {
        self.ensure_ready().await?;
        self.transport
            .send_request("resources/read", Some(serde_json::json!({ "uri": uri })))
            .await
    }

    /// Poll handshake + a trial `tools/list` until both succeed or `timeout`
    /// elapses. Never fails.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        poll_until_ready(&self.name, timeout, self.poll_interval, || async move {
            self.ensure_ready().await?;
            self.list_tools().await.map(|_| ())
        })
        .await
    }

    pub fn stderr_messages(&self) -> Vec<String> {
        self.transport.stderr_messages()
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}
