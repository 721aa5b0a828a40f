//! Clients for providers served over HTTP, with or without an event stream.

use super::{ClientState, poll_until_ready};
use crate::buffer::LineBuffer;
use crate::config::ProviderConfig;
use crate::error::McpError;
use crate::tool::ToolDescriptor;
use crate::transport::{HttpTransport, SseListener};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Client for a plain request/response HTTP provider.
///
/// There is no handshake: the client is `Ready` from construction until it
/// is closed.
pub struct HttpClient {
    transport: HttpTransport,
    closed: AtomicBool,
    poll_interval: Duration,
}

impl HttpClient {
    pub fn new(name: &str, url: &str, config: &ProviderConfig) -> Result<Self, McpError> {
        Ok(Self {
            transport: HttpTransport::new(name, url, config.request_timeout())?,
            closed: AtomicBool::new(false),
            poll_interval: config.poll_interval(),
        })
    }

    pub fn name(&self) -> &str {
        self.transport.name()
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub fn state(&self) -> ClientState {
        if self.closed.load(Ordering::SeqCst) {
            ClientState::Closed
        } else {
            ClientState::Ready
        }
    }

    fn check_open(&self) -> Result<(), McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::Closed {
                name: self.name().to_string(),
            });
        }
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        self.check_open()?;
        let body = self.transport.get_json(&["tools"]).await?;
        parse_listing(self.name(), body, "tools")
    }

    pub async fn list_resources(&self) -> Result<Vec<serde_json::Value>, McpError> {
        self.check_open()?;
        let body = self.transport.get_json(&["resources"]).await?;
        parse_listing(self.name(), body, "resources")
    }

    /// `POST {base}/tools/{name}/execute` with the arguments as the body.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        self.check_open()?;
        self.transport
            .post_json(
                &["tools", tool_name, "execute"],
                &serde_json::Value::Object(arguments),
            )
            .await
    }

    pub async fn access_resource(&self, uri: &str) -> Result<serde_json::Value, McpError> {
        self.check_open()?;
        self.transport.get_json(&["resources", uri]).await
    }

    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        poll_until_ready(self.name(), timeout, self.poll_interval, || async move {
            self.list_tools().await.map(|_| ())
        })
        .await
    }

    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Closed HTTP provider '{}'", self.name());
        }
    }
}

/// Accept either a bare array or an object wrapping it under `key`.
fn parse_listing<T: DeserializeOwned>(
    name: &str,
    body: serde_json::Value,
    key: &str,
) -> Result<Vec<T>, McpError> {
    let items = match body {
        serde_json::Value::Array(_) => body,
        serde_json::Value::Object(mut map) => match map.remove(key) {
            Some(items) => items,
            None => {
                return Err(McpError::Protocol(format!(
                    "'{name}' returned a {key} listing without a '{key}' field"
                )));
            }
        },
        serde_json::Value::Null => return Ok(Vec::new()),
        other => {
            return Err(McpError::Protocol(format!(
                "'{name}' returned an unexpected {key} listing: {other}"
            )));
        }
    };
    serde_json::from_value(items).map_err(|e| {
        McpError::Protocol(format!("Failed to parse {key} listing from '{name}': {e}"))
    })
}

/// Client for an HTTP provider that also pushes events over SSE.
///
/// Requests use the same surface as [`HttpClient`]. The event stream at the
/// provider's base url is opened on first use, reopened on the next request
/// after it ends, and its payloads are recorded, not correlated to requests.
pub struct SseClient {
    http: HttpClient,
    listener: Mutex<Option<SseListener>>,
    events: Arc<LineBuffer>,
}

impl SseClient {
    pub fn new(name: &str, url: &str, config: &ProviderConfig) -> Result<Self, McpError> {
        Ok(Self {
            http: HttpClient::new(name, url, config)?,
            listener: Mutex::new(None),
            events: Arc::new(LineBuffer::default()),
        })
    }

    pub fn name(&self) -> &str {
        self.http.name()
    }

    pub fn state(&self) -> ClientState {
        self.http.state()
    }

    /// Start the event listener, or restart it once its stream has ended.
    async fn ensure_listener(&self) {
        let mut listener = self.listener.lock().await;
        let running = listener.as_ref().is_some_and(|l| !l.is_finished());
        if !running && self.http.check_open().is_ok() {
            if listener.is_some() {
                tracing::debug!("Reconnecting event stream for '{}'", self.name());
            }
            let transport = self.http.transport();
            *listener = Some(SseListener::spawn(
                self.name(),
                transport.client().clone(),
                transport.base_url().clone(),
                Arc::clone(&self.events),
            ));
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        self.ensure_listener().await;
        self.http.list_tools().await
    }

    pub async fn list_resources(&self) -> Result<Vec<serde_json::Value>, McpError> {
        self.ensure_listener().await;
        self.http.list_resources().await
    }

    pub async fn execute_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        self.ensure_listener().await;
        self.http.execute_tool(tool_name, arguments).await
    }

    pub async fn access_resource(&self, uri: &str) -> Result<serde_json::Value, McpError> {
        self.ensure_listener().await;
        self.http.access_resource(uri).await
    }

    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        poll_until_ready(self.name(), timeout, self.http.poll_interval, || async move {
            self.list_tools().await.map(|_| ())
        })
        .await
    }

    /// Drain the raw payloads of events pushed since the last call.
    pub fn push_events(&self) -> Vec<String> {
        self.events.drain()
    }

    pub async fn close(&self) {
        self.http.close().await;
        let listener = self.listener.lock().await.take();
        if let Some(listener) = listener {
            listener.stop().await;
        }
    }
}
