//! Plain HTTP transport: one JSON request, one JSON response, no envelope.

use crate::error::McpError;
use reqwest::{Method, Url};
use std::time::Duration;

/// HTTP binding to a provider's REST surface.
#[derive(Clone)]
pub struct HttpTransport {
    name: String,
    http: reqwest::Client,
    base: Url,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(name: &str, base_url: &str, request_timeout: Duration) -> Result<Self, McpError> {
        let base = Url::parse(base_url).map_err(|e| McpError::InvalidConfig {
            name: name.to_string(),
            message: format!("invalid url '{base_url}': {e}"),
        })?;
        if base.cannot_be_a_base() {
            return Err(McpError::InvalidConfig {
                name: name.to_string(),
                message: format!("url '{base_url}' cannot be used as a base"),
            });
        }

        // No client-wide timeout: the event stream is long-lived, so each
        // request sets its own.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| McpError::transport(name, e))?;

        Ok(Self {
            name: name.to_string(),
            http,
            base,
            request_timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Build `{base}/{segments...}`, percent-encoding each segment so values
    /// such as resource URIs survive as a single path component.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn get_json(&self, segments: &[&str]) -> Result<serde_json::Value, McpError> {
        self.send(Method::GET, segments, None).await
    }

    pub async fn post_json(
        &self,
        segments: &[&str],
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        self.send(Method::POST, segments, Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let url = self.endpoint(segments);
        tracing::debug!("{method} {url} ({})", self.name);

        let mut request = self
            .http
            .request(method, url)
            .timeout(self.request_timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.classify(e, segments))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http {
                name: self.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.classify(e, segments))?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            McpError::Protocol(format!("'{}' returned invalid JSON: {e}", self.name))
        })
    }

    fn classify(&self, err: reqwest::Error, segments: &[&str]) -> McpError {
        if err.is_timeout() {
            McpError::Timeout {
                name: self.name.clone(),
                method: segments.join("/"),
                timeout_ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            McpError::transport(&self.name, err)
        }
    }
}
