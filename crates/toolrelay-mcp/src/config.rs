//! Configuration types for tool providers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn default_timeout() -> u64 {
    30000
}

fn default_shutdown_grace() -> u64 {
    3000
}

fn default_kill_wait() -> u64 {
    2000
}

fn default_poll_interval() -> u64 {
    1000
}

/// All configured tool providers, keyed by provider name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Which wire binding a provider speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC over a child process's stdin/stdout.
    Stdio,
    /// HTTP requests plus a server-pushed event stream.
    Sse,
    /// Plain HTTP request/response. Unrecognized types land here too.
    #[default]
    #[serde(other)]
    Http,
}

/// Configuration for a single tool provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type", default)]
    pub kind: TransportKind,
    /// Command to run for `stdio` providers (e.g., "npx", "python").
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to set for the provider process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Base URL for `http` and `sse` providers.
    #[serde(default)]
    pub url: Option<String>,
    /// Timeout for each request in milliseconds (default: 30000).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// How long `close` waits for a provider process to exit on its own.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
    /// How long `close` waits after killing a provider process.
    #[serde(default = "default_kill_wait")]
    pub kill_wait_ms: u64,
    /// Pause between readiness attempts.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl ProviderConfig {
    /// A `stdio` provider launched with `command` and `args`.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            kind: TransportKind::Stdio,
            command: Some(command.into()),
            args,
            url: None,
            ..Self::http("")
        }
    }

    /// An `http` provider rooted at `url`.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Http,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            timeout_ms: default_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
            kill_wait_ms: default_kill_wait(),
            poll_interval_ms: default_poll_interval(),
        }
    }

    /// An `sse` provider rooted at `url`.
    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            kind: TransportKind::Sse,
            ..Self::http(url)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeouts(&self) -> ShutdownTimeouts {
        ShutdownTimeouts {
            graceful: Duration::from_millis(self.shutdown_grace_ms),
            kill_wait: Duration::from_millis(self.kill_wait_ms),
        }
    }
}

/// Layered bounds for tearing down a provider process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeouts {
    /// Wait for a voluntary exit after stdin is closed.
    pub graceful: Duration,
    /// Wait for exit after a forced kill before giving up.
    pub kill_wait: Duration,
}

impl Default for ShutdownTimeouts {
    fn default() -> Self {
        Self {
            graceful: Duration::from_millis(default_shutdown_grace()),
            kill_wait: Duration::from_millis(default_kill_wait()),
        }
    }
}
