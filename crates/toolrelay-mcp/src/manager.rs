//! Provider registry: many named clients behind one catalog and one dispatch
//! point.

use crate::client::{ClientState, ProviderClient};
use crate::config::{ProviderConfig, ProvidersConfig, TransportKind};
use crate::error::McpError;
use crate::normalize::{apply_fixups, coerce_arguments, normalize_result};
use crate::tool::{ToolInfo, ToolResult, is_meta_tool};
use crate::transport::spawn_provider_process;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::process::Child;

/// Text returned by the meta tool when no provider exposes any tool.
pub const NO_TOOLS_MESSAGE: &str = "No tools available.";

/// Owns every registered provider client.
#[derive(Default)]
pub struct ToolManager {
    clients: HashMap<String, Arc<ProviderClient>>,
    /// Providers that failed their last readiness poll.
    degraded: Mutex<HashSet<String>>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn and register every configured provider.
    ///
    /// Providers that fail to start are logged and skipped; the session
    /// continues with whatever providers are available. Must be called from
    /// within a Tokio runtime.
    pub fn start(config: &ProvidersConfig) -> Self {
        let mut manager = Self::new();
        let mut names: Vec<&String> = config.providers.keys().collect();
        names.sort();

        for name in names {
            let provider = &config.providers[name];
            let process = if provider.kind == TransportKind::Stdio {
                match spawn_provider_process(name, provider) {
                    Ok(child) => Some(child),
                    Err(e) => {
                        tracing::warn!("Failed to start tool provider '{name}': {e}");
                        continue;
                    }
                }
            } else {
                None
            };
            if let Err(e) = manager.register(name, provider, process) {
                tracing::warn!("Failed to register tool provider '{name}': {e}");
            }
        }

        manager
    }

    /// Build the client implied by `config` and store it under `name`.
    ///
    /// An existing client with the same name is replaced without being
    /// closed; close it first if its cleanup matters.
    pub fn register(
        &mut self,
        name: &str,
        config: &ProviderConfig,
        process: Option<Child>,
    ) -> Result<(), McpError> {
        let client = ProviderClient::from_config(name, config, process)?;
        if self
            .clients
            .insert(name.to_string(), Arc::new(client))
            .is_some()
        {
            tracing::warn!("Tool provider '{name}' re-registered; previous client replaced");
        } else {
            tracing::info!("Registered {:?} tool provider '{name}'", config.kind);
        }
        self.degraded_set().remove(name);
        Ok(())
    }

    pub fn client(&self, name: &str) -> Option<Arc<ProviderClient>> {
        self.clients.get(name).cloned()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_degraded(&self, name: &str) -> bool {
        self.degraded_set().contains(name)
    }

    fn degraded_set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.degraded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, name: &str) -> Result<&Arc<ProviderClient>, McpError> {
        self.clients.get(name).ok_or_else(|| McpError::UnknownProvider {
            name: name.to_string(),
        })
    }

    /// Poll every provider for readiness concurrently.
    ///
    /// Providers that do not become ready within `timeout` are marked
    /// degraded and left out of the catalog. Returns `(name, ready)` pairs
    /// sorted by name.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Vec<(String, bool)> {
        let polls = self.clients.iter().map(|(name, client)| async move {
            (name.clone(), client.wait_until_ready(timeout).await)
        });
        let mut outcomes = futures_util::future::join_all(polls).await;
        outcomes.sort();

        let mut degraded = self.degraded_set();
        for (name, ready) in &outcomes {
            if *ready {
                degraded.remove(name);
            } else {
                tracing::warn!("Tool provider '{name}' is degraded; its tools are unavailable");
                degraded.insert(name.clone());
            }
        }
        outcomes
    }

    /// Handshake state of every provider, sorted by name.
    pub async fn states(&self) -> Vec<(String, ClientState)> {
        let mut states = Vec::with_capacity(self.clients.len());
        for name in self.provider_names() {
            if let Some(client) = self.clients.get(&name) {
                states.push((name, client.state().await));
            }
        }
        states
    }

    /// The meta tool followed by every real tool, sorted by provider then
    /// tool name.
    pub async fn list_all_tools(&self) -> Vec<ToolInfo> {
        let mut tools = vec![ToolInfo::meta()];
        tools.extend(self.list_provider_tools().await);
        tools
    }

    /// Fan `list_tools` out to every non-degraded provider. Failing providers
    /// contribute nothing.
    async fn list_provider_tools(&self) -> Vec<ToolInfo> {
        let degraded = self.degraded_set().clone();
        let listings = self
            .clients
            .iter()
            .filter(|(name, _)| !degraded.contains(*name))
            .map(|(name, client)| async move {
                match client.list_tools().await {
                    Ok(tools) => tools
                        .into_iter()
                        .map(|t| t.into_info(name))
                        .filter(|t| !t.is_meta())
                        .collect(),
                    Err(e) => {
                        tracing::warn!("Failed to list tools from '{name}': {e}");
                        Vec::new()
                    }
                }
            });

        let mut tools: Vec<ToolInfo> = futures_util::future::join_all(listings)
            .await
            .into_iter()
            .flatten()
            .collect();
        tools.sort_by(|a, b| {
            (&a.provider_name, &a.tool_name).cmp(&(&b.provider_name, &b.tool_name))
        });
        tools
    }

    /// Text listing of every real tool, as returned by the meta tool.
    pub async fn catalog_listing(&self) -> String {
        format_listing(&self.list_provider_tools().await)
    }

    /// Invoke a tool and normalize its result.
    ///
    /// Runtime failures come back as `ToolResult { error }`. Only caller
    /// mistakes (unknown provider, missing required argument) are raised.
    pub async fn execute(
        &self,
        provider_name: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, McpError> {
        if is_meta_tool(provider_name, tool_name) {
            return Ok(ToolResult::success(self.catalog_listing().await));
        }

        let client = self.lookup(provider_name)?;
        let mut arguments = match coerce_arguments(arguments) {
            Ok(map) => map,
            Err(message) => {
                tracing::warn!("Rejected arguments for {provider_name}/{tool_name}: {message}");
                return Ok(ToolResult::failure(message));
            }
        };
        apply_fixups(tool_name, &mut arguments)?;

        tracing::debug!("Executing {provider_name}/{tool_name}");
        match client.execute_tool(tool_name, arguments).await {
            Ok(raw) => Ok(normalize_result(raw)),
            Err(e) if e.is_caller_error() => Err(e),
            Err(e) => {
                tracing::warn!("Tool {provider_name}/{tool_name} failed: {e}");
                Ok(ToolResult::failure(e.to_string()))
            }
        }
    }

    pub async fn list_resources(
        &self,
        provider_name: &str,
    ) -> Result<Vec<serde_json::Value>, McpError> {
        self.lookup(provider_name)?.list_resources().await
    }

    pub async fn access_resource(
        &self,
        provider_name: &str,
        uri: &str,
    ) -> Result<serde_json::Value, McpError> {
        self.lookup(provider_name)?.access_resource(uri).await
    }

    /// Drain a provider's captured stderr. Empty for unknown providers.
    pub fn stderr_messages(&self, provider_name: &str) -> Vec<String> {
        self.clients
            .get(provider_name)
            .map(|c| c.get_stderr_messages())
            .unwrap_or_default()
    }

    /// Close every client concurrently. Never fails.
    pub async fn close_all(&self) {
        let closes = self.clients.iter().map(|(name, client)| async move {
            client.close().await;
            tracing::debug!("Closed tool provider '{name}'");
        });
        futures_util::future::join_all(closes).await;
    }
}

fn format_listing(tools: &[ToolInfo]) -> String {
    let blocks: Vec<String> = tools
        .iter()
        .filter(|t| !t.is_meta())
        .map(|t| {
            format!(
                "- Provider: {}, Tool: {}\n  Description: {}\n  Input schema: {}",
                t.provider_name, t.tool_name, t.description, t.input_schema
            )
        })
        .collect();
    if blocks.is_empty() {
        NO_TOOLS_MESSAGE.to_string()
    } else {
        blocks.join("\n")
    }
}
