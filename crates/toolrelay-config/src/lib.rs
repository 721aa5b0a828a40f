//! Multi-tier configuration for toolrelay.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > settings file > defaults

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use toolrelay_core::{MAX_ITERATIONS, MAX_TOOL_OUTPUT_CHARS};
use toolrelay_mcp::{ProviderConfig, ProvidersConfig};

/// Default overall deadline for provider readiness, in seconds.
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 60;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Resolved configuration for a toolrelay session.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub providers: ProvidersConfig,
    pub max_iterations: usize,
    pub max_tool_output_chars: usize,
    pub ready_timeout: Duration,
    pub config_dir: PathBuf,
}

/// Settings that can be read from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    /// Raw provider tables; validated when the config is resolved.
    #[serde(default)]
    pub providers: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub orchestration: OrchestrationSettings,
    #[serde(default)]
    pub readiness: ReadinessSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationSettings {
    pub max_iterations: Option<usize>,
    pub max_tool_output_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadinessSettings {
    pub timeout_secs: Option<u64>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub providers_file: Option<PathBuf>,
    pub ready_timeout_secs: Option<u64>,
}

impl RelayConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables (`TOOLRELAY_PROVIDERS`)
    /// 3. Settings file (~/.toolrelay/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"));
        let providers_file = overrides
            .providers_file
            .clone()
            .or_else(|| std::env::var_os("TOOLRELAY_PROVIDERS").map(PathBuf::from));
        Self::resolve(config_dir, settings, providers_file.as_deref(), &overrides)
    }

    /// Combine already-read settings with the provider file and overrides.
    pub fn resolve(
        config_dir: PathBuf,
        settings: SettingsFile,
        providers_file: Option<&Path>,
        overrides: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        let mut providers = HashMap::with_capacity(settings.providers.len());
        for (name, entry) in settings.providers {
            match parse_provider(&name, entry) {
                Ok(config) => {
                    providers.insert(name, config);
                }
                Err(e) => tracing::warn!("Skipping provider in config.toml: {e}"),
            }
        }

        // Provider file entries replace same-named settings entries.
        if let Some(path) = providers_file {
            let from_file = load_providers_file(path)?;
            tracing::debug!(
                "Loaded {} provider(s) from {}",
                from_file.len(),
                path.display()
            );
            providers.extend(from_file);
        }

        let max_iterations = settings
            .orchestration
            .max_iterations
            .unwrap_or(MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "orchestration.max_iterations".into(),
                message: "must be at least 1".into(),
            });
        }

        let max_tool_output_chars = settings
            .orchestration
            .max_tool_output_chars
            .unwrap_or(MAX_TOOL_OUTPUT_CHARS);

        // Resolve readiness deadline: CLI > config file > default
        let ready_timeout_secs = overrides
            .ready_timeout_secs
            .or(settings.readiness.timeout_secs)
            .unwrap_or(DEFAULT_READY_TIMEOUT_SECS);

        Ok(RelayConfig {
            providers: ProvidersConfig { providers },
            max_iterations,
            max_tool_output_chars,
            ready_timeout: Duration::from_secs(ready_timeout_secs),
            config_dir,
        })
    }
}

/// Get the toolrelay config directory path (~/.toolrelay/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TOOLRELAY_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".toolrelay")
}

/// Load and parse a TOML settings file, returning defaults on any error.
pub fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}

/// Read a JSON provider file. Unlike the settings file, failures here are
/// errors: the file was named explicitly.
pub fn load_providers_file(path: &Path) -> Result<HashMap<String, ProviderConfig>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_providers_json(&content).map_err(|message| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    })
}

/// Parse a JSON object of `name -> provider`, optionally wrapped in a
/// `providers` or `mcpServers` key.
pub fn parse_providers_json(content: &str) -> Result<HashMap<String, ProviderConfig>, String> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let serde_json::Value::Object(mut root) = value else {
        return Err("expected a JSON object of providers".to_string());
    };

    let wrapped = ["providers", "mcpServers"]
        .into_iter()
        .find(|key| root.len() == 1 && root.get(*key).is_some_and(|v| v.is_object()));
    let entries = match wrapped.and_then(|key| root.remove(key)) {
        Some(serde_json::Value::Object(inner)) => inner,
        _ => root,
    };

    providers_from_entries(entries.into_iter().collect())
}

/// Validate raw provider entries, failing on the first bad one.
fn providers_from_entries(
    entries: HashMap<String, serde_json::Value>,
) -> Result<HashMap<String, ProviderConfig>, String> {
    entries
        .into_iter()
        .map(|(name, entry)| parse_provider(&name, entry).map(|config| (name, config)))
        .collect()
}

/// Validate one provider entry. An entry without a `type` but with a
/// `command` is a `stdio` provider.
fn parse_provider(name: &str, mut entry: serde_json::Value) -> Result<ProviderConfig, String> {
    if let Some(table) = entry.as_object_mut() {
        if !table.contains_key("type") && table.contains_key("command") {
            table.insert("type".into(), "stdio".into());
        }
    }
    serde_json::from_value(entry).map_err(|e| format!("provider '{name}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use toolrelay_mcp::TransportKind;

    #[test]
    fn test_default_settings() {
        let settings = SettingsFile::default();
        assert!(settings.providers.is_empty());
        assert!(settings.orchestration.max_iterations.is_none());
        assert!(settings.readiness.timeout_secs.is_none());
    }

    #[test]
    fn test_settings_toml_parse() {
        let toml_str = r#"
[orchestration]
max_iterations = 5
max_tool_output_chars = 4000

[readiness]
timeout_secs = 10

[providers.files]
type = "stdio"
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
env = { DEBUG = "1" }

[providers.search]
type = "sse"
url = "http://localhost:8000/sse"
timeout_ms = 10000
"#;
        let settings: SettingsFile = toml::from_str(toml_str).unwrap();
        let config = RelayConfig::resolve(
            PathBuf::from("/tmp/toolrelay"),
            settings,
            None,
            &CliOverrides::default(),
        )
        .unwrap();

        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.max_tool_output_chars, 4000);
        assert_eq!(config.ready_timeout, Duration::from_secs(10));

        let files = &config.providers.providers["files"];
        assert_eq!(files.kind, TransportKind::Stdio);
        assert_eq!(files.args.len(), 3);
        assert_eq!(files.env["DEBUG"], "1");
        assert_eq!(files.timeout_ms, 30000);

        let search = &config.providers.providers["search"];
        assert_eq!(search.kind, TransportKind::Sse);
        assert_eq!(search.timeout_ms, 10000);
    }

    #[test]
    fn test_defaults_when_nothing_configured() {
        let config = RelayConfig::resolve(
            PathBuf::from("."),
            SettingsFile::default(),
            None,
            &CliOverrides::default(),
        )
        .unwrap();
        assert!(config.providers.providers.is_empty());
        assert_eq!(config.max_iterations, MAX_ITERATIONS);
        assert_eq!(config.max_tool_output_chars, MAX_TOOL_OUTPUT_CHARS);
        assert_eq!(
            config.ready_timeout,
            Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_cli_ready_timeout_wins() {
        let mut settings = SettingsFile::default();
        settings.readiness.timeout_secs = Some(10);
        let overrides = CliOverrides {
            ready_timeout_secs: Some(2),
            ..CliOverrides::default()
        };
        let config = RelayConfig::resolve(PathBuf::from("."), settings, None, &overrides).unwrap();
        assert_eq!(config.ready_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut settings = SettingsFile::default();
        settings.orchestration.max_iterations = Some(0);
        let result =
            RelayConfig::resolve(PathBuf::from("."), settings, None, &CliOverrides::default());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_malformed_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[orchestration\nmax_iterations = ").unwrap();
        let settings = load_settings_file(&path);
        assert!(settings.orchestration.max_iterations.is_none());

        let missing = load_settings_file(&dir.path().join("nope.toml"));
        assert!(missing.providers.is_empty());
    }

    #[test]
    fn test_invalid_provider_entry_in_settings_is_skipped() {
        let toml_str = r#"
[providers.bad]
type = "stdio"
args = "not a list"

[providers.good]
command = "npx"
args = ["-y", "good-server"]

[providers.remote]
type = "http"
url = "http://localhost:9000"
"#;
        let settings: SettingsFile = toml::from_str(toml_str).unwrap();
        let config = RelayConfig::resolve(
            PathBuf::from("."),
            settings,
            None,
            &CliOverrides::default(),
        )
        .unwrap();
        let providers = &config.providers.providers;
        assert_eq!(providers.len(), 2);
        assert!(!providers.contains_key("bad"));
        assert_eq!(providers["good"].kind, TransportKind::Stdio);
        assert_eq!(providers["good"].command.as_deref(), Some("npx"));
        assert_eq!(providers["remote"].kind, TransportKind::Http);
    }

    #[test]
    fn test_parse_bare_providers_json() {
        let providers = parse_providers_json(
            r#"{
                "brave": {"type": "stdio", "command": "npx", "args": ["-y", "brave"]},
                "remote": {"type": "http", "url": "http://localhost:9000"}
            }"#,
        )
        .unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers["brave"].kind, TransportKind::Stdio);
        assert_eq!(providers["remote"].url.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_parse_wrapped_providers_json() {
        let providers = parse_providers_json(
            r#"{"mcpServers": {"fs": {"command": "mcp-fs", "args": ["/srv"]}}}"#,
        )
        .unwrap();
        // A command without a type means stdio.
        assert_eq!(providers["fs"].kind, TransportKind::Stdio);

        let providers =
            parse_providers_json(r#"{"providers": {"web": {"url": "http://x"}}}"#).unwrap();
        assert_eq!(providers["web"].kind, TransportKind::Http);
    }

    #[test]
    fn test_provider_named_providers_is_not_unwrapped() {
        let providers = parse_providers_json(
            r#"{"providers": {"type": "http", "url": "http://x"}, "other": {"url": "http://y"}}"#,
        )
        .unwrap();
        assert_eq!(providers.len(), 2);
        assert!(providers.contains_key("providers"));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(parse_providers_json("[1, 2]").is_err());
        assert!(parse_providers_json("{not json").is_err());
        assert!(parse_providers_json(r#"{"p": {"args": 5}}"#).is_err());
    }

    #[test]
    fn test_providers_file_overrides_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"shared": {{"type": "http", "url": "http://from-file"}}}}"#
        )
        .unwrap();

        let settings: SettingsFile = toml::from_str(
            r#"
[providers.shared]
type = "sse"
url = "http://from-settings"

[providers.only_settings]
type = "http"
url = "http://settings-only"
"#,
        )
        .unwrap();

        let config = RelayConfig::resolve(
            PathBuf::from("."),
            settings,
            Some(file.path()),
            &CliOverrides::default(),
        )
        .unwrap();
        let shared = &config.providers.providers["shared"];
        assert_eq!(shared.kind, TransportKind::Http);
        assert_eq!(shared.url.as_deref(), Some("http://from-file"));
        assert!(config.providers.providers.contains_key("only_settings"));
    }

    #[test]
    fn test_named_providers_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            load_providers_file(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{").unwrap();
        let result = RelayConfig::resolve(
            PathBuf::from("."),
            SettingsFile::default(),
            Some(&broken),
            &CliOverrides::default(),
        );
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
