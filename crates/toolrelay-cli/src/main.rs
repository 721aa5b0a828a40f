//! toolrelay CLI: inspect and exercise configured MCP tool providers.

mod console;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::ConsoleGenerator;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolrelay_config::{CliOverrides, RelayConfig};
use toolrelay_core::{Completion, Generator, Orchestrator};
use toolrelay_mcp::ToolManager;

#[derive(Parser)]
#[command(name = "toolrelay", version, about = "Inspect and exercise MCP tool providers")]
struct Cli {
    /// JSON file of providers (overrides TOOLRELAY_PROVIDERS)
    #[arg(long, global = true)]
    providers: Option<PathBuf>,

    /// Seconds to wait for providers to become ready
    #[arg(long, global = true)]
    ready_timeout: Option<u64>,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every available tool, including the meta tool
    Tools,
    /// Invoke a tool and print its normalized result
    Call {
        provider: String,
        tool: String,
        /// Tool arguments as JSON
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// List a provider's resources
    Resources { provider: String },
    /// Read one resource from a provider
    Read { provider: String, uri: String },
    /// Show the readiness of each provider
    Status,
    /// Print the tool catalog prompt used for text-only models
    Catalog,
    /// Print what a provider wrote to stderr
    Stderr { provider: String },
    /// Run the tool-calling loop for a request, reading each model reply
    /// as one line on stdin
    Chat { prompt: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config = RelayConfig::load(CliOverrides {
        providers_file: cli.providers,
        ready_timeout_secs: cli.ready_timeout,
    })
    .context("Failed to load configuration")?;

    if config.providers.providers.is_empty() {
        tracing::warn!(
            "No providers configured (looked in {} and TOOLRELAY_PROVIDERS)",
            config.config_dir.join("config.toml").display()
        );
    }

    let manager = Arc::new(ToolManager::start(&config.providers));
    let readiness = manager.wait_until_ready(config.ready_timeout).await;
    for (name, ready) in &readiness {
        if !ready {
            eprintln!("Warning: provider '{name}' did not become ready; its tools are unavailable");
        }
    }

    let result = run_command(cli.command, &manager, &readiness, &config).await;
    manager.close_all().await;
    result
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_command(
    command: Command,
    manager: &Arc<ToolManager>,
    readiness: &[(String, bool)],
    config: &RelayConfig,
) -> Result<()> {
    match command {
        Command::Tools => {
            let tools = manager.list_all_tools().await;
            print!("{}", output::format_tools(&tools));
        }
        Command::Call {
            provider,
            tool,
            args,
        } => {
            let arguments: serde_json::Value = serde_json::from_str(&args)
                .with_context(|| format!("--args is not valid JSON: {args}"))?;
            let result = manager.execute(&provider, &tool, arguments).await?;
            if let Some(error) = &result.error {
                anyhow::bail!("{provider}/{tool} failed: {error}");
            }
            println!("{}", result.payload_text());
        }
        Command::Resources { provider } => {
            let resources = manager.list_resources(&provider).await?;
            if resources.is_empty() {
                eprintln!("No resources.");
            }
            for resource in &resources {
                println!("{}", output::format_resource(resource));
            }
        }
        Command::Read { provider, uri } => {
            let contents = manager
                .access_resource(&provider, &uri)
                .await
                .with_context(|| format!("Failed to read {uri} from '{provider}'"))?;
            println!("{}", serde_json::to_string_pretty(&contents)?);
        }
        Command::Status => {
            let states = manager.states().await;
            print!("{}", output::format_status(&states, readiness));
        }
        Command::Catalog => {
            let tools = manager.list_all_tools().await;
            println!("{}", toolrelay_core::prompt::tool_catalog_prompt(&tools));
        }
        Command::Stderr { provider } => {
            if manager.client(&provider).is_none() {
                anyhow::bail!("Unknown provider: {provider}");
            }
            for line in manager.stderr_messages(&provider) {
                println!("{line}");
            }
        }
        Command::Chat { prompt } => {
            let generator = Arc::new(ConsoleGenerator::new(tokio::io::BufReader::new(
                tokio::io::stdin(),
            )));
            let cancel = CancellationToken::new();
            let ctrl_c = tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                }
            });
            let completion = run_chat(&prompt, generator, manager, config, cancel).await;
            ctrl_c.abort();
            let completion = completion?;
            eprintln!("  [{} model round trip(s)]", completion.iterations);
            println!("{}", completion.text);
        }
    }
    Ok(())
}

/// Drive one request through the orchestration loop with the configured
/// iteration and output budgets.
async fn run_chat(
    prompt: &str,
    generator: Arc<dyn Generator>,
    manager: &Arc<ToolManager>,
    config: &RelayConfig,
    cancel: CancellationToken,
) -> Result<Completion> {
    let orchestrator = Orchestrator::new(generator, Arc::clone(manager))
        .with_max_iterations(config.max_iterations)
        .with_max_tool_output_chars(config.max_tool_output_chars);
    let completion = orchestrator
        .run(prompt, &[], cancel, |event| {
            if let Some(line) = output::format_event(&event) {
                eprintln!("{line}");
            }
        })
        .await?;
    Ok(completion)
}
