use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use corral_core::{Config, HostContext};
use corral_mcp::{McpManager, McpSettings, RmcpClientFactory, ToolRegistry};

/// Launch configured MCP servers and keep them running.
#[derive(Debug, Parser)]
#[command(name = "corral", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CORRAL_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    /// Start everything, print a report and exit instead of waiting for ctrl-c.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_subscriber(&config.log.level);
    config.validate()?;
    tracing::info!("loaded config from {}", display_path(&cli.config));

    let tools = Arc::new(ToolRegistry::new());
    let host = Arc::new(HostContext::new(config, Arc::clone(&tools)));
    let factory = Arc::new(RmcpClientFactory::new(Arc::clone(&tools)));
    let manager = McpManager::new(
        Arc::clone(&host) as Arc<dyn McpSettings>,
        factory,
    );

    manager.start_configured_mcp_servers().await;
    for extension in host.active_extensions() {
        manager.start_extension(extension).await;
    }

    report(&manager, &tools);

    if !cli.once {
        tracing::info!("running, press ctrl-c to stop");
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
        } else {
            tracing::info!("received shutdown signal");
        }
    }

    manager.stop().await;
    tracing::info!(refreshes = host.generation(), "all MCP servers stopped");
    Ok(())
}

fn report(manager: &McpManager, tools: &ToolRegistry) {
    for (name, status) in manager.server_statuses() {
        let count = tools.server_tools(&name).len();
        tracing::info!(server = %name, %status, tools = count, "MCP server");
    }
    for blocked in manager.get_blocked_mcp_servers() {
        if blocked.extension_name.is_empty() {
            tracing::info!(server = %blocked.name, "MCP server blocked by settings");
        } else {
            tracing::info!(
                server = %blocked.name,
                extension = %blocked.extension_name,
                "MCP server blocked by settings"
            );
        }
    }
    tracing::info!(total = tools.tool_count(), "MCP tools available");

    let instructions = manager.get_mcp_instructions();
    if !instructions.is_empty() {
        println!("{instructions}");
    }
}

fn display_path(path: &Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (missing, using defaults)", path.display())
    }
}

fn init_subscriber(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
