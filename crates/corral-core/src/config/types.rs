use std::collections::BTreeMap;

use corral_mcp::{AutoRestartConfig, Extension, McpServerConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub extensions: Vec<Extension>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LogConfig {
    /// Default `tracing` filter, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpConfig {
    /// Whether the working folder is trusted to launch MCP servers at all.
    #[serde(default = "default_trusted")]
    pub trusted: bool,
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
    #[serde(default)]
    pub auto_restart: AutoRestartConfig,
    #[serde(default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            trusted: default_trusted(),
            allowed: Vec::new(),
            blocked: Vec::new(),
            auto_restart: AutoRestartConfig::default(),
            servers: BTreeMap::new(),
        }
    }
}

fn default_trusted() -> bool {
    true
}
