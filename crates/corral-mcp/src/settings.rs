use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::McpError;
use crate::handle::BoxFuture;

/// Connection parameters for one MCP server.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct McpServerConfig {
    /// Stdio transport: command to spawn.
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// HTTP transport: remote MCP server URL.
    pub url: Option<String>,
    #[serde(default = "default_mcp_timeout")]
    pub timeout: u64,
}

impl McpServerConfig {
    #[must_use]
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: None,
            timeout: default_mcp_timeout(),
        }
    }
}

impl std::fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted: HashMap<&str, &str> = self
            .env
            .keys()
            .map(|k| (k.as_str(), "[REDACTED]"))
            .collect();
        f.debug_struct("McpServerConfig")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &redacted)
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn default_mcp_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AutoRestartConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_unhealthy_timeout_ms")]
    pub unhealthy_timeout_ms: u64,
}

impl AutoRestartConfig {
    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    #[must_use]
    pub fn unhealthy_timeout(&self) -> Duration {
        Duration::from_millis(self.unhealthy_timeout_ms)
    }
}

impl Default for AutoRestartConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            health_check_interval_ms: default_health_check_interval_ms(),
            unhealthy_timeout_ms: default_unhealthy_timeout_ms(),
        }
    }
}

fn default_health_check_interval_ms() -> u64 {
    30_000
}

fn default_unhealthy_timeout_ms() -> u64 {
    60_000
}

/// A packaged bundle contributing its own MCP servers, activated as a unit.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Extension {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_extension_active", rename = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

fn default_extension_active() -> bool {
    true
}

/// Host-side view of MCP settings, read by the manager at call time.
pub trait McpSettings: Send + Sync {
    fn is_trusted_folder(&self) -> bool;

    fn mcp_servers(&self) -> BTreeMap<String, McpServerConfig>;

    fn allowed_mcp_servers(&self) -> Vec<String>;

    fn blocked_mcp_servers(&self) -> Vec<String>;

    fn mcp_auto_restart(&self) -> AutoRestartConfig;

    /// Re-synchronize host context after a batch of servers changed.
    fn refresh_mcp_context(&self) -> BoxFuture<'_, Result<(), McpError>>;
}
