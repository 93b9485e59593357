//! Host side of the MCP manager: settings backed by [`Config`] and the
//! shared tool registry that discovery publishes into.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use corral_mcp::{
    AutoRestartConfig, BoxFuture, Extension, McpError, McpServerConfig, McpSettings, ToolRegistry,
};

use crate::config::Config;

#[derive(Debug)]
pub struct HostContext {
    config: Config,
    tools: Arc<ToolRegistry>,
    generation: AtomicU64,
}

impl HostContext {
    #[must_use]
    pub fn new(config: Config, tools: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            tools,
            generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Number of context refreshes seen so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Configured extensions that should be started.
    pub fn active_extensions(&self) -> impl Iterator<Item = &Extension> {
        self.config.extensions.iter().filter(|ext| ext.is_active)
    }
}

impl McpSettings for HostContext {
    fn is_trusted_folder(&self) -> bool {
        self.config.mcp.trusted
    }

    fn mcp_servers(&self) -> BTreeMap<String, McpServerConfig> {
        self.config.mcp.servers.clone()
    }

    fn allowed_mcp_servers(&self) -> Vec<String> {
        self.config.mcp.allowed.clone()
    }

    fn blocked_mcp_servers(&self) -> Vec<String> {
        self.config.mcp.blocked.clone()
    }

    fn mcp_auto_restart(&self) -> AutoRestartConfig {
        self.config.mcp.auto_restart
    }

    fn refresh_mcp_context(&self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!(
                generation,
                tools = self.tools.tool_count(),
                "mcp context refreshed"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_mcp::McpTool;

    fn context(config: Config) -> HostContext {
        HostContext::new(config, Arc::new(ToolRegistry::new()))
    }

    #[test]
    fn settings_reflect_config() {
        let mut config = Config::default();
        config.mcp.trusted = false;
        config.mcp.allowed = vec!["a".into()];
        config.mcp.blocked = vec!["b".into()];
        config.mcp.auto_restart.enabled = true;
        config
            .mcp
            .servers
            .insert("a".into(), McpServerConfig::stdio("mcp-a", Vec::new()));
        let ctx = context(config);

        assert!(!ctx.is_trusted_folder());
        assert_eq!(ctx.allowed_mcp_servers(), vec!["a"]);
        assert_eq!(ctx.blocked_mcp_servers(), vec!["b"]);
        assert!(ctx.mcp_auto_restart().enabled);
        assert_eq!(ctx.mcp_servers().len(), 1);
    }

    #[test]
    fn active_extensions_skips_inactive() {
        let mut config = Config::default();
        config.extensions.push(Extension {
            name: "on".into(),
            is_active: true,
            ..Default::default()
        });
        config.extensions.push(Extension {
            name: "off".into(),
            is_active: false,
            ..Default::default()
        });
        let ctx = context(config);
        let names: Vec<_> = ctx.active_extensions().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["on"]);
    }

    #[tokio::test]
    async fn refresh_bumps_generation() {
        let ctx = context(Config::default());
        ctx.tools().replace_server_tools(
            "files",
            vec![McpTool {
                server_id: "files".into(),
                name: "read".into(),
                description: String::new(),
                input_schema: Default::default(),
            }],
        );
        assert_eq!(ctx.generation(), 0);
        ctx.refresh_mcp_context().await.unwrap();
        ctx.refresh_mcp_context().await.unwrap();
        assert_eq!(ctx.generation(), 2);
    }
}
