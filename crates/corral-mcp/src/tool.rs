use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    pub server_id: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl McpTool {
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.server_id, self.name)
    }
}

/// Sink for tools published by clients during discovery.
///
/// The manager never reads it; hosts do.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    servers: RwLock<Vec<(String, Vec<McpTool>)>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything previously published by `server`.
    pub fn replace_server_tools(&self, server: &str, tools: Vec<McpTool>) {
        let mut servers = self.servers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, existing)) = servers.iter_mut().find(|(s, _)| s == server) {
            *existing = tools;
        } else {
            servers.push((server.to_owned(), tools));
        }
    }

    pub fn remove_server(&self, server: &str) {
        self.servers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(s, _)| s != server);
    }

    #[must_use]
    pub fn server_tools(&self, server: &str) -> Vec<McpTool> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(s, _)| s == server)
            .map(|(_, tools)| tools.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn all_tools(&self) -> Vec<McpTool> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(|(_, tools)| tools.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, tools)| tools.len())
            .sum()
    }
}
