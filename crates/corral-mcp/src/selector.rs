//! Trust, allow-list and block-list gating for MCP servers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::settings::{McpServerConfig, McpSettings};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub trusted: bool,
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
}

impl SelectionPolicy {
    #[must_use]
    pub fn from_settings(settings: &dyn McpSettings) -> Self {
        Self {
            trusted: settings.is_trusted_folder(),
            allowed: settings.allowed_mcp_servers(),
            blocked: settings.blocked_mcp_servers(),
        }
    }
}

/// A server skipped because its name is on the block list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlockedServer {
    pub name: String,
    /// Empty for user-configured servers.
    pub extension_name: String,
}

#[derive(Debug, Default)]
pub struct Selection {
    pub eligible: Vec<(String, McpServerConfig)>,
    pub blocked: Vec<BlockedServer>,
}

/// Decide which of `servers` may start under `policy`.
///
/// An untrusted folder starts nothing and records nothing. Blocked names are
/// reported with `extension_name`; a non-empty allow list restricts the rest.
#[must_use]
pub fn select_servers(
    servers: &BTreeMap<String, McpServerConfig>,
    policy: &SelectionPolicy,
    extension_name: &str,
) -> Selection {
    let mut selection = Selection::default();
    if !policy.trusted {
        return selection;
    }

    for (name, config) in servers {
        if policy.blocked.iter().any(|b| b == name) {
            selection.blocked.push(BlockedServer {
                name: name.clone(),
                extension_name: extension_name.to_owned(),
            });
            continue;
        }
        if !policy.allowed.is_empty() && !policy.allowed.iter().any(|a| a == name) {
            continue;
        }
        selection.eligible.push((name.clone(), config.clone()));
    }

    selection
}
