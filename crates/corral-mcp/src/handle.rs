use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::McpError;
use crate::settings::McpServerConfig;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpServerStatus {
    Disconnected,
    Disconnecting,
    Connecting,
    Connected,
}

impl McpServerStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Disconnecting => "disconnecting",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }

    #[must_use]
    pub fn is_healthy(self) -> bool {
        self == Self::Connected
    }
}

impl std::fmt::Display for McpServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One connection to one MCP server.
///
/// Implementations own the transport; the manager only drives the lifecycle.
pub trait McpClientHandle: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<(), McpError>>;

    /// Enumerate the server's tools and publish them to the tool registry.
    fn discover(&self) -> BoxFuture<'_, Result<(), McpError>>;

    fn disconnect(&self) -> BoxFuture<'_, Result<(), McpError>>;

    fn status(&self) -> McpServerStatus;

    fn server_config(&self) -> &McpServerConfig;

    /// Instructions advertised by the server during the handshake, if any.
    fn instructions(&self) -> Option<String>;
}

/// Builds client handles, one per server name.
pub trait ClientFactory: Send + Sync {
    fn create(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> BoxFuture<'_, Result<Arc<dyn McpClientHandle>, McpError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connected_is_healthy() {
        assert!(McpServerStatus::Connected.is_healthy());
        assert!(!McpServerStatus::Connecting.is_healthy());
        assert!(!McpServerStatus::Disconnecting.is_healthy());
        assert!(!McpServerStatus::Disconnected.is_healthy());
    }

    #[test]
    fn status_display() {
        assert_eq!(McpServerStatus::Disconnecting.to_string(), "disconnecting");
    }
}
