#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("No MCP server registered with the name \"{name}\"")]
    NotFound { name: String },

    #[error("failed to create client for server '{server}': {message}")]
    ClientInit { server: String, message: String },

    #[error("invalid configuration for server '{server}': {message}")]
    InvalidConfig { server: String, message: String },

    #[error("connection failed for server '{server}': {message}")]
    Connection { server: String, message: String },

    #[error("discovery failed for server '{server}': {message}")]
    Discovery { server: String, message: String },

    #[error("disconnect failed for server '{server}': {message}")]
    Disconnect { server: String, message: String },

    #[error("server '{server}' did not respond within {timeout_secs}s")]
    Timeout { server: String, timeout_secs: u64 },

    #[error("context refresh failed: {message}")]
    ContextRefresh { message: String },
}

impl McpError {
    /// Server this error is attributed to, if any.
    #[must_use]
    pub fn server(&self) -> Option<&str> {
        match self {
            Self::NotFound { name } => Some(name),
            Self::ClientInit { server, .. }
            | Self::InvalidConfig { server, .. }
            | Self::Connection { server, .. }
            | Self::Discovery { server, .. }
            | Self::Disconnect { server, .. }
            | Self::Timeout { server, .. } => Some(server),
            Self::ContextRefresh { .. } => None,
        }
    }
}
