//! MCP client lifecycle: server selection, batched discovery, restarts and
//! health-checked auto-restart.

pub mod client;
pub mod discovery;
pub mod error;
pub mod handle;
mod health;
pub mod instructions;
pub mod manager;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod registry;
pub mod selector;
pub mod settings;
pub mod tool;

pub use client::{RmcpClient, RmcpClientFactory};
pub use discovery::DiscoveryState;
pub use error::McpError;
pub use handle::{BoxFuture, ClientFactory, McpClientHandle, McpServerStatus};
pub use instructions::format_mcp_instructions;
pub use manager::McpManager;
pub use selector::{BlockedServer, Selection, SelectionPolicy, select_servers};
pub use settings::{AutoRestartConfig, Extension, McpServerConfig, McpSettings};
pub use tool::{McpTool, ToolRegistry};
