//! Configuration loading and the host-side MCP context.

pub mod config;
pub mod host;

pub use config::Config;
pub use host::HostContext;
