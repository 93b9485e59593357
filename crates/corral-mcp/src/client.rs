use std::sync::{Arc, PoisonError, RwLock};

use rmcp::ServiceExt;
use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use tokio::process::Command;
use tokio::sync::Mutex;
use url::Url;

use crate::error::McpError;
use crate::handle::{BoxFuture, ClientFactory, McpClientHandle, McpServerStatus};
use crate::settings::McpServerConfig;
use crate::tool::{McpTool, ToolRegistry};

type ClientService = RunningService<rmcp::RoleClient, ()>;

/// [`McpClientHandle`] over `rmcp`, using a child process (stdio) or
/// streamable HTTP depending on the server config.
pub struct RmcpClient {
    name: String,
    config: McpServerConfig,
    tools: Arc<ToolRegistry>,
    service: Mutex<Option<ClientService>>,
    status: RwLock<McpServerStatus>,
    instructions: RwLock<Option<String>>,
}

impl std::fmt::Debug for RmcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RmcpClient")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl RmcpClient {
    #[must_use]
    pub fn new(name: &str, config: McpServerConfig, tools: Arc<ToolRegistry>) -> Self {
        Self {
            name: name.to_owned(),
            config,
            tools,
            service: Mutex::new(None),
            status: RwLock::new(McpServerStatus::Disconnected),
            instructions: RwLock::new(None),
        }
    }

    fn set_status(&self, status: McpServerStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn connection_error(&self, message: impl ToString) -> McpError {
        McpError::Connection {
            server: self.name.clone(),
            message: message.to_string(),
        }
    }

    async fn handshake(&self) -> Result<ClientService, McpError> {
        if let Some(url) = &self.config.url {
            let transport = StreamableHttpClientTransport::from_uri(url.clone());
            return ().serve(transport)
                .await
                .map_err(|e| self.connection_error(e));
        }

        let command = self.config.command.as_deref().ok_or_else(|| McpError::InvalidConfig {
            server: self.name.clone(),
            message: "neither command nor url is set".into(),
        })?;
        let mut cmd = Command::new(command);
        cmd.args(&self.config.args);
        for (k, v) in &self.config.env {
            cmd.env(k, v);
        }
        let transport = TokioChildProcess::new(cmd).map_err(|e| self.connection_error(e))?;
        ().serve(transport)
            .await
            .map_err(|e| self.connection_error(e))
    }
}

impl McpClientHandle for RmcpClient {
    fn connect(&self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            let mut slot = self.service.lock().await;
            if slot.is_some() {
                return Ok(());
            }
            self.set_status(McpServerStatus::Connecting);

            let result = tokio::time::timeout(self.config.timeout(), self.handshake())
                .await
                .map_err(|_| McpError::Timeout {
                    server: self.name.clone(),
                    timeout_secs: self.config.timeout,
                })
                .and_then(|r| r);
            let service = match result {
                Ok(service) => service,
                Err(e) => {
                    self.set_status(McpServerStatus::Disconnected);
                    return Err(e);
                }
            };

            let instructions = service.peer_info().and_then(|info| info.instructions.clone());
            *self
                .instructions
                .write()
                .unwrap_or_else(PoisonError::into_inner) = instructions;
            *slot = Some(service);
            self.set_status(McpServerStatus::Connected);
            tracing::debug!(server = %self.name, "MCP handshake complete");
            Ok(())
        })
    }

    fn discover(&self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            let slot = self.service.lock().await;
            let service = slot.as_ref().ok_or_else(|| McpError::Discovery {
                server: self.name.clone(),
                message: "not connected".into(),
            })?;

            let listed = tokio::time::timeout(self.config.timeout(), service.list_all_tools())
                .await
                .map_err(|_| McpError::Timeout {
                    server: self.name.clone(),
                    timeout_secs: self.config.timeout,
                })?
                .map_err(|e| McpError::Discovery {
                    server: self.name.clone(),
                    message: e.to_string(),
                })?;

            let tools: Vec<McpTool> = listed
                .into_iter()
                .map(|t| McpTool {
                    server_id: self.name.clone(),
                    name: t.name.to_string(),
                    description: t.description.map_or_else(String::new, |d| d.to_string()),
                    input_schema: serde_json::to_value(&*t.input_schema).unwrap_or_default(),
                })
                .collect();
            tracing::info!(server = %self.name, tools = tools.len(), "discovered MCP tools");
            self.tools.replace_server_tools(&self.name, tools);
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            let service = self.service.lock().await.take();
            self.tools.remove_server(&self.name);
            *self
                .instructions
                .write()
                .unwrap_or_else(PoisonError::into_inner) = None;

            let Some(service) = service else {
                self.set_status(McpServerStatus::Disconnected);
                return Ok(());
            };
            self.set_status(McpServerStatus::Disconnecting);
            let result = service.cancel().await;
            self.set_status(McpServerStatus::Disconnected);
            result.map(|_| ()).map_err(|e| McpError::Disconnect {
                server: self.name.clone(),
                message: e.to_string(),
            })
        })
    }

    fn status(&self) -> McpServerStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn server_config(&self) -> &McpServerConfig {
        &self.config
    }

    fn instructions(&self) -> Option<String> {
        self.instructions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Builds [`RmcpClient`]s that publish into a shared [`ToolRegistry`].
#[derive(Debug, Clone)]
pub struct RmcpClientFactory {
    tools: Arc<ToolRegistry>,
}

impl RmcpClientFactory {
    #[must_use]
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    #[must_use]
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }
}

fn validate_transport(name: &str, config: &McpServerConfig) -> Result<(), McpError> {
    let invalid = |message: String| McpError::InvalidConfig {
        server: name.to_owned(),
        message,
    };
    match (&config.command, &config.url) {
        (Some(_), Some(_)) => Err(invalid("command and url are mutually exclusive".into())),
        (None, None) => Err(invalid("neither command nor url is set".into())),
        (Some(command), None) if command.trim().is_empty() => {
            Err(invalid("command is empty".into()))
        }
        (None, Some(url)) => Url::parse(url)
            .map(|_| ())
            .map_err(|e| invalid(format!("invalid url '{url}': {e}"))),
        (Some(_), None) => Ok(()),
    }
}

impl ClientFactory for RmcpClientFactory {
    fn create(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> BoxFuture<'_, Result<Arc<dyn McpClientHandle>, McpError>> {
        let result = validate_transport(name, config).map(|()| {
            Arc::new(RmcpClient::new(name, config.clone(), Arc::clone(&self.tools)))
                as Arc<dyn McpClientHandle>
        });
        Box::pin(async move { result })
    }
}
