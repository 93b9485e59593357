//! Test doubles for the client handle, factory and settings contracts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::error::McpError;
use crate::handle::{BoxFuture, ClientFactory, McpClientHandle, McpServerStatus};
use crate::settings::{AutoRestartConfig, McpServerConfig, McpSettings};

#[derive(Debug)]
pub struct MockClient {
    config: McpServerConfig,
    instructions: Option<String>,
    status: Mutex<McpServerStatus>,
    connect_calls: AtomicUsize,
    discover_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    fail_connect: AtomicBool,
    fail_discover: AtomicBool,
    disconnect_failures_left: AtomicUsize,
    report_unhealthy: AtomicBool,
    /// `true` lets `connect` complete.
    connect_gate: watch::Sender<bool>,
    /// `true` lets `disconnect` complete.
    disconnect_gate: watch::Sender<bool>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new(McpServerConfig::default(), None)
    }
}

impl MockClient {
    #[must_use]
    pub fn new(config: McpServerConfig, instructions: Option<String>) -> Self {
        let (connect_gate, _) = watch::channel(true);
        let (disconnect_gate, _) = watch::channel(true);
        Self {
            config,
            instructions,
            status: Mutex::new(McpServerStatus::Disconnected),
            connect_calls: AtomicUsize::new(0),
            discover_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            fail_discover: AtomicBool::new(false),
            disconnect_failures_left: AtomicUsize::new(0),
            report_unhealthy: AtomicBool::new(false),
            connect_gate,
            disconnect_gate,
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.connect_calls.store(0, Ordering::SeqCst);
        self.discover_calls.store(0, Ordering::SeqCst);
        self.disconnect_calls.store(0, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_discover(&self, fail: bool) {
        self.fail_discover.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` disconnects fail.
    pub fn fail_next_disconnects(&self, n: usize) {
        self.disconnect_failures_left.store(n, Ordering::SeqCst);
    }

    /// Keep reporting a non-connected status even after a successful connect.
    pub fn set_report_unhealthy(&self, unhealthy: bool) {
        self.report_unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    /// Park every `connect` until [`MockClient::open_connect_gate`].
    pub fn close_connect_gate(&self) {
        self.connect_gate.send_replace(false);
    }

    pub fn open_connect_gate(&self) {
        self.connect_gate.send_replace(true);
    }

    /// Park every `disconnect` until [`MockClient::open_disconnect_gate`].
    pub fn close_disconnect_gate(&self) {
        self.disconnect_gate.send_replace(false);
    }

    pub fn open_disconnect_gate(&self) {
        self.disconnect_gate.send_replace(true);
    }

    fn set_status(&self, status: McpServerStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

impl McpClientHandle for MockClient {
    fn connect(&self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            let mut gate = self.connect_gate.subscribe();
            let _ = gate.wait_for(|open| *open).await;
            if self.fail_connect.load(Ordering::SeqCst) {
                self.set_status(McpServerStatus::Disconnected);
                return Err(McpError::Connection {
                    server: "mock".into(),
                    message: "mock connect failure".into(),
                });
            }
            self.set_status(McpServerStatus::Connected);
            Ok(())
        })
    }

    fn discover(&self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            self.discover_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_discover.load(Ordering::SeqCst) {
                return Err(McpError::Discovery {
                    server: "mock".into(),
                    message: "mock discover failure".into(),
                });
            }
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
            self.set_status(McpServerStatus::Disconnecting);
            let mut gate = self.disconnect_gate.subscribe();
            let _ = gate.wait_for(|open| *open).await;
            self.set_status(McpServerStatus::Disconnected);
            let failing = self
                .disconnect_failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(McpError::Disconnect {
                    server: "mock".into(),
                    message: "mock disconnect failure".into(),
                });
            }
            Ok(())
        })
    }

    fn status(&self) -> McpServerStatus {
        if self.report_unhealthy.load(Ordering::SeqCst) {
            return McpServerStatus::Disconnected;
        }
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn server_config(&self) -> &McpServerConfig {
        &self.config
    }

    fn instructions(&self) -> Option<String> {
        self.instructions.clone()
    }
}

type BuildFn =
    dyn Fn(&str, &McpServerConfig) -> Result<Arc<dyn McpClientHandle>, McpError> + Send + Sync;

pub struct MockFactory {
    build: Box<BuildFn>,
    created: AtomicUsize,
    /// `true` lets `create` complete.
    create_gate: watch::Sender<bool>,
}

impl std::fmt::Debug for MockFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFactory")
            .field("created", &self.created.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MockFactory {
    /// Hand out the same client for every server, so call counts accumulate.
    #[must_use]
    pub fn shared(client: Arc<MockClient>) -> Self {
        Self::from_fn(move |_, _| Ok(Arc::clone(&client) as Arc<dyn McpClientHandle>))
    }

    #[must_use]
    pub fn from_fn<F>(build: F) -> Self
    where
        F: Fn(&str, &McpServerConfig) -> Result<Arc<dyn McpClientHandle>, McpError>
            + Send
            + Sync
            + 'static,
    {
        let (create_gate, _) = watch::channel(true);
        Self {
            build: Box::new(build),
            created: AtomicUsize::new(0),
            create_gate,
        }
    }

    #[must_use]
    pub fn failing(message: &str) -> Self {
        let message = message.to_owned();
        Self::from_fn(move |name, _| {
            Err(McpError::ClientInit {
                server: name.to_owned(),
                message: message.clone(),
            })
        })
    }

    /// Park every `create` until [`MockFactory::open_create_gate`].
    pub fn close_create_gate(&self) {
        self.create_gate.send_replace(false);
    }

    pub fn open_create_gate(&self) {
        self.create_gate.send_replace(true);
    }

    /// Clients successfully built so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MockFactory {
    fn create(
        &self,
        name: &str,
        config: &McpServerConfig,
    ) -> BoxFuture<'_, Result<Arc<dyn McpClientHandle>, McpError>> {
        let result = (self.build)(name, config);
        if result.is_ok() {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
        let mut gate = self.create_gate.subscribe();
        Box::pin(async move {
            let _ = gate.wait_for(|open| *open).await;
            result
        })
    }
}

#[derive(Debug)]
pub struct MockSettings {
    pub trusted: bool,
    pub servers: BTreeMap<String, McpServerConfig>,
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
    pub auto_restart: AutoRestartConfig,
    pub fail_refresh: bool,
    refresh_calls: AtomicUsize,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            trusted: true,
            servers: BTreeMap::new(),
            allowed: Vec::new(),
            blocked: Vec::new(),
            auto_restart: AutoRestartConfig::default(),
            fail_refresh: false,
            refresh_calls: AtomicUsize::new(0),
        }
    }
}

impl MockSettings {
    #[must_use]
    pub fn with_servers(names: &[&str]) -> Self {
        Self {
            servers: names
                .iter()
                .map(|n| ((*n).to_owned(), McpServerConfig::default()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

impl McpSettings for MockSettings {
    fn is_trusted_folder(&self) -> bool {
        self.trusted
    }

    fn mcp_servers(&self) -> BTreeMap<String, McpServerConfig> {
        self.servers.clone()
    }

    fn allowed_mcp_servers(&self) -> Vec<String> {
        self.allowed.clone()
    }

    fn blocked_mcp_servers(&self) -> Vec<String> {
        self.blocked.clone()
    }

    fn mcp_auto_restart(&self) -> AutoRestartConfig {
        self.auto_restart
    }

    fn refresh_mcp_context(&self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh {
                return Err(McpError::ContextRefresh {
                    message: "mock refresh failure".into(),
                });
            }
            Ok(())
        })
    }
}
