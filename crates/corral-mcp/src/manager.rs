use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::discovery::{DiscoveryState, DiscoveryTracker};
use crate::error::McpError;
use crate::handle::{ClientFactory, McpClientHandle, McpServerStatus};
use crate::health::HealthMonitor;
use crate::instructions::format_mcp_instructions;
use crate::registry::{ClientEntry, ClientRegistry, RestartTicket};
use crate::selector::{BlockedServer, SelectionPolicy, select_servers};
use crate::settings::{Extension, McpServerConfig, McpSettings};

/// State shared between the manager and its background tasks.
pub(crate) struct ManagerCore {
    settings: Arc<dyn McpSettings>,
    factory: Arc<dyn ClientFactory>,
    pub(crate) registry: ClientRegistry,
    discovery: DiscoveryTracker,
    blocked: Mutex<Vec<BlockedServer>>,
}

impl ManagerCore {
    fn record_blocked(&self, blocked: Vec<BlockedServer>) {
        if blocked.is_empty() {
            return;
        }
        for record in &blocked {
            tracing::info!(
                server = %record.name,
                extension = %record.extension_name,
                "skipping blocked MCP server"
            );
        }
        self.blocked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(blocked);
    }

    pub(crate) async fn refresh_context(&self) {
        if let Err(e) = self.settings.refresh_mcp_context().await {
            tracing::warn!("MCP context refresh failed: {e:#}");
        }
    }

    async fn start_server(
        &self,
        name: &str,
        config: &McpServerConfig,
        extension_name: &str,
    ) -> Result<(), McpError> {
        let client = self.factory.create(name, config).await?;
        if let Some(previous) = self
            .registry
            .insert(name, Arc::clone(&client), extension_name)
            && let Err(e) = previous.disconnect().await
        {
            tracing::warn!(server = name, "failed to disconnect replaced MCP client: {e:#}");
        }
        let result = async {
            client.connect().await?;
            client.discover().await
        }
        .await;
        self.registry.mark_healthy(name, Instant::now());
        self.release_if_removed(name, &client).await;
        result
    }

    /// Connect and discover every server on its own task; returns how many succeeded.
    async fn start_batch(
        self: &Arc<Self>,
        servers: Vec<(String, McpServerConfig)>,
        extension_name: &str,
    ) -> usize {
        let mut join_set = JoinSet::new();
        for (name, config) in servers {
            let core = Arc::clone(self);
            let extension_name = extension_name.to_owned();
            join_set.spawn(async move {
                let result = core.start_server(&name, &config, &extension_name).await;
                (name, result)
            });
        }

        let mut started = 0;
        while let Some(result) = join_set.join_next().await {
            let Ok((server, start_result)) = result else {
                tracing::warn!("MCP server startup task panicked");
                continue;
            };
            match start_result {
                Ok(()) => {
                    tracing::info!(server, "MCP server connected");
                    started += 1;
                }
                Err(e) => tracing::warn!(server, "MCP server failed to start: {e:#}"),
            }
        }
        started
    }

    /// Disconnect, rebuild from the old client's config, connect, discover.
    ///
    /// Disconnect failures are logged and do not stop the reconnect. The new
    /// client only replaces the entry the ticket was taken for; if that entry
    /// was removed in the meantime the new client is dropped or disconnected.
    pub(crate) async fn reconnect(&self, name: &str, ticket: RestartTicket) -> Result<(), McpError> {
        let _ticket = ticket;
        let Some(entry) = self.registry.get(name) else {
            return Ok(());
        };

        if let Err(e) = entry.client.disconnect().await {
            tracing::warn!(server = name, "MCP disconnect failed during restart: {e:#}");
        }

        let config = entry.client.server_config().clone();
        let client = match self.factory.create(name, &config).await {
            Ok(client) => client,
            Err(e) => {
                self.registry.mark_healthy(name, Instant::now());
                return Err(e);
            }
        };
        if !self
            .registry
            .replace_guarded(name, &entry.guard, Arc::clone(&client))
        {
            tracing::debug!(server = name, "MCP server removed during restart");
            return Ok(());
        }

        let result = async {
            client.connect().await?;
            client.discover().await
        }
        .await;
        self.registry.mark_healthy(name, Instant::now());
        self.release_if_removed(name, &client).await;
        result
    }

    /// Disconnect `client` if it was removed while connecting, since whoever
    /// removed it may have disconnected it before the connect finished.
    async fn release_if_removed(&self, name: &str, client: &Arc<dyn McpClientHandle>) {
        if self.registry.is_current(name, client) {
            return;
        }
        tracing::debug!(server = name, "MCP server removed while connecting");
        if let Err(e) = client.disconnect().await {
            tracing::warn!(server = name, "failed to disconnect removed MCP client: {e:#}");
        }
    }

    async fn restart_entry(&self, entry: &ClientEntry) {
        let Some(ticket) = entry.guard.try_acquire() else {
            tracing::info!(server = %entry.name, "MCP server restart already in progress");
            return;
        };
        match self.reconnect(&entry.name, ticket).await {
            Ok(()) => tracing::info!(server = %entry.name, "MCP server restarted"),
            Err(e) => tracing::warn!(server = %entry.name, "MCP server restart failed: {e:#}"),
        }
    }
}

/// Owns every MCP client of a host: selection, batched startup, restarts and
/// the auto-restart health monitor.
pub struct McpManager {
    core: Arc<ManagerCore>,
    monitor: Mutex<Option<HealthMonitor>>,
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager")
            .field("server_count", &self.core.registry.len())
            .field("discovery_state", &self.core.discovery.get())
            .finish_non_exhaustive()
    }
}

impl McpManager {
    #[must_use]
    pub fn new(settings: Arc<dyn McpSettings>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            core: Arc::new(ManagerCore {
                settings,
                factory,
                registry: ClientRegistry::default(),
                discovery: DiscoveryTracker::new(),
                blocked: Mutex::new(Vec::new()),
            }),
            monitor: Mutex::new(None),
        }
    }

    fn ensure_health_monitor(&self) {
        let mut monitor = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if monitor.is_none() {
            *monitor = HealthMonitor::spawn(
                Arc::clone(&self.core),
                self.core.settings.mcp_auto_restart(),
            );
        }
    }

    /// Start every configured server that passes the trust, allow and block
    /// policy, then refresh host context once.
    ///
    /// The discovery state becomes [`DiscoveryState::InProgress`] as soon as
    /// this is called and [`DiscoveryState::Completed`] when the returned future
    /// resolves. Per-server failures are logged, never returned.
    pub fn start_configured_mcp_servers(&self) -> impl Future<Output = ()> + Send + '_ {
        self.core.discovery.begin();
        async move {
            self.ensure_health_monitor();
            let policy = SelectionPolicy::from_settings(self.core.settings.as_ref());
            let selection = select_servers(&self.core.settings.mcp_servers(), &policy, "");
            self.core.record_blocked(selection.blocked);

            let attempted = selection.eligible.len();
            let started = self.core.start_batch(selection.eligible, "").await;
            self.core.refresh_context().await;
            self.core.discovery.complete();
            tracing::info!(attempted, started, "MCP discovery completed");
        }
    }

    /// Start the servers contributed by an active extension.
    pub async fn start_extension(&self, extension: &Extension) {
        if !extension.is_active {
            tracing::debug!(extension = %extension.name, "extension inactive, not starting its MCP servers");
            return;
        }
        self.ensure_health_monitor();
        let policy = SelectionPolicy::from_settings(self.core.settings.as_ref());
        let selection = select_servers(&extension.mcp_servers, &policy, &extension.name);
        self.core.record_blocked(selection.blocked);
        if selection.eligible.is_empty() {
            return;
        }

        let attempted = selection.eligible.len();
        let started = self
            .core
            .start_batch(selection.eligible, &extension.name)
            .await;
        self.core.refresh_context().await;
        tracing::info!(extension = %extension.name, attempted, started, "extension MCP servers started");
    }

    /// Disconnect and forget the servers an extension contributed.
    pub async fn stop_extension(&self, extension: &Extension) {
        let removed = self.core.registry.remove_extension(&extension.name);
        if removed.is_empty() {
            return;
        }
        disconnect_all(removed).await;
        self.core.refresh_context().await;
    }

    /// Reconnect every registered server.
    pub async fn restart(&self) {
        let mut join_set = JoinSet::new();
        for entry in self.core.registry.entries() {
            let core = Arc::clone(&self.core);
            join_set.spawn(async move { core.restart_entry(&entry).await });
        }
        while let Some(result) = join_set.join_next().await {
            if result.is_err() {
                tracing::warn!("MCP server restart task panicked");
            }
        }
        self.core.refresh_context().await;
    }

    /// Reconnect one server.
    ///
    /// # Errors
    ///
    /// Returns `McpError::NotFound` if no server is registered under `name`.
    /// Failures of the reconnect itself are logged, not returned.
    pub async fn restart_server(&self, name: &str) -> Result<(), McpError> {
        let entry = self
            .core
            .registry
            .get(name)
            .ok_or_else(|| McpError::NotFound { name: name.into() })?;
        self.core.restart_entry(&entry).await;
        self.core.refresh_context().await;
        Ok(())
    }

    /// Cancel the health monitor, disconnect every client and wait for
    /// restarts already in flight to wind down.
    pub async fn stop(&self) {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(monitor) = &monitor {
            monitor.signal_shutdown();
        }
        disconnect_all(self.core.registry.drain()).await;
        if let Some(monitor) = monitor {
            monitor.join().await;
        }
    }

    #[must_use]
    pub fn get_discovery_state(&self) -> DiscoveryState {
        self.core.discovery.get()
    }

    #[must_use]
    pub fn subscribe_discovery_state(&self) -> watch::Receiver<DiscoveryState> {
        self.core.discovery.subscribe()
    }

    #[must_use]
    pub fn get_blocked_mcp_servers(&self) -> Vec<BlockedServer> {
        self.core
            .blocked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Instructions of every running server, one delimited block per server.
    #[must_use]
    pub fn get_mcp_instructions(&self) -> String {
        let entries = self.core.registry.entries();
        format_mcp_instructions(
            entries
                .iter()
                .map(|e| (e.name.as_str(), e.client.instructions())),
        )
    }

    #[must_use]
    pub fn server_names(&self) -> Vec<String> {
        self.core.registry.names()
    }

    #[must_use]
    pub fn client(&self, name: &str) -> Option<Arc<dyn McpClientHandle>> {
        self.core.registry.get(name).map(|e| e.client)
    }

    #[must_use]
    pub fn server_status(&self, name: &str) -> Option<McpServerStatus> {
        self.core.registry.get(name).map(|e| e.client.status())
    }

    #[must_use]
    pub fn server_statuses(&self) -> Vec<(String, McpServerStatus)> {
        self.core
            .registry
            .entries()
            .into_iter()
            .map(|e| {
                let status = e.client.status();
                (e.name, status)
            })
            .collect()
    }

    #[must_use]
    pub fn is_restarting(&self, name: &str) -> bool {
        self.core
            .registry
            .get(name)
            .is_some_and(|e| e.guard.is_restarting())
    }
}

async fn disconnect_all(entries: Vec<ClientEntry>) {
    let mut join_set = JoinSet::new();
    for entry in entries {
        join_set.spawn(async move {
            let result = entry.client.disconnect().await;
            (entry.name, result)
        });
    }
    while let Some(result) = join_set.join_next().await {
        match result {
            Ok((server, Ok(()))) => tracing::info!(server, "MCP server disconnected"),
            Ok((server, Err(e))) => tracing::warn!(server, "MCP disconnect failed: {e:#}"),
            Err(_) => tracing::warn!("MCP disconnect task panicked"),
        }
    }
}
