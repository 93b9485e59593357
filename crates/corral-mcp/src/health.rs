//! Background health checks with auto-restart of unresponsive servers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::manager::ManagerCore;
use crate::settings::AutoRestartConfig;

/// Handle to the periodic health-check task. Dropping it aborts the task.
#[derive(Debug)]
pub(crate) struct HealthMonitor {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Spawn the loop, or return `None` when auto-restart is disabled.
    pub(crate) fn spawn(core: Arc<ManagerCore>, config: AutoRestartConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tracing::info!(
            interval_ms = config.health_check_interval_ms,
            unhealthy_timeout_ms = config.unhealthy_timeout_ms,
            "starting MCP health monitor"
        );
        let task = tokio::spawn(run(core, config, shutdown_rx));
        Some(Self {
            shutdown_tx,
            task: Some(task),
        })
    }

    /// Stop scheduling ticks. Restarts already running keep going until
    /// [`HealthMonitor::join`].
    pub(crate) fn signal_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Wait for the loop and every restart it spawned to finish.
    pub(crate) async fn join(mut self) {
        self.signal_shutdown();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && !e.is_cancelled()
        {
            tracing::warn!("MCP health monitor task failed: {e}");
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    core: Arc<ManagerCore>,
    config: AutoRestartConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // tokio intervals reject a zero period
    let period = config.health_check_interval().max(Duration::from_millis(1));
    let unhealthy_timeout = config.unhealthy_timeout();
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut restarts = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("MCP health monitor shutting down");
                    break;
                }
            }
            Some(result) = restarts.join_next(), if !restarts.is_empty() => {
                log_restart_panic(result);
            }
            _ = interval.tick() => {
                check_servers(&core, unhealthy_timeout, &mut restarts);
            }
        }
    }

    while let Some(result) = restarts.join_next().await {
        log_restart_panic(result);
    }
}

fn log_restart_panic(result: Result<(), JoinError>) {
    if let Err(e) = result
        && e.is_panic()
    {
        tracing::warn!("MCP server restart task panicked: {e}");
    }
}

/// One health tick: refresh health baselines and restart servers that have
/// been unhealthy for at least `unhealthy_timeout`.
fn check_servers(
    core: &Arc<ManagerCore>,
    unhealthy_timeout: Duration,
    restarts: &mut JoinSet<()>,
) {
    let now = Instant::now();
    for entry in core.registry.entries() {
        if entry.guard.is_restarting() {
            continue;
        }

        let status = entry.client.status();
        let last_healthy = if status.is_healthy() {
            core.registry.mark_healthy(&entry.name, now);
            now
        } else {
            entry.last_healthy
        };

        let elapsed = now.saturating_duration_since(last_healthy);
        if elapsed < unhealthy_timeout {
            continue;
        }

        // lost the race against a manual restart
        let Some(ticket) = entry.guard.try_acquire() else {
            continue;
        };

        tracing::warn!(
            server = %entry.name,
            %status,
            unhealthy_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "MCP server unresponsive, restarting"
        );
        let core = Arc::clone(core);
        restarts.spawn(async move {
            match core.reconnect(&entry.name, ticket).await {
                Ok(()) => tracing::info!(server = %entry.name, "MCP server restarted"),
                Err(e) => tracing::warn!(server = %entry.name, "MCP server restart failed: {e:#}"),
            }
            core.refresh_context().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::handle::McpClientHandle;
    use crate::manager::McpManager;
    use crate::mock::{MockClient, MockFactory, MockSettings};
    use crate::settings::AutoRestartConfig;

    fn auto_restart(interval_ms: u64, timeout_ms: u64) -> AutoRestartConfig {
        AutoRestartConfig {
            enabled: true,
            health_check_interval_ms: interval_ms,
            unhealthy_timeout_ms: timeout_ms,
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    /// Step the paused clock so every interval tick in between fires.
    async fn advance_ms(ms: u64) {
        for _ in 0..ms / 100 {
            tokio::time::advance(Duration::from_millis(100)).await;
            settle().await;
        }
    }

    fn unhealthy_setup(config: AutoRestartConfig) -> (McpManager, Arc<MockClient>) {
        let client = Arc::new(MockClient::default());
        client.set_report_unhealthy(true);
        let mut settings = MockSettings::with_servers(&["test-server"]);
        settings.auto_restart = config;
        let manager = McpManager::new(
            Arc::new(settings),
            Arc::new(MockFactory::shared(Arc::clone(&client))),
        );
        (manager, client)
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_unresponsive_server_once_at_a_time() {
        let (manager, client) = unhealthy_setup(auto_restart(1000, 5000));
        manager.start_configured_mcp_servers().await;
        client.reset_calls();
        client.close_disconnect_gate();

        advance_ms(6000).await;
        assert_eq!(client.disconnect_calls(), 1);
        assert!(manager.is_restarting("test-server"));

        // tick while the first restart is still parked in disconnect
        advance_ms(1000).await;
        assert_eq!(client.disconnect_calls(), 1);

        client.open_disconnect_gate();
        settle().await;
        assert!(!manager.is_restarting("test-server"));
        assert_eq!(client.connect_calls(), 1);

        advance_ms(6000).await;
        assert_eq!(client.disconnect_calls(), 2);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_restart_does_not_hold_up_other_servers() {
        let stalled = Arc::new(MockClient::default());
        let other = Arc::new(MockClient::default());
        let factory = {
            let stalled = Arc::clone(&stalled);
            let other = Arc::clone(&other);
            MockFactory::from_fn(move |name, _| {
                let client = if name == "stalled" { &stalled } else { &other };
                Ok(Arc::clone(client) as Arc<dyn McpClientHandle>)
            })
        };
        let mut settings = MockSettings::with_servers(&["stalled", "other"]);
        settings.auto_restart = auto_restart(1000, 3000);
        let manager = McpManager::new(Arc::new(settings), Arc::new(factory));
        manager.start_configured_mcp_servers().await;
        stalled.set_report_unhealthy(true);
        other.set_report_unhealthy(true);
        stalled.close_disconnect_gate();

        advance_ms(3500).await;
        assert_eq!(stalled.disconnect_calls(), 1);
        assert!(manager.is_restarting("stalled"));
        assert_eq!(other.disconnect_calls(), 1);
        assert_eq!(other.connect_calls(), 2);
        assert!(!manager.is_restarting("other"));

        advance_ms(3000).await;
        assert_eq!(stalled.disconnect_calls(), 1);
        assert_eq!(other.disconnect_calls(), 2);

        stalled.open_disconnect_gate();
        settle().await;
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_server_is_never_restarted() {
        let client = Arc::new(MockClient::default());
        let mut settings = MockSettings::with_servers(&["test-server"]);
        settings.auto_restart = auto_restart(1000, 5000);
        let manager = McpManager::new(
            Arc::new(settings),
            Arc::new(MockFactory::shared(Arc::clone(&client))),
        );
        manager.start_configured_mcp_servers().await;

        advance_ms(20_000).await;
        assert_eq!(client.disconnect_calls(), 0);
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_monitor_never_restarts() {
        let (manager, client) = unhealthy_setup(AutoRestartConfig {
            enabled: false,
            ..auto_restart(1000, 5000)
        });
        manager.start_configured_mcp_servers().await;

        advance_ms(20_000).await;
        assert_eq!(client.disconnect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restart_clears_guard_for_next_attempt() {
        let (manager, client) = unhealthy_setup(auto_restart(1000, 3000));
        manager.start_configured_mcp_servers().await;
        client.reset_calls();
        client.set_fail_connect(true);
        client.fail_next_disconnects(1);

        advance_ms(3000).await;
        assert_eq!(client.disconnect_calls(), 1);
        assert_eq!(client.connect_calls(), 1);
        assert!(!manager.is_restarting("test-server"));

        advance_ms(3000).await;
        assert_eq!(client.disconnect_calls(), 2);
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_loop() {
        let (manager, client) = unhealthy_setup(auto_restart(1000, 2000));
        manager.start_configured_mcp_servers().await;
        manager.stop().await;
        client.reset_calls();

        advance_ms(10_000).await;
        assert_eq!(client.disconnect_calls(), 0);
    }
}
