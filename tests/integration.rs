use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use corral_core::{Config, HostContext};
use corral_mcp::mock::{MockClient, MockFactory};
use corral_mcp::{
    DiscoveryState, McpClientHandle, McpManager, McpServerStatus, McpSettings, ToolRegistry,
};

const CONFIG: &str = r#"
[mcp]
blocked = ["scratch"]

[mcp.auto_restart]
enabled = true
health_check_interval_ms = 1000
unhealthy_timeout_ms = 3000

[mcp.servers.files]
command = "mcp-files"

[mcp.servers.scratch]
command = "mcp-scratch"

[mcp.servers.web]
url = "http://localhost:8080/mcp"

[[extensions]]
name = "git-tools"
version = "0.3.0"

[extensions.mcp_servers.git]
command = "mcp-git"

[extensions.mcp_servers.scratch]
command = "mcp-scratch"

[[extensions]]
name = "dormant"
active = false

[extensions.mcp_servers.sleepy]
command = "mcp-sleepy"
"#;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("corral.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{CONFIG}").unwrap();
    path
}

/// Factory that hands out a fresh mock per server, answering with the
/// server name as its instructions, and remembers every client it built.
fn recording_factory() -> (MockFactory, Arc<Mutex<Vec<(String, Arc<MockClient>)>>>) {
    let built = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&built);
    let factory = MockFactory::from_fn(move |name, config| {
        let client = Arc::new(MockClient::new(
            config.clone(),
            Some(format!("use {name} wisely")),
        ));
        sink.lock()
            .unwrap()
            .push((name.to_owned(), Arc::clone(&client)));
        Ok(client as Arc<dyn McpClientHandle>)
    });
    (factory, built)
}

fn load_host(dir: &Path) -> Arc<HostContext> {
    let config = Config::load(&write_config(dir)).unwrap();
    config.validate().unwrap();
    Arc::new(HostContext::new(config, Arc::new(ToolRegistry::new())))
}

#[tokio::test]
async fn configured_servers_start_from_loaded_config() {
    let dir = tempfile::tempdir().unwrap();
    let host = load_host(dir.path());
    let (factory, built) = recording_factory();
    let manager = McpManager::new(Arc::clone(&host) as Arc<dyn McpSettings>, Arc::new(factory));

    assert_eq!(manager.get_discovery_state(), DiscoveryState::NotStarted);
    manager.start_configured_mcp_servers().await;
    assert_eq!(manager.get_discovery_state(), DiscoveryState::Completed);

    let mut names = manager.server_names();
    names.sort();
    assert_eq!(names, vec!["files", "web"]);
    assert_eq!(built.lock().unwrap().len(), 2);
    assert_eq!(manager.server_status("files"), Some(McpServerStatus::Connected));
    assert_eq!(manager.server_status("scratch"), None);

    let blocked = manager.get_blocked_mcp_servers();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].name, "scratch");
    assert!(blocked[0].extension_name.is_empty());

    assert_eq!(host.generation(), 1);
    manager.stop().await;
}

#[tokio::test]
async fn extensions_add_and_remove_their_servers() {
    let dir = tempfile::tempdir().unwrap();
    let host = load_host(dir.path());
    let (factory, _built) = recording_factory();
    let manager = McpManager::new(Arc::clone(&host) as Arc<dyn McpSettings>, Arc::new(factory));

    manager.start_configured_mcp_servers().await;
    for extension in host.active_extensions() {
        manager.start_extension(extension).await;
    }
    let inactive = &host.config().extensions[1];
    manager.start_extension(inactive).await;

    assert!(manager.server_names().contains(&"git".to_owned()));
    assert!(!manager.server_names().contains(&"sleepy".to_owned()));
    assert!(
        manager
            .get_blocked_mcp_servers()
            .iter()
            .any(|b| b.name == "scratch" && b.extension_name == "git-tools")
    );
    // One refresh for the configured batch, one for the extension.
    assert_eq!(host.generation(), 2);

    let instructions = manager.get_mcp_instructions();
    assert!(instructions.contains("tool server 'git'"));
    assert!(instructions.contains("use git wisely"));

    manager.stop_extension(&host.config().extensions[0]).await;
    assert!(!manager.server_names().contains(&"git".to_owned()));
    assert!(!manager.get_mcp_instructions().contains("use git wisely"));
    assert_eq!(host.generation(), 3);

    manager.stop().await;
    assert!(manager.server_names().is_empty());
}

#[tokio::test]
async fn restart_server_reports_unknown_names() {
    let dir = tempfile::tempdir().unwrap();
    let host = load_host(dir.path());
    let (factory, built) = recording_factory();
    let manager = McpManager::new(Arc::clone(&host) as Arc<dyn McpSettings>, Arc::new(factory));
    manager.start_configured_mcp_servers().await;

    let err = manager.restart_server("nope").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"No MCP server registered with the name "nope""#
    );

    manager.restart_server("files").await.unwrap();
    let built = built.lock().unwrap();
    let files: Vec<_> = built.iter().filter(|(n, _)| n == "files").collect();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].1.disconnect_calls(), 1);
    assert_eq!(files[1].1.connect_calls(), 1);
    drop(built);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unresponsive_server_is_restarted_by_health_monitor() {
    let dir = tempfile::tempdir().unwrap();
    let host = load_host(dir.path());
    let (factory, built) = recording_factory();
    let manager = McpManager::new(Arc::clone(&host) as Arc<dyn McpSettings>, Arc::new(factory));
    manager.start_configured_mcp_servers().await;

    let first_files = built
        .lock()
        .unwrap()
        .iter()
        .find(|(n, _)| n == "files")
        .map(|(_, c)| Arc::clone(c))
        .unwrap();
    first_files.set_report_unhealthy(true);

    for _ in 0..40 {
        tokio::time::advance(Duration::from_millis(100)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    assert_eq!(first_files.disconnect_calls(), 1);
    let files_built = built
        .lock()
        .unwrap()
        .iter()
        .filter(|(n, _)| n == "files")
        .count();
    assert_eq!(files_built, 2);
    assert_eq!(manager.server_status("files"), Some(McpServerStatus::Connected));
    assert!(!manager.is_restarting("files"));
    assert!(host.generation() >= 2);

    manager.stop().await;
}
