use super::Config;

fn parse_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CORRAL_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("CORRAL_MCP_TRUSTED") {
            if let Ok(trusted) = v.parse::<bool>() {
                self.mcp.trusted = trusted;
            } else {
                tracing::warn!("ignoring invalid CORRAL_MCP_TRUSTED value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CORRAL_MCP_ALLOWED") {
            self.mcp.allowed = parse_list(&v);
        }
        if let Ok(v) = std::env::var("CORRAL_MCP_BLOCKED") {
            self.mcp.blocked = parse_list(&v);
        }
        if let Ok(v) = std::env::var("CORRAL_MCP_AUTO_RESTART") {
            if let Ok(enabled) = v.parse::<bool>() {
                self.mcp.auto_restart.enabled = enabled;
            } else {
                tracing::warn!("ignoring invalid CORRAL_MCP_AUTO_RESTART value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CORRAL_MCP_HEALTH_CHECK_INTERVAL_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                self.mcp.auto_restart.health_check_interval_ms = ms;
            } else {
                tracing::warn!("ignoring invalid CORRAL_MCP_HEALTH_CHECK_INTERVAL_MS value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CORRAL_MCP_UNHEALTHY_TIMEOUT_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                self.mcp.auto_restart.unhealthy_timeout_ms = ms;
            } else {
                tracing::warn!("ignoring invalid CORRAL_MCP_UNHEALTHY_TIMEOUT_MS value: {v}");
            }
        }
    }
}
