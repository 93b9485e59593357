mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!("config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Check that every configured server names exactly one transport and
    /// that auto-restart timings are usable.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid entry.
    pub fn validate(&self) -> anyhow::Result<()> {
        let restart = &self.mcp.auto_restart;
        if restart.health_check_interval_ms == 0 {
            bail!("mcp.auto_restart.health_check_interval_ms must be greater than zero");
        }
        if restart.unhealthy_timeout_ms == 0 {
            bail!("mcp.auto_restart.unhealthy_timeout_ms must be greater than zero");
        }

        let extension_servers = self.extensions.iter().flat_map(|ext| {
            ext.mcp_servers
                .iter()
                .map(move |(name, cfg)| (format!("{}/{name}", ext.name), cfg))
        });
        let servers = self
            .mcp
            .servers
            .iter()
            .map(|(name, cfg)| (name.clone(), cfg))
            .chain(extension_servers);

        for (name, cfg) in servers {
            match (&cfg.command, &cfg.url) {
                (Some(_), Some(_)) => {
                    bail!("mcp server {name:?} sets both `command` and `url`")
                }
                (None, None) => bail!("mcp server {name:?} needs either `command` or `url`"),
                (Some(cmd), None) if cmd.trim().is_empty() => {
                    bail!("mcp server {name:?} has an empty `command`")
                }
                _ => {}
            }
        }
        Ok(())
    }
}
