//! Switcher configuration, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Tunables for the switcher. Every field has a default, so a partial TOML
/// file (or none at all) is fine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SwitcherConfig {
    /// Number of modems on the device.
    pub num_modems: usize,
    /// Maximum simultaneously active modems (may be raised or lowered at
    /// runtime by a capability change).
    pub max_active_modems: usize,
    /// Constant backoff between retries of a failed modem command.
    pub command_retry_period_ms: u64,
    /// Expiration handed to the validation probe.
    pub validation_timeout_ms: u64,
    /// How long a network-path-change observation may be held before it is
    /// forcibly dropped.
    pub path_watch_timeout_ms: u64,
    /// Capacity of the decision log ring buffer.
    pub decision_log_capacity: usize,
    /// Capacity of the event queue feeding the worker thread.
    pub event_queue_capacity: usize,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        SwitcherConfig {
            num_modems: 2,
            max_active_modems: 1,
            command_retry_period_ms: 5_000,
            validation_timeout_ms: 2_000,
            path_watch_timeout_ms: 5_000,
            decision_log_capacity: 30,
            event_queue_capacity: 128,
        }
    }
}

impl SwitcherConfig {
    pub fn command_retry_period(&self) -> Duration {
        Duration::from_millis(self.command_retry_period_ms)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn path_watch_timeout(&self) -> Duration {
        Duration::from_millis(self.path_watch_timeout_ms)
    }

    /// Parses a TOML document.
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: SwitcherConfig =
            toml::from_str(raw).context("invalid switcher config")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and parses a TOML config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.num_modems > 0, "num_modems must be at least 1");
        anyhow::ensure!(
            self.max_active_modems > 0,
            "max_active_modems must be at least 1"
        );
        anyhow::ensure!(
            self.event_queue_capacity > 0,
            "event_queue_capacity must be at least 1"
        );
        Ok(())
    }
}
