//! Configuration management for the interop relay monitor
//!
//! Loads configuration from TOML files with environment variable substitution.
//! The library never reads the environment on its own: the host process loads
//! [`Settings`] and passes the relevant sections to each component.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "INTEROP_MONITOR_CONFIG";

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub chains: HashMap<String, ChainConfig>,
}

/// Polling and lifecycle settings for the lifecycle monitor
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between per-chain scans of newly sent messages
    pub poll_interval_ms: u64,
    /// Interval used by `wait_for_relay`
    pub relay_poll_interval_ms: u64,
    /// Number of most recent blocks rescanned on every tick
    pub trailing_window_blocks: u64,
    /// Margin of destination blocks searched below the block matching a
    /// message's send time
    pub relay_lookback_blocks: u64,
    /// Upper bound on one destination probe made by a poll tick
    pub probe_timeout_ms: u64,
    /// Age after which an unresolved message is reported as expired
    pub message_expiry_secs: u64,
    /// Capacity of the status broadcast channel
    pub status_channel_capacity: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            relay_poll_interval_ms: 1_000,
            trailing_window_blocks: 50,
            relay_lookback_blocks: 5_000,
            probe_timeout_ms: 10_000,
            message_expiry_secs: 3_600,
            status_channel_capacity: 1_024,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Estimate reported to callers for a full swap-bridge-swap
    pub estimated_completion_secs: u64,
    /// Deadline applied to router calls that take one
    pub swap_deadline_secs: u64,
    pub completion_poll_interval_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            estimated_completion_secs: 120,
            swap_deadline_secs: 600,
            completion_poll_interval_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    /// Cross-domain messenger emitting `SentMessage` / `RelayedMessage`
    pub messenger_address: String,
    /// Cross-chain inbox used by relayers to validate executing messages
    #[serde(default)]
    pub inbox_address: String,
    /// Token symbol -> token address on this chain
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    #[serde(default)]
    pub dex: Option<DexConfig>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Router used for local swaps on a chain
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DexConfig {
    /// Router interface tag, e.g. `uniswap-v3` or `velodrome-v2`
    pub router_type: String,
    pub router_address: String,
    #[serde(default = "default_fee_tier")]
    pub fee_tier: u32,
    /// Pool factory, required by route-based routers
    #[serde(default)]
    pub factory_address: Option<String>,
    #[serde(default)]
    pub stable: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_fee_tier() -> u32 {
    3_000
}

impl Settings {
    /// Load settings from the file named by `INTEROP_MONITOR_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references first
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in &self.chains {
            if chain.enabled {
                if chain.rpc_urls.is_empty() {
                    anyhow::bail!("Chain {} has no RPC URLs configured", name);
                }
                if chain.messenger_address.is_empty() {
                    anyhow::bail!("Chain {} has no messenger address configured", name);
                }
                if chain.inbox_address.is_empty() {
                    tracing::warn!("Chain {} has no inbox address configured", name);
                }
            }
        }

        if self.monitor.trailing_window_blocks == 0 {
            anyhow::bail!("monitor.trailing_window_blocks must be at least 1");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [chains.op-a]
        chain_id = 901
        name = "OP Devnet A"
        rpc_urls = ["http://127.0.0.1:9545"]
        messenger_address = "0x4200000000000000000000000000000000000023"
        inbox_address = "0x4200000000000000000000000000000000000022"

        [chains.op-a.tokens]
        USDC = "0x1000000000000000000000000000000000000001"

        [chains.op-a.dex]
        router_type = "uniswap-v3"
        router_address = "0x2000000000000000000000000000000000000002"

        [chains.op-b]
        chain_id = 902
        name = "OP Devnet B"
        rpc_urls = ["http://127.0.0.1:9546"]
        messenger_address = "0x4200000000000000000000000000000000000023"
        enabled = false
    "#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("INTEROP_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${INTEROP_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_defaults_applied_for_missing_sections() {
        let settings = Settings::from_toml_str(MINIMAL).unwrap();

        assert_eq!(settings.monitor.poll_interval_ms, 2_000);
        assert_eq!(settings.monitor.trailing_window_blocks, 50);
        assert_eq!(settings.workflow.estimated_completion_secs, 120);
        assert!(!settings.metrics.enabled);

        let chain = settings.get_chain_by_id(901).unwrap();
        assert!(chain.enabled);
        let dex = chain.dex.as_ref().unwrap();
        assert_eq!(dex.fee_tier, 3_000);
        assert!(!dex.stable);
        assert_eq!(settings.enabled_chains().len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[monitor]\npoll_interval_ms = 250\nmessage_expiry_secs = 60\n{}",
            MINIMAL
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.monitor.poll_interval_ms, 250);
        assert_eq!(settings.monitor.message_expiry_secs, 60);
        // Unset fields keep their defaults
        assert_eq!(settings.monitor.relay_lookback_blocks, 5_000);
    }

    #[test]
    fn test_rejects_chain_without_rpc() {
        let config = r#"
            [chains.op-a]
            chain_id = 901
            name = "OP Devnet A"
            rpc_urls = []
            messenger_address = "0x4200000000000000000000000000000000000023"
        "#;
        let err = Settings::from_toml_str(config).unwrap_err();
        assert!(err.to_string().contains("no RPC URLs"));
    }

    #[test]
    fn test_rejects_all_chains_disabled() {
        let config = MINIMAL.replace("name = \"OP Devnet A\"", "name = \"OP Devnet A\"\nenabled = false");
        assert!(Settings::from_toml_str(&config).is_err());
    }
}
