//! Engine and chain configuration.
//!
//! Chains are described in a YAML file; global knobs and per-chain endpoint
//! lists can be overridden from environment variables:
//!
//! | Variable                | Effect                                        |
//! |-------------------------|-----------------------------------------------|
//! | `ENABLED_CHAINS`        | comma list of chain ids or names to index     |
//! | `POLL_INTERVAL_MS`      | sleep while caught up                         |
//! | `BATCH_SIZE`            | default blocks per batch                      |
//! | `MAX_RETRIES`           | backoff retries per batch                     |
//! | `RETRY_DELAY_MS`        | base backoff delay                            |
//! | `MAX_BACKOFF_MS`        | backoff cap                                   |
//! | `REORG_DEPTH`           | blocks replayed at start-up                   |
//! | `HEALTH_INTERVAL_SECS`  | health monitor period                         |
//! | `PROBE_INTERVAL_SECS`   | endpoint probe period                         |
//! | `RPC_URL_<NAME>`        | replace a chain's endpoints with one URL      |
//! | `RPC_URLS_<NAME>`       | replace a chain's endpoints with a comma list |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffConfig;
use crate::cursor::DEFAULT_REORG_DEPTH;
use crate::error::IndexerError;
use crate::types::{is_valid_address, ChainDescriptor};

/// Global engine settings shared by every chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_reorg_depth")]
    pub reorg_depth: u64,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_min_switch_interval_ms")]
    pub min_switch_interval_ms: u64,
    /// Consecutive probe failures after which any error forces a switch.
    #[serde(default = "default_endpoint_failure_ceiling")]
    pub endpoint_failure_ceiling: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    #[serde(default = "default_timestamp_cache_size")]
    pub timestamp_cache_size: usize,
    /// Chain ids or names to index; empty means every configured chain.
    #[serde(default)]
    pub enabled_chains: Vec<String>,
}

fn default_poll_interval_ms() -> u64 {
    12_000
}

fn default_batch_size() -> u64 {
    1_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_reorg_depth() -> u64 {
    DEFAULT_REORG_DEPTH
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_min_switch_interval_ms() -> u64 {
    5_000
}

fn default_endpoint_failure_ceiling() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_health_interval_secs() -> u64 {
    60
}

fn default_timestamp_cache_size() -> usize {
    1_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            reorg_depth: default_reorg_depth(),
            probe_interval_secs: default_probe_interval_secs(),
            min_switch_interval_ms: default_min_switch_interval_ms(),
            endpoint_failure_ceiling: default_endpoint_failure_ceiling(),
            request_timeout_secs: default_request_timeout_secs(),
            health_interval_secs: default_health_interval_secs(),
            timestamp_cache_size: default_timestamp_cache_size(),
            enabled_chains: vec![],
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn min_switch_interval(&self) -> Duration {
        Duration::from_millis(self.min_switch_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_delay_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Apply global overrides from an environment lookup.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        override_parsed(lookup, "POLL_INTERVAL_MS", &mut self.poll_interval_ms);
        override_parsed(lookup, "BATCH_SIZE", &mut self.batch_size);
        override_parsed(lookup, "MAX_RETRIES", &mut self.max_retries);
        override_parsed(lookup, "RETRY_DELAY_MS", &mut self.retry_delay_ms);
        override_parsed(lookup, "MAX_BACKOFF_MS", &mut self.max_backoff_ms);
        override_parsed(lookup, "REORG_DEPTH", &mut self.reorg_depth);
        override_parsed(lookup, "HEALTH_INTERVAL_SECS", &mut self.health_interval_secs);
        override_parsed(lookup, "PROBE_INTERVAL_SECS", &mut self.probe_interval_secs);
        if let Some(list) = lookup("ENABLED_CHAINS") {
            self.enabled_chains = split_list(&list);
        }
    }

    /// Returns `true` if `chain` passes the allowlist.
    pub fn is_enabled(&self, chain: &ChainDescriptor) -> bool {
        self.enabled_chains.is_empty()
            || self.enabled_chains.iter().any(|entry| {
                entry.eq_ignore_ascii_case(&chain.name)
                    || entry.parse::<u64>().is_ok_and(|id| id == chain.chain_id)
            })
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The on-disk configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub chains: Vec<ChainDescriptor>,
}

impl ConfigFile {
    /// Parse a YAML document.
    pub fn from_yaml(source: &str) -> Result<Self, IndexerError> {
        serde_yaml::from_str(source).map_err(|e| IndexerError::Config(format!("parse config: {e}")))
    }

    /// Read and parse a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IndexerError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| IndexerError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_yaml(&source)
    }

    /// Apply engine and per-chain endpoint overrides.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.engine.apply_env(&lookup);
        for chain in &mut self.chains {
            let key = env_key(&chain.name);
            if let Some(list) = lookup(&format!("RPC_URLS_{key}")) {
                let urls = split_list(&list);
                if !urls.is_empty() {
                    chain.endpoints = urls;
                }
            } else if let Some(url) = lookup(&format!("RPC_URL_{key}")) {
                let url = url.trim();
                if !url.is_empty() {
                    chain.endpoints = vec![url.to_string()];
                }
            }
        }
    }

    /// Descriptors that pass the allowlist, in file order.
    pub fn enabled_chains(&self) -> Vec<ChainDescriptor> {
        self.chains
            .iter()
            .filter(|c| self.engine.is_enabled(c))
            .cloned()
            .collect()
    }
}

/// `"BNB Chain"` → `"BNB_CHAIN"`.
fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Check a descriptor for problems that can be detected without the network.
pub fn validate_descriptor(chain: &ChainDescriptor) -> Result<(), IndexerError> {
    if chain.endpoints.is_empty() {
        return Err(IndexerError::Config(format!(
            "chain {} has no RPC endpoints",
            chain.label()
        )));
    }
    for (role, address) in chain.contracts.iter() {
        if !is_valid_address(address) {
            return Err(IndexerError::Config(format!(
                "chain {}: invalid {role} address {address:?}",
                chain.label()
            )));
        }
    }
    Ok(())
}
