//! Network and engine configuration

use crate::constants::{
    DEFAULT_CONFIRMATIONS, DEFAULT_FALLBACK_GAS_LIMIT, DEFAULT_GAS_BUFFER_PERCENT,
    DEFAULT_INIT_FAILURE_COOLDOWN, DEFAULT_QUOTA_CAP_USD, DEFAULT_RECEIPT_POLL_INTERVAL,
    DEFAULT_RECEIPT_TIMEOUT, DEFAULT_RPC_TIMEOUT, DEFAULT_USD_PER_CALL, ENTRY_POINT_V06,
    DEFAULT_FACTORY_V06,
};
use alloy::primitives::Address;
use eyre::{Context, Result};
use std::time::Duration;

/// Per-network account abstraction capability flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AaCapability {
    /// The AA provider supports this network at all
    pub supports_aa: bool,
    /// The network has been enabled in the provider dashboard
    pub configured_in_dashboard: bool,
    /// Gas sponsorship policy id (required for sponsored operations)
    pub gas_policy_id: Option<String>,
    /// Bundler / paymaster JSON-RPC endpoint
    pub bundler_url: Option<String>,
    /// ERC-4337 EntryPoint contract
    pub entry_point: Address,
    /// Smart account factory contract
    pub account_factory: Address,
}

impl Default for AaCapability {
    fn default() -> Self {
        Self::unsupported()
    }
}

impl AaCapability {
    /// Capability entry for a network without AA support
    pub fn unsupported() -> Self {
        Self {
            supports_aa: false,
            configured_in_dashboard: false,
            gas_policy_id: None,
            bundler_url: None,
            entry_point: ENTRY_POINT_V06,
            account_factory: DEFAULT_FACTORY_V06,
        }
    }

    /// Capability entry for a fully configured AA network
    pub fn enabled(bundler_url: impl Into<String>) -> Self {
        Self {
            supports_aa: true,
            configured_in_dashboard: true,
            bundler_url: Some(bundler_url.into()),
            ..Self::unsupported()
        }
    }

    /// Set the gas sponsorship policy id
    pub fn with_gas_policy(mut self, policy_id: impl Into<String>) -> Self {
        self.gas_policy_id = Some(policy_id.into());
        self
    }

    /// Set the EntryPoint address
    pub fn with_entry_point(mut self, entry_point: Address) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Set the account factory address
    pub fn with_account_factory(mut self, factory: Address) -> Self {
        self.account_factory = factory;
        self
    }

    /// Whether the network is both supported and configured for AA
    pub fn is_available(&self) -> bool {
        self.supports_aa && self.configured_in_dashboard
    }
}

/// Network descriptor supplied by the network-configuration collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Stable network identifier (e.g. "base-sepolia")
    pub id: String,
    /// EVM chain id
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Block explorer base URL (without trailing slash)
    pub explorer_url: String,
    /// Account abstraction capability table entry
    pub aa: AaCapability,
}

impl NetworkConfig {
    /// Create a network without AA capabilities
    pub fn new(
        id: impl Into<String>,
        chain_id: u64,
        rpc_url: impl Into<String>,
        explorer_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            chain_id,
            rpc_url: rpc_url.into(),
            explorer_url: explorer_url.into().trim_end_matches('/').to_string(),
            aa: AaCapability::unsupported(),
        }
    }

    /// Load a network from `<PREFIX>_*` environment variables
    ///
    /// Reads `<PREFIX>_CHAIN_ID`, `<PREFIX>_RPC_URL`, `<PREFIX>_EXPLORER_URL` and,
    /// optionally, `<PREFIX>_BUNDLER_URL` and `<PREFIX>_GAS_POLICY_ID`. A `.env`
    /// file is honoured.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let var = |name: &str| dotenvy::var(format!("{prefix}_{name}"));

        let chain_id: u64 = var("CHAIN_ID")
            .with_context(|| format!("{prefix}_CHAIN_ID must be set"))?
            .parse()
            .context("Invalid chain id")?;
        let rpc_url = var("RPC_URL").with_context(|| format!("{prefix}_RPC_URL must be set"))?;
        let explorer_url = var("EXPLORER_URL").unwrap_or_default();

        let mut network = Self::new(prefix.to_lowercase(), chain_id, rpc_url, explorer_url);
        if let Ok(bundler_url) = var("BUNDLER_URL") {
            let mut aa = AaCapability::enabled(bundler_url);
            if let Ok(policy) = var("GAS_POLICY_ID") {
                aa = aa.with_gas_policy(policy);
            }
            network = network.with_aa(aa);
        }
        Ok(network)
    }

    /// Set the AA capability entry
    pub fn with_aa(mut self, aa: AaCapability) -> Self {
        self.aa = aa;
        self
    }

    /// Set the RPC URL
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = rpc_url.into();
        self
    }

    /// Explorer link for a transaction hash
    pub fn explorer_tx_url(&self, tx_hash: impl std::fmt::Display) -> Option<String> {
        if self.explorer_url.is_empty() {
            return None;
        }
        Some(format!("{}/tx/{}", self.explorer_url, tx_hash))
    }
}

/// Engine-wide tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for single RPC round-trips (call, estimate, send)
    pub rpc_timeout: Duration,
    /// Deadline for receipt / user operation inclusion
    pub receipt_timeout: Duration,
    /// Receipt polling interval
    pub receipt_poll_interval: Duration,
    /// Confirmations to wait for on the EOA path
    pub confirmations: u64,
    /// Gas limit multiplier in percent (120 = estimate × 1.2)
    pub gas_buffer_percent: u64,
    /// Gas limit used when estimation itself fails
    pub fallback_gas_limit: u64,
    /// How long a failed smart-account initialization stays cached
    pub init_failure_cooldown: Duration,
    /// Sponsorship cap per period in USD
    pub quota_cap_usd: f64,
    /// Estimated sponsored cost per call in USD
    pub usd_per_call: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            confirmations: DEFAULT_CONFIRMATIONS,
            gas_buffer_percent: DEFAULT_GAS_BUFFER_PERCENT,
            fallback_gas_limit: DEFAULT_FALLBACK_GAS_LIMIT,
            init_failure_cooldown: DEFAULT_INIT_FAILURE_COOLDOWN,
            quota_cap_usd: DEFAULT_QUOTA_CAP_USD,
            usd_per_call: DEFAULT_USD_PER_CALL,
        }
    }
}

impl EngineConfig {
    /// Load overrides from `ENGINE_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(secs) = dotenvy::var("ENGINE_RPC_TIMEOUT_SECS") {
            config.rpc_timeout = Duration::from_secs(secs.parse().context("Invalid rpc timeout")?);
        }
        if let Ok(secs) = dotenvy::var("ENGINE_RECEIPT_TIMEOUT_SECS") {
            config.receipt_timeout =
                Duration::from_secs(secs.parse().context("Invalid receipt timeout")?);
        }
        if let Ok(cap) = dotenvy::var("ENGINE_QUOTA_CAP_USD") {
            config.quota_cap_usd = cap.parse().context("Invalid quota cap")?;
        }
        if let Ok(per_call) = dotenvy::var("ENGINE_USD_PER_CALL") {
            config.usd_per_call = per_call.parse().context("Invalid per-call cost")?;
        }

        Ok(config)
    }

    /// Set the RPC deadline
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Set the receipt deadline
    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    /// Set the receipt poll interval
    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    /// Set the gas buffer in percent
    pub fn with_gas_buffer_percent(mut self, percent: u64) -> Self {
        self.gas_buffer_percent = percent;
        self
    }

    /// Set the fallback gas limit
    pub fn with_fallback_gas_limit(mut self, gas_limit: u64) -> Self {
        self.fallback_gas_limit = gas_limit;
        self
    }

    /// Set the initialization failure cooldown
    pub fn with_init_failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.init_failure_cooldown = cooldown;
        self
    }

    /// Set the sponsorship cap
    pub fn with_quota_cap_usd(mut self, cap: f64) -> Self {
        self.quota_cap_usd = cap;
        self
    }

    /// Set the per-call sponsored cost estimate
    pub fn with_usd_per_call(mut self, usd_per_call: f64) -> Self {
        self.usd_per_call = usd_per_call;
        self
    }

    /// Apply the gas buffer to an estimate
    pub fn buffered_gas(&self, estimate: u64) -> u64 {
        estimate.saturating_mul(self.gas_buffer_percent) / 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explorer_url_trims_trailing_slash() {
        let network = NetworkConfig::new("sepolia", 11155111, "http://rpc", "https://scan.io/");
        let hash = alloy::primitives::TxHash::repeat_byte(0x11);
        assert_eq!(
            network.explorer_tx_url(hash).unwrap(),
            format!("https://scan.io/tx/{hash}")
        );
    }

    #[test]
    fn test_explorer_url_absent_without_explorer() {
        let network = NetworkConfig::new("local", 31337, "http://rpc", "");
        assert!(network.explorer_tx_url("0x00").is_none());
    }

    #[test]
    fn test_buffered_gas() {
        let config = EngineConfig::default();
        assert_eq!(config.buffered_gas(100_000), 120_000);
        assert_eq!(config.with_gas_buffer_percent(150).buffered_gas(10), 15);
    }

    #[test]
    fn test_capability_availability() {
        assert!(!AaCapability::unsupported().is_available());
        assert!(AaCapability::enabled("http://bundler").is_available());

        let mut half = AaCapability::enabled("http://bundler");
        half.configured_in_dashboard = false;
        assert!(!half.is_available());
    }
}
