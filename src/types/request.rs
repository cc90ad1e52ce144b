//! Execution requests

use super::call::{AbiError, CallSpec, ContractCall};
use crate::config::NetworkConfig;
use alloy::primitives::Address;

/// Routing preferences shared by single and batch requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPreferences {
    /// Try the smart-account path when eligible
    pub prefer_smart_account: bool,
    /// Never touch the smart-account path
    pub force_eoa: bool,
    /// The caller expects gas to be sponsored
    pub expect_gas_sponsorship: bool,
}

impl Default for ExecutionPreferences {
    fn default() -> Self {
        Self {
            prefer_smart_account: true,
            force_eoa: false,
            expect_gas_sponsorship: true,
        }
    }
}

impl ExecutionPreferences {
    /// Always use the EOA path
    pub fn eoa_only() -> Self {
        Self {
            prefer_smart_account: false,
            force_eoa: true,
            expect_gas_sponsorship: false,
        }
    }
}

/// Contract family that needs the EOA → smart account mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTarget {
    /// Contract holding the identity mapping
    pub contract: Address,
    /// Whether the call cannot succeed from an unlinked smart account
    pub required: bool,
}

impl LinkTarget {
    /// Linking that must succeed before the smart account may act
    pub fn required(contract: Address) -> Self {
        Self {
            contract,
            required: true,
        }
    }

    /// Linking attempted opportunistically
    pub fn optional(contract: Address) -> Self {
        Self {
            contract,
            required: false,
        }
    }
}

/// A single contract call submitted for execution
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub call: ContractCall,
    pub network: NetworkConfig,
    pub preferences: ExecutionPreferences,
    pub link: Option<LinkTarget>,
}

impl TransactionRequest {
    /// Create a request with default preferences
    pub fn new(call: ContractCall, network: NetworkConfig) -> Self {
        Self {
            call,
            network,
            preferences: ExecutionPreferences::default(),
            link: None,
        }
    }

    /// Normalize a domain-service call and wrap it in a request
    pub fn from_spec(spec: &CallSpec, network: NetworkConfig) -> Result<Self, AbiError> {
        Ok(Self::new(spec.encode()?, network))
    }

    /// Set routing preferences
    pub fn with_preferences(mut self, preferences: ExecutionPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Require or attempt identity linking against a contract
    pub fn with_link(mut self, link: LinkTarget) -> Self {
        self.link = Some(link);
        self
    }
}

/// An ordered group of calls
///
/// Atomic only on the smart-account path. On EOA fallback the calls run as
/// sequential transactions; see [`crate::BatchReport`].
#[derive(Debug, Clone)]
pub struct BatchTransactionRequest {
    pub calls: Vec<ContractCall>,
    pub network: NetworkConfig,
    pub preferences: ExecutionPreferences,
    pub link: Option<LinkTarget>,
}

impl BatchTransactionRequest {
    /// Create a batch with default preferences
    pub fn new(calls: Vec<ContractCall>, network: NetworkConfig) -> Self {
        Self {
            calls,
            network,
            preferences: ExecutionPreferences::default(),
            link: None,
        }
    }

    /// Normalize several domain-service calls into a batch
    pub fn from_specs(specs: &[CallSpec], network: NetworkConfig) -> Result<Self, AbiError> {
        let calls = specs.iter().map(CallSpec::encode).collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(calls, network))
    }

    /// Set routing preferences
    pub fn with_preferences(mut self, preferences: ExecutionPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Require or attempt identity linking against a contract
    pub fn with_link(mut self, link: LinkTarget) -> Self {
        self.link = Some(link);
        self
    }
}
