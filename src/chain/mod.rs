//! Chain client abstraction
//!
//! Thin JSON-RPC surface the EOA path and the linking protocol need: static
//! calls, gas estimation, signed submission and receipt polling. Every method
//! takes the target network so one client (one signing key) serves them all.

mod rpc;

pub use rpc::RpcChainClient;

use crate::config::NetworkConfig;
use crate::types::ContractCall;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use std::future::Future;
use std::time::Duration;

/// Transaction request parameters
#[derive(Debug, Clone)]
pub struct TxRequest {
    /// Target contract address
    pub to: Address,
    /// Transaction value in wei
    pub value: U256,
    /// Encoded calldata
    pub data: Bytes,
    /// Optional gas limit override
    pub gas_limit: Option<u64>,
}

impl TxRequest {
    /// Create a new transaction request
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: data.into(),
            gas_limit: None,
        }
    }

    /// Set transaction value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set gas limit
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

impl From<&ContractCall> for TxRequest {
    fn from(call: &ContractCall) -> Self {
        TxRequest::new(call.to, call.data.clone()).with_value(call.value)
    }
}

/// Minimal receipt shared by both execution paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    /// Execution status (false = reverted on-chain)
    pub success: bool,
}

/// Errors raised by the chain client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("execution reverted: {reason}")]
    Revert { reason: String, data: Option<Bytes> },

    #[error("gas estimation failed: {0}")]
    Estimation(String),

    #[error("submission failed: {0}")]
    Submission(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
        tx_hash: Option<TxHash>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ChainError {
    /// Timeout of an operation with no transaction in flight
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout {
            operation,
            after,
            tx_hash: None,
        }
    }
}

/// Trait for reading from and submitting to an EVM chain with one EOA
pub trait ChainClient: Send + Sync {
    /// Returns the EOA address
    fn address(&self) -> Address;

    /// Static call from the EOA; reverts come back as [`ChainError::Revert`]
    fn call(
        &self,
        network: &NetworkConfig,
        call: &ContractCall,
    ) -> impl Future<Output = Result<Bytes, ChainError>> + Send;

    /// Static call against the state at `block`
    ///
    /// Used to recover the revert reason of a transaction mined in that block.
    fn call_at(
        &self,
        network: &NetworkConfig,
        call: &ContractCall,
        block: u64,
    ) -> impl Future<Output = Result<Bytes, ChainError>> + Send;

    /// Estimates gas for a call from the EOA
    fn estimate_gas(
        &self,
        network: &NetworkConfig,
        call: &ContractCall,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Signs and sends a transaction, returning the transaction hash
    fn send(
        &self,
        network: &NetworkConfig,
        tx: TxRequest,
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;

    /// Waits until a transaction has `confirmations` confirmations or the deadline expires
    fn wait_for_receipt(
        &self,
        network: &NetworkConfig,
        tx_hash: TxHash,
        confirmations: u64,
        timeout: Duration,
    ) -> impl Future<Output = Result<Receipt, ChainError>> + Send;

    /// Gets the native token balance of an address
    fn balance(
        &self,
        network: &NetworkConfig,
        address: Address,
    ) -> impl Future<Output = Result<U256, ChainError>> + Send;
}
