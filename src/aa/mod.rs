//! Account abstraction (ERC-4337) execution
//!
//! [`AaProvider`] is the boundary to the external bundler / paymaster
//! infrastructure. [`SmartAccountClient`] binds a provider to one network and
//! one owner key and turns a list of calls into a single user operation.

mod bundler;
mod userop;

pub use bundler::BundlerProvider;
pub use userop::UserOperation;

use crate::config::NetworkConfig;
use crate::contracts::ISmartAccount;
use crate::error::FailureKind;
use crate::key::SigningKey;
use crate::types::ContractCall;
use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Errors raised on the smart-account path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AaError {
    #[error("network {0} does not support account abstraction")]
    Unsupported(String),

    #[error("smart account initialization failed: {0}")]
    Initialization(String),

    #[error("sponsorship rejected: {0}")]
    SponsorshipRejected(String),

    #[error("bundler error: {0}")]
    Bundler(String),

    #[error("user operation reverted: {0}")]
    Reverted(String),

    #[error("user operation timed out after {0:?}")]
    Timeout(Duration),
}

impl AaError {
    /// Position in the caller-facing taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unsupported(_) => FailureKind::Unsupported,
            Self::Initialization(_) => FailureKind::InitializationFailure,
            Self::SponsorshipRejected(_) | Self::Bundler(_) | Self::Reverted(_) => {
                FailureKind::SponsorshipRejected
            }
            Self::Timeout(_) => FailureKind::Timeout,
        }
    }
}

/// Inclusion result of a user operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOpReceipt {
    pub user_op_hash: B256,
    /// Bundle transaction that included the operation
    pub tx_hash: TxHash,
    pub success: bool,
    pub actual_gas_cost: U256,
    pub reason: Option<String>,
}

/// External ERC-4337 infrastructure (bundler + paymaster + factory)
pub trait AaProvider: Send + Sync + 'static {
    /// Counterfactual smart-account address for an owner
    fn counterfactual_address(
        &self,
        network: &NetworkConfig,
        owner: Address,
    ) -> impl Future<Output = Result<Address, AaError>> + Send;

    /// Build, sponsor (when a gas policy is configured), sign and submit a user operation
    fn send_user_operation(
        &self,
        network: &NetworkConfig,
        sender: Address,
        call_data: Bytes,
        owner: &PrivateKeySigner,
    ) -> impl Future<Output = Result<B256, AaError>> + Send;

    /// Wait until the operation is included on-chain or the deadline expires
    fn wait_for_user_operation(
        &self,
        network: &NetworkConfig,
        user_op_hash: B256,
        timeout: Duration,
    ) -> impl Future<Output = Result<UserOpReceipt, AaError>> + Send;
}

/// Live smart-account handle for one network and one owner key
pub struct SmartAccountClient<P> {
    network: NetworkConfig,
    key: SigningKey,
    address: Address,
    provider: Arc<P>,
    receipt_timeout: Duration,
}

impl<P> std::fmt::Debug for SmartAccountClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartAccountClient")
            .field("network", &self.network.id)
            .field("owner", &self.key.address())
            .field("address", &self.address)
            .finish()
    }
}

impl<P: AaProvider> SmartAccountClient<P> {
    pub(crate) fn new(
        network: NetworkConfig,
        key: SigningKey,
        address: Address,
        provider: Arc<P>,
        receipt_timeout: Duration,
    ) -> Self {
        Self {
            network,
            key,
            address,
            provider,
            receipt_timeout,
        }
    }

    /// Smart account address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Controlling EOA
    pub fn owner(&self) -> Address {
        self.key.address()
    }

    /// Network the client is bound to
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Encode calls as one account execution (`execute` or `executeBatch`)
    pub fn encode_calls(calls: &[ContractCall]) -> Bytes {
        match calls {
            [call] => ISmartAccount::executeCall {
                _target: call.to,
                _value: call.value,
                _calldata: call.data.clone(),
            }
            .abi_encode()
            .into(),
            _ => ISmartAccount::executeBatchCall {
                _target: calls.iter().map(|c| c.to).collect(),
                _value: calls.iter().map(|c| c.value).collect(),
                _calldata: calls.iter().map(|c| c.data.clone()).collect(),
            }
            .abi_encode()
            .into(),
        }
    }

    /// Execute calls atomically as a single user operation
    pub async fn execute(&self, calls: &[ContractCall]) -> Result<UserOpReceipt, AaError> {
        let call_data = Self::encode_calls(calls);

        let user_op_hash = self
            .provider
            .send_user_operation(&self.network, self.address, call_data, self.key.signer())
            .await?;
        tracing::debug!(network = %self.network.id, %user_op_hash, "user operation submitted");

        let receipt = self
            .provider
            .wait_for_user_operation(&self.network, user_op_hash, self.receipt_timeout)
            .await?;

        if !receipt.success {
            return Err(AaError::Reverted(
                receipt
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("user operation {user_op_hash} failed")),
            ));
        }

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::IERC20;

    #[test]
    fn test_single_call_uses_execute() {
        let call = ContractCall::typed(
            Address::repeat_byte(1),
            &IERC20::approveCall {
                spender: Address::repeat_byte(2),
                amount: U256::from(10u64),
            },
        );
        let encoded = SmartAccountClient::<crate::testing::MockAaProvider>::encode_calls(&[call]);
        assert_eq!(&encoded[..4], ISmartAccount::executeCall::SELECTOR.as_slice());
    }

    #[test]
    fn test_batch_uses_execute_batch() {
        let calls = vec![
            ContractCall::raw(Address::repeat_byte(1), vec![0x01]),
            ContractCall::raw(Address::repeat_byte(2), vec![0x02]),
        ];
        let encoded = SmartAccountClient::<crate::testing::MockAaProvider>::encode_calls(&calls);
        assert_eq!(
            &encoded[..4],
            ISmartAccount::executeBatchCall::SELECTOR.as_slice()
        );

        let decoded = ISmartAccount::executeBatchCall::abi_decode(&encoded).unwrap();
        assert_eq!(decoded._target.len(), 2);
        assert_eq!(decoded._calldata[1].as_ref(), &[0x02]);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AaError::SponsorshipRejected("x".into()).kind(),
            FailureKind::SponsorshipRejected
        );
        assert_eq!(
            AaError::Initialization("x".into()).kind(),
            FailureKind::InitializationFailure
        );
        assert_eq!(AaError::Unsupported("x".into()).kind(), FailureKind::Unsupported);
    }
}
