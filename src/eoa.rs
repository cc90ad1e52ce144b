//! EOA execution path
//!
//! Dry-run, estimate, sign, submit, wait. Submissions for one signer on one
//! network are serialized from the dry-run through the receipt so only one
//! nonce is ever in flight.

use crate::chain::{ChainClient, ChainError, Receipt, TxRequest};
use crate::config::{EngineConfig, NetworkConfig};
use crate::error::OrchestrationError;
use crate::types::ContractCall;
use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type LockKey = (String, Address);

/// Serialized EOA transaction executor
pub struct EoaExecutor {
    locks: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
    config: EngineConfig,
}

impl EoaExecutor {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn lock_for(&self, network: &NetworkConfig, signer: Address) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks
            .entry((network.id.clone(), signer))
            .or_default()
            .clone()
    }

    /// Dry-run without submitting
    pub async fn simulate<C: ChainClient>(
        &self,
        chain: &C,
        network: &NetworkConfig,
        call: &ContractCall,
    ) -> Result<(), OrchestrationError> {
        match chain.call(network, call).await {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!(
                    network = %network.id,
                    function = call.label(),
                    error = %err,
                    "dry-run failed"
                );
                Err(OrchestrationError::from_submission(err))
            }
        }
    }

    /// Execute one call from the EOA and wait for its receipt
    ///
    /// A dry-run failure returns before anything is signed. A mined but
    /// reverted transaction is reported with its hash.
    pub async fn execute<C: ChainClient>(
        &self,
        chain: &C,
        network: &NetworkConfig,
        call: &ContractCall,
    ) -> Result<Receipt, OrchestrationError> {
        let lock = self.lock_for(network, chain.address());
        let _guard = lock.lock().await;

        self.simulate(chain, network, call).await?;

        let gas_limit = match chain.estimate_gas(network, call).await {
            Ok(estimate) => self.config.buffered_gas(estimate),
            Err(err) => {
                tracing::warn!(
                    network = %network.id,
                    error = %err,
                    fallback = self.config.fallback_gas_limit,
                    "gas estimation failed, using fallback limit"
                );
                self.config.fallback_gas_limit
            }
        };

        tracing::info!(
            stage = "submitting",
            network = %network.id,
            function = call.label(),
            gas_limit,
            "submitting EOA transaction"
        );
        let tx_hash = chain
            .send(network, TxRequest::from(call).with_gas_limit(gas_limit))
            .await
            .map_err(submission_error)?;

        tracing::info!(stage = "confirming", network = %network.id, %tx_hash, "awaiting receipt");
        let receipt = chain
            .wait_for_receipt(
                network,
                tx_hash,
                self.config.confirmations,
                self.config.receipt_timeout,
            )
            .await
            .map_err(|err| match err {
                ChainError::Timeout { after, .. } => OrchestrationError::Timeout {
                    after,
                    tx_hash: Some(tx_hash),
                },
                other => OrchestrationError::Submission(format!(
                    "transaction {tx_hash} submitted but receipt unavailable: {}",
                    crate::normalizer::describe_chain_error(&other)
                )),
            })?;

        if !receipt.success {
            let reason = match receipt.block_number {
                Some(block) => mined_revert_reason(chain, network, call, block).await,
                None => None,
            };
            return Err(OrchestrationError::OnChainRevert {
                tx_hash,
                reason: reason
                    .unwrap_or_else(|| format!("Transaction {tx_hash} reverted on-chain")),
            });
        }

        Ok(receipt)
    }
}

/// Best-effort reason for a mined revert, replayed against the state of its block
async fn mined_revert_reason<C: ChainClient>(
    chain: &C,
    network: &NetworkConfig,
    call: &ContractCall,
    block: u64,
) -> Option<String> {
    match chain.call_at(network, call, block).await {
        Err(ChainError::Revert { reason, data }) => Some(
            data.and_then(|data| crate::normalizer::decode_revert_data(&data))
                .unwrap_or(reason),
        ),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(network = %network.id, error = %err, "revert replay failed");
            None
        }
    }
}

/// Errors from `send`: a revert here is a rejected submission, not a dry-run result
fn submission_error(err: ChainError) -> OrchestrationError {
    match err {
        ChainError::Revert { reason, .. } => OrchestrationError::Submission(reason),
        other => OrchestrationError::from_submission(other),
    }
}
