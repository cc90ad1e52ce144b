//! Identity linking protocol
//!
//! Records EOA → smart account inside contracts exposing [`IIdentityLink`].
//! The link transaction is always signed by the EOA. State per
//! (network, EOA, contract):
//!
//! ```text
//! Unlinked ──> LinkingInFlight ──> Linked
//!                     │
//!                     └──> LinkFailed ──> (retried by a later request)
//! ```
//!
//! An existing on-chain link to a different EOA is never overwritten.

use crate::chain::ChainClient;
use crate::config::NetworkConfig;
use crate::contracts::IIdentityLink;
use crate::eoa::EoaExecutor;
use crate::normalizer;
use crate::types::{ContractCall, LinkingState};
use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Linking failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("failed to query link status: {0}")]
    Query(String),

    #[error("smart account {smart_account} is already linked to {existing}")]
    Conflict {
        smart_account: Address,
        existing: Address,
    },

    #[error("link transaction failed: {0}")]
    Transaction(String),
}

type LinkKey = (String, Address, Address);
type StateSlot = Arc<tokio::sync::Mutex<LinkingState>>;

/// Per-pair linking state machines
#[derive(Default)]
pub struct IdentityLinker {
    states: Mutex<HashMap<LinkKey, StateSlot>>,
}

impl IdentityLinker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: LinkKey) -> StateSlot {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.entry(key).or_default().clone()
    }

    fn slots_for(&self, network_id: &str, eoa: Address) -> Vec<StateSlot> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states
            .iter()
            .filter(|((id, owner, _), _)| id == network_id && *owner == eoa)
            .map(|(_, slot)| slot.clone())
            .collect()
    }

    /// Current state for one contract
    pub fn state(&self, network_id: &str, eoa: Address, contract: Address) -> LinkingState {
        let slot = {
            let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            match states.get(&(network_id.to_string(), eoa, contract)) {
                Some(slot) => slot.clone(),
                None => return LinkingState::Unlinked,
            }
        };
        read_state(&slot)
    }

    /// Aggregate state across every contract family on a network
    pub fn network_state(&self, network_id: &str, eoa: Address) -> LinkingState {
        let states: Vec<_> = self
            .slots_for(network_id, eoa)
            .iter()
            .map(read_state)
            .collect();

        [
            LinkingState::LinkingInFlight,
            LinkingState::Linked,
            LinkingState::LinkFailed,
        ]
        .into_iter()
        .find(|wanted| states.contains(wanted))
        .unwrap_or(LinkingState::Unlinked)
    }

    /// Make sure `contract` maps `smart_account` to the chain client's EOA
    ///
    /// Concurrent callers for the same pair wait for one attempt. Once
    /// `Linked`, later calls return immediately without touching the chain.
    pub async fn ensure_linked<C: ChainClient>(
        &self,
        chain: &C,
        executor: &EoaExecutor,
        network: &NetworkConfig,
        contract: Address,
        smart_account: Address,
    ) -> Result<(), LinkError> {
        let eoa = chain.address();
        let slot = self.slot((network.id.clone(), eoa, contract));
        let mut state = slot.lock().await;

        if *state == LinkingState::Linked {
            return Ok(());
        }

        *state = LinkingState::LinkingInFlight;
        let result = link(chain, executor, network, contract, smart_account, eoa).await;

        *state = match &result {
            Ok(()) => LinkingState::Linked,
            Err(err) => {
                tracing::warn!(
                    network = %network.id,
                    %contract,
                    %smart_account,
                    error = %err,
                    "identity linking failed"
                );
                LinkingState::LinkFailed
            }
        };
        result
    }

    /// Forget an EOA's pairs on one network
    pub fn forget(&self, network_id: &str, eoa: Address) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.retain(|(id, owner, _), _| !(id == network_id && *owner == eoa));
    }

    /// Forget every pair of an EOA
    pub fn forget_eoa(&self, eoa: Address) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.retain(|(_, owner, _), _| *owner != eoa);
    }
}

fn read_state(slot: &StateSlot) -> LinkingState {
    // Held only while an attempt runs
    match slot.try_lock() {
        Ok(state) => *state,
        Err(_) => LinkingState::LinkingInFlight,
    }
}

async fn link<C: ChainClient>(
    chain: &C,
    executor: &EoaExecutor,
    network: &NetworkConfig,
    contract: Address,
    smart_account: Address,
    eoa: Address,
) -> Result<(), LinkError> {
    let query = ContractCall::typed(
        contract,
        &IIdentityLink::linkedEoaCall {
            smartAccount: smart_account,
        },
    );
    let raw = chain
        .call(network, &query)
        .await
        .map_err(|e| LinkError::Query(normalizer::describe_chain_error(&e)))?;
    let existing = IIdentityLink::linkedEoaCall::abi_decode_returns(&raw)
        .map_err(|e| LinkError::Query(format!("malformed linkedEoa response: {e}")))?;

    if existing == eoa {
        tracing::debug!(network = %network.id, %contract, "already linked on-chain");
        return Ok(());
    }
    if !existing.is_zero() {
        return Err(LinkError::Conflict {
            smart_account,
            existing,
        });
    }

    tracing::info!(
        stage = "linking",
        network = %network.id,
        %contract,
        %eoa,
        %smart_account,
        "submitting link transaction"
    );
    let link_call = ContractCall::typed(
        contract,
        &IIdentityLink::linkSmartAccountCall {
            smartAccount: smart_account,
        },
    );
    let receipt = executor
        .execute(chain, network, &link_call)
        .await
        .map_err(|e| LinkError::Transaction(e.to_string()))?;

    tracing::info!(network = %network.id, tx_hash = %receipt.tx_hash, "identity linked");
    Ok(())
}
