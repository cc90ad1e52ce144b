//! Account identity across the two execution substrates

use alloy::primitives::Address;
use serde::Serialize;

/// Link status between an EOA and its smart account inside a contract family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum LinkingState {
    #[default]
    Unlinked,
    LinkingInFlight,
    Linked,
    /// Last attempt failed; a later request may retry
    LinkFailed,
}

/// The logical user behind a (signing key, network) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountIdentity {
    pub eoa_address: Address,
    /// Counterfactual smart account, once the AA client initialized
    pub smart_account_address: Option<Address>,
    pub linking_state: LinkingState,
}
