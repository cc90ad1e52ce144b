//! Error types for the transaction engine
//!
//! Setup code (parsing keys, URLs and environment configuration) uses `eyre`
//! for ergonomic error handling with context. Routing code uses the typed
//! [`OrchestrationError`] so every fallback transition is a visible branch.

pub use eyre::{eyre, Context, Report, Result};

use crate::aa::AaError;
use crate::chain::ChainError;
use crate::linking::LinkError;
use alloy::primitives::{Bytes, TxHash};
use serde::Serialize;
use std::time::Duration;

/// Failure taxonomy surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network lacks AA support or dashboard configuration
    Unsupported,
    /// Sponsorship budget exhausted
    QuotaExceeded,
    /// Smart-account client could not be constructed
    InitializationFailure,
    /// On-chain identity link could not be established
    LinkingFailure,
    /// Paymaster or bundler refused (or failed) the user operation
    SponsorshipRejected,
    /// Dry-run reverted, nothing was submitted
    SimulationRevert,
    /// Submission or on-chain execution failed on the EOA path
    SubmissionFailure,
    /// A network deadline expired
    Timeout,
    /// The request itself could not be executed (e.g. empty batch)
    InvalidRequest,
}

impl FailureKind {
    /// Whether the kind is absorbed by the orchestrator on the AA path
    pub fn is_soft(self) -> bool {
        matches!(
            self,
            FailureKind::Unsupported
                | FailureKind::QuotaExceeded
                | FailureKind::InitializationFailure
                | FailureKind::LinkingFailure
                | FailureKind::SponsorshipRejected
        )
    }
}

/// Error channel of the execution pipeline
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("account abstraction unsupported: {0}")]
    Unsupported(String),

    #[error("sponsorship quota exceeded: requested ${requested:.4}, remaining ${remaining:.4}")]
    QuotaExceeded { requested: f64, remaining: f64 },

    #[error("smart account unavailable: {0}")]
    SmartAccount(#[from] AaError),

    #[error("identity linking failed: {0}")]
    Linking(#[from] LinkError),

    #[error("{reason}")]
    SimulationRevert { reason: String, data: Option<Bytes> },

    #[error("{reason}")]
    OnChainRevert { tx_hash: TxHash, reason: String },

    #[error("{0}")]
    Submission(String),

    #[error("timed out after {after:?}")]
    Timeout {
        after: Duration,
        tx_hash: Option<TxHash>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl OrchestrationError {
    /// Classify the error into the caller-facing taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unsupported(_) => FailureKind::Unsupported,
            Self::QuotaExceeded { .. } => FailureKind::QuotaExceeded,
            Self::SmartAccount(err) => err.kind(),
            Self::Linking(_) => FailureKind::LinkingFailure,
            Self::SimulationRevert { .. } => FailureKind::SimulationRevert,
            Self::OnChainRevert { .. } | Self::Submission(_) => FailureKind::SubmissionFailure,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
        }
    }

    /// Soft errors route to the EOA path instead of reaching the caller
    pub fn is_soft(&self) -> bool {
        self.kind().is_soft()
    }

    /// Hash of a transaction that was broadcast before the failure, if any
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::OnChainRevert { tx_hash, .. } => Some(*tx_hash),
            Self::Timeout { tx_hash, .. } => *tx_hash,
            _ => None,
        }
    }

    /// Map a chain client error raised while submitting on the EOA path
    pub fn from_submission(err: ChainError) -> Self {
        match err {
            ChainError::Timeout { after, tx_hash, .. } => Self::Timeout { after, tx_hash },
            ChainError::Revert { reason, data } => Self::SimulationRevert { reason, data },
            other => Self::Submission(crate::normalizer::describe_chain_error(&other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_kinds_route_to_eoa() {
        assert!(FailureKind::Unsupported.is_soft());
        assert!(FailureKind::SponsorshipRejected.is_soft());
        assert!(FailureKind::LinkingFailure.is_soft());
        assert!(!FailureKind::SimulationRevert.is_soft());
        assert!(!FailureKind::Timeout.is_soft());
        assert!(!FailureKind::SubmissionFailure.is_soft());
    }

    #[test]
    fn test_aa_timeout_is_recoverable_but_classified_as_timeout() {
        let err = OrchestrationError::from(AaError::Timeout(Duration::from_secs(5)));
        assert_eq!(err.kind(), FailureKind::Timeout);
        // The AA path treats every AaError as recoverable regardless of kind
        assert!(matches!(err, OrchestrationError::SmartAccount(_)));
    }

    #[test]
    fn test_tx_hash_exposed_for_on_chain_revert() {
        let hash = TxHash::repeat_byte(0xab);
        let err = OrchestrationError::OnChainRevert {
            tx_hash: hash,
            reason: "reverted".into(),
        };
        assert_eq!(err.tx_hash(), Some(hash));
        assert_eq!(err.kind(), FailureKind::SubmissionFailure);
    }
}
