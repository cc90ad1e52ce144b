//! Uniform execution results

use crate::error::{FailureKind, OrchestrationError};
use alloy::primitives::TxHash;
use serde::Serialize;

/// Path that actually served a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExecutionPath {
    SmartAccount,
    #[serde(rename = "EOA")]
    Eoa,
}

impl std::fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SmartAccount => write!(f, "smart-account"),
            Self::Eoa => write!(f, "eoa"),
        }
    }
}

/// Terminal failure returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    /// Human-readable reason, never empty
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "Transaction failed for an unknown reason".to_string()
        } else {
            message
        };
        Self { kind, message }
    }
}

impl From<&OrchestrationError> for ExecutionFailure {
    fn from(err: &OrchestrationError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Per-call outcome of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Whether the calls executed as one all-or-nothing unit
    pub atomic: bool,
    /// Number of calls in the batch
    pub total: usize,
    /// Hashes of the calls that completed, in order
    pub completed_hashes: Vec<TxHash>,
    /// Index of the call that failed, if any
    pub failed_index: Option<usize>,
}

impl BatchReport {
    /// Number of calls that completed
    pub fn completed(&self) -> usize {
        self.completed_hashes.len()
    }
}

/// Result of every `execute` / `execute_batch` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    /// Representative hash (last hash for sequential batches)
    pub tx_hash: Option<TxHash>,
    /// Absent when nothing reached the chain (e.g. dry-run revert)
    pub path_used: Option<ExecutionPath>,
    pub explorer_url: Option<String>,
    pub error: Option<ExecutionFailure>,
    pub batch: Option<BatchReport>,
}

impl ExecutionResult {
    /// Successful execution
    pub fn succeeded(tx_hash: TxHash, path: ExecutionPath, explorer_url: Option<String>) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash),
            path_used: Some(path),
            explorer_url,
            error: None,
            batch: None,
        }
    }

    /// Failed execution
    pub fn failed(failure: ExecutionFailure) -> Self {
        Self {
            success: false,
            tx_hash: None,
            path_used: None,
            explorer_url: None,
            error: Some(failure),
            batch: None,
        }
    }

    /// Set the path and hash of a failure that reached the chain
    pub fn on_path(mut self, path: ExecutionPath, tx_hash: Option<TxHash>) -> Self {
        self.path_used = Some(path);
        if tx_hash.is_some() {
            self.tx_hash = tx_hash;
        }
        self
    }

    /// Set the explorer link
    pub fn with_explorer_url(mut self, url: Option<String>) -> Self {
        self.explorer_url = url;
        self
    }

    /// Attach batch details
    pub fn with_batch(mut self, report: BatchReport) -> Self {
        self.batch = Some(report);
        self
    }

    /// Failure reason, if any
    pub fn message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}
