//! Wallet transaction engine
//!
//! Executes contract calls on behalf of a mobile wallet user. Each request is
//! routed through an ERC-4337 smart account with sponsored gas when the
//! network allows it, and falls back to an EOA-signed transaction otherwise.
//!
//! # Features
//!
//! - Sponsored smart-account execution via bundler + paymaster
//! - Atomic batches (sequential with partial-completion reports on EOA)
//! - Single-flight smart-account client cache
//! - Monthly gasless quota ledger
//! - On-chain EOA → smart account identity linking
//! - Uniform results with normalized revert reasons
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wallet_tx_engine::{
//!     BundlerProvider, EngineConfig, EngineContext, NetworkConfig, Orchestrator,
//!     RpcChainClient, SigningKey, TransactionRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let config = EngineConfig::from_env()?;
//!     let network = NetworkConfig::from_env("BASE_SEPOLIA")?;
//!     let key = SigningKey::from_hex(std::env::var("PRIVATE_KEY")?)?;
//!
//!     let provider = Arc::new(BundlerProvider::new(&config)?);
//!     let context = Arc::new(EngineContext::new(provider, config.clone()));
//!     let chain = RpcChainClient::new(key.clone(), &config);
//!     let engine = Orchestrator::new(chain, key, context)?;
//!
//!     let result = engine.execute(&TransactionRequest::new(call, network)).await;
//!     println!("{:?} via {:?}", result.tx_hash, result.path_used);
//!     Ok(())
//! }
//! ```

pub mod aa;
pub mod cache;
pub mod chain;
pub mod config;
pub mod constants;
pub mod contracts;
pub mod eoa;
pub mod error;
pub mod key;
pub mod linking;
pub mod normalizer;
pub mod orchestrator;
pub mod quota;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use aa::{AaError, AaProvider, BundlerProvider, SmartAccountClient, UserOpReceipt};
pub use cache::SmartAccountCache;
pub use chain::{ChainClient, ChainError, Receipt, RpcChainClient, TxRequest};
pub use config::{AaCapability, EngineConfig, NetworkConfig};
pub use error::{eyre, Context, FailureKind, OrchestrationError, Report, Result};
pub use key::SigningKey;
pub use linking::{IdentityLinker, LinkError};
pub use orchestrator::{
    decide_path, EngineContext, EoaReason, ExecutionStage, Orchestrator, PathDecision, ProgressFn,
};
pub use quota::{CostModel, FixedPerCall, QuotaLedger, QuotaRecord};
pub use types::{
    AbiSource, AccountIdentity, BatchReport, BatchTransactionRequest, CallSpec, ContractCall,
    ExecutionFailure, ExecutionPath, ExecutionPreferences, ExecutionResult, LinkTarget,
    LinkingState, TransactionRequest,
};
