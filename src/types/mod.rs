//! Request, result and identity types

pub mod call;
pub mod identity;
pub mod request;
pub mod result;

pub use call::{AbiError, AbiSource, CallSpec, ContractCall};
pub use identity::{AccountIdentity, LinkingState};
pub use request::{BatchTransactionRequest, ExecutionPreferences, LinkTarget, TransactionRequest};
pub use result::{BatchReport, ExecutionFailure, ExecutionPath, ExecutionResult};
