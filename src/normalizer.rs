//! Normalizes heterogeneous provider errors into readable reasons
//!
//! Reverts are decoded in order: standard `Error(string)` / `Panic(uint256)`,
//! then the known custom errors in [`crate::contracts::KnownErrors`], then a
//! bare selector. Provider messages from bundlers and paymasters are matched
//! against known fragments to decide whether a sponsored operation was
//! rejected.

use crate::aa::AaError;
use crate::chain::ChainError;
use crate::contracts::KnownErrors::KnownErrorsErrors;
use alloy::primitives::hex;
use alloy::sol_types::{Panic, Revert, SolError, SolInterface};

/// Decode revert data into a readable reason
pub fn decode_revert_data(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }

    if let Ok(revert) = Revert::abi_decode(data) {
        return Some(clean_revert_message(&revert.reason));
    }

    if let Ok(panic) = Panic::abi_decode(data) {
        return Some(format!("Transaction panicked ({panic})"));
    }

    if let Ok(known) = KnownErrorsErrors::abi_decode(data) {
        return Some(describe_known_error(&known));
    }

    if data.len() >= 4 {
        return Some(format!(
            "Transaction reverted with custom error 0x{}",
            hex::encode(&data[..4])
        ));
    }

    None
}

fn describe_known_error(err: &KnownErrorsErrors) -> String {
    match err {
        KnownErrorsErrors::ERC20InsufficientBalance(e) => format!(
            "Insufficient token balance: have {}, need {}",
            e.balance, e.needed
        ),
        KnownErrorsErrors::ERC20InsufficientAllowance(e) => format!(
            "Insufficient token allowance for {}: approved {}, need {}",
            e.spender, e.allowance, e.needed
        ),
        KnownErrorsErrors::ERC20InvalidReceiver(e) => {
            format!("Invalid token receiver {}", e.receiver)
        }
        KnownErrorsErrors::OwnableUnauthorizedAccount(e) => {
            format!("Account {} is not the owner", e.account)
        }
        KnownErrorsErrors::AccessControlUnauthorizedAccount(e) => {
            format!("Account {} is missing role {}", e.account, e.neededRole)
        }
        KnownErrorsErrors::EnforcedPause(_) => "Contract is paused".to_string(),
        KnownErrorsErrors::ReentrancyGuardReentrantCall(_) => {
            "Reentrant call rejected".to_string()
        }
        KnownErrorsErrors::SafeERC20FailedOperation(e) => {
            format!("Token operation failed for {}", e.token)
        }
        KnownErrorsErrors::AlreadyLinked(e) => format!(
            "Smart account {} is already linked to {}",
            e.smartAccount, e.eoa
        ),
    }
}

/// Strip node boilerplate from a textual revert message
pub fn clean_revert_message(message: &str) -> String {
    let trimmed = message.trim();
    let stripped = trimmed
        .strip_prefix("execution reverted:")
        .or_else(|| trimmed.strip_prefix("execution reverted"))
        .map(str::trim)
        .unwrap_or(trimmed);

    if stripped.is_empty() {
        "Transaction reverted without a reason".to_string()
    } else {
        stripped.to_string()
    }
}

/// Human-readable description of a chain client failure
pub fn describe_chain_error(err: &ChainError) -> String {
    match err {
        ChainError::Revert { reason, .. } => reason.clone(),
        ChainError::Timeout { operation, after, .. } => {
            format!("Network request ({operation}) timed out after {}s", after.as_secs())
        }
        ChainError::Rpc(message)
        | ChainError::Estimation(message)
        | ChainError::Submission(message)
        | ChainError::Config(message) => humanize_rpc_message(message),
    }
}

fn humanize_rpc_message(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") {
        "Insufficient native balance to pay for gas".to_string()
    } else if lower.contains("nonce too low") || lower.contains("already known") {
        "A transaction with this nonce was already submitted".to_string()
    } else if lower.contains("replacement transaction underpriced") {
        "A pending transaction is blocking this one; try again shortly".to_string()
    } else if lower.contains("user denied") || lower.contains("rejected by user") {
        "Transaction was rejected".to_string()
    } else if message.trim().is_empty() {
        "Unknown network error".to_string()
    } else {
        message.to_string()
    }
}

const SPONSORSHIP_MARKERS: &[&str] = &[
    "paymaster",
    "sponsor",
    "policy",
    "aa31",
    "aa32",
    "aa33",
    "aa34",
    "aa21",
    "insufficient balance for gas",
];

/// Classify a bundler / paymaster error message
pub fn classify_aa_message(message: &str) -> AaError {
    let lower = message.to_lowercase();
    if SPONSORSHIP_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return AaError::SponsorshipRejected(message.to_string());
    }
    AaError::Bundler(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::KnownErrors;
    use alloy::primitives::{Address, U256};

    #[test]
    fn test_decodes_error_string() {
        let data = Revert {
            reason: "Stake: amount too low".into(),
        }
        .abi_encode();
        assert_eq!(decode_revert_data(&data).unwrap(), "Stake: amount too low");
    }

    #[test]
    fn test_decodes_known_custom_error() {
        let data = KnownErrors::ERC20InsufficientAllowance {
            spender: Address::repeat_byte(0x22),
            allowance: U256::ZERO,
            needed: U256::from(5u64),
        }
        .abi_encode();

        let reason = decode_revert_data(&data).unwrap();
        assert!(reason.starts_with("Insufficient token allowance"), "{reason}");
        assert!(reason.contains("need 5"));
    }

    #[test]
    fn test_unknown_selector_is_reported() {
        let reason = decode_revert_data(&[0xde, 0xad, 0xbe, 0xef, 0x00]).unwrap();
        assert_eq!(reason, "Transaction reverted with custom error 0xdeadbeef");
    }

    #[test]
    fn test_empty_revert_data() {
        assert!(decode_revert_data(&[]).is_none());
    }

    #[test]
    fn test_clean_revert_message() {
        assert_eq!(clean_revert_message("execution reverted: Paused"), "Paused");
        assert_eq!(
            clean_revert_message("execution reverted"),
            "Transaction reverted without a reason"
        );
    }

    #[test]
    fn test_humanized_funds_error() {
        let err = ChainError::Submission("insufficient funds for gas * price + value".into());
        assert_eq!(
            describe_chain_error(&err),
            "Insufficient native balance to pay for gas"
        );
    }

    #[test]
    fn test_classify_paymaster_rejection() {
        assert!(matches!(
            classify_aa_message("AA33 reverted (or OOG)"),
            AaError::SponsorshipRejected(_)
        ));
        assert!(matches!(
            classify_aa_message("Sponsorship policy limit reached"),
            AaError::SponsorshipRejected(_)
        ));
        assert!(matches!(
            classify_aa_message("internal bundler error"),
            AaError::Bundler(_)
        ));
    }
}
