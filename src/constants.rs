//! Protocol addresses and engine defaults

use alloy::primitives::{address, Address};
use std::time::Duration;

/// ERC-4337 EntryPoint v0.6 (same address on most chains)
pub const ENTRY_POINT_V06: Address = address!("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// Default v0.6 smart account factory
pub const DEFAULT_FACTORY_V06: Address = address!("0x85e23b94e7F5E9cC1fF78BCe78cfb15B81f0DF00");

/// Deadline for a single RPC round-trip
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for a receipt or user operation inclusion (60 polls × 2 seconds)
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Receipt polling interval
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Confirmations awaited on the EOA path
pub const DEFAULT_CONFIRMATIONS: u64 = 1;

/// Gas estimate multiplier in percent (×1.2)
pub const DEFAULT_GAS_BUFFER_PERCENT: u64 = 120;

/// Conservative gas limit used when estimation fails
pub const DEFAULT_FALLBACK_GAS_LIMIT: u64 = 500_000;

/// How long a broken AA provider is left alone before retrying initialization
pub const DEFAULT_INIT_FAILURE_COOLDOWN: Duration = Duration::from_secs(60);

/// Monthly sponsorship cap in USD
pub const DEFAULT_QUOTA_CAP_USD: f64 = 10.0;

/// Estimated sponsored cost of one call in USD
pub const DEFAULT_USD_PER_CALL: f64 = 0.01;

/// Salt passed to the account factory (one account per owner)
pub const DEFAULT_ACCOUNT_SALT: &[u8] = b"";

/// Placeholder signature used while estimating user operation gas
pub const DUMMY_SIGNATURE: [u8; 65] = alloy::hex!(
    "0xfffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c"
);
