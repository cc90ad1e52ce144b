//! In-memory chain and AA provider used by the unit tests

use crate::aa::{AaError, AaProvider, UserOpReceipt};
use crate::chain::{ChainClient, ChainError, Receipt, TxRequest};
use crate::config::{AaCapability, NetworkConfig};
use crate::contracts::IIdentityLink;
use crate::key::SigningKey;
use crate::types::ContractCall;
use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{Revert, SolCall, SolError, SolValue};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Anvil account #0
pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Counterfactual address handed out by [`MockAaProvider`]
pub const MOCK_SMART_ACCOUNT: Address = Address::repeat_byte(0x5a);

pub fn test_key() -> SigningKey {
    SigningKey::from_hex(TEST_KEY).unwrap()
}

/// Network without AA capabilities
pub fn eoa_network() -> NetworkConfig {
    NetworkConfig::new("devnet", 31337, "http://127.0.0.1:8545", "https://explorer.test/")
}

/// Network with AA support and a gas policy
pub fn aa_network() -> NetworkConfig {
    NetworkConfig::new("devnet-aa", 84532, "http://127.0.0.1:8545", "https://explorer.test")
        .with_aa(AaCapability::enabled("http://127.0.0.1:4337").with_gas_policy("policy-1"))
}

/// Four-byte selector of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn selector_of(data: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    let len = data.len().min(4);
    out[..len].copy_from_slice(&data[..len]);
    out
}

/// Cross-mock record of interactions, in order
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<&'static str>>>);

impl Journal {
    fn push(&self, entry: &'static str) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    /// Position of the first occurrence of an entry
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| *e == entry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Call { to: Address, selector: [u8; 4] },
    Estimate { to: Address },
    Send { to: Address, selector: [u8; 4] },
    Receipt(TxHash),
    Balance(Address),
}

impl ChainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Call { .. } => "call",
            Self::Estimate { .. } => "estimate",
            Self::Send { .. } => "send",
            Self::Receipt(_) => "receipt",
            Self::Balance(_) => "balance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTx {
    pub hash: TxHash,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: Option<u64>,
}

impl SentTx {
    pub fn selector(&self) -> [u8; 4] {
        selector_of(&self.data)
    }
}

/// Chain client backed by in-memory state
///
/// Dry-runs succeed unless the selector was registered with
/// [`MockChain::reverting`]. The identity-link registry answers `linkedEoa`
/// and is updated by `linkSmartAccount` transactions.
pub struct MockChain {
    address: Address,
    journal: Journal,
    events: Mutex<Vec<ChainEvent>>,
    sent: Mutex<Vec<SentTx>>,
    reverts: HashMap<[u8; 4], String>,
    failing_receipts: HashSet<[u8; 4]>,
    mined_reverts: HashMap<[u8; 4], String>,
    links: Mutex<HashMap<(Address, Address), Address>>,
    gas_estimate: Option<u64>,
    receipt_timeout: bool,
    fail_next_link: AtomicBool,
    nonce: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            address: test_key().address(),
            journal: Journal::default(),
            events: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            reverts: HashMap::new(),
            failing_receipts: HashSet::new(),
            mined_reverts: HashMap::new(),
            links: Mutex::new(HashMap::new()),
            gas_estimate: Some(60_000),
            receipt_timeout: false,
            fail_next_link: AtomicBool::new(false),
            nonce: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Dry-runs of this selector revert with `reason`
    pub fn reverting(mut self, selector: [u8; 4], reason: &str) -> Self {
        self.reverts.insert(selector, reason.to_string());
        self
    }

    /// Transactions with this selector are mined but revert
    pub fn failing_receipt(mut self, selector: [u8; 4]) -> Self {
        self.failing_receipts.insert(selector);
        self
    }

    /// Transactions with this selector pass the dry-run, are mined, then
    /// revert with `reason` when replayed at their block
    pub fn reverting_when_mined(mut self, selector: [u8; 4], reason: &str) -> Self {
        self.failing_receipts.insert(selector);
        self.mined_reverts.insert(selector, reason.to_string());
        self
    }

    pub fn with_gas_estimate(mut self, gas: u64) -> Self {
        self.gas_estimate = Some(gas);
        self
    }

    pub fn failing_estimation(mut self) -> Self {
        self.gas_estimate = None;
        self
    }

    pub fn timing_out_receipts(mut self) -> Self {
        self.receipt_timeout = true;
        self
    }

    /// The next `linkSmartAccount` submission is rejected
    pub fn failing_link_once(self) -> Self {
        self.fail_next_link.store(true, Ordering::SeqCst);
        self
    }

    /// Seed the on-chain link registry
    pub fn set_link(&self, contract: Address, smart_account: Address, eoa: Address) {
        self.links
            .lock()
            .unwrap()
            .insert((contract, smart_account), eoa);
    }

    pub fn events(&self) -> Vec<ChainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent transactions excluding identity-link transactions
    pub fn business_transactions(&self) -> Vec<SentTx> {
        self.sent()
            .into_iter()
            .filter(|tx| tx.selector() != IIdentityLink::linkSmartAccountCall::SELECTOR)
            .collect()
    }

    pub fn link_transactions(&self) -> usize {
        self.sent()
            .iter()
            .filter(|tx| tx.selector() == IIdentityLink::linkSmartAccountCall::SELECTOR)
            .count()
    }

    /// Highest number of transactions awaiting a receipt at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn log(&self, event: ChainEvent) {
        self.journal.push(event.name());
        self.events.lock().unwrap().push(event);
    }

    fn dry_run(&self, call: &ContractCall) -> Result<Bytes, ChainError> {
        let selector = selector_of(&call.data);

        if selector == IIdentityLink::linkedEoaCall::SELECTOR {
            let query = IIdentityLink::linkedEoaCall::abi_decode(&call.data)
                .map_err(|e| ChainError::Rpc(e.to_string()))?;
            let linked = self
                .links
                .lock()
                .unwrap()
                .get(&(call.to, query.smartAccount))
                .copied()
                .unwrap_or(Address::ZERO);
            return Ok(linked.abi_encode().into());
        }

        if let Some(reason) = self.reverts.get(&selector) {
            let data = Revert {
                reason: reason.clone(),
            }
            .abi_encode();
            return Err(ChainError::Revert {
                reason: reason.clone(),
                data: Some(data.into()),
            });
        }

        Ok(Bytes::new())
    }
}

impl ChainClient for MockChain {
    fn address(&self) -> Address {
        self.address
    }

    async fn call(&self, _network: &NetworkConfig, call: &ContractCall) -> Result<Bytes, ChainError> {
        self.log(ChainEvent::Call {
            to: call.to,
            selector: selector_of(&call.data),
        });
        self.dry_run(call)
    }

    async fn call_at(
        &self,
        _network: &NetworkConfig,
        call: &ContractCall,
        _block: u64,
    ) -> Result<Bytes, ChainError> {
        let selector = selector_of(&call.data);
        self.log(ChainEvent::Call {
            to: call.to,
            selector,
        });

        match self.mined_reverts.get(&selector) {
            Some(reason) => Err(ChainError::Revert {
                reason: "execution reverted".into(),
                data: Some(
                    Revert {
                        reason: reason.clone(),
                    }
                    .abi_encode()
                    .into(),
                ),
            }),
            None => self.dry_run(call),
        }
    }

    async fn estimate_gas(
        &self,
        _network: &NetworkConfig,
        call: &ContractCall,
    ) -> Result<u64, ChainError> {
        self.log(ChainEvent::Estimate { to: call.to });
        self.gas_estimate
            .ok_or_else(|| ChainError::Estimation("gas required exceeds allowance".into()))
    }

    async fn send(&self, _network: &NetworkConfig, tx: TxRequest) -> Result<TxHash, ChainError> {
        let selector = selector_of(&tx.data);
        self.log(ChainEvent::Send { to: tx.to, selector });

        if selector == IIdentityLink::linkSmartAccountCall::SELECTOR {
            if self.fail_next_link.swap(false, Ordering::SeqCst) {
                return Err(ChainError::Submission("link rejected by node".into()));
            }
            let link = IIdentityLink::linkSmartAccountCall::abi_decode(&tx.data)
                .map_err(|e| ChainError::Submission(e.to_string()))?;
            self.set_link(tx.to, link.smartAccount, self.address);
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst) + 1;
        let hash = TxHash::left_padding_from(&nonce.to_be_bytes());
        self.sent.lock().unwrap().push(SentTx {
            hash,
            to: tx.to,
            data: tx.data,
            value: tx.value,
            gas_limit: tx.gas_limit,
        });

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        // Let other tasks interleave if submissions are not serialized
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(hash)
    }

    async fn wait_for_receipt(
        &self,
        _network: &NetworkConfig,
        tx_hash: TxHash,
        _confirmations: u64,
        timeout: Duration,
    ) -> Result<Receipt, ChainError> {
        self.log(ChainEvent::Receipt(tx_hash));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.receipt_timeout {
            return Err(ChainError::Timeout {
                operation: "receipt",
                after: timeout,
                tx_hash: Some(tx_hash),
            });
        }

        let selector = self
            .sent()
            .iter()
            .find(|tx| tx.hash == tx_hash)
            .map(SentTx::selector)
            .ok_or_else(|| ChainError::Rpc(format!("unknown transaction {tx_hash}")))?;

        Ok(Receipt {
            tx_hash,
            block_number: Some(1),
            gas_used: 21_000,
            success: !self.failing_receipts.contains(&selector),
        })
    }

    async fn balance(&self, _network: &NetworkConfig, address: Address) -> Result<U256, ChainError> {
        self.log(ChainEvent::Balance(address));
        Ok(U256::from(10u64).pow(U256::from(18u64)))
    }
}

/// AA provider that accepts or rejects user operations on demand
pub struct MockAaProvider {
    account: Address,
    init_error: Option<AaError>,
    init_delay: Duration,
    send_error: Option<AaError>,
    receipt_error: Option<AaError>,
    op_success: bool,
    address_lookups: AtomicUsize,
    user_ops: Mutex<Vec<(Address, Bytes)>>,
    journal: Journal,
}

impl Default for MockAaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAaProvider {
    pub fn new() -> Self {
        Self {
            account: MOCK_SMART_ACCOUNT,
            init_error: None,
            init_delay: Duration::ZERO,
            send_error: None,
            receipt_error: None,
            op_success: true,
            address_lookups: AtomicUsize::new(0),
            user_ops: Mutex::new(Vec::new()),
            journal: Journal::default(),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_account(mut self, account: Address) -> Self {
        self.account = account;
        self
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn failing_init(mut self, error: AaError) -> Self {
        self.init_error = Some(error);
        self
    }

    /// `send_user_operation` fails (e.g. paymaster rejection)
    pub fn failing_send(mut self, error: AaError) -> Self {
        self.send_error = Some(error);
        self
    }

    /// Inclusion wait fails (e.g. timeout)
    pub fn failing_receipt(mut self, error: AaError) -> Self {
        self.receipt_error = Some(error);
        self
    }

    /// Operations are included but revert
    pub fn reverting_ops(mut self) -> Self {
        self.op_success = false;
        self
    }

    pub fn address_lookups(&self) -> usize {
        self.address_lookups.load(Ordering::SeqCst)
    }

    /// (sender, call data) of every submitted operation
    pub fn user_ops(&self) -> Vec<(Address, Bytes)> {
        self.user_ops.lock().unwrap().clone()
    }
}

impl AaProvider for MockAaProvider {
    async fn counterfactual_address(
        &self,
        _network: &NetworkConfig,
        _owner: Address,
    ) -> Result<Address, AaError> {
        self.address_lookups.fetch_add(1, Ordering::SeqCst);
        self.journal.push("address");
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        match &self.init_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.account),
        }
    }

    async fn send_user_operation(
        &self,
        _network: &NetworkConfig,
        sender: Address,
        call_data: Bytes,
        _owner: &PrivateKeySigner,
    ) -> Result<B256, AaError> {
        self.journal.push("user_op");
        if let Some(err) = &self.send_error {
            return Err(err.clone());
        }

        let mut ops = self.user_ops.lock().unwrap();
        ops.push((sender, call_data));
        Ok(B256::left_padding_from(&(ops.len() as u64).to_be_bytes()))
    }

    async fn wait_for_user_operation(
        &self,
        _network: &NetworkConfig,
        user_op_hash: B256,
        _timeout: Duration,
    ) -> Result<UserOpReceipt, AaError> {
        self.journal.push("user_op_receipt");
        if let Some(err) = &self.receipt_error {
            return Err(err.clone());
        }

        Ok(UserOpReceipt {
            user_op_hash,
            tx_hash: keccak256(user_op_hash),
            success: self.op_success,
            actual_gas_cost: U256::from(1_000_000_000_000u64),
            reason: (!self.op_success).then(|| "execution reverted".to_string()),
        })
    }
}
