//! Bundler / paymaster JSON-RPC provider
//!
//! Talks to an ERC-4337 v0.6 bundler over JSON-RPC. When the network carries a
//! gas policy the operation is sent to `pm_sponsorUserOperation` first;
//! otherwise gas is estimated with `eth_estimateUserOperationGas` and the
//! account pays for itself.

use super::{AaError, AaProvider, UserOpReceipt, UserOperation};
use crate::config::{EngineConfig, NetworkConfig};
use crate::constants::{DEFAULT_ACCOUNT_SALT, DUMMY_SIGNATURE};
use crate::contracts::{IAccountFactory, IEntryPoint};
use crate::normalizer;
use alloy::network::{Ethereum, TransactionBuilder};
use alloy::primitives::aliases::U192;
use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::{Client as HttpClient, Url};
use alloy::transports::http::Http;
use alloy::transports::TransportError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::IntoFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ReadProvider = Arc<RootProvider<Ethereum>>;

/// Paymaster sponsorship result (v0.6)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymasterResult {
    pre_verification_gas: Option<U256>,
    verification_gas_limit: Option<U256>,
    call_gas_limit: Option<U256>,
    paymaster_and_data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GasEstimation {
    call_gas_limit: U256,
    verification_gas_limit: U256,
    pre_verification_gas: U256,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUserOpReceipt {
    user_op_hash: B256,
    success: bool,
    #[serde(default)]
    actual_gas_cost: U256,
    #[serde(default)]
    reason: Option<String>,
    receipt: RawBundleReceipt,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBundleReceipt {
    transaction_hash: TxHash,
}

impl From<RawUserOpReceipt> for UserOpReceipt {
    fn from(raw: RawUserOpReceipt) -> Self {
        Self {
            user_op_hash: raw.user_op_hash,
            tx_hash: raw.receipt.transaction_hash,
            success: raw.success,
            actual_gas_cost: raw.actual_gas_cost,
            reason: raw.reason.filter(|r| !r.is_empty() && r != "0x"),
        }
    }
}

/// [`AaProvider`] backed by a bundler endpoint and the network's RPC node
pub struct BundlerProvider {
    http: HttpClient,
    rpc_timeout: Duration,
    poll_interval: Duration,
    bundlers: Mutex<HashMap<String, RpcClient>>,
    readers: Mutex<HashMap<String, ReadProvider>>,
}

impl BundlerProvider {
    /// Create a provider sharing one HTTP connection pool across networks
    pub fn new(config: &EngineConfig) -> eyre::Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.rpc_timeout)
            .build()
            .map_err(|e| eyre::eyre!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            http,
            rpc_timeout: config.rpc_timeout,
            poll_interval: config.receipt_poll_interval,
            bundlers: Mutex::new(HashMap::new()),
            readers: Mutex::new(HashMap::new()),
        })
    }

    fn bundler(&self, network: &NetworkConfig) -> Result<RpcClient, AaError> {
        let raw_url = network.aa.bundler_url.as_deref().ok_or_else(|| {
            AaError::Unsupported(format!("{} has no bundler endpoint", network.id))
        })?;

        let mut bundlers = self
            .bundlers
            .lock()
            .map_err(|_| AaError::Initialization("bundler cache poisoned".into()))?;

        if let Some(client) = bundlers.get(raw_url) {
            return Ok(client.clone());
        }

        let url: Url = raw_url
            .parse()
            .map_err(|e| AaError::Initialization(format!("invalid bundler URL: {e}")))?;
        let transport = Http::with_client(self.http.clone(), url);
        let client = RpcClient::builder().transport(transport, false);

        bundlers.insert(raw_url.to_string(), client.clone());
        Ok(client)
    }

    fn reader(&self, network: &NetworkConfig) -> Result<ReadProvider, AaError> {
        let mut readers = self
            .readers
            .lock()
            .map_err(|_| AaError::Initialization("provider cache poisoned".into()))?;

        if let Some(provider) = readers.get(&network.id) {
            return Ok(provider.clone());
        }

        let url: Url = network.rpc_url.parse().map_err(|e| {
            AaError::Initialization(format!("invalid RPC URL for {}: {e}", network.id))
        })?;

        // Read-only provider without fillers
        let provider = Arc::new(
            ProviderBuilder::new()
                .disable_recommended_fillers()
                .network::<Ethereum>()
                .connect_http(url),
        );

        readers.insert(network.id.clone(), provider.clone());
        Ok(provider)
    }

    /// Run a future under the RPC deadline
    async fn deadline<T, E>(
        &self,
        fut: impl IntoFuture<Output = Result<T, E>>,
        map_err: impl FnOnce(E) -> AaError,
    ) -> Result<T, AaError> {
        tokio::time::timeout(self.rpc_timeout, fut)
            .await
            .map_err(|_| AaError::Timeout(self.rpc_timeout))?
            .map_err(map_err)
    }

    async fn read_call<C: SolCall>(
        &self,
        provider: &ReadProvider,
        to: Address,
        call: C,
    ) -> Result<C::Return, AaError> {
        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(call.abi_encode());

        let output = self
            .deadline(provider.call(request), |e| {
                AaError::Initialization(e.to_string())
            })
            .await?;

        C::abi_decode_returns(&output).map_err(|e| AaError::Initialization(e.to_string()))
    }

    async fn init_code(
        &self,
        provider: &ReadProvider,
        network: &NetworkConfig,
        sender: Address,
        owner: Address,
    ) -> Result<Bytes, AaError> {
        let code = self
            .deadline(provider.get_code_at(sender), |e| AaError::Bundler(e.to_string()))
            .await?;

        if !code.is_empty() {
            return Ok(Bytes::new());
        }

        let create = IAccountFactory::createAccountCall {
            _admin: owner,
            _data: Bytes::from_static(DEFAULT_ACCOUNT_SALT),
        };
        let mut init_code = network.aa.account_factory.to_vec();
        init_code.extend_from_slice(&create.abi_encode());
        Ok(init_code.into())
    }

    async fn sponsor(
        &self,
        bundler: &RpcClient,
        network: &NetworkConfig,
        op: &mut UserOperation,
        policy_id: &str,
    ) -> Result<(), AaError> {
        let context = serde_json::json!({ "sponsorshipPolicyId": policy_id });
        let result: PaymasterResult = self
            .deadline(
                bundler.request(
                    "pm_sponsorUserOperation",
                    (&*op, network.aa.entry_point, context),
                ),
                map_transport_error,
            )
            .await?;

        if result.paymaster_and_data.is_empty() {
            return Err(AaError::SponsorshipRejected(format!(
                "paymaster returned no sponsorship for policy {policy_id}"
            )));
        }

        op.paymaster_and_data = result.paymaster_and_data;
        match (
            result.call_gas_limit,
            result.verification_gas_limit,
            result.pre_verification_gas,
        ) {
            (Some(call), Some(verification), Some(pre_verification)) => {
                op.call_gas_limit = call;
                op.verification_gas_limit = verification;
                op.pre_verification_gas = pre_verification;
            }
            _ => self.estimate_gas(bundler, network, op).await?,
        }
        Ok(())
    }

    async fn estimate_gas(
        &self,
        bundler: &RpcClient,
        network: &NetworkConfig,
        op: &mut UserOperation,
    ) -> Result<(), AaError> {
        let estimate: GasEstimation = self
            .deadline(
                bundler.request("eth_estimateUserOperationGas", (&*op, network.aa.entry_point)),
                map_transport_error,
            )
            .await?;

        op.call_gas_limit = estimate.call_gas_limit;
        op.verification_gas_limit = estimate.verification_gas_limit;
        op.pre_verification_gas = estimate.pre_verification_gas;
        Ok(())
    }

    async fn poll_receipt(
        &self,
        bundler: &RpcClient,
        user_op_hash: B256,
    ) -> Result<UserOpReceipt, AaError> {
        loop {
            let receipt: Option<RawUserOpReceipt> = self
                .deadline(
                    bundler.request("eth_getUserOperationReceipt", [user_op_hash]),
                    map_transport_error,
                )
                .await?;

            if let Some(receipt) = receipt {
                return Ok(receipt.into());
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Bundler errors carry their reason in the JSON-RPC error message
fn map_transport_error(err: TransportError) -> AaError {
    match err.as_error_resp() {
        Some(payload) => normalizer::classify_aa_message(&payload.message),
        None => AaError::Bundler(err.to_string()),
    }
}

impl AaProvider for BundlerProvider {
    async fn counterfactual_address(
        &self,
        network: &NetworkConfig,
        owner: Address,
    ) -> Result<Address, AaError> {
        let provider = self.reader(network)?;

        let address = self
            .read_call(
                &provider,
                network.aa.account_factory,
                IAccountFactory::getAddressCall {
                    _adminSigner: owner,
                    _data: Bytes::from_static(DEFAULT_ACCOUNT_SALT),
                },
            )
            .await?;

        tracing::debug!(network = %network.id, %owner, %address, "counterfactual address resolved");
        Ok(address)
    }

    async fn send_user_operation(
        &self,
        network: &NetworkConfig,
        sender: Address,
        call_data: Bytes,
        owner: &PrivateKeySigner,
    ) -> Result<B256, AaError> {
        let provider = self.reader(network)?;
        let bundler = self.bundler(network)?;
        let entry_point = network.aa.entry_point;

        let init_code = self.init_code(&provider, network, sender, owner.address()).await?;
        let nonce = self
            .read_call(
                &provider,
                entry_point,
                IEntryPoint::getNonceCall {
                    sender,
                    key: U192::ZERO,
                },
            )
            .await
            .map_err(|e| AaError::Bundler(format!("failed to read account nonce: {e}")))?;

        let fees = self
            .deadline(provider.estimate_eip1559_fees(), |e| AaError::Bundler(e.to_string()))
            .await?;

        let mut op = UserOperation::new(sender, nonce, init_code, call_data);
        op.max_fee_per_gas = U256::from(fees.max_fee_per_gas);
        op.max_priority_fee_per_gas = U256::from(fees.max_priority_fee_per_gas);
        op.signature = Bytes::from_static(&DUMMY_SIGNATURE);

        match network.aa.gas_policy_id.as_deref() {
            Some(policy_id) => self.sponsor(&bundler, network, &mut op, policy_id).await?,
            None => self.estimate_gas(&bundler, network, &mut op).await?,
        }

        op.sign(owner, entry_point, network.chain_id)
            .map_err(|e| AaError::Bundler(format!("failed to sign user operation: {e}")))?;

        let user_op_hash: B256 = self
            .deadline(
                bundler.request("eth_sendUserOperation", (&op, entry_point)),
                map_transport_error,
            )
            .await?;

        Ok(user_op_hash)
    }

    async fn wait_for_user_operation(
        &self,
        network: &NetworkConfig,
        user_op_hash: B256,
        timeout: Duration,
    ) -> Result<UserOpReceipt, AaError> {
        let bundler = self.bundler(network)?;

        tokio::time::timeout(timeout, self.poll_receipt(&bundler, user_op_hash))
            .await
            .map_err(|_| AaError::Timeout(timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AaCapability;

    #[test]
    fn test_receipt_deserializes() {
        let json = serde_json::json!({
            "userOpHash": format!("{}", B256::repeat_byte(0x11)),
            "sender": format!("{}", Address::repeat_byte(0x22)),
            "nonce": "0x0",
            "success": true,
            "actualGasCost": "0x5208",
            "actualGasUsed": "0x5208",
            "logs": [],
            "receipt": { "transactionHash": format!("{}", B256::repeat_byte(0x33)) }
        });

        let receipt: UserOpReceipt = serde_json::from_value::<RawUserOpReceipt>(json)
            .unwrap()
            .into();
        assert!(receipt.success);
        assert_eq!(receipt.tx_hash, B256::repeat_byte(0x33));
        assert_eq!(receipt.actual_gas_cost, U256::from(0x5208u64));
        assert!(receipt.reason.is_none());
    }

    #[test]
    fn test_paymaster_result_partial_gas() {
        let json = serde_json::json!({ "paymasterAndData": "0xabcd" });
        let result: PaymasterResult = serde_json::from_value(json).unwrap();
        assert_eq!(result.paymaster_and_data.as_ref(), &[0xab, 0xcd]);
        assert!(result.call_gas_limit.is_none());
    }

    #[tokio::test]
    async fn test_missing_bundler_url_is_unsupported() {
        let provider = BundlerProvider::new(&EngineConfig::default()).unwrap();
        let network = NetworkConfig::new("local", 31337, "http://127.0.0.1:8545", "");
        assert!(matches!(provider.bundler(&network), Err(AaError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_bundler_client_reused() {
        let provider = BundlerProvider::new(&EngineConfig::default()).unwrap();
        let network = NetworkConfig::new("local", 31337, "http://127.0.0.1:8545", "")
            .with_aa(AaCapability::enabled("http://127.0.0.1:4337"));

        provider.bundler(&network).unwrap();
        provider.bundler(&network).unwrap();
        assert_eq!(provider.bundlers.lock().unwrap().len(), 1);
    }
}
