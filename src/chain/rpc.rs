//! JSON-RPC chain client backed by a local private key

use super::{ChainClient, ChainError, Receipt, TxRequest};
use crate::config::{EngineConfig, NetworkConfig};
use crate::key::SigningKey;
use crate::normalizer;
use crate::types::ContractCall;
use alloy::eips::BlockId;
use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use alloy::transports::http::reqwest::Url;
use alloy::transports::TransportError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type WalletProvider = Arc<dyn Provider<Ethereum>>;

/// Chain client signing locally with the user's EOA key
///
/// Providers are built lazily per network and reused; the wallet filler
/// handles nonce, gas price, chain id and signing.
pub struct RpcChainClient {
    key: SigningKey,
    providers: Mutex<HashMap<String, WalletProvider>>,
    rpc_timeout: Duration,
    poll_interval: Duration,
}

impl RpcChainClient {
    /// Create a client for a signing key
    pub fn new(key: SigningKey, config: &EngineConfig) -> Self {
        Self {
            key,
            providers: Mutex::new(HashMap::new()),
            rpc_timeout: config.rpc_timeout,
            poll_interval: config.receipt_poll_interval,
        }
    }

    /// Provider for a network, built on first use
    fn provider(&self, network: &NetworkConfig) -> Result<WalletProvider, ChainError> {
        let mut providers = self
            .providers
            .lock()
            .map_err(|_| ChainError::Config("provider cache poisoned".into()))?;

        if let Some(provider) = providers.get(&network.id) {
            return Ok(provider.clone());
        }

        let url: Url = network
            .rpc_url
            .parse()
            .map_err(|e| ChainError::Config(format!("invalid RPC URL for {}: {e}", network.id)))?;

        // Build provider with wallet filler - this handles nonce, gas, and signing
        let wallet = EthereumWallet::from(self.key.signer().clone());
        let provider: WalletProvider =
            Arc::new(ProviderBuilder::new().wallet(wallet).connect_http(url));

        providers.insert(network.id.clone(), provider.clone());
        Ok(provider)
    }

    fn request_for(&self, call: &ContractCall) -> alloy::rpc::types::TransactionRequest {
        alloy::rpc::types::TransactionRequest::default()
            .with_from(self.key.address())
            .with_to(call.to)
            .with_value(call.value)
            .with_input(call.data.clone())
    }

    async fn poll_receipt(
        &self,
        provider: &WalletProvider,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> Result<Receipt, ChainError> {
        loop {
            let receipt: Option<TransactionReceipt> = provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?;

            if let Some(receipt) = receipt {
                let confirmed = match (confirmations, receipt.block_number) {
                    (0 | 1, _) => true,
                    (_, Some(mined_at)) => {
                        let head = provider
                            .get_block_number()
                            .await
                            .map_err(|e| ChainError::Rpc(e.to_string()))?;
                        head + 1 >= mined_at + confirmations
                    }
                    (_, None) => false,
                };

                if confirmed {
                    return Ok(Receipt {
                        tx_hash,
                        block_number: receipt.block_number,
                        gas_used: receipt.gas_used,
                        success: receipt.status(),
                    });
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Map an RPC failure, decoding revert payloads when the node returns them
fn map_rpc_error(err: TransportError, fallback: fn(String) -> ChainError) -> ChainError {
    if let Some(payload) = err.as_error_resp() {
        if let Some(data) = payload.as_revert_data() {
            let reason = normalizer::decode_revert_data(&data)
                .unwrap_or_else(|| normalizer::clean_revert_message(&payload.message));
            return ChainError::Revert {
                reason,
                data: Some(data),
            };
        }
        if payload.message.to_lowercase().contains("revert") {
            return ChainError::Revert {
                reason: normalizer::clean_revert_message(&payload.message),
                data: None,
            };
        }
    }
    fallback(err.to_string())
}

impl ChainClient for RpcChainClient {
    fn address(&self) -> Address {
        self.key.address()
    }

    async fn call(
        &self,
        network: &NetworkConfig,
        call: &ContractCall,
    ) -> Result<Bytes, ChainError> {
        let provider = self.provider(network)?;
        let request = self.request_for(call);

        tokio::time::timeout(self.rpc_timeout, provider.call(request))
            .await
            .map_err(|_| ChainError::timeout("eth_call", self.rpc_timeout))?
            .map_err(|e| map_rpc_error(e, ChainError::Rpc))
    }

    async fn call_at(
        &self,
        network: &NetworkConfig,
        call: &ContractCall,
        block: u64,
    ) -> Result<Bytes, ChainError> {
        let provider = self.provider(network)?;
        let request = self.request_for(call);

        tokio::time::timeout(
            self.rpc_timeout,
            provider.call(request).block(BlockId::number(block)),
        )
        .await
        .map_err(|_| ChainError::timeout("eth_call", self.rpc_timeout))?
        .map_err(|e| map_rpc_error(e, ChainError::Rpc))
    }

    async fn estimate_gas(
        &self,
        network: &NetworkConfig,
        call: &ContractCall,
    ) -> Result<u64, ChainError> {
        let provider = self.provider(network)?;
        let request = self.request_for(call);

        tokio::time::timeout(self.rpc_timeout, provider.estimate_gas(request))
            .await
            .map_err(|_| ChainError::timeout("eth_estimateGas", self.rpc_timeout))?
            .map_err(|e| map_rpc_error(e, ChainError::Estimation))
    }

    async fn send(&self, network: &NetworkConfig, tx: TxRequest) -> Result<TxHash, ChainError> {
        let provider = self.provider(network)?;

        let mut tx_request = alloy::rpc::types::TransactionRequest::default()
            .with_from(self.key.address())
            .with_to(tx.to)
            .with_value(tx.value)
            .with_input(tx.data);

        // Set gas limit if provided
        if let Some(gas_limit) = tx.gas_limit {
            tx_request = tx_request.with_gas_limit(gas_limit);
        }

        // Provider will fill nonce, gas price, chain_id and sign
        let pending_tx =
            tokio::time::timeout(self.rpc_timeout, provider.send_transaction(tx_request))
                .await
                .map_err(|_| ChainError::timeout("eth_sendRawTransaction", self.rpc_timeout))?
                .map_err(|e| map_rpc_error(e, ChainError::Submission))?;

        Ok(*pending_tx.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        network: &NetworkConfig,
        tx_hash: TxHash,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<Receipt, ChainError> {
        let provider = self.provider(network)?;

        tokio::time::timeout(timeout, self.poll_receipt(&provider, tx_hash, confirmations))
            .await
            .map_err(|_| ChainError::Timeout {
                operation: "receipt",
                after: timeout,
                tx_hash: Some(tx_hash),
            })?
    }

    async fn balance(
        &self,
        network: &NetworkConfig,
        address: Address,
    ) -> Result<U256, ChainError> {
        let provider = self.provider(network)?;

        tokio::time::timeout(self.rpc_timeout, provider.get_balance(address))
            .await
            .map_err(|_| ChainError::timeout("eth_getBalance", self.rpc_timeout))?
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[tokio::test]
    async fn test_provider_cached_per_network() {
        let key = SigningKey::from_hex(ANVIL_KEY).unwrap();
        let client = RpcChainClient::new(key, &EngineConfig::default());
        let network = NetworkConfig::new("local", 31337, "http://127.0.0.1:8545", "");

        let a = client.provider(&network).unwrap();
        let b = client.provider(&network).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_invalid_rpc_url_is_config_error() {
        let key = SigningKey::from_hex(ANVIL_KEY).unwrap();
        let client = RpcChainClient::new(key, &EngineConfig::default());
        let network = NetworkConfig::new("broken", 1, "not a url", "");

        assert!(matches!(client.provider(&network), Err(ChainError::Config(_))));
    }
}
