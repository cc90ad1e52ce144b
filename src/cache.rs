//! Smart-account client cache
//!
//! One entry per (network id, owner address), backed by a moka cache.
//! Concurrent callers for the same key await a single initialization.
//! Failed initializations stay cached for a cooldown so a broken provider is
//! not hammered on every request; successful clients never expire.

use crate::aa::{AaError, AaProvider, SmartAccountClient};
use crate::config::{EngineConfig, NetworkConfig};
use crate::key::SigningKey;
use alloy::primitives::Address;
use moka::future::Cache;
use moka::Expiry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type CacheKey = (String, Address);
type Entry<P> = Result<Arc<SmartAccountClient<P>>, AaError>;

/// Ready clients live until invalidated, failures until the cooldown ends
struct InitExpiry {
    cooldown: Duration,
}

impl<P> Expiry<CacheKey, Entry<P>> for InitExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &Entry<P>,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.as_ref().err().map(|_| self.cooldown)
    }
}

/// Lazily initialized, memoized smart-account clients
pub struct SmartAccountCache<P> {
    provider: Arc<P>,
    clients: Cache<CacheKey, Entry<P>>,
    receipt_timeout: Duration,
    initializations: AtomicUsize,
}

impl<P: AaProvider> SmartAccountCache<P> {
    pub fn new(provider: Arc<P>, config: &EngineConfig) -> Self {
        let clients = Cache::builder()
            .expire_after(InitExpiry {
                cooldown: config.init_failure_cooldown,
            })
            .support_invalidation_closures()
            .build();

        Self {
            provider,
            clients,
            receipt_timeout: config.receipt_timeout,
            initializations: AtomicUsize::new(0),
        }
    }

    /// Return the cached client or initialize it exactly once
    ///
    /// Every failure is returned as an [`AaError`]; nothing here panics or
    /// aborts the caller's attempt.
    pub async fn get_or_init(
        &self,
        network: &NetworkConfig,
        key: &SigningKey,
    ) -> Result<Arc<SmartAccountClient<P>>, AaError> {
        if !network.aa.is_available() {
            return Err(AaError::Unsupported(network.id.clone()));
        }

        let init = async {
            self.initializations.fetch_add(1, Ordering::SeqCst);
            match self.initialize(network, key).await {
                Ok(client) => {
                    tracing::info!(
                        network = %network.id,
                        smart_account = %client.address(),
                        "smart account client initialized"
                    );
                    Ok(Arc::new(client))
                }
                Err(error) => {
                    tracing::warn!(network = %network.id, %error, "smart account unavailable");
                    Err(error)
                }
            }
        };

        self.clients
            .get_with((network.id.clone(), key.address()), init)
            .await
    }

    async fn initialize(
        &self,
        network: &NetworkConfig,
        key: &SigningKey,
    ) -> Result<SmartAccountClient<P>, AaError> {
        let address = self
            .provider
            .counterfactual_address(network, key.address())
            .await
            .map_err(|err| match err {
                AaError::Unsupported(_) | AaError::Initialization(_) => err,
                other => AaError::Initialization(other.to_string()),
            })?;

        if address.is_zero() {
            return Err(AaError::Initialization(
                "provider returned the zero address".into(),
            ));
        }

        Ok(SmartAccountClient::new(
            network.clone(),
            key.clone(),
            address,
            self.provider.clone(),
            self.receipt_timeout,
        ))
    }

    /// Already-initialized client, without triggering initialization
    pub async fn get(&self, network_id: &str, owner: Address) -> Option<Arc<SmartAccountClient<P>>> {
        self.clients
            .get(&(network_id.to_string(), owner))
            .await
            .and_then(Result::ok)
    }

    /// Drop an owner's entry for one network
    pub async fn invalidate(&self, network_id: &str, owner: Address) {
        self.clients.invalidate(&(network_id.to_string(), owner)).await;
    }

    /// Drop every entry belonging to an owner
    pub fn forget_owner(&self, owner: Address) {
        if let Err(error) = self
            .clients
            .invalidate_entries_if(move |(_, address), _| *address == owner)
        {
            tracing::warn!(%owner, %error, "failed to drop cached smart accounts");
        }
    }

    /// Number of initializations attempted so far
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }
}
