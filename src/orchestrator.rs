//! Transaction orchestrator
//!
//! Every request runs through the same pipeline:
//!
//! 1. `checking`: [`decide_path`] evaluates eligibility without any I/O.
//! 2. When eligible, the smart-account attempt obtains a client from the
//!    cache, links the identity if the request asks for it, then submits one
//!    user operation for all calls. Any failure here is absorbed and logged.
//! 3. Otherwise, or after a failed attempt, the EOA path dry-runs and submits
//!    each call in order.
//!
//! Callers always get an [`ExecutionResult`]. AA is never raced against EOA.

use crate::aa::AaProvider;
use crate::cache::SmartAccountCache;
use crate::chain::{ChainClient, ChainError};
use crate::config::{AaCapability, EngineConfig, NetworkConfig};
use crate::eoa::EoaExecutor;
use crate::error::{FailureKind, OrchestrationError};
use crate::key::SigningKey;
use crate::linking::IdentityLinker;
use crate::quota::QuotaLedger;
use crate::types::{
    AccountIdentity, BatchReport, BatchTransactionRequest, ContractCall, ExecutionFailure,
    ExecutionPath, ExecutionPreferences, ExecutionResult, LinkTarget, TransactionRequest,
};
use alloy::primitives::U256;
use std::sync::Arc;

/// Quota ledger tag for sponsored executions
const SMART_ACCOUNT_TAG: &str = "smart_account";

/// Stage transitions reported while a request runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStage {
    Checking,
    Linking,
    Batching,
    Submitting,
    Confirming,
    Fallback,
}

impl ExecutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Linking => "linking",
            Self::Batching => "batching",
            Self::Submitting => "submitting",
            Self::Confirming => "confirming",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress callback for UI indicators
pub type ProgressFn<'a> = dyn Fn(ExecutionStage) + Send + Sync + 'a;

/// Why a request goes straight to the EOA path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EoaReason {
    Forced,
    NotPreferred,
    Unsupported,
    NotConfigured,
    NoSponsorPolicy,
    QuotaExceeded,
}

impl EoaReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forced => "EOA forced by caller",
            Self::NotPreferred => "smart account not preferred",
            Self::Unsupported => "network does not support account abstraction",
            Self::NotConfigured => "network not configured for account abstraction",
            Self::NoSponsorPolicy => "sponsorship expected but no gas policy configured",
            Self::QuotaExceeded => "sponsorship quota exhausted",
        }
    }

    /// Soft error behind the decision, `None` for caller choices
    pub fn to_error(&self, requested: f64, remaining: f64) -> Option<OrchestrationError> {
        match self {
            Self::Forced | Self::NotPreferred => None,
            Self::Unsupported | Self::NotConfigured | Self::NoSponsorPolicy => {
                Some(OrchestrationError::Unsupported(self.as_str().into()))
            }
            Self::QuotaExceeded => Some(OrchestrationError::QuotaExceeded {
                requested,
                remaining,
            }),
        }
    }
}

/// Outcome of the eligibility gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathDecision {
    TryAa,
    UseEoa(EoaReason),
}

/// Decide which path to try first
///
/// Pure: `quota_available` is the ledger's answer for this request's
/// estimate, computed by the caller.
pub fn decide_path(
    preferences: &ExecutionPreferences,
    aa: &AaCapability,
    quota_available: bool,
) -> PathDecision {
    let reason = if preferences.force_eoa {
        EoaReason::Forced
    } else if !preferences.prefer_smart_account {
        EoaReason::NotPreferred
    } else if !aa.supports_aa {
        EoaReason::Unsupported
    } else if !aa.configured_in_dashboard {
        EoaReason::NotConfigured
    } else if preferences.expect_gas_sponsorship && aa.gas_policy_id.is_none() {
        EoaReason::NoSponsorPolicy
    } else if !quota_available {
        EoaReason::QuotaExceeded
    } else {
        return PathDecision::TryAa;
    };
    PathDecision::UseEoa(reason)
}

/// Shared, internally synchronized state injected into orchestrators
pub struct EngineContext<P> {
    pub config: EngineConfig,
    pub cache: SmartAccountCache<P>,
    pub quota: QuotaLedger,
    pub linker: IdentityLinker,
    pub eoa: EoaExecutor,
}

impl<P: AaProvider> EngineContext<P> {
    pub fn new(provider: Arc<P>, config: EngineConfig) -> Self {
        Self {
            cache: SmartAccountCache::new(provider, &config),
            quota: QuotaLedger::new(&config),
            linker: IdentityLinker::new(),
            eoa: EoaExecutor::new(config.clone()),
            config,
        }
    }

    /// Replace the quota ledger (e.g. one restored from storage)
    pub fn with_quota(mut self, quota: QuotaLedger) -> Self {
        self.quota = quota;
        self
    }
}

/// One unit of work: a single call or an ordered batch
struct Job<'a> {
    calls: &'a [ContractCall],
    network: &'a NetworkConfig,
    preferences: ExecutionPreferences,
    link: Option<LinkTarget>,
    batch: bool,
}

/// Routes requests for one signing key
pub struct Orchestrator<C, P> {
    chain: C,
    key: SigningKey,
    context: Arc<EngineContext<P>>,
}

impl<C: ChainClient, P: AaProvider> Orchestrator<C, P> {
    /// Bind a chain client and the same signing key it signs with
    pub fn new(chain: C, key: SigningKey, context: Arc<EngineContext<P>>) -> eyre::Result<Self> {
        if chain.address() != key.address() {
            eyre::bail!(
                "chain client signs as {} but the signing key is {}",
                chain.address(),
                key.address()
            );
        }
        Ok(Self {
            chain,
            key,
            context,
        })
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn context(&self) -> &EngineContext<P> {
        &self.context
    }

    pub fn eoa_address(&self) -> alloy::primitives::Address {
        self.key.address()
    }

    /// Execute a single call
    pub async fn execute(&self, request: &TransactionRequest) -> ExecutionResult {
        self.execute_with_progress(request, None).await
    }

    /// Execute a single call, reporting stage transitions
    pub async fn execute_with_progress(
        &self,
        request: &TransactionRequest,
        progress: Option<&ProgressFn<'_>>,
    ) -> ExecutionResult {
        let job = Job {
            calls: std::slice::from_ref(&request.call),
            network: &request.network,
            preferences: request.preferences,
            link: request.link,
            batch: false,
        };
        self.run(job, progress).await
    }

    /// Execute an ordered batch
    ///
    /// Atomic on the smart-account path. On the EOA path calls are sent one
    /// by one and the result's [`BatchReport`] shows how far the batch got.
    pub async fn execute_batch(&self, request: &BatchTransactionRequest) -> ExecutionResult {
        self.execute_batch_with_progress(request, None).await
    }

    pub async fn execute_batch_with_progress(
        &self,
        request: &BatchTransactionRequest,
        progress: Option<&ProgressFn<'_>>,
    ) -> ExecutionResult {
        let job = Job {
            calls: &request.calls,
            network: &request.network,
            preferences: request.preferences,
            link: request.link,
            batch: true,
        };
        self.run(job, progress).await
    }

    /// Identity of this key on a network
    pub async fn identity(&self, network: &NetworkConfig) -> AccountIdentity {
        let eoa = self.key.address();
        AccountIdentity {
            eoa_address: eoa,
            smart_account_address: self
                .context
                .cache
                .get(&network.id, eoa)
                .await
                .map(|client| client.address()),
            linking_state: self.context.linker.network_state(&network.id, eoa),
        }
    }

    /// Forget every cached client and link state of this key
    pub fn logout(&self) {
        let eoa = self.key.address();
        self.context.cache.forget_owner(eoa);
        self.context.linker.forget_eoa(eoa);
        tracing::info!(%eoa, "identity cleared");
    }

    /// Invalidate this key's cached state for a network
    pub async fn switch_network(&self, network_id: &str) {
        let eoa = self.key.address();
        self.context.cache.invalidate(network_id, eoa).await;
        self.context.linker.forget(network_id, eoa);
        tracing::info!(network = network_id, "network switched");
    }

    /// Native balance of the EOA
    pub async fn balance(&self, network: &NetworkConfig) -> Result<U256, ChainError> {
        self.chain.balance(network, self.key.address()).await
    }

    async fn run(&self, job: Job<'_>, progress: Option<&ProgressFn<'_>>) -> ExecutionResult {
        if job.calls.is_empty() {
            let err = OrchestrationError::InvalidRequest("batch contains no calls".into());
            return ExecutionResult::failed(ExecutionFailure::from(&err));
        }

        report(progress, job.network, ExecutionStage::Checking);
        let estimate = self.context.quota.estimate(job.calls.len());
        // Forced EOA never consults the ledger
        let decision = if job.preferences.force_eoa {
            PathDecision::UseEoa(EoaReason::Forced)
        } else {
            decide_path(
                &job.preferences,
                &job.network.aa,
                self.context.quota.can_sponsor(estimate),
            )
        };

        match decision {
            PathDecision::TryAa => match self.try_smart_account(&job, estimate, progress).await {
                Ok(result) => return result,
                Err(err) => {
                    tracing::warn!(
                        network = %job.network.id,
                        kind = ?err.kind(),
                        error = %err,
                        "smart account path failed, falling back to EOA"
                    );
                    report(progress, job.network, ExecutionStage::Fallback);
                }
            },
            PathDecision::UseEoa(reason) => {
                match reason.to_error(estimate, self.context.quota.remaining()) {
                    Some(err) => tracing::info!(
                        network = %job.network.id,
                        kind = ?err.kind(),
                        soft = err.is_soft(),
                        error = %err,
                        "smart account skipped, using EOA path"
                    ),
                    None => tracing::debug!(
                        network = %job.network.id,
                        reason = reason.as_str(),
                        "using EOA path"
                    ),
                }
            }
        }

        if job.batch {
            self.run_eoa_batch(&job, progress).await
        } else {
            self.run_eoa_single(&job, progress).await
        }
    }

    /// Smart-account attempt; every error returned here is recoverable
    async fn try_smart_account(
        &self,
        job: &Job<'_>,
        estimate: f64,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<ExecutionResult, OrchestrationError> {
        let network = job.network;
        let client = self.context.cache.get_or_init(network, &self.key).await?;

        if let Some(target) = job.link {
            report(progress, network, ExecutionStage::Linking);
            let linked = self
                .context
                .linker
                .ensure_linked(
                    &self.chain,
                    &self.context.eoa,
                    network,
                    target.contract,
                    client.address(),
                )
                .await;

            if let Err(err) = linked {
                if target.required {
                    return Err(err.into());
                }
                tracing::warn!(
                    network = %network.id,
                    contract = %target.contract,
                    error = %err,
                    "optional linking failed, continuing with smart account"
                );
            }
        }

        let stage = if job.calls.len() > 1 {
            ExecutionStage::Batching
        } else {
            ExecutionStage::Submitting
        };
        report(progress, network, stage);

        let receipt = client.execute(job.calls).await?;
        report(progress, network, ExecutionStage::Confirming);

        self.context.quota.record(estimate, SMART_ACCOUNT_TAG);
        tracing::info!(
            network = %network.id,
            tx_hash = %receipt.tx_hash,
            user_op_hash = %receipt.user_op_hash,
            calls = job.calls.len(),
            "executed via smart account"
        );

        let url = network.explorer_tx_url(receipt.tx_hash);
        let result = ExecutionResult::succeeded(receipt.tx_hash, ExecutionPath::SmartAccount, url);
        if !job.batch {
            return Ok(result);
        }
        Ok(result.with_batch(BatchReport {
            atomic: true,
            total: job.calls.len(),
            // Every call landed in the same bundle transaction
            completed_hashes: vec![receipt.tx_hash; job.calls.len()],
            failed_index: None,
        }))
    }

    async fn run_eoa_single(&self, job: &Job<'_>, progress: Option<&ProgressFn<'_>>) -> ExecutionResult {
        let network = job.network;
        let call = &job.calls[0];

        report(progress, network, ExecutionStage::Submitting);
        match self.context.eoa.execute(&self.chain, network, call).await {
            Ok(receipt) => {
                report(progress, network, ExecutionStage::Confirming);
                tracing::info!(network = %network.id, tx_hash = %receipt.tx_hash, "executed via EOA");
                ExecutionResult::succeeded(
                    receipt.tx_hash,
                    ExecutionPath::Eoa,
                    network.explorer_tx_url(receipt.tx_hash),
                )
            }
            Err(err) => eoa_failure(network, &err, ExecutionFailure::from(&err), None),
        }
    }

    async fn run_eoa_batch(&self, job: &Job<'_>, progress: Option<&ProgressFn<'_>>) -> ExecutionResult {
        let network = job.network;
        let total = job.calls.len();
        let mut completed = Vec::with_capacity(total);

        for (index, call) in job.calls.iter().enumerate() {
            report(progress, network, ExecutionStage::Submitting);
            tracing::info!(
                network = %network.id,
                step = index + 1,
                total,
                function = call.label(),
                "sequential EOA call"
            );

            match self.context.eoa.execute(&self.chain, network, call).await {
                Ok(receipt) => completed.push(receipt.tx_hash),
                Err(err) => {
                    let failure = ExecutionFailure::new(
                        err.kind(),
                        format!(
                            "Call {} of {} ({}) failed: {}",
                            index + 1,
                            total,
                            call.label(),
                            err
                        ),
                    );
                    let report = BatchReport {
                        atomic: false,
                        total,
                        completed_hashes: completed,
                        failed_index: Some(index),
                    };
                    return eoa_failure(network, &err, failure, Some(report));
                }
            }
        }

        report(progress, network, ExecutionStage::Confirming);
        let last = completed[completed.len() - 1];
        ExecutionResult::succeeded(last, ExecutionPath::Eoa, network.explorer_tx_url(last))
            .with_batch(BatchReport {
                atomic: false,
                total,
                completed_hashes: completed,
                failed_index: None,
            })
    }
}

/// Result for a terminal EOA failure
///
/// `path_used` stays empty only when nothing reached the chain: a failed
/// dry-run on the first call of a request.
fn eoa_failure(
    network: &NetworkConfig,
    err: &OrchestrationError,
    failure: ExecutionFailure,
    batch: Option<BatchReport>,
) -> ExecutionResult {
    let last_completed = batch
        .as_ref()
        .and_then(|report| report.completed_hashes.last().copied());
    let tx_hash = err.tx_hash().or(last_completed);
    let reached_chain = tx_hash.is_some() || err.kind() != FailureKind::SimulationRevert;

    tracing::warn!(network = %network.id, kind = ?failure.kind, reason = %failure.message, "execution failed");

    let mut result = ExecutionResult::failed(failure);
    if reached_chain {
        result = result
            .on_path(ExecutionPath::Eoa, tx_hash)
            .with_explorer_url(tx_hash.and_then(|hash| network.explorer_tx_url(hash)));
    }
    match batch {
        Some(report) => result.with_batch(report),
        None => result,
    }
}

fn report(progress: Option<&ProgressFn<'_>>, network: &NetworkConfig, stage: ExecutionStage) {
    tracing::info!(stage = stage.as_str(), network = %network.id, "stage");
    if let Some(callback) = progress {
        callback(stage);
    }
}
