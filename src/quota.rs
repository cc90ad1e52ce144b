//! Gasless quota ledger
//!
//! Tracks estimated sponsored spend per calendar month (UTC) against a fixed
//! cap. `can_sponsor` is a cheap synchronous check made before an AA
//! attempt; `record` is only called after a sponsored execution succeeded.
//!
//! The check and the record are two separate critical sections. Concurrent
//! requests can therefore each pass the check and together overshoot the cap
//! by at most their combined estimates. That overshoot is accepted.

use crate::config::EngineConfig;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Persistent ledger state, one per user or installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRecord {
    /// Start of the current accumulation period
    pub period_start: DateTime<Utc>,
    pub estimated_usd_consumed: f64,
    pub cap: f64,
    /// Consumption broken down by path tag
    #[serde(default)]
    pub by_path: BTreeMap<String, f64>,
}

impl QuotaRecord {
    /// Empty record for the period containing `now`
    pub fn new(cap: f64, now: DateTime<Utc>) -> Self {
        Self {
            period_start: period_start(now),
            estimated_usd_consumed: 0.0,
            cap,
            by_path: BTreeMap::new(),
        }
    }

    /// Budget left in the current period
    pub fn remaining(&self) -> f64 {
        (self.cap - self.estimated_usd_consumed).max(0.0)
    }
}

/// First instant of the calendar month containing `now`
fn period_start(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|start| start.and_utc())
        .unwrap_or(now)
}

/// Sponsored-cost estimation policy
pub trait CostModel: Send + Sync {
    /// Estimated USD cost of sponsoring `calls` calls in one operation
    fn estimate_usd(&self, calls: usize) -> f64;
}

/// Flat per-call estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPerCall {
    pub usd_per_call: f64,
}

impl CostModel for FixedPerCall {
    fn estimate_usd(&self, calls: usize) -> f64 {
        self.usd_per_call * calls as f64
    }
}

/// Thread-safe sponsorship budget
pub struct QuotaLedger {
    record: Mutex<QuotaRecord>,
    cost_model: Box<dyn CostModel>,
}

impl std::fmt::Debug for QuotaLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaLedger")
            .field("record", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl QuotaLedger {
    /// Fresh ledger using the configured cap and per-call estimate
    pub fn new(config: &EngineConfig) -> Self {
        Self::from_record(QuotaRecord::new(config.quota_cap_usd, Utc::now()), config)
    }

    /// Restore a persisted ledger
    ///
    /// The record keeps its own cap and consumption; the per-call estimate
    /// comes from `config`.
    pub fn from_record(record: QuotaRecord, config: &EngineConfig) -> Self {
        Self {
            record: Mutex::new(record),
            cost_model: Box::new(FixedPerCall {
                usd_per_call: config.usd_per_call,
            }),
        }
    }

    /// Replace the cost estimation policy
    pub fn with_cost_model(mut self, model: impl CostModel + 'static) -> Self {
        self.cost_model = Box::new(model);
        self
    }

    fn lock(&self) -> MutexGuard<'_, QuotaRecord> {
        // The record is plain data; a panic elsewhere cannot leave it half-written
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self, now: DateTime<Utc>) -> MutexGuard<'_, QuotaRecord> {
        let mut record = self.lock();
        let start = period_start(now);
        if start > record.period_start {
            tracing::info!(
                consumed = record.estimated_usd_consumed,
                period = %start.format("%Y-%m"),
                "quota period rolled over"
            );
            *record = QuotaRecord::new(record.cap, now);
        }
        record
    }

    /// Estimated sponsored cost of `calls` calls
    pub fn estimate(&self, calls: usize) -> f64 {
        self.cost_model.estimate_usd(calls)
    }

    /// Whether `estimated_usd` still fits under the cap
    pub fn can_sponsor(&self, estimated_usd: f64) -> bool {
        self.can_sponsor_at(estimated_usd, Utc::now())
    }

    pub(crate) fn can_sponsor_at(&self, estimated_usd: f64, now: DateTime<Utc>) -> bool {
        let record = self.current(now);
        record.estimated_usd_consumed + estimated_usd <= record.cap
    }

    /// Book a successful sponsored execution
    pub fn record(&self, estimated_usd: f64, path_tag: &str) {
        self.record_at(estimated_usd, path_tag, Utc::now());
    }

    pub(crate) fn record_at(&self, estimated_usd: f64, path_tag: &str, now: DateTime<Utc>) {
        if !estimated_usd.is_finite() || estimated_usd <= 0.0 {
            tracing::warn!(estimated_usd, "ignoring non-positive quota record");
            return;
        }

        let mut record = self.current(now);
        record.estimated_usd_consumed += estimated_usd;
        *record.by_path.entry(path_tag.to_string()).or_default() += estimated_usd;

        tracing::debug!(
            estimated_usd,
            path = path_tag,
            consumed = record.estimated_usd_consumed,
            cap = record.cap,
            "sponsored usage recorded"
        );
    }

    /// Estimated spend in the current period
    pub fn consumed(&self) -> f64 {
        self.current(Utc::now()).estimated_usd_consumed
    }

    /// Budget left in the current period
    pub fn remaining(&self) -> f64 {
        self.current(Utc::now()).remaining()
    }

    /// Copy of the ledger state for persistence
    pub fn snapshot(&self) -> QuotaRecord {
        self.lock().clone()
    }
}
