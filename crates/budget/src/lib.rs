//! # Dialectic Budget
//!
//! Affordability rules for generation jobs:
//! - validated per-token [`CostRates`]
//! - the SSOT output cap and input headroom
//! - NSF and rationality-threshold checks over the whole operation
//! - idempotency keys for compression debits

pub mod planner;
pub mod rates;

pub use planner::{
    BudgetPlanner, FitCheck, Headroom, PreflightPlan, PromptSizing, SpendEstimate,
};
pub use rates::CostRates;

use dialectic_core::BudgetError;
use serde::{Deserialize, Serialize};

/// Spend limits applied to every job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetPolicy {
    /// Share of the balance a job may commit before generation.
    pub rationality_threshold: f64,
    pub safety_buffer_tokens: u64,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            rationality_threshold: 0.8,
            safety_buffer_tokens: 32,
        }
    }
}

impl BudgetPolicy {
    pub fn threshold_percent(&self) -> u32 {
        (self.rationality_threshold * 100.0).round() as u32
    }
}

/// Both the wallet id and a wallet service are needed before any paid work.
pub fn require_wallet<'a, W: ?Sized>(
    wallet_id: Option<&'a str>,
    service: Option<&'a W>,
) -> Result<(&'a str, &'a W), BudgetError> {
    match (wallet_id.map(str::trim), service) {
        (Some(id), Some(service)) if !id.is_empty() => Ok((id, service)),
        _ => Err(BudgetError::WalletRequired),
    }
}

/// Debit key for summarizing `candidate_id` within `job_id`.
///
/// Deterministic so a retried job never pays twice for the same summary.
pub fn rag_idempotency_key(job_id: &str, candidate_id: &str) -> String {
    format!("rag:{job_id}:{candidate_id}")
}
