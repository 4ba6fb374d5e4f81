//! Preflight planning: output cap, input headroom and affordability.

use dialectic_core::{
    BudgetError, ContextWindowError, ContextWindowReason, CoreError, ModelConfig,
};
use serde::{Deserialize, Serialize};

use crate::BudgetPolicy;
use crate::rates::CostRates;

/// Projected spend for an operation, in wallet units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpendEstimate {
    pub compression: f64,
    pub embedding: f64,
    pub final_input: f64,
    pub planned_output: f64,
}

impl SpendEstimate {
    /// Everything spent before generation starts.
    pub fn input_side(&self) -> f64 {
        self.compression + self.embedding + self.final_input
    }

    pub fn total(&self) -> f64 {
        self.input_side() + self.planned_output
    }
}

/// Output cap and the input room it leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headroom {
    pub ssot_output_cap: u64,
    pub allowed_input: u64,
}

/// How large the prompt is before any compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSizing {
    /// Tokens in the full payload.
    pub current_tokens: u64,
    /// Tokens that relevance scoring would embed (prompt plus documents).
    pub embedding_tokens: u64,
}

/// The result of a passing preflight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightPlan {
    pub balance: f64,
    pub rates: CostRates,
    pub current_tokens: u64,
    pub target_tokens: u64,
    pub oversized: bool,
    pub headroom: Headroom,
    pub estimate: SpendEstimate,
}

/// Result of re-sizing after a compression step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitCheck {
    pub fits: bool,
    pub headroom: Headroom,
}

/// Budget arithmetic for one model under one policy.
#[derive(Debug, Clone)]
pub struct BudgetPlanner<'a> {
    model: &'a ModelConfig,
    rates: CostRates,
    policy: BudgetPolicy,
}

impl<'a> BudgetPlanner<'a> {
    /// Fails with a misconfigured-model error when the rates are unusable.
    pub fn new(model: &'a ModelConfig, policy: BudgetPolicy) -> Result<Self, BudgetError> {
        Ok(Self {
            model,
            rates: CostRates::from_model(model)?,
            policy,
        })
    }

    pub fn rates(&self) -> CostRates {
        self.rates
    }

    pub fn policy(&self) -> BudgetPolicy {
        self.policy
    }

    /// The size compression aims for.
    pub fn target_tokens(&self) -> u64 {
        self.model.context_window_tokens
    }

    /// Cost of sending `tokens` of prompt, never more than the window.
    pub fn final_input_cost(&self, tokens: u64) -> f64 {
        self.rates.input_cost(tokens.min(self.target_tokens()))
    }

    /// The single source of truth for `max_tokens_to_generate`.
    pub fn ssot_output_cap(&self, balance: f64, input_side: f64) -> u64 {
        let spendable = (self.policy.rationality_threshold * balance).min(balance - input_side);
        let cap = (spendable / self.rates.output).floor();
        let cap = if cap.is_finite() && cap > 0.0 {
            cap as u64
        } else {
            0
        };
        match self.model.provider_max_output_tokens {
            Some(max) => cap.min(max),
            None => cap,
        }
    }

    pub fn allowed_input(&self, ssot_output_cap: u64) -> u64 {
        let limit = self
            .model
            .provider_max_input_tokens
            .unwrap_or(self.model.context_window_tokens);
        limit.saturating_sub(ssot_output_cap.saturating_add(self.policy.safety_buffer_tokens))
    }

    pub fn headroom(&self, balance: f64, input_side: f64) -> Headroom {
        let ssot_output_cap = self.ssot_output_cap(balance, input_side);
        Headroom {
            ssot_output_cap,
            allowed_input: self.allowed_input(ssot_output_cap),
        }
    }

    /// NSF first, then the rationality threshold on pre-generation spend.
    pub fn check_affordability(
        &self,
        estimate: &SpendEstimate,
        balance: f64,
    ) -> Result<(), BudgetError> {
        let total = estimate.total();
        if total > balance {
            return Err(BudgetError::InsufficientFunds {
                required: total,
                balance,
            });
        }

        let input_side = estimate.input_side();
        if input_side > self.policy.rationality_threshold * balance {
            return Err(BudgetError::RationalityThreshold {
                estimated: input_side,
                balance,
                percent: self.policy.threshold_percent(),
            });
        }

        Ok(())
    }

    /// Run the full preflight for a prompt at `balance`.
    pub fn plan(&self, balance: f64, sizing: PromptSizing) -> Result<PreflightPlan, CoreError> {
        let current = sizing.current_tokens;
        let target = self.target_tokens();
        let oversized = current > target;

        let mut estimate = SpendEstimate {
            final_input: self.final_input_cost(current),
            ..SpendEstimate::default()
        };
        if oversized {
            estimate.compression = self.rates.input_cost(current - target);
            estimate.embedding = self.rates.embedding_cost(sizing.embedding_tokens);
        }

        let headroom = self.headroom(balance, estimate.input_side());
        estimate.planned_output = self.rates.output_cost(headroom.ssot_output_cap);

        tracing::debug!(
            tokens = current,
            target,
            oversized,
            balance,
            ssot_output_cap = headroom.ssot_output_cap,
            allowed_input = headroom.allowed_input,
            "Budget preflight"
        );

        if !oversized && current > headroom.allowed_input {
            return Err(ContextWindowError {
                tokens: current,
                limit: headroom.allowed_input,
                reason: ContextWindowReason::ExceedsHeadroom,
            }
            .into());
        }

        self.check_affordability(&estimate, balance)?;

        Ok(PreflightPlan {
            balance,
            rates: self.rates,
            current_tokens: current,
            target_tokens: target,
            oversized,
            headroom,
            estimate,
        })
    }

    /// Spend projected for summarizing one candidate while the prompt is at `current_tokens`.
    pub fn compression_step_estimate(
        &self,
        candidate_tokens: u64,
        current_tokens: u64,
        balance: f64,
    ) -> SpendEstimate {
        let mut estimate = SpendEstimate {
            compression: self.rates.input_cost(candidate_tokens),
            final_input: self.final_input_cost(current_tokens),
            ..SpendEstimate::default()
        };
        let cap = self.ssot_output_cap(balance, estimate.input_side());
        estimate.planned_output = self.rates.output_cost(cap);
        estimate
    }

    /// Whether a (compressed) prompt now fits both the window and the
    /// headroom left by the output cap at the current balance.
    pub fn fit(&self, tokens: u64, balance: f64) -> FitCheck {
        let headroom = self.headroom(balance, self.final_input_cost(tokens));
        FitCheck {
            fits: tokens <= self.target_tokens() && tokens <= headroom.allowed_input,
            headroom,
        }
    }
}
