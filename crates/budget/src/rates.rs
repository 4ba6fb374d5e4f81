//! Per-token cost rates for a model.
//!
//! Rates are wallet units per token. Input and output rates must be
//! strictly positive; an embedding rate, when configured, must be too.

use dialectic_core::{BudgetError, ModelConfig};
use serde::{Deserialize, Serialize};

/// Validated per-token rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRates {
    pub input: f64,
    pub output: f64,
    pub embedding: f64,
}

fn positive(model: &ModelConfig, name: &str, rate: f64) -> Result<f64, BudgetError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(BudgetError::MisconfiguredModel {
            model: model.api_identifier.clone(),
            reason: format!("{name} must be a positive number, got {rate}"),
        })
    }
}

impl CostRates {
    /// Read and validate the rates on a model config.
    pub fn from_model(model: &ModelConfig) -> Result<Self, BudgetError> {
        let input = positive(model, "input_token_cost_rate", model.input_token_cost_rate)?;
        let output = positive(model, "output_token_cost_rate", model.output_token_cost_rate)?;
        let embedding = match model.embedding_cost_rate {
            Some(rate) => positive(model, "embedding_cost_rate", rate)?,
            None => input,
        };
        Ok(Self {
            input,
            output,
            embedding,
        })
    }

    pub fn input_cost(&self, tokens: u64) -> f64 {
        tokens as f64 * self.input
    }

    pub fn output_cost(&self, tokens: u64) -> f64 {
        tokens as f64 * self.output
    }

    pub fn embedding_cost(&self, tokens: u64) -> f64 {
        tokens as f64 * self.embedding
    }
}
