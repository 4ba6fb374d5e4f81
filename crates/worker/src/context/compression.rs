//! The compression loop.
//!
//! Summarizes candidates cheapest-first until the prompt fits both the
//! context window and the headroom left by the output cap. The wallet
//! balance is threaded through each step as a value: every paid summary
//! reduces it locally, which can shrink the output cap on the next fit
//! check.

use std::collections::VecDeque;

use dialectic_budget::{BudgetPlanner, Headroom, rag_idempotency_key};
use dialectic_core::{
    CompressionCandidate, ContextWindowError, ContextWindowReason, CoreError, DebitRequest,
    Summarizer, SummaryContext, TokenCounter, WalletService,
};

use crate::context::scoring::order_candidates;
use crate::context::working::WorkingPrompt;

pub const RAG_ENTITY_TYPE: &str = "rag_compression";

/// Who pays and on whose behalf.
#[derive(Debug, Clone)]
pub struct CompressionRun {
    pub job_id: String,
    pub wallet_id: String,
    pub summary_context: SummaryContext,
}

/// State after a successful compression.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutcome {
    pub balance: f64,
    pub tokens: u64,
    pub headroom: Headroom,
    pub summarized: Vec<String>,
}

pub struct Compressor<'a> {
    pub planner: &'a BudgetPlanner<'a>,
    pub counter: &'a dyn TokenCounter,
    pub summarizer: &'a dyn Summarizer,
    pub wallet: &'a dyn WalletService,
}

impl Compressor<'_> {
    pub async fn compress(
        &self,
        prompt: &mut WorkingPrompt,
        candidates: Vec<CompressionCandidate>,
        balance: f64,
        run: &CompressionRun,
    ) -> Result<CompressionOutcome, CoreError> {
        let mut queue: VecDeque<_> = order_candidates(candidates).into();
        let mut balance = balance;
        let mut tokens = self.counter.count(&prompt.sized());
        let mut summarized = Vec::new();

        tracing::info!(
            job_id = %run.job_id,
            tokens,
            target = self.planner.target_tokens(),
            candidates = queue.len(),
            "Compressing oversized prompt"
        );

        while let Some(candidate) = queue.pop_front() {
            let candidate_tokens = self.counter.count_text(&candidate.content);
            let estimate =
                self.planner
                    .compression_step_estimate(candidate_tokens, tokens, balance);
            self.planner.check_affordability(&estimate, balance)?;

            let summary = self
                .summarizer
                .summarize(&candidate, &run.summary_context)
                .await?;

            if summary.tokens_used > 0 {
                let amount = self.planner.rates().input_cost(summary.tokens_used);
                self.wallet
                    .debit(DebitRequest {
                        wallet_id: run.wallet_id.clone(),
                        amount,
                        idempotency_key: rag_idempotency_key(&run.job_id, &candidate.id),
                        related_entity_id: candidate.id.clone(),
                        related_entity_type: RAG_ENTITY_TYPE.into(),
                        notes: format!("RAG compression for job {}", run.job_id),
                    })
                    .await?;
                balance -= amount;
            }

            prompt.apply_summary(&candidate, summary.content);
            tokens = self.counter.count(&prompt.sized());
            summarized.push(candidate.id.clone());

            let fit = self.planner.fit(tokens, balance);
            tracing::debug!(
                job_id = %run.job_id,
                candidate_id = %candidate.id,
                tokens,
                balance,
                tokens_used = summary.tokens_used,
                allowed_input = fit.headroom.allowed_input,
                "Summarized compression candidate"
            );

            if fit.fits {
                tracing::info!(
                    job_id = %run.job_id,
                    tokens,
                    balance,
                    summarized = summarized.len(),
                    "Prompt fits after compression"
                );
                return Ok(CompressionOutcome {
                    balance,
                    tokens,
                    headroom: fit.headroom,
                    summarized,
                });
            }
        }

        let limit = self
            .planner
            .fit(tokens, balance)
            .headroom
            .allowed_input
            .min(self.planner.target_tokens());
        tracing::warn!(
            job_id = %run.job_id,
            tokens,
            limit,
            "Compression could not reduce the prompt enough"
        );
        Err(ContextWindowError {
            tokens,
            limit,
            reason: ContextWindowReason::CompressionExhausted,
        }
        .into())
    }
}
