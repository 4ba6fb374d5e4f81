//! The job executor.
//!
//! Runs one job end to end:
//!
//! 1. **Validate** the payload (identity, chunk target, wallet, rates)
//! 2. **Gather** declared inputs from the artifact stores
//! 3. **Preflight** the budget against a single balance read
//! 4. **Compress** the prompt if it exceeds the context window
//! 5. **Invoke** the model with the SSOT output cap
//! 6. **Classify** the response (complete, truncated, retry)
//! 7. **Persist** the chunk through the registrar
//! 8. **Schedule** the continuation, assembly or render follow-on
//!
//! Nothing is paid for and no model is called until steps 1-3 pass.

use std::sync::Arc;

use dialectic_budget::{BudgetPlanner, PreflightPlan, PromptSizing, require_wallet};
use dialectic_core::{
    ArtifactStore, ChunkTarget, ContributionUpload, DocumentAssembler, DocumentIdentity,
    FailedAttempt, Job, JobQueue, MemoryIndex, ModelConfig, ModelInvoker, ModelRequest,
    NO_PROMPT_ID, ObjectStorage, PathContext, PromptConstructionPayload, Registrar, Result,
    Summarizer, SummaryContext, TokenCounter, WalletService,
};
use serde::{Deserialize, Serialize};

use crate::context::{
    CompressionRun, CompressionStrategy, Compressor, ScoringRequest, TurnNormalizer, WorkingPrompt,
};
use crate::continuation::{ChunkPlan, ResponseVerdict, classify_response, continuation_payload};
use crate::followon::{FollowOnScheduler, RenderPayload};
use crate::gather::{ArtifactGatherer, merge_documents};
use crate::settings::EngineSettings;

/// Every collaborator the executor talks to.
#[derive(Clone)]
pub struct WorkerDeps {
    pub resources: Arc<dyn ArtifactStore>,
    pub contributions: Arc<dyn ArtifactStore>,
    pub feedback: Arc<dyn ArtifactStore>,
    pub storage: Arc<dyn ObjectStorage>,
    /// `None` when the hosting service has no wallet configured.
    pub wallet: Option<Arc<dyn WalletService>>,
    pub model: Arc<dyn ModelInvoker>,
    pub counter: Arc<dyn TokenCounter>,
    pub strategy: Arc<dyn CompressionStrategy>,
    pub summarizer: Arc<dyn Summarizer>,
    pub memory_index: Arc<dyn MemoryIndex>,
    pub registrar: Arc<dyn Registrar>,
    pub assembler: Arc<dyn DocumentAssembler>,
    pub queue: Arc<dyn JobQueue>,
}

/// How a job finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// A root document finished in one turn.
    Completed {
        contribution_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        render_job_id: Option<String>,
    },
    /// A chunk was saved and the next turn was queued.
    Continued {
        contribution_id: String,
        continuation_job_id: String,
        continuation_count: u32,
    },
    /// The final chunk of a chain was saved and assembly ran.
    Assembled {
        contribution_id: String,
        root_id: String,
    },
    /// Nothing was saved; the job was requeued.
    RetryScheduled { attempt: u32, reason: String },
}

/// Lowercase, path-safe form of a model identifier.
pub fn model_slug(api_identifier: &str) -> String {
    api_identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Everything known once validation and the preflight have passed.
struct Prepared<'a> {
    identity: DocumentIdentity,
    target: ChunkTarget,
    wallet_id: String,
    wallet: &'a dyn WalletService,
    planner: BudgetPlanner<'a>,
    working: WorkingPrompt,
    plan: PreflightPlan,
}

pub struct JobExecutor {
    deps: WorkerDeps,
    settings: EngineSettings,
    gatherer: ArtifactGatherer,
}

impl JobExecutor {
    pub fn new(deps: WorkerDeps, settings: EngineSettings) -> Self {
        let gatherer = ArtifactGatherer::new(
            deps.resources.clone(),
            deps.contributions.clone(),
            deps.feedback.clone(),
            deps.storage.clone(),
        );
        Self {
            deps,
            settings,
            gatherer,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Validate, gather and run the budget preflight without calling the
    /// model. Reads the wallet balance once.
    pub async fn preflight(
        &self,
        job: &Job,
        prompt: PromptConstructionPayload,
        model: &ModelConfig,
    ) -> Result<PreflightPlan> {
        Ok(self.prepare(job, prompt, model).await?.plan)
    }

    async fn prepare<'a>(
        &'a self,
        job: &'a Job,
        prompt: PromptConstructionPayload,
        model: &'a ModelConfig,
    ) -> Result<Prepared<'a>> {
        let payload = &job.payload;

        // ── Validate ──────────────────────────────────────────────────
        let identity = payload.identity()?;
        let target = payload.chunk_target()?;
        let (wallet_id, wallet) =
            require_wallet(payload.wallet_id.as_deref(), self.deps.wallet.as_deref())?;
        let planner = BudgetPlanner::new(model, self.settings.policy)?;

        // ── Gather ────────────────────────────────────────────────────
        let gathered = self
            .gatherer
            .gather(&identity, &payload.inputs_required)
            .await?;
        let mut prompt = prompt;
        prompt.resource_documents = merge_documents(prompt.resource_documents, gathered);

        // ── Preflight ─────────────────────────────────────────────────
        let working = WorkingPrompt::new(
            prompt,
            self.settings.history_tail_len,
            TurnNormalizer::new(self.settings.user_spacer.clone()),
        );
        let counter = self.deps.counter.as_ref();
        let current_tokens = counter.count(&working.sized());
        let embedding_tokens = counter.count_text(working.current_prompt())
            + working
                .documents()
                .iter()
                .map(|d| counter.count_text(&d.content))
                .sum::<u64>();

        let balance = wallet.get_balance(wallet_id).await?;
        let plan = planner.plan(
            balance,
            PromptSizing {
                current_tokens,
                embedding_tokens,
            },
        )?;

        Ok(Prepared {
            identity,
            target,
            wallet_id: wallet_id.to_string(),
            wallet,
            planner,
            working,
            plan,
        })
    }

    pub async fn execute(
        &self,
        job: &Job,
        prompt: PromptConstructionPayload,
        model: &ModelConfig,
    ) -> Result<JobOutcome> {
        let payload = &job.payload;
        tracing::info!(
            job_id = %job.id,
            model = %model.api_identifier,
            attempt = job.attempt_count,
            "Executing job"
        );

        let Prepared {
            identity,
            target,
            wallet_id,
            wallet,
            planner,
            mut working,
            plan,
        } = self.prepare(job, prompt, model).await?;
        let counter = self.deps.counter.as_ref();

        // ── Compress ──────────────────────────────────────────────────
        let headroom = if plan.oversized {
            let indexed = self
                .deps
                .memory_index
                .indexed_ids(&identity.session_id)
                .await?;
            let candidates = self
                .deps
                .strategy
                .candidates(&ScoringRequest {
                    history: working.history(),
                    window: working.window(),
                    documents: working.documents(),
                    current_prompt: working.current_prompt(),
                    relevance: &payload.inputs_relevance,
                    indexed: &indexed,
                })
                .await?;

            let compressor = Compressor {
                planner: &planner,
                counter,
                summarizer: self.deps.summarizer.as_ref(),
                wallet,
            };
            let run = CompressionRun {
                job_id: job.id.clone(),
                wallet_id: wallet_id.clone(),
                summary_context: SummaryContext {
                    job_id: job.id.clone(),
                    session_id: identity.session_id.clone(),
                    stage_slug: identity.stage_slug.clone(),
                },
            };
            compressor
                .compress(&mut working, candidates, plan.balance, &run)
                .await?
                .headroom
        } else {
            plan.headroom
        };

        // ── Invoke ────────────────────────────────────────────────────
        let request = ModelRequest {
            payload: working.sized(),
            max_tokens_to_generate: headroom.ssot_output_cap,
            wallet_id: wallet_id.clone(),
            provider_id: model.provider_id.clone(),
            prompt_id: NO_PROMPT_ID.into(),
        };
        tracing::debug!(
            job_id = %job.id,
            max_tokens = request.max_tokens_to_generate,
            messages = request.payload.messages.len(),
            documents = request.payload.resource_documents.len(),
            "Invoking model"
        );
        let response = match self.deps.model.invoke(&request).await {
            Ok(response) => response,
            Err(e) => {
                return self
                    .schedule_retry(job, format!("Model invocation failed: {e}"))
                    .await;
            }
        };

        // ── Classify ──────────────────────────────────────────────────
        let (body, truncated) =
            match classify_response(&response, payload.continue_until_complete) {
                ResponseVerdict::Complete(body) => (body, false),
                ResponseVerdict::Truncated(body) => (body, true),
                ResponseVerdict::Retry { reason } => {
                    return self.schedule_retry(job, reason).await;
                }
            };
        let chunk = ChunkPlan::new(&target, truncated, self.settings.max_continuations);

        // ── Persist ───────────────────────────────────────────────────
        let upload = ContributionUpload {
            path: PathContext {
                project_id: identity.project_id.clone(),
                session_id: identity.session_id.clone(),
                iteration_number: identity.iteration_number,
                stage_slug: identity.stage_slug.clone(),
                document_key: identity.document_key.clone(),
                model_slug: model_slug(&model.api_identifier),
                attempt_count: job.attempt_count,
                is_continuation: chunk.is_continuation,
                turn_index: chunk.turn_index,
                file_extension: body.format.extension().into(),
            },
            content: body.content,
            mime_type: body.format.mime_type().into(),
            model_id: identity.model_id.clone(),
            tokens_in: response.input_tokens,
            tokens_out: response.output_tokens,
            target_contribution_id: chunk.supersedes.clone(),
            document_relationships: payload.document_relationships.clone(),
            is_intermediate: payload.is_intermediate,
        };
        let saved = self.deps.registrar.upload_and_register(upload).await?;

        let mut relationships = payload.document_relationships.clone();
        let root_id = match &chunk.root_id {
            Some(root_id) => root_id.clone(),
            None => {
                relationships.insert(identity.stage_slug.clone(), saved.id.clone());
                self.deps
                    .registrar
                    .set_document_relationships(&saved.id, &relationships)
                    .await?;
                saved.id.clone()
            }
        };

        // ── Schedule ──────────────────────────────────────────────────
        let scheduler = FollowOnScheduler::new(self.deps.queue.as_ref());

        if chunk.schedule_continuation {
            let next_count = target.continuation_count() + 1;
            let next = continuation_payload(payload, &saved.id, next_count, relationships);
            let continuation_job_id = scheduler
                .schedule_continuation(&next, job.parent_job_id.as_deref())
                .await?;
            return Ok(JobOutcome::Continued {
                contribution_id: saved.id,
                continuation_job_id,
                continuation_count: next_count,
            });
        }

        if chunk.assemble {
            self.deps.assembler.assemble(&root_id).await?;
            tracing::info!(job_id = %job.id, root_id = %root_id, "Assembled final document");
            return Ok(JobOutcome::Assembled {
                contribution_id: saved.id,
                root_id,
            });
        }

        let render_job_id = match identity.document_key.as_deref() {
            Some(document_key) if payload.output_type.is_document() => {
                let render = RenderPayload::new(&identity, document_key, &root_id);
                Some(scheduler.schedule_render(&render, &job.id).await?)
            }
            _ => None,
        };

        tracing::info!(job_id = %job.id, contribution_id = %saved.id, "Job completed");
        Ok(JobOutcome::Completed {
            contribution_id: saved.id,
            render_job_id,
        })
    }

    async fn schedule_retry(&self, job: &Job, reason: String) -> Result<JobOutcome> {
        let attempt = job.attempt_count + 1;
        tracing::warn!(
            job_id = %job.id,
            attempt,
            max_retries = job.max_retries,
            reason = %reason,
            "Scheduling retry"
        );
        self.deps
            .queue
            .retry(
                job,
                attempt,
                vec![FailedAttempt {
                    model_id: job.payload.model_id.clone(),
                    error: reason.clone(),
                }],
            )
            .await?;
        Ok(JobOutcome::RetryScheduled { attempt, reason })
    }
}
