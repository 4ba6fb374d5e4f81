//! End-to-end tests for the job executor.
//!
//! Every collaborator is an in-memory double from `dialectic-memory`, so the
//! tests assert on what was queried, debited, uploaded, registered and
//! enqueued as well as on the returned outcome.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dialectic_core::{
    BudgetError, CompressionCandidate, ContextWindowReason, Contribution, CoreError,
    FinishReason, InputDescriptor, InputKind, Job, JobPayload, JobType, Message, ModelConfig,
    ModelResponse, OutputType, PersistError, PromptConstructionPayload, ResourceDocument,
    SourceType, StoreKind, StoredArtifact, ValidationError, WalletService,
};
use dialectic_memory::{
    ArtifactRecord, CanonicalPathNamer, HashingEmbedder, InMemoryArtifactStore,
    InMemoryContributionRegistry, InMemoryJobQueue, InMemoryMemoryIndex, InMemoryObjectStorage,
    InMemoryWallet, RecordingAssembler, ScriptedModel, ScriptedSummarizer,
};
use dialectic_worker::context::ScoringRequest;
use dialectic_worker::{
    CharEstimateCounter, CompressionStrategy, EngineSettings, JobExecutor, JobOutcome,
    SimilarityStrategy, StorageRegistrar, WorkerDeps,
};
use serde_json::json;

// ── Harness ──────────────────────────────────────────────────────────────

/// Returns a fixed candidate list, unsorted.
struct FixedStrategy(Vec<CompressionCandidate>);

#[async_trait]
impl CompressionStrategy for FixedStrategy {
    async fn candidates(
        &self,
        _request: &ScoringRequest<'_>,
    ) -> Result<Vec<CompressionCandidate>, CoreError> {
        Ok(self.0.clone())
    }
}

struct Harness {
    resources: Arc<InMemoryArtifactStore>,
    contributions: Arc<InMemoryArtifactStore>,
    feedback: Arc<InMemoryArtifactStore>,
    storage: Arc<InMemoryObjectStorage>,
    wallet: Arc<InMemoryWallet>,
    model: Arc<ScriptedModel>,
    summarizer: Arc<ScriptedSummarizer>,
    registry: Arc<InMemoryContributionRegistry>,
    assembler: Arc<RecordingAssembler>,
    queue: Arc<InMemoryJobQueue>,
    strategy: Arc<dyn CompressionStrategy>,
    chars_per_token: usize,
    with_wallet: bool,
}

impl Harness {
    fn new(balance: f64, responses: Vec<ModelResponse>) -> Self {
        Self {
            resources: Arc::new(InMemoryArtifactStore::new(StoreKind::Resources)),
            contributions: Arc::new(InMemoryArtifactStore::new(StoreKind::Contributions)),
            feedback: Arc::new(InMemoryArtifactStore::new(StoreKind::Feedback)),
            storage: Arc::new(InMemoryObjectStorage::new()),
            wallet: Arc::new(InMemoryWallet::with_balance("wallet-1", balance)),
            model: Arc::new(ScriptedModel::new(responses)),
            summarizer: Arc::new(ScriptedSummarizer::new(10)),
            registry: Arc::new(InMemoryContributionRegistry::new()),
            assembler: Arc::new(RecordingAssembler::new()),
            queue: Arc::new(InMemoryJobQueue::new()),
            strategy: Arc::new(SimilarityStrategy::new(Arc::new(HashingEmbedder::default()))),
            chars_per_token: 4,
            with_wallet: true,
        }
    }

    fn executor(&self) -> JobExecutor {
        let registrar = StorageRegistrar::new(
            self.storage.clone(),
            self.registry.clone(),
            Arc::new(CanonicalPathNamer),
        );
        let deps = WorkerDeps {
            resources: self.resources.clone(),
            contributions: self.contributions.clone(),
            feedback: self.feedback.clone(),
            storage: self.storage.clone(),
            wallet: self
                .with_wallet
                .then(|| self.wallet.clone() as Arc<dyn WalletService>),
            model: self.model.clone(),
            counter: Arc::new(CharEstimateCounter::new(self.chars_per_token)),
            strategy: self.strategy.clone(),
            summarizer: self.summarizer.clone(),
            memory_index: Arc::new(InMemoryMemoryIndex::new()),
            registrar: Arc::new(registrar),
            assembler: self.assembler.clone(),
            queue: self.queue.clone(),
        };
        JobExecutor::new(deps, EngineSettings::default())
    }

    async fn run(
        &self,
        job: &Job,
        prompt: PromptConstructionPayload,
        model: &ModelConfig,
    ) -> Result<JobOutcome, CoreError> {
        self.executor().execute(job, prompt, model).await
    }

    async fn seed_input(
        &self,
        store: &InMemoryArtifactStore,
        project: Option<&str>,
        key: &str,
        stage: &str,
        body: &str,
    ) {
        let file_name = format!("{key}.md");
        store
            .insert(ArtifactRecord {
                project_id: project.map(Into::into),
                session_id: "session-1".into(),
                iteration_number: 1,
                artifact: StoredArtifact {
                    id: format!("{key}-id"),
                    storage_bucket: "inputs".into(),
                    storage_path: format!("project-1/{stage}"),
                    file_name: file_name.clone(),
                    document_key: Some(key.into()),
                    stage_slug: Some(stage.into()),
                },
            })
            .await;
        self.storage
            .put("inputs", &format!("project-1/{stage}/{file_name}"), body)
            .await;
    }
}

// window 10k, input 1.0, output 2.0: a small prompt at balance 1000 gets SSOT 400.
fn model_config() -> ModelConfig {
    ModelConfig {
        api_identifier: "openai/gpt-4o".into(),
        provider_id: "provider-1".into(),
        context_window_tokens: 10_000,
        provider_max_input_tokens: None,
        provider_max_output_tokens: None,
        input_token_cost_rate: 1.0,
        output_token_cost_rate: 2.0,
        embedding_cost_rate: None,
    }
}

fn payload() -> JobPayload {
    JobPayload {
        model_id: "model-1".into(),
        wallet_id: Some("wallet-1".into()),
        project_id: Some("project-1".into()),
        session_id: Some("session-1".into()),
        iteration_number: 1,
        stage_slug: Some("thesis".into()),
        document_key: Some("business_case".into()),
        ..JobPayload::default()
    }
}

fn continuation(count: Option<serde_json::Value>, parent: &str) -> JobPayload {
    JobPayload {
        target_contribution_id: Some(parent.into()),
        continuation_count: count,
        continue_until_complete: true,
        document_relationships: BTreeMap::from([("thesis".to_string(), "root-1".to_string())]),
        ..payload()
    }
}

fn job(payload: JobPayload) -> Job {
    Job {
        id: "job-1".into(),
        parent_job_id: Some("parent-job".into()),
        attempt_count: 0,
        max_retries: 3,
        payload,
    }
}

fn prompt(text: &str) -> PromptConstructionPayload {
    PromptConstructionPayload {
        current_user_prompt: text.into(),
        ..PromptConstructionPayload::default()
    }
}

fn reply(content: &str, finish: FinishReason) -> ModelResponse {
    ModelResponse {
        content: content.into(),
        finish_reason: Some(finish),
        content_type: None,
        input_tokens: 10,
        output_tokens: 20,
    }
}

fn existing(id: &str) -> Contribution {
    Contribution {
        id: id.into(),
        session_id: "session-1".into(),
        stage_slug: "thesis".into(),
        iteration_number: 1,
        document_key: Some("business_case".into()),
        storage_bucket: "dialectic-contributions".into(),
        storage_path: "project-1/thesis".into(),
        file_name: format!("{id}.md"),
        mime_type: "text/markdown".into(),
        is_latest_edit: true,
        target_contribution_id: None,
        document_relationships: BTreeMap::new(),
    }
}

fn doc_candidate(id: &str, index: usize, score: f64, content: &str) -> CompressionCandidate {
    CompressionCandidate {
        id: id.into(),
        content: content.into(),
        source_type: SourceType::Document,
        original_index: index,
        value_score: score,
        effective_score: score,
    }
}

// ── Root documents ───────────────────────────────────────────────────────

#[tokio::test]
async fn root_document_is_saved_and_rendered() {
    let h = Harness::new(1000.0, vec![reply("# Business case", FinishReason::Stop)]);
    let outcome = h
        .run(&job(payload()), prompt("Write the business case."), &model_config())
        .await
        .unwrap();

    let JobOutcome::Completed {
        contribution_id,
        render_job_id,
    } = outcome
    else {
        panic!("expected completion");
    };

    let renders = h.queue.enqueued_of(JobType::Render).await;
    assert_eq!(renders.len(), 1);
    assert_eq!(render_job_id.as_deref(), Some(renders[0].id.as_str()));
    assert_eq!(renders[0].parent_job_id.as_deref(), Some("job-1"));
    assert_eq!(renders[0].payload["document_identity"], json!(contribution_id));
    assert_eq!(renders[0].payload["document_key"], "business_case");

    // A root records itself as the chain root for its stage.
    let updates = h.registry.relationship_updates().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.get("thesis"), Some(&contribution_id));

    let saved = h.registry.get(&contribution_id).await.unwrap();
    assert!(saved.is_latest_edit);
    assert_eq!(saved.mime_type, "text/markdown");
    assert!(h.queue.enqueued_of(JobType::Continuation).await.is_empty());
}

#[tokio::test]
async fn ssot_cap_is_sent_as_max_tokens() {
    let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.run(&job(payload()), prompt("Write the business case."), &model_config())
        .await
        .unwrap();

    let requests = h.model.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].max_tokens_to_generate, 400);
    assert_eq!(requests[0].prompt_id, "__none__");
    assert_eq!(requests[0].wallet_id, "wallet-1");
    assert_eq!(h.wallet.balance_reads(), 1);
}

#[tokio::test]
async fn non_document_output_is_not_rendered() {
    let h = Harness::new(1000.0, vec![reply("context", FinishReason::Stop)]);
    let p = JobPayload {
        output_type: OutputType::HeaderContext,
        document_key: None,
        ..payload()
    };
    let outcome = h.run(&job(p), prompt("Plan."), &model_config()).await.unwrap();

    assert!(matches!(
        outcome,
        JobOutcome::Completed {
            render_job_id: None,
            ..
        }
    ));
    assert!(h.queue.enqueued().await.is_empty());
}

#[tokio::test]
async fn resource_documents_never_become_messages() {
    let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.seed_input(&h.resources, Some("project-1"), "spec", "thesis", "gathered spec body")
        .await;

    let p = JobPayload {
        inputs_required: vec![InputDescriptor {
            kind: InputKind::Document,
            document_key: "spec".into(),
            slug: None,
            required: true,
        }],
        ..payload()
    };
    let mut pr = prompt("Write it.");
    pr.resource_documents = vec![ResourceDocument::new("given", "given document body")];
    pr.conversation_history = vec![
        Message::user("first"),
        Message::assistant("reply"),
    ];
    h.run(&job(p), pr, &model_config()).await.unwrap();

    let request = &h.model.requests().await[0];
    let docs: Vec<&str> = request
        .payload
        .resource_documents
        .iter()
        .map(|d| d.content.as_str())
        .collect();
    assert_eq!(docs, vec!["given document body", "gathered spec body"]);
    assert!(
        request
            .payload
            .messages
            .iter()
            .all(|m| !m.content.contains("document body") && !m.content.contains("spec body"))
    );
    assert_eq!(request.payload.message, "Write it.");
}

// ── Validation ───────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_continuation_counts_fail_before_any_work() {
    for count in [Some(json!(0)), Some(json!(-1)), None, Some(json!("two")), Some(json!(1.5))] {
        let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
        let err = h
            .run(&job(continuation(count.clone(), "parent-1")), prompt("Go."), &model_config())
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                CoreError::Validation(ValidationError::InvalidContinuationCount { .. })
            ),
            "count {count:?} gave {err:?}"
        );
        assert!(h.model.requests().await.is_empty());
        assert!(h.storage.uploads().await.is_empty());
        assert_eq!(h.wallet.balance_reads(), 0);
    }
}

#[tokio::test]
async fn continuation_without_chain_root_is_rejected() {
    let h = Harness::new(1000.0, vec![]);
    let mut p = continuation(Some(json!(1)), "parent-1");
    p.document_relationships.clear();
    let err = h.run(&job(p), prompt("Go."), &model_config()).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::MissingChainRoot { .. })
    ));
}

#[tokio::test]
async fn missing_wallet_blocks_model_call() {
    let mut h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.with_wallet = false;
    let err = h
        .run(&job(payload()), prompt("Go."), &model_config())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Budget(BudgetError::WalletRequired)));

    let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    let p = JobPayload {
        wallet_id: None,
        ..payload()
    };
    let err = h.run(&job(p), prompt("Go."), &model_config()).await.unwrap_err();
    assert!(matches!(err, CoreError::Budget(BudgetError::WalletRequired)));
    assert!(h.model.requests().await.is_empty());
}

#[tokio::test]
async fn misconfigured_rates_block_model_call() {
    let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    let mut model = model_config();
    model.output_token_cost_rate = 0.0;
    let err = h.run(&job(payload()), prompt("Go."), &model).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Budget(BudgetError::MisconfiguredModel { .. })
    ));
    assert!(h.model.requests().await.is_empty());
}

// ── Budget preflight ─────────────────────────────────────────────────────

#[tokio::test]
async fn insufficient_funds_blocks_model_call() {
    // "Write the business case." is 24 chars: 6 tokens + 4 overhead = 10.
    let h = Harness::new(5.0, vec![reply("ok", FinishReason::Stop)]);
    let err = h
        .run(&job(payload()), prompt("Write the business case."), &model_config())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Budget(BudgetError::InsufficientFunds { .. })
    ));
    assert!(h.model.requests().await.is_empty());
    assert!(h.wallet.debits().await.is_empty());
}

#[tokio::test]
async fn rationality_threshold_blocks_model_call() {
    // input 10 fits the balance of 12 but exceeds 80% of it (9.6).
    let h = Harness::new(12.0, vec![reply("ok", FinishReason::Stop)]);
    let err = h
        .run(&job(payload()), prompt("Write the business case."), &model_config())
        .await
        .unwrap_err();
    match err {
        CoreError::Budget(BudgetError::RationalityThreshold { percent, .. }) => {
            assert_eq!(percent, 80);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.model.requests().await.is_empty());
}

#[tokio::test]
async fn headroom_boundary_is_inclusive() {
    // Provider input max 600, SSOT 400, buffer 32: allowed input is 168.
    let mut model = model_config();
    model.provider_max_input_tokens = Some(600);

    // One char per token: 164 chars + 4 overhead = 168 tokens.
    let mut h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.chars_per_token = 1;
    h.run(&job(payload()), prompt(&"x".repeat(164)), &model)
        .await
        .unwrap();
    assert_eq!(h.model.requests().await[0].max_tokens_to_generate, 400);

    let mut h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.chars_per_token = 1;
    let err = h
        .run(&job(payload()), prompt(&"x".repeat(165)), &model)
        .await
        .unwrap_err();
    match err {
        CoreError::ContextWindow(e) => {
            assert_eq!(e.reason, ContextWindowReason::ExceedsHeadroom);
            assert_eq!(e.tokens, 169);
            assert_eq!(e.limit, 168);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.model.requests().await.is_empty());
}

#[tokio::test]
async fn preflight_plans_without_calling_the_model() {
    let h = Harness::new(1000.0, vec![]);
    let plan = h
        .executor()
        .preflight(&job(payload()), prompt("Write the business case."), &model_config())
        .await
        .unwrap();

    assert!(!plan.oversized);
    assert_eq!(plan.current_tokens, 10);
    assert_eq!(plan.headroom.ssot_output_cap, 400);
    assert_eq!(plan.estimate.planned_output, 800.0);
    assert!(h.model.requests().await.is_empty());
    assert_eq!(h.wallet.balance_reads(), 1);
}

// ── Compression ──────────────────────────────────────────────────────────

// Window 110, output capped at 20, buffer 32: allowed input is 58.
fn small_window() -> ModelConfig {
    ModelConfig {
        context_window_tokens: 110,
        provider_max_output_tokens: Some(20),
        input_token_cost_rate: 0.01,
        output_token_cost_rate: 0.01,
        ..model_config()
    }
}

#[tokio::test]
async fn compression_runs_in_ascending_score_order_with_keyed_debits() {
    let body = "y".repeat(100);
    let mut h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.chars_per_token = 1;
    h.summarizer = Arc::new(ScriptedSummarizer::new(10).with_tokens("b", 0));
    h.strategy = Arc::new(FixedStrategy(vec![
        doc_candidate("a", 0, 0.3, &body),
        doc_candidate("b", 1, 0.1, &body),
        doc_candidate("c", 2, 0.2, &body),
    ]));

    let mut pr = prompt("go");
    pr.resource_documents = ["a", "b", "c"]
        .iter()
        .map(|id| ResourceDocument::new(*id, body.clone()))
        .collect();

    // 6 + 3 * 104 = 318 tokens; after three summaries 6 + 3 * 15 = 51.
    h.run(&job(payload()), pr, &small_window()).await.unwrap();

    let scores: Vec<f64> = h
        .summarizer
        .calls()
        .await
        .iter()
        .map(|c| c.effective_score)
        .collect();
    assert_eq!(scores, vec![0.1, 0.2, 0.3]);

    let keys: Vec<String> = h
        .wallet
        .debits()
        .await
        .into_iter()
        .map(|d| d.idempotency_key)
        .collect();
    assert_eq!(keys, vec!["rag:job-1:c", "rag:job-1:a"]);

    let request = &h.model.requests().await[0];
    assert_eq!(request.max_tokens_to_generate, 20);
    assert!(
        request
            .payload
            .resource_documents
            .iter()
            .all(|d| d.content.starts_with("[summary:"))
    );
    assert_eq!(h.wallet.balance_reads(), 1);
}

#[tokio::test]
async fn compression_that_cannot_fit_never_calls_the_model() {
    let mut h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.chars_per_token = 1;

    // The prompt alone is over the window and is never a candidate.
    let mut pr = prompt(&"p".repeat(200));
    pr.resource_documents = vec![ResourceDocument::new("doc", "d".repeat(100))];
    let err = h.run(&job(payload()), pr, &small_window()).await.unwrap_err();

    match err {
        CoreError::ContextWindow(e) => {
            assert_eq!(e.reason, ContextWindowReason::CompressionExhausted)
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.summarizer.calls().await.len(), 1);
    assert!(h.model.requests().await.is_empty());
    assert!(h.storage.uploads().await.is_empty());
}

// ── Response handling ────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_json_schedules_exactly_one_retry() {
    let mut response = reply("{\"content\": \"unterminated", FinishReason::Stop);
    response.content_type = Some("application/json".into());
    let h = Harness::new(1000.0, vec![response]);

    let outcome = h
        .run(&job(payload()), prompt("Go."), &model_config())
        .await
        .unwrap();

    match outcome {
        JobOutcome::RetryScheduled { attempt, reason } => {
            assert_eq!(attempt, 1);
            assert!(reason.contains("Malformed JSON"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let retries = h.queue.retries().await;
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].attempt_count, 1);
    assert_eq!(retries[0].failures[0].model_id, "model-1");
    assert!(h.storage.uploads().await.is_empty());
    assert!(h.registry.records().await.is_empty());
}

#[tokio::test]
async fn provider_failure_schedules_retry() {
    let h = Harness::new(1000.0, vec![]);
    h.model.push_error("upstream 503").await;
    let outcome = h
        .run(&job(payload()), prompt("Go."), &model_config())
        .await
        .unwrap();
    match outcome {
        JobOutcome::RetryScheduled { reason, .. } => {
            assert!(reason.starts_with("Model invocation failed"))
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(h.storage.uploads().await.is_empty());
}

// ── Continuations ────────────────────────────────────────────────────────

#[tokio::test]
async fn truncated_root_starts_a_chain() {
    let h = Harness::new(1000.0, vec![reply("part one", FinishReason::Length)]);
    let p = JobPayload {
        continue_until_complete: true,
        ..payload()
    };
    let outcome = h.run(&job(p), prompt("Go."), &model_config()).await.unwrap();

    let JobOutcome::Continued {
        contribution_id,
        continuation_job_id,
        continuation_count,
    } = outcome
    else {
        panic!("expected continuation");
    };
    assert_eq!(continuation_count, 1);

    let queued = h.queue.enqueued_of(JobType::Continuation).await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, continuation_job_id);
    assert_eq!(queued[0].parent_job_id.as_deref(), Some("parent-job"));
    let next: JobPayload = serde_json::from_value(queued[0].payload.clone()).unwrap();
    assert_eq!(next.target_contribution_id.as_deref(), Some(contribution_id.as_str()));
    assert_eq!(next.continuation_count, Some(json!(1)));
    assert_eq!(
        next.document_relationships.get("thesis"),
        Some(&contribution_id)
    );

    let (_, path) = &h.storage.uploads().await[0];
    assert!(path.ends_with("_continuation_0.md"), "{path}");
    assert!(h.queue.enqueued_of(JobType::Render).await.is_empty());
}

#[tokio::test]
async fn truncation_without_continue_flag_is_stored_as_final() {
    let h = Harness::new(1000.0, vec![reply("cut", FinishReason::MaxTokens)]);
    let outcome = h
        .run(&job(payload()), prompt("Go."), &model_config())
        .await
        .unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { .. }));
    assert!(h.queue.enqueued_of(JobType::Continuation).await.is_empty());
}

#[tokio::test]
async fn continuation_clears_only_its_parent() {
    let h = Harness::new(1000.0, vec![reply("more", FinishReason::Length)]);
    h.registry.insert(existing("parent-1")).await;
    h.registry.insert(existing("other")).await;

    let outcome = h
        .run(&job(continuation(Some(json!(1)), "parent-1")), prompt("Go."), &model_config())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        JobOutcome::Continued {
            continuation_count: 2,
            ..
        }
    ));

    assert!(!h.registry.get("parent-1").await.unwrap().is_latest_edit);
    assert!(h.registry.get("other").await.unwrap().is_latest_edit);
    assert_eq!(h.registry.cleared_parents().await, vec!["parent-1"]);
    // Only roots write their relationships back.
    assert!(h.registry.relationship_updates().await.is_empty());
}

#[tokio::test]
async fn final_continuation_assembles_the_chain() {
    let h = Harness::new(1000.0, vec![reply("the end", FinishReason::Stop)]);
    h.registry.insert(existing("parent-1")).await;

    let outcome = h
        .run(&job(continuation(Some(json!(2)), "parent-1")), prompt("Go."), &model_config())
        .await
        .unwrap();

    match outcome {
        JobOutcome::Assembled { root_id, .. } => assert_eq!(root_id, "root-1"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.assembler.assembled().await, vec!["root-1"]);
    assert!(h.queue.enqueued().await.is_empty());
    // The terminal chunk still supersedes its parent.
    assert_eq!(h.registry.cleared_parents().await, vec!["parent-1"]);
    assert!(!h.registry.get("parent-1").await.unwrap().is_latest_edit);
}

#[tokio::test]
async fn continuation_limit_forces_assembly() {
    let h = Harness::new(1000.0, vec![reply("still going", FinishReason::Length)]);
    h.registry.insert(existing("parent-5")).await;

    let outcome = h
        .run(&job(continuation(Some(json!(5)), "parent-5")), prompt("Go."), &model_config())
        .await
        .unwrap();
    assert!(matches!(outcome, JobOutcome::Assembled { .. }));
    assert!(h.queue.enqueued_of(JobType::Continuation).await.is_empty());
}

// ── Persistence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn registration_failure_removes_the_upload() {
    let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.registry.fail_register(true);

    let err = h
        .run(&job(payload()), prompt("Go."), &model_config())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Persist(PersistError::RegistrationFailed {
            cleanup_error: None,
            ..
        })
    ));
    let uploads = h.storage.uploads().await;
    assert_eq!(h.storage.removals().await, uploads);
    assert!(h.queue.enqueued().await.is_empty());
}

#[tokio::test]
async fn cleanup_failure_still_surfaces_the_registration_error() {
    let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.registry.fail_register(true);
    h.storage.fail_removals(true);

    let err = h
        .run(&job(payload()), prompt("Go."), &model_config())
        .await
        .unwrap_err();
    match err {
        CoreError::Persist(PersistError::RegistrationFailed { cleanup_error, .. }) => {
            assert!(cleanup_error.is_some())
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ── Gathering ────────────────────────────────────────────────────────────

#[tokio::test]
async fn inputs_are_routed_to_their_stores() {
    let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.seed_input(&h.resources, Some("project-1"), "spec", "thesis", "spec body")
        .await;
    h.seed_input(&h.feedback, Some("project-1"), "notes", "thesis", "feedback body")
        .await;
    // Intermediate artifacts fall back to contributions, which carry no project scope.
    h.seed_input(&h.contributions, None, "header", "planning", "header body")
        .await;

    let p = JobPayload {
        inputs_required: vec![
            InputDescriptor {
                kind: InputKind::Document,
                document_key: "spec".into(),
                slug: None,
                required: true,
            },
            InputDescriptor {
                kind: InputKind::Feedback,
                document_key: "notes".into(),
                slug: None,
                required: true,
            },
            InputDescriptor {
                kind: InputKind::Intermediate("header_context".into()),
                document_key: "header".into(),
                slug: Some("planning".into()),
                required: true,
            },
            InputDescriptor {
                kind: InputKind::Document,
                document_key: "appendix".into(),
                slug: None,
                required: false,
            },
        ],
        ..payload()
    };
    h.run(&job(p), prompt("Go."), &model_config()).await.unwrap();

    let request = &h.model.requests().await[0];
    let docs: Vec<&str> = request
        .payload
        .resource_documents
        .iter()
        .map(|d| d.content.as_str())
        .collect();
    assert_eq!(docs, vec!["spec body", "feedback body", "header body"]);

    let contribution_queries = h.contributions.queries().await;
    assert_eq!(contribution_queries.len(), 1);
    assert!(contribution_queries[0].project_id.is_none());
    assert_eq!(contribution_queries[0].stage_slug, "planning");
    assert_eq!(h.feedback.queries().await.len(), 1);
    // spec, header (tried first), appendix
    assert_eq!(h.resources.queries().await.len(), 3);
}

#[tokio::test]
async fn missing_required_input_fails_before_the_model() {
    let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    let p = JobPayload {
        inputs_required: vec![InputDescriptor {
            kind: InputKind::SeedPrompt,
            document_key: "seed".into(),
            slug: None,
            required: true,
        }],
        ..payload()
    };
    let err = h.run(&job(p), prompt("Go."), &model_config()).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::RequiredInputMissing { .. })
    ));
    assert!(h.model.requests().await.is_empty());
    assert_eq!(h.wallet.balance_reads(), 0);
}

fn seed_descriptor(document_key: &str, required: bool) -> InputDescriptor {
    InputDescriptor {
        kind: InputKind::SeedPrompt,
        document_key: document_key.into(),
        slug: None,
        required,
    }
}

#[tokio::test]
async fn failed_download_of_required_input_aborts_before_the_model() {
    let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.seed_input(&h.resources, Some("project-1"), "seed", "thesis", "seed body")
        .await;
    h.storage.fail_download("project-1/thesis/seed.md").await;

    let p = JobPayload {
        inputs_required: vec![seed_descriptor("seed", true)],
        ..payload()
    };
    let err = h.run(&job(p), prompt("Go."), &model_config()).await.unwrap_err();
    match err {
        CoreError::Validation(ValidationError::DownloadFailed { path, .. }) => {
            assert_eq!(path, "project-1/thesis/seed.md")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.model.requests().await.is_empty());
    assert_eq!(h.wallet.balance_reads(), 0);
    assert!(h.storage.uploads().await.is_empty());
}

#[tokio::test]
async fn failed_download_of_optional_input_is_skipped() {
    let h = Harness::new(1000.0, vec![reply("ok", FinishReason::Stop)]);
    h.seed_input(&h.resources, Some("project-1"), "seed", "thesis", "seed body")
        .await;
    h.seed_input(&h.resources, Some("project-1"), "extra", "thesis", "extra body")
        .await;
    h.storage.fail_download("project-1/thesis/extra.md").await;

    let p = JobPayload {
        inputs_required: vec![seed_descriptor("seed", true), seed_descriptor("extra", false)],
        ..payload()
    };
    let outcome = h.run(&job(p), prompt("Go."), &model_config()).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Completed { .. }));

    let requests = h.model.requests().await;
    assert_eq!(requests.len(), 1);
    let docs: Vec<&str> = requests[0]
        .payload
        .resource_documents
        .iter()
        .map(|d| d.content.as_str())
        .collect();
    assert_eq!(docs, vec!["seed body"]);
}
