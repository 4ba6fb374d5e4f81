//! `dialectic run`: Execute a fixture job against in-memory services.
//!
//! Prints a JSON report with the outcome (or error) and every side effect
//! the job had: uploads, removals, debits, registrations and queued jobs.

use std::path::Path;

use dialectic_config::WorkerConfig;
use dialectic_core::{Contribution, CoreError, DebitRequest, ErrorCategory};
use dialectic_memory::{EnqueuedJob, RetryRecord};
use dialectic_worker::{EngineSettings, JobExecutor, JobOutcome};
use serde::Serialize;

use crate::fixture::{Backends, Fixture};

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&CoreError> for ErrorReport {
    fn from(e: &CoreError) -> Self {
        Self {
            code: e.code(),
            category: e.category(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    pub model_calls: usize,
    pub max_tokens_sent: Vec<u64>,
    pub debits: Vec<DebitRequest>,
    pub uploads: Vec<String>,
    pub removals: Vec<String>,
    pub contributions: Vec<Contribution>,
    pub enqueued: Vec<EnqueuedJob>,
    pub retries: Vec<RetryRecord>,
    pub assembled: Vec<String>,
}

impl RunReport {
    pub async fn collect(result: &Result<JobOutcome, CoreError>, backends: &Backends) -> Self {
        let requests = backends.model.requests().await;
        let debits = match &backends.wallet {
            Some(wallet) => wallet.debits().await,
            None => Vec::new(),
        };
        let join = |(bucket, path): (String, String)| format!("{bucket}/{path}");
        Self {
            outcome: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(ErrorReport::from),
            model_calls: requests.len(),
            max_tokens_sent: requests.iter().map(|r| r.max_tokens_to_generate).collect(),
            debits,
            uploads: backends.storage.uploads().await.into_iter().map(join).collect(),
            removals: backends.storage.removals().await.into_iter().map(join).collect(),
            contributions: backends.registry.records().await,
            enqueued: backends.queue.enqueued().await,
            retries: backends.queue.retries().await,
            assembled: backends.assembler.assembled().await,
        }
    }
}

/// Execute the fixture and build its report.
pub async fn execute(
    config: &WorkerConfig,
    fixture: &Fixture,
) -> (Result<JobOutcome, CoreError>, RunReport) {
    let backends = fixture.backends().await;
    let executor = JobExecutor::new(backends.deps(config), EngineSettings::from(config));
    let result = executor
        .execute(&fixture.job, fixture.prompt.clone(), &fixture.model)
        .await;
    let report = RunReport::collect(&result, &backends).await;
    (result, report)
}

pub async fn run(config: &WorkerConfig, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::load(path)?;
    let (result, report) = execute(config, &fixture).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    result.map(|_| ()).map_err(Into::into)
}
