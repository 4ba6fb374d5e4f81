//! Job queue contract used for continuations, follow-ons and retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::job::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Next chunk of a truncated document.
    Continuation,
    /// Turn a finished document into its rendered form.
    Render,
}

/// One failed attempt, recorded on the retried job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub model_id: String,
    pub error: String,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a new job and return its id.
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        parent_job_id: Option<&str>,
    ) -> Result<String, CollaboratorError>;

    /// Requeue `job` as attempt number `attempt_count`.
    async fn retry(
        &self,
        job: &Job,
        attempt_count: u32,
        failures: Vec<FailedAttempt>,
    ) -> Result<(), CollaboratorError>;
}
