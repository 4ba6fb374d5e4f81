//! In-memory job queue.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialectic_core::{CollaboratorError, FailedAttempt, Job, JobQueue, JobType};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueuedJob {
    pub id: String,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub parent_job_id: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    pub job_id: String,
    pub attempt_count: u32,
    pub failures: Vec<FailedAttempt>,
}

pub struct InMemoryJobQueue {
    enqueued: Arc<RwLock<Vec<EnqueuedJob>>>,
    retries: Arc<RwLock<Vec<RetryRecord>>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            enqueued: Arc::new(RwLock::new(Vec::new())),
            retries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn enqueued(&self) -> Vec<EnqueuedJob> {
        self.enqueued.read().await.clone()
    }

    pub async fn enqueued_of(&self, job_type: JobType) -> Vec<EnqueuedJob> {
        self.enqueued
            .read()
            .await
            .iter()
            .filter(|j| j.job_type == job_type)
            .cloned()
            .collect()
    }

    pub async fn retries(&self) -> Vec<RetryRecord> {
        self.retries.read().await.clone()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        parent_job_id: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        let id = Uuid::new_v4().to_string();
        self.enqueued.write().await.push(EnqueuedJob {
            id: id.clone(),
            job_type,
            payload,
            parent_job_id: parent_job_id.map(str::to_string),
            enqueued_at: Utc::now(),
        });
        Ok(id)
    }

    async fn retry(
        &self,
        job: &Job,
        attempt_count: u32,
        failures: Vec<FailedAttempt>,
    ) -> Result<(), CollaboratorError> {
        if attempt_count > job.max_retries {
            return Err(CollaboratorError::new(
                "queue",
                format!("job {} exhausted {} retries", job.id, job.max_retries),
            ));
        }
        self.retries.write().await.push(RetryRecord {
            job_id: job.id.clone(),
            attempt_count,
            failures,
        });
        Ok(())
    }
}
