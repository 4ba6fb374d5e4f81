//! Follow-on scheduling: render jobs for finished documents and the next
//! job of a continuation chain.

use dialectic_core::{CoreError, DocumentIdentity, JobPayload, JobQueue, JobType};
use serde::{Deserialize, Serialize};

/// A render job carries the document's root identity and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPayload {
    pub project_id: String,
    pub session_id: String,
    pub iteration_number: u32,
    pub stage_slug: String,
    pub document_key: String,
    /// Root contribution of the document's lineage.
    pub document_identity: String,
    pub model_id: String,
}

impl RenderPayload {
    pub fn new(identity: &DocumentIdentity, document_key: &str, root_id: &str) -> Self {
        Self {
            project_id: identity.project_id.clone(),
            session_id: identity.session_id.clone(),
            iteration_number: identity.iteration_number,
            stage_slug: identity.stage_slug.clone(),
            document_key: document_key.to_string(),
            document_identity: root_id.to_string(),
            model_id: identity.model_id.clone(),
        }
    }
}

pub struct FollowOnScheduler<'a> {
    queue: &'a dyn JobQueue,
}

impl<'a> FollowOnScheduler<'a> {
    pub fn new(queue: &'a dyn JobQueue) -> Self {
        Self { queue }
    }

    /// Enqueue rendering of a finished document. Returns the new job id.
    pub async fn schedule_render(
        &self,
        payload: &RenderPayload,
        parent_job_id: &str,
    ) -> Result<String, CoreError> {
        let job_id = self
            .queue
            .enqueue(
                JobType::Render,
                serde_json::to_value(payload)?,
                Some(parent_job_id),
            )
            .await?;
        tracing::info!(
            job_id = %job_id,
            parent_job_id,
            document_identity = %payload.document_identity,
            "Scheduled render job"
        );
        Ok(job_id)
    }

    /// Enqueue the next chunk of a chain, keeping the original parent job.
    pub async fn schedule_continuation(
        &self,
        payload: &JobPayload,
        parent_job_id: Option<&str>,
    ) -> Result<String, CoreError> {
        let job_id = self
            .queue
            .enqueue(
                JobType::Continuation,
                serde_json::to_value(payload)?,
                parent_job_id,
            )
            .await?;
        tracing::info!(
            job_id = %job_id,
            target_contribution_id = ?payload.target_contribution_id,
            "Scheduled continuation job"
        );
        Ok(job_id)
    }
}
