//! Compression candidates and the summarization collaborators.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// Where a candidate came from in the working prompt. History sorts before
/// documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    History,
    Document,
}

/// A piece of the prompt that may be replaced by its summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionCandidate {
    pub id: String,
    pub content: String,
    pub source_type: SourceType,
    /// Index into the history or the resource documents, per `source_type`.
    pub original_index: usize,
    pub value_score: f64,
    pub effective_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryContext {
    pub job_id: String,
    pub session_id: String,
    pub stage_slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub content: String,
    /// Tokens billed for producing the summary.
    pub tokens_used: u64,
}

/// Summarizes one candidate (retrieval-augmented).
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        candidate: &CompressionCandidate,
        context: &SummaryContext,
    ) -> Result<Summary, CollaboratorError>;
}

/// Tracks which history records are already in the retrieval index.
#[async_trait]
pub trait MemoryIndex: Send + Sync {
    async fn indexed_ids(&self, session_id: &str) -> Result<HashSet<String>, CollaboratorError>;
}
