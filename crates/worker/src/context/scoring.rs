//! Compression candidate scoring.
//!
//! History in the mutable middle is scored by position (older is cheaper to
//! lose). Resource documents are scored by how little they resemble the
//! current prompt, weighted by the recipe's declared relevance.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dialectic_core::{
    CompressionCandidate, CoreError, EmbeddingClient, Message, RelevanceRule, ResourceDocument,
    Role, SourceType,
};

use crate::context::history::HistoryWindow;

/// Everything a strategy may look at when proposing candidates.
pub struct ScoringRequest<'a> {
    pub history: &'a [Message],
    pub window: &'a HistoryWindow,
    pub documents: &'a [ResourceDocument],
    pub current_prompt: &'a str,
    pub relevance: &'a [RelevanceRule],
    /// History ids already in the retrieval index.
    pub indexed: &'a HashSet<String>,
}

/// Proposes which parts of the prompt may be summarized.
#[async_trait]
pub trait CompressionStrategy: Send + Sync {
    async fn candidates(
        &self,
        request: &ScoringRequest<'_>,
    ) -> Result<Vec<CompressionCandidate>, CoreError>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if the vectors differ in length or either is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    dot / denom
}

/// Relevance for a document. A rule for the document's own stage beats a
/// general rule for the same key; documents without a key weigh 1.0.
pub fn resolve_relevance(rules: &[RelevanceRule], document: &ResourceDocument) -> f64 {
    let Some(key) = document.document_key.as_deref() else {
        return 1.0;
    };
    let matching = || rules.iter().filter(move |r| r.document_key == key);

    let staged = document.stage_slug.as_deref().and_then(|stage| {
        matching().find(|r| r.slug.as_deref() == Some(stage))
    });
    staged
        .or_else(|| matching().find(|r| r.slug.is_none()))
        .map(|r| r.relevance)
        .unwrap_or(1.0)
}

/// Stable id for a history message.
pub fn history_candidate_id(message: &Message, index: usize) -> String {
    message
        .id
        .clone()
        .unwrap_or_else(|| format!("history-{index}"))
}

/// Score the mutable middle of the history by position.
pub fn score_history(
    history: &[Message],
    window: &HistoryWindow,
    indexed: &HashSet<String>,
) -> Vec<CompressionCandidate> {
    let middle = window.middle();
    let span = (middle.len() + 1) as f64;
    middle
        .clone()
        .filter_map(|index| {
            let message = &history[index];
            if message.role == Role::System {
                return None;
            }
            let id = history_candidate_id(message, index);
            if indexed.contains(&id) {
                return None;
            }
            let value = (index - middle.start + 1) as f64 / span;
            Some(CompressionCandidate {
                id,
                content: message.content.clone(),
                source_type: SourceType::History,
                original_index: index,
                value_score: value,
                effective_score: value,
            })
        })
        .collect()
}

/// Sort ascending by effective score. Ties go by source, then by index
/// within that source, since history and document indices are unrelated.
pub fn order_candidates(mut candidates: Vec<CompressionCandidate>) -> Vec<CompressionCandidate> {
    candidates.sort_by(|a, b| {
        a.effective_score
            .total_cmp(&b.effective_score)
            .then(a.source_type.cmp(&b.source_type))
            .then(a.original_index.cmp(&b.original_index))
    });
    candidates
}

/// Default strategy: positional history plus embedding similarity for documents.
pub struct SimilarityStrategy {
    embeddings: Arc<dyn EmbeddingClient>,
}

impl SimilarityStrategy {
    pub fn new(embeddings: Arc<dyn EmbeddingClient>) -> Self {
        Self { embeddings }
    }
}

#[async_trait]
impl CompressionStrategy for SimilarityStrategy {
    async fn candidates(
        &self,
        request: &ScoringRequest<'_>,
    ) -> Result<Vec<CompressionCandidate>, CoreError> {
        let mut candidates = score_history(request.history, request.window, request.indexed);

        if !request.documents.is_empty() {
            let prompt = self.embeddings.embed(request.current_prompt).await?;
            for (index, document) in request.documents.iter().enumerate() {
                let embedding = self.embeddings.embed(&document.content).await?;
                let similarity = cosine_similarity(&embedding.vector, &prompt.vector);
                let value = 1.0 - similarity;
                let relevance = resolve_relevance(request.relevance, document);
                tracing::debug!(
                    candidate_id = %document.id,
                    similarity,
                    relevance,
                    "Scored document candidate"
                );
                candidates.push(CompressionCandidate {
                    id: document.id.clone(),
                    content: document.content.clone(),
                    source_type: SourceType::Document,
                    original_index: index,
                    value_score: value,
                    effective_score: relevance * value,
                });
            }
        }

        Ok(order_candidates(candidates))
    }
}
