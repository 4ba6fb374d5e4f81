//! Scripted model, summarizer and embedding doubles, plus a memory index.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use dialectic_core::{
    CollaboratorError, CompressionCandidate, Embedding, EmbeddingClient, MemoryIndex,
    ModelInvoker, ModelRequest, ModelResponse, Summarizer, Summary, SummaryContext,
};
use tokio::sync::RwLock;

/// Replies with queued responses in order and logs every request.
pub struct ScriptedModel {
    script: Arc<RwLock<VecDeque<Result<ModelResponse, String>>>>,
    requests: Arc<RwLock<Vec<ModelRequest>>>,
}

impl ScriptedModel {
    pub fn new(responses: impl IntoIterator<Item = ModelResponse>) -> Self {
        Self {
            script: Arc::new(RwLock::new(responses.into_iter().map(Ok).collect())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Queue a provider failure.
    pub async fn push_error(&self, message: impl Into<String>) {
        self.script.write().await.push_back(Err(message.into()));
    }

    pub async fn push(&self, response: ModelResponse) {
        self.script.write().await.push_back(Ok(response));
    }

    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedModel {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, CollaboratorError> {
        self.requests.write().await.push(request.clone());
        match self.script.write().await.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(CollaboratorError::new("model", message)),
            None => Err(CollaboratorError::new("model", "no scripted response left")),
        }
    }
}

/// One summarization call as seen by [`ScriptedSummarizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryCall {
    pub candidate_id: String,
    pub effective_score: f64,
    pub job_id: String,
}

/// Summarizes to a short fixed string and bills a configurable token count.
pub struct ScriptedSummarizer {
    tokens_used: u64,
    overrides: HashMap<String, u64>,
    calls: Arc<RwLock<Vec<SummaryCall>>>,
}

impl ScriptedSummarizer {
    pub fn new(tokens_used: u64) -> Self {
        Self {
            tokens_used,
            overrides: HashMap::new(),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Bill `tokens` for this candidate instead of the default.
    pub fn with_tokens(mut self, candidate_id: &str, tokens: u64) -> Self {
        self.overrides.insert(candidate_id.to_string(), tokens);
        self
    }

    pub async fn calls(&self) -> Vec<SummaryCall> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(
        &self,
        candidate: &CompressionCandidate,
        context: &SummaryContext,
    ) -> Result<Summary, CollaboratorError> {
        self.calls.write().await.push(SummaryCall {
            candidate_id: candidate.id.clone(),
            effective_score: candidate.effective_score,
            job_id: context.job_id.clone(),
        });
        let tokens_used = self
            .overrides
            .get(&candidate.id)
            .copied()
            .unwrap_or(self.tokens_used);
        Ok(Summary {
            content: format!("[summary:{}]", candidate.id),
            tokens_used,
        })
    }
}

/// Bag-of-words embedding over hashed buckets.
///
/// Deterministic across runs, so identical texts have cosine similarity 1
/// and texts with disjoint vocabularies have similarity 0.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, CollaboratorError> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut tokens = 0u64;
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
            tokens += 1;
        }
        Ok(Embedding { vector, tokens })
    }
}

/// Per-session sets of history ids already in the retrieval index.
pub struct InMemoryMemoryIndex {
    sessions: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl InMemoryMemoryIndex {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn mark_indexed(&self, session_id: &str, message_id: &str) {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .insert(message_id.to_string());
    }
}

impl Default for InMemoryMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryIndex for InMemoryMemoryIndex {
    async fn indexed_ids(&self, session_id: &str) -> Result<HashSet<String>, CollaboratorError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}
