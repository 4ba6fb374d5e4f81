//! Model configuration, responses, and the model-facing collaborator traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::prompt::{ModelRequest, SizedPayload};

/// Pricing and limits for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub api_identifier: String,
    pub provider_id: String,
    pub context_window_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_max_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_max_output_tokens: Option<u64>,
    /// Wallet units per input token.
    pub input_token_cost_rate: f64,
    /// Wallet units per output token.
    pub output_token_cost_rate: f64,
    /// Wallet units per embedded token; falls back to the input rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_cost_rate: Option<f64>,
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    MaxTokens,
    ContentTruncated,
    NextDocument,
    ToolCalls,
    FunctionCall,
    ContentFilter,
    Error,
    #[serde(other)]
    Unknown,
}

impl FinishReason {
    /// Whether the provider cut the output short and more can be requested.
    pub fn requests_continuation(&self) -> bool {
        !matches!(self, FinishReason::Stop | FinishReason::Error)
    }
}

/// A completed model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Calls a model provider.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, CollaboratorError>;
}

/// Sizes prompts in tokens for a specific model.
pub trait TokenCounter: Send + Sync {
    /// Tokens in the full payload, resource documents included.
    fn count(&self, payload: &SizedPayload) -> u64;

    /// Tokens in a standalone piece of text.
    fn count_text(&self, text: &str) -> u64;
}

/// An embedding vector with the tokens it cost to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub tokens: u64,
}

/// Produces embeddings for relevance scoring.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding, CollaboratorError>;
}
