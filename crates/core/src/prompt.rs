//! Prompt payloads: what the prompt assembler hands the worker, and what
//! the worker finally sends to the model.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// Sentinel prompt id sent with every worker-originated model call.
pub const NO_PROMPT_ID: &str = "__none__";

/// A supporting document passed to the model beside the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ResourceDocument {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            document_key: None,
            stage_slug: None,
            kind: None,
        }
    }
}

/// Input to the executor from the prompt assembler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptConstructionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<Message>,
    #[serde(default)]
    pub resource_documents: Vec<ResourceDocument>,
    pub current_user_prompt: String,
}

/// The token-bearing part of a model request.
///
/// The token counter sizes exactly this value, and the request sent to the
/// model embeds the same value, so what was counted is what is sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    /// The current user prompt.
    pub message: String,
    /// Alternating history ending on a user turn; never contains resource
    /// documents.
    pub messages: Vec<Message>,
    pub resource_documents: Vec<ResourceDocument>,
}

impl SizedPayload {
    /// True when the closing user turn of `messages` is the current prompt
    /// itself, so it must only be counted once.
    pub fn prompt_closes_history(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.role == Role::User && m.content == self.message)
    }
}

/// A fully-formed model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    #[serde(flatten)]
    pub payload: SizedPayload,
    pub max_tokens_to_generate: u64,
    pub wallet_id: String,
    pub provider_id: String,
    pub prompt_id: String,
}
