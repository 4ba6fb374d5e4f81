//! The prompt as it is being fitted into the model's window.

use dialectic_core::{
    CompressionCandidate, Message, PromptConstructionPayload, ResourceDocument, SizedPayload,
    SourceType,
};

use crate::context::alternation::TurnNormalizer;
use crate::context::history::HistoryWindow;

/// Raw prompt parts plus the rules that shape them into a request.
///
/// Compression edits the raw parts; [`WorkingPrompt::sized`] always renders
/// the normalized form, so the counted payload is the one that is sent.
#[derive(Debug, Clone)]
pub struct WorkingPrompt {
    system_instruction: Option<String>,
    history: Vec<Message>,
    documents: Vec<ResourceDocument>,
    current_prompt: String,
    window: HistoryWindow,
    normalizer: TurnNormalizer,
}

impl WorkingPrompt {
    pub fn new(
        payload: PromptConstructionPayload,
        history_tail_len: usize,
        normalizer: TurnNormalizer,
    ) -> Self {
        let window = HistoryWindow::new(&payload.conversation_history, history_tail_len);
        Self {
            system_instruction: payload.system_instruction,
            history: payload.conversation_history,
            documents: payload.resource_documents,
            current_prompt: payload.current_user_prompt,
            window,
            normalizer,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn window(&self) -> &HistoryWindow {
        &self.window
    }

    pub fn documents(&self) -> &[ResourceDocument] {
        &self.documents
    }

    pub fn current_prompt(&self) -> &str {
        &self.current_prompt
    }

    /// Replace a candidate's content with its summary.
    pub fn apply_summary(&mut self, candidate: &CompressionCandidate, summary: String) {
        let slot = match candidate.source_type {
            SourceType::History => self
                .history
                .get_mut(candidate.original_index)
                .map(|m| &mut m.content),
            SourceType::Document => self
                .documents
                .get_mut(candidate.original_index)
                .map(|d| &mut d.content),
        };
        if let Some(content) = slot {
            *content = summary;
        } else {
            tracing::warn!(
                candidate_id = %candidate.id,
                index = candidate.original_index,
                "Compression candidate no longer present in prompt"
            );
        }
    }

    /// Render the request payload: normalized history closed by a user
    /// turn, documents kept apart.
    pub fn sized(&self) -> SizedPayload {
        SizedPayload {
            system_instruction: self.system_instruction.clone(),
            message: self.current_prompt.clone(),
            messages: self
                .normalizer
                .normalize(&self.history, &self.window, &self.current_prompt),
            resource_documents: self.documents.clone(),
        }
    }
}
