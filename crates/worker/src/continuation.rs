//! Continuation state machine.
//!
//! A job either starts a document (root) or extends a chain
//! (`target_contribution_id` set). The model response decides whether the
//! chunk is terminal or needs another turn; malformed output is never a
//! continuation and goes to retry instead.

use std::collections::BTreeMap;

use dialectic_core::{ChunkTarget, FinishReason, JobPayload, ModelResponse};

/// Result of inspecting a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseVerdict {
    /// Natural stop. The body is stored as-is.
    Complete(ResponseBody),
    /// More output is needed. The body is stored raw.
    Truncated(ResponseBody),
    /// Nothing may be stored; the job should be retried.
    Retry { reason: String },
}

/// Content and its storage format.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseBody {
    pub content: String,
    pub format: BodyFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Markdown,
}

impl BodyFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            BodyFormat::Json => "application/json",
            BodyFormat::Markdown => "text/markdown",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            BodyFormat::Json => "json",
            BodyFormat::Markdown => "md",
        }
    }
}

/// Strip a Markdown code fence around a JSON body, if present.
pub fn strip_json_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn looks_like_json(response: &ModelResponse) -> bool {
    if response
        .content_type
        .as_deref()
        .is_some_and(|t| t.contains("json"))
    {
        return true;
    }
    let trimmed = response.content.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with("```json")
}

/// In-band signals a model may put in a JSON body to ask for more turns.
pub fn requests_more(body: &serde_json::Value) -> bool {
    let flag = body
        .get("continuation_needed")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    let stop_reason = matches!(
        body.get("stop_reason").and_then(serde_json::Value::as_str),
        Some("continuation" | "token_limit")
    );
    let cursor = body
        .get("resume_cursor")
        .is_some_and(|c| match c {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.trim().is_empty(),
            serde_json::Value::Object(o) => !o.is_empty(),
            serde_json::Value::Array(a) => !a.is_empty(),
            _ => true,
        });
    flag || stop_reason || cursor
}

/// Decide what to do with a model response.
pub fn classify_response(response: &ModelResponse, continue_until_complete: bool) -> ResponseVerdict {
    let finish = response.finish_reason.clone().unwrap_or(FinishReason::Stop);
    if finish == FinishReason::Error {
        return ResponseVerdict::Retry {
            reason: "Model reported finish_reason 'error'".into(),
        };
    }

    let json = looks_like_json(response);
    let format = if json {
        BodyFormat::Json
    } else {
        BodyFormat::Markdown
    };

    if finish.requests_continuation() {
        let body = ResponseBody {
            content: response.content.clone(),
            format,
        };
        return if continue_until_complete {
            ResponseVerdict::Truncated(body)
        } else {
            ResponseVerdict::Complete(body)
        };
    }

    if !json {
        return ResponseVerdict::Complete(ResponseBody {
            content: response.content.clone(),
            format,
        });
    }

    let cleaned = strip_json_fence(&response.content);
    match serde_json::from_str::<serde_json::Value>(cleaned) {
        Ok(value) => {
            let body = ResponseBody {
                content: cleaned.to_string(),
                format,
            };
            if continue_until_complete && requests_more(&value) {
                ResponseVerdict::Truncated(body)
            } else {
                ResponseVerdict::Complete(body)
            }
        }
        Err(e) => ResponseVerdict::Retry {
            reason: format!("Malformed JSON in model response: {e}"),
        },
    }
}

/// Where a saved chunk sits in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Root,
    Continuing,
    TerminalContinuation,
}

/// What the executor must do around saving a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub state: ChunkState,
    pub is_continuation: bool,
    pub turn_index: Option<u32>,
    /// Parent whose latest-edit marker the save clears.
    pub supersedes: Option<String>,
    /// Chain root for assembly; `None` for roots until saved.
    pub root_id: Option<String>,
    pub schedule_continuation: bool,
    pub assemble: bool,
}

impl ChunkPlan {
    pub fn new(target: &ChunkTarget, truncated: bool, max_continuations: u32) -> Self {
        match target {
            ChunkTarget::Root => Self {
                state: ChunkState::Root,
                is_continuation: truncated,
                turn_index: truncated.then_some(0),
                supersedes: None,
                root_id: None,
                schedule_continuation: truncated,
                assemble: false,
            },
            ChunkTarget::Continuation {
                parent_id,
                continuation_count,
                root_id,
            } => {
                let more = truncated && *continuation_count < max_continuations;
                if truncated && !more {
                    tracing::warn!(
                        continuation_count,
                        max_continuations,
                        "Continuation limit reached, treating chunk as final"
                    );
                }
                Self {
                    state: if more {
                        ChunkState::Continuing
                    } else {
                        ChunkState::TerminalContinuation
                    },
                    is_continuation: true,
                    turn_index: Some(*continuation_count),
                    supersedes: Some(parent_id.clone()),
                    root_id: Some(root_id.clone()),
                    schedule_continuation: more,
                    assemble: !more,
                }
            }
        }
    }
}

/// Payload for the next chunk of a chain.
pub fn continuation_payload(
    parent: &JobPayload,
    saved_id: &str,
    next_count: u32,
    relationships: BTreeMap<String, String>,
) -> JobPayload {
    JobPayload {
        target_contribution_id: Some(saved_id.to_string()),
        continuation_count: Some(serde_json::Value::from(next_count)),
        continue_until_complete: true,
        document_relationships: relationships,
        ..parent.clone()
    }
}
