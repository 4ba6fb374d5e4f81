//! Job payloads and the validated views derived from them.
//!
//! A [`JobPayload`] arrives as loosely-typed JSON from the queue. Before any
//! budget or model work the executor turns it into closed variants:
//! a [`DocumentIdentity`] naming where the output belongs and a
//! [`ChunkTarget`] saying whether this job starts a document or extends one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// What kind of artifact a job produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// A user-facing document that gets rendered once complete.
    #[default]
    Document,
    /// Planner context consumed by later jobs; never rendered.
    HeaderContext,
    /// Structured intermediate output.
    AssembledJson,
}

impl OutputType {
    pub fn is_document(self) -> bool {
        matches!(self, OutputType::Document)
    }
}

/// The kind of an input artifact a job depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Document,
    Feedback,
    SeedPrompt,
    ProjectResource,
    /// Any intermediate artifact type (header context, pairwise synthesis, ...).
    #[serde(untagged)]
    Intermediate(String),
}

impl InputKind {
    pub fn as_str(&self) -> &str {
        match self {
            InputKind::Document => "document",
            InputKind::Feedback => "feedback",
            InputKind::SeedPrompt => "seed_prompt",
            InputKind::ProjectResource => "project_resource",
            InputKind::Intermediate(kind) => kind,
        }
    }
}

/// A required or optional input declared by the job's recipe step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    #[serde(rename = "type")]
    pub kind: InputKind,
    pub document_key: String,
    /// Stage the artifact was produced in; defaults to the job's stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// Recipe-declared weight for a document when choosing what to compress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceRule {
    pub document_key: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<InputKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub relevance: f64,
}

/// The raw payload carried by an execution job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub iteration_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_key: Option<String>,
    #[serde(default)]
    pub output_type: OutputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_contribution_id: Option<String>,
    /// Kept as raw JSON so a malformed count is a validation error, not a decode error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_count: Option<serde_json::Value>,
    #[serde(default)]
    pub continue_until_complete: bool,
    #[serde(default)]
    pub document_relationships: BTreeMap<String, String>,
    #[serde(default)]
    pub inputs_required: Vec<InputDescriptor>,
    #[serde(default)]
    pub inputs_relevance: Vec<RelevanceRule>,
    #[serde(default)]
    pub is_intermediate: bool,
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_job_id: Option<String>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    pub payload: JobPayload,
}

fn default_max_retries() -> u32 {
    3
}

/// Where a job's output lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIdentity {
    pub project_id: String,
    pub session_id: String,
    pub iteration_number: u32,
    pub stage_slug: String,
    pub document_key: Option<String>,
    pub model_id: String,
}

/// Whether a job starts a new document or extends an existing chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkTarget {
    Root,
    Continuation {
        parent_id: String,
        continuation_count: u32,
        /// The chain root, from `document_relationships[stage_slug]`.
        root_id: String,
    },
}

impl ChunkTarget {
    pub fn is_continuation(&self) -> bool {
        matches!(self, ChunkTarget::Continuation { .. })
    }

    pub fn continuation_count(&self) -> u32 {
        match self {
            ChunkTarget::Root => 0,
            ChunkTarget::Continuation {
                continuation_count, ..
            } => *continuation_count,
        }
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::MissingField { field }),
    }
}

fn parse_continuation_count(raw: Option<&serde_json::Value>) -> Result<u32, ValidationError> {
    let invalid = |found: String| ValidationError::InvalidContinuationCount { found };
    let Some(value) = raw else {
        return Err(invalid("missing".into()));
    };
    let count = value
        .as_u64()
        .filter(|n| *n > 0)
        .ok_or_else(|| invalid(value.to_string()))?;
    u32::try_from(count).map_err(|_| invalid(value.to_string()))
}

impl JobPayload {
    /// Validate the identity fields. Document outputs need every field;
    /// other outputs only need the session scope.
    pub fn identity(&self) -> Result<DocumentIdentity, ValidationError> {
        if self.model_id.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "model_id" });
        }
        let document_key = if self.output_type.is_document() {
            Some(required(&self.document_key, "document_key")?)
        } else {
            self.document_key.clone().filter(|k| !k.trim().is_empty())
        };
        Ok(DocumentIdentity {
            project_id: required(&self.project_id, "project_id")?,
            session_id: required(&self.session_id, "session_id")?,
            iteration_number: self.iteration_number,
            stage_slug: required(&self.stage_slug, "stage_slug")?,
            document_key,
            model_id: self.model_id.clone(),
        })
    }

    /// Derive the chunk target. A continuation needs a positive integer
    /// count and a chain root for its stage.
    pub fn chunk_target(&self) -> Result<ChunkTarget, ValidationError> {
        let Some(parent_id) = self
            .target_contribution_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        else {
            return Ok(ChunkTarget::Root);
        };

        let continuation_count = parse_continuation_count(self.continuation_count.as_ref())?;
        let stage = required(&self.stage_slug, "stage_slug")?;
        let root_id = self
            .document_relationships
            .get(&stage)
            .filter(|id| !id.trim().is_empty())
            .cloned()
            .ok_or(ValidationError::MissingChainRoot { stage })?;

        Ok(ChunkTarget::Continuation {
            parent_id: parent_id.to_string(),
            continuation_count,
            root_id,
        })
    }
}
