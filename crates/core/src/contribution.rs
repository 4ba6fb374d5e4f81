//! Persistence contracts: chunk uploads, contribution records, and the
//! collaborators that store and register them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CollaboratorError, PersistError};

/// Everything needed to derive a canonical storage path for an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathContext {
    pub project_id: String,
    pub session_id: String,
    pub iteration_number: u32,
    pub stage_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_key: Option<String>,
    pub model_slug: String,
    pub attempt_count: u32,
    pub is_continuation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_index: Option<u32>,
    /// Extension without the dot (`md`, `json`).
    pub file_extension: String,
}

/// A model-generated chunk and the metadata it is registered with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionUpload {
    pub path: PathContext,
    pub content: String,
    pub mime_type: String,
    pub model_id: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// The chunk this one extends; its latest-edit marker is cleared on register.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_contribution_id: Option<String>,
    #[serde(default)]
    pub document_relationships: BTreeMap<String, String>,
    #[serde(default)]
    pub is_intermediate: bool,
}

impl ContributionUpload {
    /// The record whose latest-edit marker this upload replaces.
    pub fn supersedes(&self) -> Option<&str> {
        self.target_contribution_id.as_deref()
    }
}

/// A resolved object location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    pub directory: String,
    pub file_name: String,
}

impl StorageLocation {
    pub fn object_path(&self) -> String {
        format!("{}/{}", self.directory.trim_end_matches('/'), self.file_name)
    }
}

/// A registered record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: String,
    pub session_id: String,
    pub stage_slug: String,
    pub iteration_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_key: Option<String>,
    pub storage_bucket: String,
    pub storage_path: String,
    pub file_name: String,
    pub mime_type: String,
    pub is_latest_edit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_contribution_id: Option<String>,
    #[serde(default)]
    pub document_relationships: BTreeMap<String, String>,
}

/// Derives canonical storage locations, including collision handling.
pub trait PathNamer: Send + Sync {
    fn locate(&self, upload: &ContributionUpload) -> StorageLocation;
}

/// The record store behind contributions.
#[async_trait]
pub trait ContributionRegistry: Send + Sync {
    /// Insert a record for an uploaded object. When the upload supersedes a
    /// parent, the parent's latest-edit marker is cleared in the same write.
    async fn register(
        &self,
        upload: &ContributionUpload,
        location: &StorageLocation,
    ) -> Result<Contribution, CollaboratorError>;

    async fn update_document_relationships(
        &self,
        contribution_id: &str,
        relationships: &BTreeMap<String, String>,
    ) -> Result<(), CollaboratorError>;
}

/// Upload plus registration, treated by the executor as one step.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn upload_and_register(
        &self,
        upload: ContributionUpload,
    ) -> Result<Contribution, PersistError>;

    async fn set_document_relationships(
        &self,
        contribution_id: &str,
        relationships: &BTreeMap<String, String>,
    ) -> Result<(), CollaboratorError>;
}

/// Reassembles a continuation chain into one document.
#[async_trait]
pub trait DocumentAssembler: Send + Sync {
    async fn assemble(&self, root_contribution_id: &str) -> Result<(), CollaboratorError>;
}
