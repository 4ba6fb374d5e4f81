//! Artifact stores and object storage.
//!
//! Three independently-queryable stores hold a job's possible inputs:
//! finished documents (resources), in-progress contributions, and user
//! feedback. Each returns storage locations; bytes come from
//! [`ObjectStorage`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::job::InputKind;

/// Which store an artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Resources,
    Contributions,
    Feedback,
}

/// Lookup for one input descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactQuery {
    /// Absent for stores that are scoped by session only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub session_id: String,
    pub iteration_number: u32,
    pub stage_slug: String,
    pub document_key: String,
    pub kind: InputKind,
}

/// A stored artifact's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub id: String,
    pub storage_bucket: String,
    pub storage_path: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_slug: Option<String>,
}

impl StoredArtifact {
    /// Full object path within the bucket.
    pub fn object_path(&self) -> String {
        let dir = self.storage_path.trim_end_matches('/');
        if dir.is_empty() {
            self.file_name.clone()
        } else {
            format!("{dir}/{}", self.file_name)
        }
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    async fn find_documents(
        &self,
        query: &ArtifactQuery,
    ) -> Result<Vec<StoredArtifact>, CollaboratorError>;
}

/// Blob storage.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, CollaboratorError>;

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), CollaboratorError>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), CollaboratorError>;
}
