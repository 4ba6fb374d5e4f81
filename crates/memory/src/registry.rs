//! Contribution records, canonical path naming and chain assembly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dialectic_core::{
    CollaboratorError, Contribution, ContributionRegistry, ContributionUpload, DocumentAssembler,
    PathNamer, StorageLocation,
};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const CONTRIBUTIONS_BUCKET: &str = "dialectic-contributions";

/// Registry that keeps every record in a Vec.
pub struct InMemoryContributionRegistry {
    records: Arc<RwLock<Vec<Contribution>>>,
    /// Parent ids whose latest-edit flag was cleared, in order.
    cleared: Arc<RwLock<Vec<String>>>,
    relationship_updates: Arc<RwLock<Vec<(String, BTreeMap<String, String>)>>>,
    fail_register: AtomicBool,
}

impl InMemoryContributionRegistry {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            cleared: Arc::new(RwLock::new(Vec::new())),
            relationship_updates: Arc::new(RwLock::new(Vec::new())),
            fail_register: AtomicBool::new(false),
        }
    }

    /// Seed an existing record, e.g. the parent of a continuation.
    pub async fn insert(&self, record: Contribution) {
        self.records.write().await.push(record);
    }

    pub fn fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub async fn records(&self) -> Vec<Contribution> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Contribution> {
        self.records.read().await.iter().find(|c| c.id == id).cloned()
    }

    pub async fn cleared_parents(&self) -> Vec<String> {
        self.cleared.read().await.clone()
    }

    pub async fn relationship_updates(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.relationship_updates.read().await.clone()
    }
}

impl Default for InMemoryContributionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContributionRegistry for InMemoryContributionRegistry {
    async fn register(
        &self,
        upload: &ContributionUpload,
        location: &StorageLocation,
    ) -> Result<Contribution, CollaboratorError> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("registry", "insert rejected"));
        }

        let path = &upload.path;
        let record = Contribution {
            id: Uuid::new_v4().to_string(),
            session_id: path.session_id.clone(),
            stage_slug: path.stage_slug.clone(),
            iteration_number: path.iteration_number,
            document_key: path.document_key.clone(),
            storage_bucket: location.bucket.clone(),
            storage_path: location.directory.clone(),
            file_name: location.file_name.clone(),
            mime_type: upload.mime_type.clone(),
            is_latest_edit: true,
            target_contribution_id: upload.target_contribution_id.clone(),
            document_relationships: upload.document_relationships.clone(),
        };

        // Clear the parent and insert under one write lock.
        let mut records = self.records.write().await;
        if let Some(parent_id) = upload.supersedes() {
            for parent in records.iter_mut().filter(|c| c.id == parent_id) {
                parent.is_latest_edit = false;
            }
            self.cleared.write().await.push(parent_id.to_string());
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn update_document_relationships(
        &self,
        contribution_id: &str,
        relationships: &BTreeMap<String, String>,
    ) -> Result<(), CollaboratorError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|c| c.id == contribution_id)
            .ok_or_else(|| {
                CollaboratorError::new("registry", format!("no contribution {contribution_id}"))
            })?;
        record.document_relationships = relationships.clone();
        self.relationship_updates
            .write()
            .await
            .push((contribution_id.to_string(), relationships.clone()));
        Ok(())
    }
}

/// Derives `{project}/session_{id8}/iteration_{n}/{stage}` locations.
///
/// File names carry the model slug, attempt count and document key, with a
/// `_continuation_{turn}` suffix for chunks after the root, so every turn of
/// a chain lands on a distinct object.
#[derive(Debug, Clone, Default)]
pub struct CanonicalPathNamer;

impl PathNamer for CanonicalPathNamer {
    fn locate(&self, upload: &ContributionUpload) -> StorageLocation {
        let p = &upload.path;
        let session: String = p.session_id.chars().take(8).collect();
        let mut directory = format!(
            "{}/session_{}/iteration_{}/{}",
            p.project_id, session, p.iteration_number, p.stage_slug
        );
        if p.is_continuation {
            directory.push_str("/_work");
        }

        let mut file_name = format!("{}_{}", p.model_slug, p.attempt_count);
        if let Some(key) = &p.document_key {
            file_name.push('_');
            file_name.push_str(key);
        }
        if p.is_continuation
            && let Some(turn) = p.turn_index
        {
            file_name.push_str(&format!("_continuation_{turn}"));
        }
        file_name.push('.');
        file_name.push_str(&p.file_extension);

        StorageLocation {
            bucket: CONTRIBUTIONS_BUCKET.to_string(),
            directory,
            file_name,
        }
    }
}

/// Records which chains were assembled.
pub struct RecordingAssembler {
    assembled: Arc<RwLock<Vec<String>>>,
    fail: AtomicBool,
}

impl RecordingAssembler {
    pub fn new() -> Self {
        Self {
            assembled: Arc::new(RwLock::new(Vec::new())),
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn assembled(&self) -> Vec<String> {
        self.assembled.read().await.clone()
    }
}

impl Default for RecordingAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentAssembler for RecordingAssembler {
    async fn assemble(&self, root_contribution_id: &str) -> Result<(), CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("assembler", "assembly failed"));
        }
        self.assembled
            .write()
            .await
            .push(root_contribution_id.to_string());
        Ok(())
    }
}
