//! In-memory artifact stores and object storage.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dialectic_core::{
    ArtifactQuery, ArtifactStore, CollaboratorError, ObjectStorage, StoreKind, StoredArtifact,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// An artifact plus the scope it was stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub iteration_number: u32,
    #[serde(flatten)]
    pub artifact: StoredArtifact,
}

impl ArtifactRecord {
    fn matches(&self, query: &ArtifactQuery) -> bool {
        let project_ok = match &query.project_id {
            Some(project) => self.project_id.as_ref() == Some(project),
            None => true,
        };
        project_ok
            && self.session_id == query.session_id
            && self.iteration_number == query.iteration_number
            && self.artifact.stage_slug.as_deref() == Some(query.stage_slug.as_str())
            && self.artifact.document_key.as_deref() == Some(query.document_key.as_str())
    }
}

/// A store that keeps records in a Vec and remembers every query.
pub struct InMemoryArtifactStore {
    kind: StoreKind,
    records: Arc<RwLock<Vec<ArtifactRecord>>>,
    queries: Arc<RwLock<Vec<ArtifactQuery>>>,
}

impl InMemoryArtifactStore {
    pub fn new(kind: StoreKind) -> Self {
        Self::with_records(kind, Vec::new())
    }

    pub fn with_records(kind: StoreKind, records: Vec<ArtifactRecord>) -> Self {
        Self {
            kind,
            records: Arc::new(RwLock::new(records)),
            queries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn insert(&self, record: ArtifactRecord) {
        self.records.write().await.push(record);
    }

    pub async fn queries(&self) -> Vec<ArtifactQuery> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn find_documents(
        &self,
        query: &ArtifactQuery,
    ) -> Result<Vec<StoredArtifact>, CollaboratorError> {
        self.queries.write().await.push(query.clone());
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.matches(query))
            .map(|r| r.artifact.clone())
            .collect())
    }
}

/// Blob storage keyed by `(bucket, path)`.
pub struct InMemoryObjectStorage {
    objects: Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
    uploads: Arc<RwLock<Vec<(String, String)>>>,
    removals: Arc<RwLock<Vec<(String, String)>>>,
    failing_downloads: Arc<RwLock<HashSet<String>>>,
    fail_uploads: AtomicBool,
    fail_removals: AtomicBool,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            uploads: Arc::new(RwLock::new(Vec::new())),
            removals: Arc::new(RwLock::new(Vec::new())),
            failing_downloads: Arc::new(RwLock::new(HashSet::new())),
            fail_uploads: AtomicBool::new(false),
            fail_removals: AtomicBool::new(false),
        }
    }

    /// Seed an object without recording an upload.
    pub async fn put(&self, bucket: &str, path: &str, bytes: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), path.to_string()), bytes.into());
    }

    pub async fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    /// Make downloads of `path` fail.
    pub async fn fail_download(&self, path: &str) {
        self.failing_downloads.write().await.insert(path.to_string());
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    pub async fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.read().await.clone()
    }

    pub async fn removals(&self) -> Vec<(String, String)> {
        self.removals.read().await.clone()
    }
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, CollaboratorError> {
        if self.failing_downloads.read().await.contains(path) {
            return Err(CollaboratorError::new("storage", format!("download of {path} failed")));
        }
        self.object(bucket, path)
            .await
            .ok_or_else(|| CollaboratorError::new("storage", format!("object not found: {bucket}/{path}")))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), CollaboratorError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("storage", "upload rejected"));
        }
        self.put(bucket, path, bytes).await;
        self.uploads
            .write()
            .await
            .push((bucket.to_string(), path.to_string()));
        Ok(())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), CollaboratorError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("storage", "remove rejected"));
        }
        let mut objects = self.objects.write().await;
        let mut removals = self.removals.write().await;
        for path in paths {
            objects.remove(&(bucket.to_string(), path.clone()));
            removals.push((bucket.to_string(), path.clone()));
        }
        Ok(())
    }
}
