//! Upload-then-register handshake.
//!
//! Bytes are uploaded first, then the record is registered. If registration
//! fails after a successful upload, the uploaded object is removed on a
//! best-effort basis so no unreferenced blob is left behind; a failed
//! removal is logged and reported inside the returned error, never raised
//! on its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dialectic_core::{
    CollaboratorError, Contribution, ContributionRegistry, ContributionUpload, ObjectStorage,
    PathNamer, PersistError, Registrar, StorageLocation,
};

/// A successful upload that has not been registered yet.
///
/// Must be either disarmed after registration or compensated.
struct PendingUpload<'a> {
    storage: &'a dyn ObjectStorage,
    location: StorageLocation,
}

impl PendingUpload<'_> {
    fn disarm(self) -> StorageLocation {
        self.location
    }

    /// Remove the orphaned object. Returns the removal error, if any.
    async fn compensate(self) -> Option<String> {
        let path = self.location.object_path();
        match self
            .storage
            .remove(&self.location.bucket, std::slice::from_ref(&path))
            .await
        {
            Ok(()) => {
                tracing::info!(bucket = %self.location.bucket, path = %path, "Removed orphaned upload");
                None
            }
            Err(e) => {
                tracing::warn!(
                    bucket = %self.location.bucket,
                    path = %path,
                    error = %e,
                    "Failed to remove orphaned upload"
                );
                Some(e.to_string())
            }
        }
    }
}

/// [`Registrar`] built from object storage and a contribution registry.
pub struct StorageRegistrar {
    storage: Arc<dyn ObjectStorage>,
    registry: Arc<dyn ContributionRegistry>,
    namer: Arc<dyn PathNamer>,
}

impl StorageRegistrar {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        registry: Arc<dyn ContributionRegistry>,
        namer: Arc<dyn PathNamer>,
    ) -> Self {
        Self {
            storage,
            registry,
            namer,
        }
    }

    async fn upload(&self, upload: &ContributionUpload) -> Result<PendingUpload<'_>, PersistError> {
        let location = self.namer.locate(upload);
        let path = location.object_path();
        self.storage
            .upload(
                &location.bucket,
                &path,
                upload.content.as_bytes().to_vec(),
                &upload.mime_type,
            )
            .await
            .map_err(|e| PersistError::UploadFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!(bucket = %location.bucket, path = %path, "Uploaded artifact");
        Ok(PendingUpload {
            storage: self.storage.as_ref(),
            location,
        })
    }
}

#[async_trait]
impl Registrar for StorageRegistrar {
    async fn upload_and_register(
        &self,
        upload: ContributionUpload,
    ) -> Result<Contribution, PersistError> {
        let pending = self.upload(&upload).await?;

        match self.registry.register(&upload, &pending.location).await {
            Ok(contribution) => {
                let location = pending.disarm();
                tracing::info!(
                    contribution_id = %contribution.id,
                    path = %location.object_path(),
                    supersedes = ?upload.supersedes(),
                    "Registered contribution"
                );
                Ok(contribution)
            }
            Err(e) => {
                let path = pending.location.object_path();
                tracing::error!(path = %path, error = %e, "Registration failed after upload");
                let cleanup_error = pending.compensate().await;
                Err(PersistError::RegistrationFailed {
                    path,
                    reason: e.to_string(),
                    cleanup_error,
                })
            }
        }
    }

    async fn set_document_relationships(
        &self,
        contribution_id: &str,
        relationships: &BTreeMap<String, String>,
    ) -> Result<(), CollaboratorError> {
        self.registry
            .update_document_relationships(contribution_id, relationships)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialectic_core::PathContext;
    use dialectic_memory::{CanonicalPathNamer, InMemoryContributionRegistry, InMemoryObjectStorage};

    fn upload() -> ContributionUpload {
        ContributionUpload {
            path: PathContext {
                project_id: "proj".into(),
                session_id: "sess".into(),
                iteration_number: 1,
                stage_slug: "thesis".into(),
                document_key: Some("business_case".into()),
                model_slug: "gpt-4o".into(),
                attempt_count: 0,
                is_continuation: false,
                turn_index: None,
                file_extension: "md".into(),
            },
            content: "# Title".into(),
            mime_type: "text/markdown".into(),
            model_id: "m1".into(),
            tokens_in: 10,
            tokens_out: 20,
            target_contribution_id: None,
            document_relationships: BTreeMap::new(),
            is_intermediate: false,
        }
    }

    fn fixture() -> (
        Arc<InMemoryObjectStorage>,
        Arc<InMemoryContributionRegistry>,
        StorageRegistrar,
    ) {
        let storage = Arc::new(InMemoryObjectStorage::new());
        let registry = Arc::new(InMemoryContributionRegistry::new());
        let registrar =
            StorageRegistrar::new(storage.clone(), registry.clone(), Arc::new(CanonicalPathNamer));
        (storage, registry, registrar)
    }

    #[tokio::test]
    async fn upload_then_register() {
        let (storage, registry, registrar) = fixture();
        let saved = registrar.upload_and_register(upload()).await.unwrap();

        assert_eq!(registry.records().await.len(), 1);
        let path = format!("{}/{}", saved.storage_path, saved.file_name);
        assert_eq!(
            storage.object(&saved.storage_bucket, &path).await,
            Some(b"# Title".to_vec())
        );
        assert!(storage.removals().await.is_empty());
    }

    #[tokio::test]
    async fn upload_failure_skips_registration() {
        let (storage, registry, registrar) = fixture();
        storage.fail_uploads(true);
        let err = registrar.upload_and_register(upload()).await.unwrap_err();
        assert!(matches!(err, PersistError::UploadFailed { .. }));
        assert!(registry.records().await.is_empty());
    }

    #[tokio::test]
    async fn registration_failure_removes_orphan() {
        let (storage, registry, registrar) = fixture();
        registry.fail_register(true);

        let err = registrar.upload_and_register(upload()).await.unwrap_err();
        let (path, cleanup_error) = match err {
            PersistError::RegistrationFailed {
                path,
                cleanup_error,
                ..
            } => (path, cleanup_error),
            other => panic!("expected registration failure, got {other:?}"),
        };
        assert!(cleanup_error.is_none());
        assert_eq!(storage.uploads().await.len(), 1);
        let removals = storage.removals().await;
        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0].1, path);
        assert!(storage.object(&removals[0].0, &path).await.is_none());
    }

    #[tokio::test]
    async fn cleanup_failure_is_reported_not_raised() {
        let (storage, registry, registrar) = fixture();
        registry.fail_register(true);
        storage.fail_removals(true);

        let err = registrar.upload_and_register(upload()).await.unwrap_err();
        match err {
            PersistError::RegistrationFailed {
                reason,
                cleanup_error,
                ..
            } => {
                assert!(reason.contains("insert rejected"));
                assert!(cleanup_error.unwrap().contains("remove rejected"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
