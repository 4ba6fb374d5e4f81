//! Artifact gathering.
//!
//! Resolves a job's declared inputs against the artifact stores and
//! downloads their content. Each input kind has a fixed store route; the
//! first store in the route that answers wins, so stores are never unioned
//! for one descriptor.

use std::collections::HashSet;
use std::sync::Arc;

use dialectic_core::{
    ArtifactQuery, ArtifactStore, CoreError, DocumentIdentity, InputDescriptor, InputKind,
    ObjectStorage, ResourceDocument, StoreKind, StoredArtifact, ValidationError,
};

/// Stores consulted for an input kind, in precedence order.
pub fn store_route(kind: &InputKind) -> &'static [StoreKind] {
    match kind {
        InputKind::Document | InputKind::SeedPrompt | InputKind::ProjectResource => {
            &[StoreKind::Resources]
        }
        InputKind::Feedback => &[StoreKind::Feedback],
        InputKind::Intermediate(_) => &[StoreKind::Resources, StoreKind::Contributions],
    }
}

pub struct ArtifactGatherer {
    resources: Arc<dyn ArtifactStore>,
    contributions: Arc<dyn ArtifactStore>,
    feedback: Arc<dyn ArtifactStore>,
    storage: Arc<dyn ObjectStorage>,
}

impl ArtifactGatherer {
    pub fn new(
        resources: Arc<dyn ArtifactStore>,
        contributions: Arc<dyn ArtifactStore>,
        feedback: Arc<dyn ArtifactStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            resources,
            contributions,
            feedback,
            storage,
        }
    }

    fn store(&self, kind: StoreKind) -> &dyn ArtifactStore {
        match kind {
            StoreKind::Resources => self.resources.as_ref(),
            StoreKind::Contributions => self.contributions.as_ref(),
            StoreKind::Feedback => self.feedback.as_ref(),
        }
    }

    /// Gather documents for every descriptor, in declaration order.
    pub async fn gather(
        &self,
        identity: &DocumentIdentity,
        descriptors: &[InputDescriptor],
    ) -> Result<Vec<ResourceDocument>, CoreError> {
        let mut seen = HashSet::new();
        let mut documents = Vec::new();

        for descriptor in descriptors {
            let stage = descriptor
                .slug
                .clone()
                .unwrap_or_else(|| identity.stage_slug.clone());
            let artifacts = self.find(identity, descriptor, &stage).await?;

            if artifacts.is_empty() {
                if descriptor.required {
                    return Err(ValidationError::RequiredInputMissing {
                        document_key: descriptor.document_key.clone(),
                        stage,
                    }
                    .into());
                }
                tracing::debug!(
                    document_key = %descriptor.document_key,
                    stage = %stage,
                    "Optional input not found, skipping"
                );
                continue;
            }

            for artifact in artifacts {
                if !seen.insert(artifact.id.clone()) {
                    continue;
                }
                match self.download(&artifact).await {
                    Ok(content) => documents.push(ResourceDocument {
                        id: artifact.id,
                        content,
                        document_key: artifact
                            .document_key
                            .or_else(|| Some(descriptor.document_key.clone())),
                        stage_slug: artifact.stage_slug.or_else(|| Some(stage.clone())),
                        kind: Some(descriptor.kind.as_str().to_string()),
                    }),
                    Err(e) if descriptor.required => return Err(e.into()),
                    Err(e) => {
                        tracing::warn!(
                            document_key = %descriptor.document_key,
                            error = %e,
                            "Optional input could not be downloaded, skipping"
                        );
                    }
                }
            }
        }

        tracing::debug!(count = documents.len(), "Gathered input documents");
        Ok(documents)
    }

    async fn find(
        &self,
        identity: &DocumentIdentity,
        descriptor: &InputDescriptor,
        stage: &str,
    ) -> Result<Vec<StoredArtifact>, CoreError> {
        for &kind in store_route(&descriptor.kind) {
            let query = ArtifactQuery {
                // contributions are scoped by session only
                project_id: (kind != StoreKind::Contributions).then(|| identity.project_id.clone()),
                session_id: identity.session_id.clone(),
                iteration_number: identity.iteration_number,
                stage_slug: stage.to_string(),
                document_key: descriptor.document_key.clone(),
                kind: descriptor.kind.clone(),
            };
            let found = self.store(kind).find_documents(&query).await?;
            if !found.is_empty() {
                tracing::debug!(
                    store = ?kind,
                    document_key = %descriptor.document_key,
                    matches = found.len(),
                    "Input resolved"
                );
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    async fn download(&self, artifact: &StoredArtifact) -> Result<String, ValidationError> {
        if artifact.storage_bucket.trim().is_empty() || artifact.file_name.trim().is_empty() {
            return Err(ValidationError::InvalidStorageLocation {
                id: artifact.id.clone(),
                reason: "bucket and file name are required".into(),
            });
        }
        let path = artifact.object_path();
        let bytes = self
            .storage
            .download(&artifact.storage_bucket, &path)
            .await
            .map_err(|e| ValidationError::DownloadFailed {
                bucket: artifact.storage_bucket.clone(),
                path: path.clone(),
                reason: e.message,
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Append gathered documents after the existing ones, first id wins.
pub fn merge_documents(
    existing: Vec<ResourceDocument>,
    gathered: Vec<ResourceDocument>,
) -> Vec<ResourceDocument> {
    let mut seen: HashSet<String> = existing.iter().map(|d| d.id.clone()).collect();
    let mut merged = existing;
    merged.extend(gathered.into_iter().filter(|d| seen.insert(d.id.clone())));
    merged
}
