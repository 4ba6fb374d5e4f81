//! JSON fixtures for local runs.
//!
//! A fixture describes one job plus the state of every collaborator it will
//! touch. [`Fixture::backends`] turns it into seeded in-memory services.

use std::path::Path;
use std::sync::Arc;

use dialectic_config::WorkerConfig;
use dialectic_core::{
    Contribution, Job, ModelConfig, ModelResponse, PromptConstructionPayload, StoreKind,
    WalletService,
};
use dialectic_memory::{
    ArtifactRecord, CanonicalPathNamer, HashingEmbedder, InMemoryArtifactStore,
    InMemoryContributionRegistry, InMemoryJobQueue, InMemoryMemoryIndex, InMemoryObjectStorage,
    InMemoryWallet, RecordingAssembler, ScriptedModel, ScriptedSummarizer,
};
use dialectic_worker::{CharEstimateCounter, SimilarityStrategy, StorageRegistrar, WorkerDeps};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFixture {
    pub wallet_id: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactFixtures {
    #[serde(default)]
    pub resources: Vec<ArtifactRecord>,
    #[serde(default)]
    pub contributions: Vec<ArtifactRecord>,
    #[serde(default)]
    pub feedback: Vec<ArtifactRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectFixture {
    pub bucket: String,
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub job: Job,
    pub prompt: PromptConstructionPayload,
    pub model: ModelConfig,
    /// Omit to run without a wallet service.
    #[serde(default)]
    pub wallet: Option<WalletFixture>,
    #[serde(default)]
    pub responses: Vec<ModelResponse>,
    #[serde(default)]
    pub artifacts: ArtifactFixtures,
    #[serde(default)]
    pub objects: Vec<ObjectFixture>,
    /// Records already in the registry, e.g. the parent of a continuation.
    #[serde(default)]
    pub contributions: Vec<Contribution>,
    #[serde(default = "default_summary_tokens")]
    pub summary_tokens: u64,
}

fn default_summary_tokens() -> u64 {
    16
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read fixture {}: {e}", path.display()))?;
        let fixture = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse fixture {}: {e}", path.display()))?;
        Ok(fixture)
    }

    /// Build in-memory services seeded with this fixture's state.
    pub async fn backends(&self) -> Backends {
        let storage = Arc::new(InMemoryObjectStorage::new());
        for object in &self.objects {
            storage
                .put(&object.bucket, &object.path, object.content.as_str())
                .await;
        }

        let registry = Arc::new(InMemoryContributionRegistry::new());
        for record in &self.contributions {
            registry.insert(record.clone()).await;
        }

        let wallet = self
            .wallet
            .as_ref()
            .map(|w| Arc::new(InMemoryWallet::with_balance(&w.wallet_id, w.balance)));

        Backends {
            resources: Arc::new(InMemoryArtifactStore::with_records(
                StoreKind::Resources,
                self.artifacts.resources.clone(),
            )),
            contributions: Arc::new(InMemoryArtifactStore::with_records(
                StoreKind::Contributions,
                self.artifacts.contributions.clone(),
            )),
            feedback: Arc::new(InMemoryArtifactStore::with_records(
                StoreKind::Feedback,
                self.artifacts.feedback.clone(),
            )),
            storage,
            wallet,
            model: Arc::new(ScriptedModel::new(self.responses.clone())),
            summarizer: Arc::new(ScriptedSummarizer::new(self.summary_tokens)),
            registry,
            assembler: Arc::new(RecordingAssembler::new()),
            queue: Arc::new(InMemoryJobQueue::new()),
        }
    }
}

/// Seeded services, kept concrete so side effects can be reported.
pub struct Backends {
    pub resources: Arc<InMemoryArtifactStore>,
    pub contributions: Arc<InMemoryArtifactStore>,
    pub feedback: Arc<InMemoryArtifactStore>,
    pub storage: Arc<InMemoryObjectStorage>,
    pub wallet: Option<Arc<InMemoryWallet>>,
    pub model: Arc<ScriptedModel>,
    pub summarizer: Arc<ScriptedSummarizer>,
    pub registry: Arc<InMemoryContributionRegistry>,
    pub assembler: Arc<RecordingAssembler>,
    pub queue: Arc<InMemoryJobQueue>,
}

impl Backends {
    pub fn deps(&self, config: &WorkerConfig) -> WorkerDeps {
        let registrar = StorageRegistrar::new(
            self.storage.clone(),
            self.registry.clone(),
            Arc::new(CanonicalPathNamer),
        );
        WorkerDeps {
            resources: self.resources.clone(),
            contributions: self.contributions.clone(),
            feedback: self.feedback.clone(),
            storage: self.storage.clone(),
            wallet: self
                .wallet
                .clone()
                .map(|w| w as Arc<dyn WalletService>),
            model: self.model.clone(),
            counter: Arc::new(CharEstimateCounter::new(config.chars_per_token)),
            strategy: Arc::new(SimilarityStrategy::new(Arc::new(HashingEmbedder::default()))),
            summarizer: self.summarizer.clone(),
            memory_index: Arc::new(InMemoryMemoryIndex::new()),
            registrar: Arc::new(registrar),
            assembler: self.assembler.clone(),
            queue: self.queue.clone(),
        }
    }
}
