//! In-memory collaborators for the dialectic worker.
//!
//! Every service trait from `dialectic-core` has an implementation here that
//! keeps its state behind a `tokio::sync::RwLock` and records the calls it
//! receives, for local runs and tests.

pub mod model;
pub mod queue;
pub mod registry;
pub mod stores;
pub mod wallet;

pub use model::{
    HashingEmbedder, InMemoryMemoryIndex, ScriptedModel, ScriptedSummarizer, SummaryCall,
};
pub use queue::{EnqueuedJob, InMemoryJobQueue, RetryRecord};
pub use registry::{
    CONTRIBUTIONS_BUCKET, CanonicalPathNamer, InMemoryContributionRegistry, RecordingAssembler,
};
pub use stores::{ArtifactRecord, InMemoryArtifactStore, InMemoryObjectStorage};
pub use wallet::InMemoryWallet;
