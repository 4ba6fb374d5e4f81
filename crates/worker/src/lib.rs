//! The dialectic job worker.
//!
//! Executes queued generation jobs for the multi-stage document pipeline:
//!
//! 1. **Gather** the job's declared inputs
//! 2. **Preflight** the wallet (SSOT output cap, headroom, NSF, rationality)
//! 3. **Compress** oversized prompts cheapest-candidate-first
//! 4. **Normalize** turn alternation and **invoke** the model
//! 5. **Persist** the chunk and **schedule** continuation, assembly or render
//!
//! All external services are injected through [`WorkerDeps`].

pub mod context;
pub mod continuation;
pub mod executor;
pub mod followon;
pub mod gather;
pub mod persist;
pub mod settings;

pub use context::{CharEstimateCounter, CompressionStrategy, SimilarityStrategy, TurnNormalizer};
pub use continuation::{ChunkPlan, ChunkState, ResponseVerdict, classify_response};
pub use executor::{JobExecutor, JobOutcome, WorkerDeps};
pub use followon::{FollowOnScheduler, RenderPayload};
pub use gather::ArtifactGatherer;
pub use persist::StorageRegistrar;
pub use settings::EngineSettings;
