//! # Dialectic Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! dialectic generation worker. This crate holds no engine logic: it
//! defines the model that the budget, worker and in-memory crates build on.
//!
//! ## Design Philosophy
//!
//! Every external service the worker talks to (stores, wallet, model,
//! queue, registrar) is a trait here. Implementations live elsewhere:
//! - production adapters in the hosting service
//! - in-memory doubles in `dialectic-memory`

pub mod artifact;
pub mod contribution;
pub mod error;
pub mod job;
pub mod message;
pub mod model;
pub mod prompt;
pub mod queue;
pub mod rag;
pub mod wallet;

// Re-export key types at crate root for ergonomics
pub use artifact::{ArtifactQuery, ArtifactStore, ObjectStorage, StoreKind, StoredArtifact};
pub use contribution::{
    Contribution, ContributionRegistry, ContributionUpload, DocumentAssembler, PathContext,
    PathNamer, Registrar, StorageLocation,
};
pub use error::{
    BudgetError, CollaboratorError, ContextWindowError, ContextWindowReason, CoreError,
    ErrorCategory, PersistError, Result, ValidationError,
};
pub use job::{
    ChunkTarget, DocumentIdentity, InputDescriptor, InputKind, Job, JobPayload, OutputType,
    RelevanceRule,
};
pub use message::{Message, Role};
pub use model::{
    Embedding, EmbeddingClient, FinishReason, ModelConfig, ModelInvoker, ModelResponse,
    TokenCounter,
};
pub use prompt::{ModelRequest, NO_PROMPT_ID, PromptConstructionPayload, ResourceDocument, SizedPayload};
pub use queue::{FailedAttempt, JobQueue, JobType};
pub use rag::{CompressionCandidate, MemoryIndex, SourceType, Summarizer, Summary, SummaryContext};
pub use wallet::{DebitReceipt, DebitRequest, WalletService};
