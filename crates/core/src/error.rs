//! Error types for the dialectic worker domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`CoreError`] wraps them all
//! so job-level callers can classify a failure without matching on strings.

use thiserror::Error;

/// Broad classification used by the job runner to decide how to surface a
/// failure (fail the job, mark it unaffordable, or schedule a retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Affordability,
    ContextWindow,
    Parsing,
    Infrastructure,
}

/// The top-level error type for all worker operations.
#[derive(Debug, Error)]
pub enum CoreError {
    // --- Payload / input errors ---
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // --- Wallet / cost errors ---
    #[error("Budget error: {0}")]
    Budget(#[from] BudgetError),

    // --- Sizing errors ---
    #[error("Context window error: {0}")]
    ContextWindow(#[from] ContextWindowError),

    // --- Upload / registration errors ---
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    // --- External service errors ---
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Budget(e) => e.category(),
            Self::ContextWindow(_) => ErrorCategory::ContextWindow,
            Self::Persist(_) | Self::Collaborator(_) => ErrorCategory::Infrastructure,
            Self::Serialization(_) => ErrorCategory::Parsing,
        }
    }

    /// Stable machine-readable code for the failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::Budget(e) => e.code(),
            Self::ContextWindow(_) => "context_window_exceeded",
            Self::Persist(PersistError::RegistrationFailed { .. }) => "registration_failed",
            Self::Persist(_) => "upload_failed",
            Self::Collaborator(_) => "collaborator_failed",
            Self::Serialization(_) => "serialization_failed",
        }
    }
}

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

// --- Bounded context errors ---

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Job payload is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("continuation_count must be a positive integer for continuation jobs (got {found})")]
    InvalidContinuationCount { found: String },

    #[error("Continuation job is missing document_relationships entry for stage '{stage}'")]
    MissingChainRoot { stage: String },

    #[error("Required input document '{document_key}' for stage '{stage}' was not found")]
    RequiredInputMissing { document_key: String, stage: String },

    #[error("Failed to download '{path}' from bucket '{bucket}': {reason}")]
    DownloadFailed {
        bucket: String,
        path: String,
        reason: String,
    },

    #[error("Artifact '{id}' has an invalid storage location: {reason}")]
    InvalidStorageLocation { id: String, reason: String },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::InvalidContinuationCount { .. } => "invalid_continuation_count",
            Self::MissingChainRoot { .. } => "missing_chain_root",
            Self::RequiredInputMissing { .. } => "required_input_missing",
            Self::DownloadFailed { .. } => "download_failed",
            Self::InvalidStorageLocation { .. } => "invalid_storage_location",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetError {
    #[error("Wallet is required to process model calls.")]
    WalletRequired,

    #[error("Model '{model}' is misconfigured: {reason}")]
    MisconfiguredModel { model: String, reason: String },

    #[error(
        "Insufficient funds for the entire operation: estimated cost {required:.2} exceeds balance {balance:.2}"
    )]
    InsufficientFunds { required: f64, balance: f64 },

    #[error(
        "Estimated input cost {estimated:.2} exceeds {percent}% of the user's balance ({balance:.2})"
    )]
    RationalityThreshold {
        estimated: f64,
        balance: f64,
        percent: u32,
    },
}

impl BudgetError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::WalletRequired | Self::MisconfiguredModel { .. } => ErrorCategory::Validation,
            Self::InsufficientFunds { .. } | Self::RationalityThreshold { .. } => {
                ErrorCategory::Affordability
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::WalletRequired => "wallet_required",
            Self::MisconfiguredModel { .. } => "model_misconfigured",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::RationalityThreshold { .. } => "rationality_threshold",
        }
    }
}

/// Why a prompt could not be made to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextWindowReason {
    /// The prompt fits the window but leaves no room for the output cap.
    ExceedsHeadroom,
    /// Every compression candidate was summarized and the prompt is still too large.
    CompressionExhausted,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("prompt of {tokens} tokens exceeds the allowed input of {limit} tokens ({reason:?})")]
pub struct ContextWindowError {
    pub tokens: u64,
    pub limit: u64,
    pub reason: ContextWindowReason,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Upload of '{path}' failed: {reason}")]
    UploadFailed { path: String, reason: String },

    #[error("Registration failed for '{path}': {reason}{}", cleanup_note(.cleanup_error))]
    RegistrationFailed {
        path: String,
        reason: String,
        /// `None` when the orphaned upload was removed.
        cleanup_error: Option<String>,
    },
}

fn cleanup_note(cleanup_error: &Option<String>) -> String {
    match cleanup_error {
        Some(e) => format!(" (orphan cleanup also failed: {e})"),
        None => String::new(),
    }
}

/// A failure reported by an injected service (store, wallet, model, queue).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{service}: {message}")]
pub struct CollaboratorError {
    pub service: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}
