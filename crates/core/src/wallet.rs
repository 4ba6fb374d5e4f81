//! Token wallet contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// A request to spend from a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebitRequest {
    pub wallet_id: String,
    pub amount: f64,
    /// Replaying a debit with the same key must not charge twice.
    pub idempotency_key: String,
    pub related_entity_id: String,
    pub related_entity_type: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebitReceipt {
    pub transaction_id: String,
    pub balance_after: f64,
}

#[async_trait]
pub trait WalletService: Send + Sync {
    async fn get_balance(&self, wallet_id: &str) -> Result<f64, CollaboratorError>;

    async fn debit(&self, request: DebitRequest) -> Result<DebitReceipt, CollaboratorError>;
}
