//! In-memory token wallet with idempotent debits.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dialectic_core::{CollaboratorError, DebitReceipt, DebitRequest, WalletService};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Wallet balances plus a ledger of every debit applied.
///
/// A debit whose idempotency key was already seen returns the original
/// receipt and leaves the balance untouched.
pub struct InMemoryWallet {
    balances: Arc<RwLock<HashMap<String, f64>>>,
    ledger: Arc<RwLock<Vec<DebitRequest>>>,
    receipts: Arc<RwLock<HashMap<String, DebitReceipt>>>,
    balance_reads: AtomicUsize,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::new())),
            ledger: Arc::new(RwLock::new(Vec::new())),
            receipts: Arc::new(RwLock::new(HashMap::new())),
            balance_reads: AtomicUsize::new(0),
        }
    }

    pub fn with_balance(wallet_id: &str, balance: f64) -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::from([(
                wallet_id.to_string(),
                balance,
            )]))),
            ..Self::new()
        }
    }

    pub async fn set_balance(&self, wallet_id: &str, balance: f64) {
        self.balances
            .write()
            .await
            .insert(wallet_id.to_string(), balance);
    }

    pub async fn balance(&self, wallet_id: &str) -> Option<f64> {
        self.balances.read().await.get(wallet_id).copied()
    }

    /// Debits actually applied, in order. Replays are not listed.
    pub async fn debits(&self) -> Vec<DebitRequest> {
        self.ledger.read().await.clone()
    }

    /// How many times `get_balance` was called.
    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletService for InMemoryWallet {
    async fn get_balance(&self, wallet_id: &str) -> Result<f64, CollaboratorError> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        self.balance(wallet_id)
            .await
            .ok_or_else(|| CollaboratorError::new("wallet", format!("unknown wallet: {wallet_id}")))
    }

    async fn debit(&self, request: DebitRequest) -> Result<DebitReceipt, CollaboratorError> {
        let mut receipts = self.receipts.write().await;
        if let Some(receipt) = receipts.get(&request.idempotency_key) {
            tracing::debug!(key = %request.idempotency_key, "Replayed debit");
            return Ok(receipt.clone());
        }

        let mut balances = self.balances.write().await;
        let balance = balances.get_mut(&request.wallet_id).ok_or_else(|| {
            CollaboratorError::new("wallet", format!("unknown wallet: {}", request.wallet_id))
        })?;
        if request.amount > *balance {
            return Err(CollaboratorError::new(
                "wallet",
                format!("insufficient balance {balance} for debit of {}", request.amount),
            ));
        }
        *balance -= request.amount;

        let receipt = DebitReceipt {
            transaction_id: Uuid::new_v4().to_string(),
            balance_after: *balance,
        };
        receipts.insert(request.idempotency_key.clone(), receipt.clone());
        self.ledger.write().await.push(request);
        Ok(receipt)
    }
}
