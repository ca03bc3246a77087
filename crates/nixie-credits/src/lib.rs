//! Client for the remote credit ledger.
//!
//! The ledger guarantees atomic, per-user-serialized deductions; this client
//! adds the lazy-initialization handshake on top. A deduction that succeeds
//! is final: there is no refund path, even when the operation the credit
//! paid for fails downstream. Callers must deduct before doing the expensive
//! work, never after.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;

use nixie_core::collaborators::{CreditLedger, LedgerError};
use nixie_core::{CreditTransactionType, DeductOutcome, UserCredits};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CreditsError {
    #[error("insufficient credits")]
    InsufficientCredits {
        /// Balance reported by the ledger, unchanged by the refused call.
        balance: i64,
    },
    #[error("credit service unavailable")]
    LedgerUnavailable,
}

#[derive(Clone)]
pub struct CreditsClient {
    ledger: Arc<dyn CreditLedger>,
    last_known: Arc<Mutex<Option<UserCredits>>>,
}

impl CreditsClient {
    pub fn new(ledger: Arc<dyn CreditLedger>) -> Self {
        Self {
            ledger,
            last_known: Arc::new(Mutex::new(None)),
        }
    }

    /// The most recent balance observed by this client, if any. Loaded
    /// lazily on first use and refreshed after every deduction.
    pub fn last_known(&self) -> Option<UserCredits> {
        self.last_known.lock().unwrap().clone()
    }

    /// Deduct `amount` credits atomically. If the account does not exist yet
    /// the client initializes it (idempotent, safe to race with another
    /// session) and retries the deduction exactly once; a second failure is
    /// surfaced as `LedgerUnavailable` rather than swallowed.
    pub async fn deduct(
        &self,
        user_id: &str,
        amount: i64,
        tx_type: CreditTransactionType,
        reference_id: Option<&str>,
        metadata: Value,
    ) -> Result<i64, CreditsError> {
        let first = self
            .ledger
            .deduct(user_id, amount, tx_type, reference_id, metadata.clone())
            .await;

        let outcome = match first {
            Ok(outcome) => outcome,
            Err(LedgerError::NotInitialized) => {
                self.ledger
                    .initialize_account(user_id)
                    .await
                    .map_err(|e| {
                        log::warn!("credit account init failed for {user_id}: {e}");
                        CreditsError::LedgerUnavailable
                    })?;
                self.ledger
                    .deduct(user_id, amount, tx_type, reference_id, metadata)
                    .await
                    .map_err(|e| {
                        log::warn!("credit deduction retry failed for {user_id}: {e}");
                        CreditsError::LedgerUnavailable
                    })?
            }
            Err(e) => {
                log::warn!("credit deduction failed for {user_id}: {e}");
                return Err(CreditsError::LedgerUnavailable);
            }
        };

        self.settle(user_id, amount, outcome)
    }

    /// Fetch the user's credits, creating the account on first need.
    pub async fn get_or_initialize(&self, user_id: &str) -> Result<UserCredits, CreditsError> {
        let fetched = self.ledger.fetch(user_id).await.map_err(|e| {
            log::warn!("credit fetch failed for {user_id}: {e}");
            CreditsError::LedgerUnavailable
        })?;

        let credits = match fetched {
            Some(credits) => credits,
            None => self.ledger.initialize_account(user_id).await.map_err(|e| {
                log::warn!("credit account init failed for {user_id}: {e}");
                CreditsError::LedgerUnavailable
            })?,
        };

        *self.last_known.lock().unwrap() = Some(credits.clone());
        Ok(credits)
    }

    /// Non-mutating balance check. A user with no account yet has balance 0.
    pub async fn check(&self, user_id: &str, required: i64) -> Result<bool, CreditsError> {
        let balance = match self.ledger.fetch(user_id).await {
            Ok(Some(credits)) => credits.balance,
            Ok(None) => 0,
            Err(e) => {
                log::warn!("credit check failed for {user_id}: {e}");
                return Err(CreditsError::LedgerUnavailable);
            }
        };
        Ok(balance >= required)
    }

    /// Grant credits (purchases, bonuses). Pass-through to the ledger.
    pub async fn add(
        &self,
        user_id: &str,
        amount: i64,
        tx_type: CreditTransactionType,
        reference_id: Option<&str>,
        metadata: Value,
    ) -> Result<UserCredits, CreditsError> {
        let credits = self
            .ledger
            .add(user_id, amount, tx_type, reference_id, metadata)
            .await
            .map_err(|e| {
                log::warn!("credit grant failed for {user_id}: {e}");
                CreditsError::LedgerUnavailable
            })?;
        *self.last_known.lock().unwrap() = Some(credits.clone());
        Ok(credits)
    }

    fn settle(
        &self,
        user_id: &str,
        amount: i64,
        outcome: DeductOutcome,
    ) -> Result<i64, CreditsError> {
        let mut cached = self.last_known.lock().unwrap();
        match cached.as_mut() {
            Some(credits) if credits.user_id == user_id => {
                credits.balance = outcome.new_balance;
                if outcome.success {
                    credits.lifetime_used += amount;
                }
            }
            _ => {}
        }
        drop(cached);

        if outcome.success {
            Ok(outcome.new_balance)
        } else {
            Err(CreditsError::InsufficientCredits {
                balance: outcome.new_balance,
            })
        }
    }
}
