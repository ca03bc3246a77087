//! Contracts for the external services the editing core runs against.
//!
//! Nixie itself owns none of these: rendering is delegated to a diagram
//! library, persistence and the credit ledger live behind a remote API, and
//! the completion service is an opaque text-in/text-out model call. Each
//! trait is the minimal surface the core needs; production impls live with
//! the embedding application, tests use in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::{CreditTransactionType, DeductOutcome, UserCredits};

/// Failure reported by the diagram-rendering library. The message is shown
/// to the user verbatim in the preview pane.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// The diagram-rendering library. `parse` validates syntax without producing
/// output; `render` turns source into display markup under a caller-chosen
/// element id.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn parse(&self, text: &str) -> Result<(), RenderError>;
    async fn render(&self, id: &str, text: &str) -> Result<String, RenderError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("diagram not found")]
    NotFound,
    #[error("permission denied")]
    Denied,
    #[error("{0}")]
    Unknown(String),
}

/// Persistence collaborator for diagram rows. Update-by-id only; the CRUD
/// surface around projects and diagram listings is not this core's concern.
#[async_trait]
pub trait DiagramStore: Send + Sync {
    async fn update_diagram(&self, id: &str, code: &str) -> Result<(), StoreError>;
    async fn set_visibility(&self, id: &str, is_public: bool) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    /// The user has no credits row yet. Recoverable via `initialize_account`.
    #[error("credits account not initialized")]
    NotInitialized,
    #[error("{0}")]
    Unavailable(String),
}

/// The remote credit ledger. `deduct` is atomic and serialized per user at
/// the service boundary; `initialize_account` is idempotent and safe to race.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn initialize_account(&self, user_id: &str) -> Result<UserCredits, LedgerError>;

    async fn deduct(
        &self,
        user_id: &str,
        amount: i64,
        tx_type: CreditTransactionType,
        reference_id: Option<&str>,
        metadata: Value,
    ) -> Result<DeductOutcome, LedgerError>;

    async fn fetch(&self, user_id: &str) -> Result<Option<UserCredits>, LedgerError>;

    async fn add(
        &self,
        user_id: &str,
        amount: i64,
        tx_type: CreditTransactionType,
        reference_id: Option<&str>,
        metadata: Value,
    ) -> Result<UserCredits, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("completion backend not configured")]
    NotConfigured,
    #[error("{0}")]
    Backend(String),
}

/// Opaque text-completion service. No structured output is guaranteed beyond
/// plain text that may contain a fenced code block.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError>;

    /// Whether the backend has everything it needs to accept a call.
    fn configured(&self) -> bool {
        true
    }

    /// Backend name for support-facing messages.
    fn provider_name(&self) -> String {
        "unknown".to_string()
    }
}

/// Session/identity provider. `None` means no authenticated user, which the
/// core treats as a hard precondition failure rather than a recoverable state.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Option<String>;
}
