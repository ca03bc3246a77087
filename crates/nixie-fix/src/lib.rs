//! AI-assisted syntax fixing.
//!
//! Drives one fix attempt through a fixed pipeline:
//! `Idle -> Validating -> QuotaCheck -> Calling -> {Success | Failed} -> Idle`.
//! A credit is spent before the completion call and is never refunded if the
//! call fails downstream. Deduct-then-work is the anti-abuse policy: the
//! expensive operation is never performed on an unpaid request.

mod engine;
mod parse;
mod prompt;
mod sanitize;

pub use engine::LlmCompletion;
pub use sanitize::{error_hash, looks_like_diagram, sanitize_input};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use nixie_core::collaborators::{CompletionService, IdentityProvider};
use nixie_core::{
    CreditTransactionType, FixOutcome, AI_FIX_COST, MAX_CODE_LEN, MAX_ERROR_MESSAGE_LEN,
};
use nixie_credits::{CreditsClient, CreditsError};

/// Upper bound on one completion call. The collaborator owns its own retry
/// and transport timeouts; this is the last-resort watchdog that keeps a
/// hung call from pinning the session in `Calling` forever.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixPhase {
    Idle,
    Validating,
    QuotaCheck,
    Calling,
}

#[derive(Debug, Clone)]
pub struct FixRequest {
    pub code: String,
    pub error_message: String,
    pub diagram_id: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FixError {
    #[error("you must be signed in to use AI fix")]
    NotAuthenticated,
    #[error("AI provider \"{provider}\" is not configured. Please contact support.")]
    NotConfigured { provider: String },
    #[error("{0}")]
    Validation(String),
    #[error("insufficient credits")]
    InsufficientCredits {
        /// Last balance reported by the ledger, for display.
        balance: i64,
    },
    /// The model responded but produced nothing usable. The spent credit is
    /// not refunded.
    #[error("{0}")]
    NoFix(String),
    /// Transient collaborator failure. Deliberately generic: internal detail
    /// is logged server-side only.
    #[error("An error occurred while processing your request. Please try again.")]
    Service,
}

pub struct SyntaxFixer {
    identity: Arc<dyn IdentityProvider>,
    credits: CreditsClient,
    completion: Arc<dyn CompletionService>,
    call_timeout: Duration,
    phase: Mutex<FixPhase>,
}

impl SyntaxFixer {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        credits: CreditsClient,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            identity,
            credits,
            completion,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            phase: Mutex::new(FixPhase::Idle),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn phase(&self) -> FixPhase {
        *self.phase.lock().unwrap()
    }

    pub fn credits(&self) -> &CreditsClient {
        &self.credits
    }

    /// Run one fix attempt. Does not mutate any editor state: the result is
    /// a reviewable outcome the caller applies only on explicit user accept.
    pub async fn fix(&self, request: FixRequest) -> Result<FixOutcome, FixError> {
        let result = self.run(request).await;
        self.set_phase(FixPhase::Idle);
        result
    }

    async fn run(&self, request: FixRequest) -> Result<FixOutcome, FixError> {
        let user_id = self
            .identity
            .current_user()
            .await
            .ok_or(FixError::NotAuthenticated)?;

        if !self.completion.configured() {
            return Err(FixError::NotConfigured {
                provider: self.completion.provider_name(),
            });
        }

        self.set_phase(FixPhase::Validating);
        let (code, error_message) = validate(&request)?;

        self.set_phase(FixPhase::QuotaCheck);
        let hash_input: String = error_message.chars().take(100).collect();
        let metadata = json!({ "error_hash": sanitize::error_hash(&hash_input) });
        let credits_remaining = self
            .credits
            .deduct(
                &user_id,
                AI_FIX_COST,
                CreditTransactionType::AiFix,
                request.diagram_id.as_deref(),
                metadata,
            )
            .await
            .map_err(|e| match e {
                CreditsError::InsufficientCredits { balance } => {
                    FixError::InsufficientCredits { balance }
                }
                CreditsError::LedgerUnavailable => FixError::Service,
            })?;

        self.set_phase(FixPhase::Calling);
        let user_message = prompt::user_message(&code, &error_message);
        let call = self
            .completion
            .complete(prompt::SYSTEM_PROMPT, &user_message);
        let text = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                log::error!("ai fix completion failed: {e}");
                return Err(FixError::Service);
            }
            Err(_) => {
                log::error!(
                    "ai fix completion timed out after {:?}",
                    self.call_timeout
                );
                return Err(FixError::Service);
            }
        };

        match parse::extract_fixed_code(&text) {
            Some(fixed_code) => Ok(FixOutcome {
                fixed_code,
                explanation: parse::extract_explanation(&text),
                credits_remaining,
            }),
            None if text.contains("ERROR:") || text.contains("Invalid input") => {
                Err(FixError::NoFix(
                    "Unable to process the provided code. Please ensure it is valid Mermaid syntax."
                        .to_string(),
                ))
            }
            None => Err(FixError::NoFix(
                "Unable to generate a fix. Please check your diagram syntax manually.".to_string(),
            )),
        }
    }

    fn set_phase(&self, phase: FixPhase) {
        *self.phase.lock().unwrap() = phase;
    }
}

fn validate(request: &FixRequest) -> Result<(String, String), FixError> {
    if request.code.is_empty() {
        return Err(FixError::Validation("Code is required".to_string()));
    }
    if request.code.len() > MAX_CODE_LEN {
        return Err(FixError::Validation(format!(
            "Code must be less than {MAX_CODE_LEN} characters"
        )));
    }
    if request.error_message.is_empty() {
        return Err(FixError::Validation("Error message is required".to_string()));
    }
    if request.error_message.len() > MAX_ERROR_MESSAGE_LEN {
        return Err(FixError::Validation(format!(
            "Error message must be less than {MAX_ERROR_MESSAGE_LEN} characters"
        )));
    }
    if !sanitize::looks_like_diagram(&request.code) {
        return Err(FixError::Validation(
            "Input does not appear to be valid Mermaid diagram code".to_string(),
        ));
    }
    Ok((
        sanitize::sanitize_input(&request.code),
        sanitize::sanitize_input(&request.error_message),
    ))
}
