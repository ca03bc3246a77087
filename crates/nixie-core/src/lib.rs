pub mod collaborators;
pub mod settings;

use serde::{Deserialize, Serialize};
use std::time::Duration;

// --- Editor constants (matching the hosted frontend) ---

/// Quiescence interval before a preview render fires.
pub const RENDER_DEBOUNCE: Duration = Duration::from_millis(500);
/// Quiescence interval before an autosave write fires.
pub const AUTOSAVE_DELAY: Duration = Duration::from_millis(2000);
/// Default left-pane share of the split editor.
pub const DEFAULT_SPLIT_RATIO: f64 = 0.5;
/// Hard clamp on the split ratio in either direction.
pub const MIN_SPLIT_RATIO: f64 = 0.2;
pub const MAX_SPLIT_RATIO: f64 = 0.8;
/// Maximum diagram source length accepted by the AI fixer.
pub const MAX_CODE_LEN: usize = 100_000;
/// Maximum parse-error length accepted by the AI fixer.
pub const MAX_ERROR_MESSAGE_LEN: usize = 2_000;
/// Cap on the fix explanation returned to the caller.
pub const EXPLANATION_MAX_LEN: usize = 500;
/// Credits charged per AI fix.
pub const AI_FIX_COST: i64 = 1;
/// Credits granted when a ledger account is first initialized.
pub const INITIAL_CREDITS: i64 = 50;

/// Starter source for newly created diagrams.
pub const DEFAULT_TEMPLATE: &str = "graph TD\n    A[Start] --> B[End]";

// --- Credit types (matching the ledger service rows) ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserCredits {
    pub user_id: String,
    pub balance: i64,
    pub lifetime_used: i64,
}

/// Raw result row from the ledger's atomic deduct operation. `success: false`
/// with an unchanged `new_balance` means the balance was insufficient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductOutcome {
    pub success: bool,
    pub new_balance: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreditTransactionType {
    AiFix,
    Purchase,
    Bonus,
    Refund,
    Initial,
}

/// Append-only audit row the ledger records for every successful balance
/// change. Written by the ledger service itself; carried here so callers can
/// deserialize transaction history for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    pub amount: i64,
    #[serde(rename = "type")]
    pub tx_type: CreditTransactionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub resulting_balance: i64,
}

// --- AI fix types ---

/// Successful result of an AI fix call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixOutcome {
    pub fixed_code: String,
    pub explanation: String,
    pub credits_remaining: i64,
}

/// A proposed replacement for the user's diagram source, held until the user
/// accepts or rejects it. Never applied without an explicit accept.
#[derive(Debug, Clone, PartialEq)]
pub struct FixProposal {
    pub original_text: String,
    pub proposed_text: String,
    pub rationale: String,
}
