//! The editing session behind the split view.
//!
//! Owns the source text. Every edit fans out to the render gate and the
//! autosaver, which reconcile their own async results; nothing here blocks.
//! The AI-fix workflow stages its result as a proposal that only an explicit
//! user accept applies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nixie_core::collaborators::{DiagramStore, StoreError};
use nixie_core::FixProposal;
use nixie_fix::{FixError, FixPhase, FixRequest, SyntaxFixer};

use crate::autosave::{Autosave, SaveView};
use crate::render::{RenderGate, RenderView};
use crate::split::SplitPane;

/// Initial state, seeded from the persisted diagram row.
pub struct SessionSeed {
    pub diagram_id: String,
    pub code: String,
    pub is_public: bool,
}

pub struct EditorSession {
    diagram_id: String,
    code: Mutex<String>,
    render: RenderGate,
    autosave: Autosave,
    split: Mutex<SplitPane>,
    fixer: SyntaxFixer,
    store: Arc<dyn DiagramStore>,
    proposal: Mutex<Option<FixProposal>>,
    fix_busy: AtomicBool,
    visibility: Mutex<VisibilityState>,
}

struct VisibilityState {
    is_public: bool,
    is_saving: bool,
}

impl EditorSession {
    pub fn new(
        seed: SessionSeed,
        render: RenderGate,
        fixer: SyntaxFixer,
        store: Arc<dyn DiagramStore>,
    ) -> Self {
        let autosave = Autosave::new(Arc::clone(&store), &seed.diagram_id, &seed.code, true);
        // The loaded text gets an initial preview; it never autosaves.
        render.submit(&seed.code);
        Self {
            diagram_id: seed.diagram_id,
            code: Mutex::new(seed.code),
            render,
            autosave,
            split: Mutex::new(SplitPane::new()),
            fixer,
            store,
            proposal: Mutex::new(None),
            fix_busy: AtomicBool::new(false),
            visibility: Mutex::new(VisibilityState {
                is_public: seed.is_public,
                is_saving: false,
            }),
        }
    }

    // --- Source text ---

    pub fn code(&self) -> String {
        self.code.lock().unwrap().clone()
    }

    /// Apply a local edit. The new text re-enters the render and autosave
    /// pipelines; their results come back through `render_view`/`save_view`.
    pub fn set_code(&self, text: &str) {
        *self.code.lock().unwrap() = text.to_string();
        self.render.submit(text);
        self.autosave.observe(text);
    }

    pub fn render_view(&self) -> RenderView {
        self.render.view()
    }

    pub fn save_view(&self) -> SaveView {
        self.autosave.view()
    }

    pub fn is_dirty(&self) -> bool {
        self.autosave.is_dirty()
    }

    pub fn set_autosave_enabled(&self, enabled: bool) {
        self.autosave.set_enabled(enabled);
    }

    // --- AI fix workflow ---

    /// Ask the fixer for a corrected version of the current source. At most
    /// one proposal may be pending review, and at most one call in flight.
    pub async fn request_fix(&self) -> Result<FixProposal, FixError> {
        if self.proposal.lock().unwrap().is_some() {
            return Err(FixError::Validation(
                "a fix is already awaiting review".to_string(),
            ));
        }
        if self.fix_busy.swap(true, Ordering::SeqCst) {
            return Err(FixError::Validation(
                "a fix is already in progress".to_string(),
            ));
        }
        let result = self.run_fix().await;
        self.fix_busy.store(false, Ordering::SeqCst);
        result
    }

    async fn run_fix(&self) -> Result<FixProposal, FixError> {
        let original = self.code();
        let error_message = self.render.view().error_message.ok_or_else(|| {
            FixError::Validation("there is no parse error to fix".to_string())
        })?;

        let outcome = self
            .fixer
            .fix(FixRequest {
                code: original.clone(),
                error_message,
                diagram_id: Some(self.diagram_id.clone()),
            })
            .await?;

        let proposal = FixProposal {
            original_text: original,
            proposed_text: outcome.fixed_code,
            rationale: outcome.explanation,
        };
        *self.proposal.lock().unwrap() = Some(proposal.clone());
        Ok(proposal)
    }

    pub fn proposal(&self) -> Option<FixProposal> {
        self.proposal.lock().unwrap().clone()
    }

    pub fn fix_phase(&self) -> FixPhase {
        self.fixer.phase()
    }

    /// Apply the pending proposal as a normal edit. Returns false when no
    /// proposal is pending.
    pub fn accept_fix(&self) -> bool {
        let taken = self.proposal.lock().unwrap().take();
        match taken {
            Some(proposal) => {
                self.set_code(&proposal.proposed_text);
                true
            }
            None => false,
        }
    }

    /// Discard the pending proposal without touching the source.
    pub fn reject_fix(&self) -> bool {
        self.proposal.lock().unwrap().take().is_some()
    }

    // --- Sharing ---

    pub fn is_public(&self) -> bool {
        self.visibility.lock().unwrap().is_public
    }

    pub fn is_visibility_saving(&self) -> bool {
        self.visibility.lock().unwrap().is_saving
    }

    /// Toggle sharing optimistically: apply locally, confirm with the store,
    /// revert on failure.
    pub async fn toggle_visibility(&self) -> Result<bool, StoreError> {
        let target = {
            let mut vis = self.visibility.lock().unwrap();
            vis.is_public = !vis.is_public;
            vis.is_saving = true;
            vis.is_public
        };

        let result = self.store.set_visibility(&self.diagram_id, target).await;

        let mut vis = self.visibility.lock().unwrap();
        vis.is_saving = false;
        match result {
            Ok(()) => Ok(target),
            Err(e) => {
                vis.is_public = !target;
                log::warn!("visibility update failed for {}: {e}", self.diagram_id);
                Err(e)
            }
        }
    }

    // --- Split pane ---

    pub fn split_ratio(&self) -> f64 {
        self.split.lock().unwrap().ratio()
    }

    pub fn set_split_ratio(&self, ratio: f64) {
        self.split.lock().unwrap().set_ratio(ratio);
    }

    pub fn begin_divider_drag(&self) {
        self.split.lock().unwrap().begin_drag();
    }

    pub fn drag_divider_to(&self, pointer_x: f64, container_width: f64) {
        self.split.lock().unwrap().drag_to(pointer_x, container_width);
    }

    pub fn end_divider_drag(&self) {
        self.split.lock().unwrap().end_drag();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nixie_core::collaborators::{
        CompletionError, CompletionService, CreditLedger, DiagramRenderer, IdentityProvider,
        LedgerError, RenderError,
    };
    use nixie_core::{CreditTransactionType, DeductOutcome, UserCredits};
    use nixie_credits::CreditsClient;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::sleep;

    struct FakeRenderer;

    #[async_trait]
    impl DiagramRenderer for FakeRenderer {
        async fn parse(&self, text: &str) -> Result<(), RenderError> {
            if text.contains("oops") {
                Err(RenderError::new("Parse error on line 2"))
            } else {
                Ok(())
            }
        }

        async fn render(&self, _id: &str, text: &str) -> Result<String, RenderError> {
            Ok(format!("<svg>{text}</svg>"))
        }
    }

    struct FakeStore {
        saved: Mutex<Vec<String>>,
        fail_visibility: AtomicBool,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                saved: Mutex::new(Vec::new()),
                fail_visibility: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DiagramStore for FakeStore {
        async fn update_diagram(&self, _id: &str, code: &str) -> Result<(), StoreError> {
            self.saved.lock().unwrap().push(code.to_string());
            Ok(())
        }

        async fn set_visibility(&self, _id: &str, _is_public: bool) -> Result<(), StoreError> {
            if self.fail_visibility.load(Ordering::SeqCst) {
                Err(StoreError::Unknown("network unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct FakeIdentity;

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        async fn current_user(&self) -> Option<String> {
            Some("u1".to_string())
        }
    }

    struct FakeLedger {
        balance: Mutex<i64>,
        deduct_calls: AtomicUsize,
    }

    impl FakeLedger {
        fn with_balance(balance: i64) -> Self {
            Self {
                balance: Mutex::new(balance),
                deduct_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CreditLedger for FakeLedger {
        async fn initialize_account(&self, user_id: &str) -> Result<UserCredits, LedgerError> {
            Ok(UserCredits {
                user_id: user_id.to_string(),
                balance: *self.balance.lock().unwrap(),
                lifetime_used: 0,
            })
        }

        async fn deduct(
            &self,
            _user_id: &str,
            amount: i64,
            _tx_type: CreditTransactionType,
            _reference_id: Option<&str>,
            _metadata: Value,
        ) -> Result<DeductOutcome, LedgerError> {
            self.deduct_calls.fetch_add(1, Ordering::SeqCst);
            let mut balance = self.balance.lock().unwrap();
            if *balance < amount {
                return Ok(DeductOutcome {
                    success: false,
                    new_balance: *balance,
                    error_message: Some("insufficient credits".to_string()),
                });
            }
            *balance -= amount;
            Ok(DeductOutcome {
                success: true,
                new_balance: *balance,
                error_message: None,
            })
        }

        async fn fetch(&self, user_id: &str) -> Result<Option<UserCredits>, LedgerError> {
            Ok(Some(UserCredits {
                user_id: user_id.to_string(),
                balance: *self.balance.lock().unwrap(),
                lifetime_used: 0,
            }))
        }

        async fn add(
            &self,
            _user_id: &str,
            _amount: i64,
            _tx_type: CreditTransactionType,
            _reference_id: Option<&str>,
            _metadata: Value,
        ) -> Result<UserCredits, LedgerError> {
            unimplemented!("not exercised")
        }
    }

    struct FakeCompletion(String);

    #[async_trait]
    impl CompletionService for FakeCompletion {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, CompletionError> {
            Ok(self.0.clone())
        }
    }

    const FIX_RESPONSE: &str =
        "Replaced the broken line.\n\n```mermaid\ngraph TD\n    A --> B\n```";

    fn session_with(
        store: Arc<FakeStore>,
        ledger: Arc<FakeLedger>,
        seed_code: &str,
    ) -> EditorSession {
        let fixer = SyntaxFixer::new(
            Arc::new(FakeIdentity),
            CreditsClient::new(ledger),
            Arc::new(FakeCompletion(FIX_RESPONSE.to_string())),
        );
        EditorSession::new(
            SessionSeed {
                diagram_id: "d1".to_string(),
                code: seed_code.to_string(),
                is_public: false,
            },
            RenderGate::with_renderer(Arc::new(FakeRenderer)),
            fixer,
            store,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_fix_reenters_render_and_autosave() {
        let store = Arc::new(FakeStore::new());
        let ledger = Arc::new(FakeLedger::with_balance(5));
        let session = session_with(store.clone(), ledger, "graph TD\n    oops");

        // Initial preview surfaces the parse error.
        sleep(Duration::from_millis(600)).await;
        assert!(session.render_view().has_error());

        let proposal = session.request_fix().await.unwrap();
        assert_eq!(proposal.proposed_text, "graph TD\n    A --> B");
        assert_eq!(proposal.rationale, "Replaced the broken line.");
        // Nothing is applied yet.
        assert_eq!(session.code(), "graph TD\n    oops");

        assert!(session.accept_fix());
        assert_eq!(session.code(), "graph TD\n    A --> B");
        assert!(session.proposal().is_none());

        // The accepted text renders and persists like any edit.
        sleep(Duration::from_millis(600)).await;
        assert_eq!(
            session.render_view().markup.as_deref(),
            Some("<svg>graph TD\n    A --> B</svg>")
        );
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(*store.saved.lock().unwrap(), vec!["graph TD\n    A --> B"]);
        assert!(!session.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_fix_request_is_blocked_until_review_resolves() {
        let store = Arc::new(FakeStore::new());
        let ledger = Arc::new(FakeLedger::with_balance(5));
        let session = session_with(store, ledger.clone(), "graph TD\n    oops");

        sleep(Duration::from_millis(600)).await;
        session.request_fix().await.unwrap();

        let err = session.request_fix().await.unwrap_err();
        assert!(matches!(err, FixError::Validation(_)));
        assert_eq!(ledger.deduct_calls.load(Ordering::SeqCst), 1);

        // Resolving the review re-enables the affordance.
        assert!(session.reject_fix());
        session.request_fix().await.unwrap();
        assert_eq!(ledger.deduct_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejecting_a_proposal_leaves_the_source_untouched() {
        let store = Arc::new(FakeStore::new());
        let ledger = Arc::new(FakeLedger::with_balance(5));
        let session = session_with(store.clone(), ledger, "graph TD\n    oops");

        sleep(Duration::from_millis(600)).await;
        session.request_fix().await.unwrap();
        assert!(session.reject_fix());
        assert_eq!(session.code(), "graph TD\n    oops");
        assert!(session.proposal().is_none());

        // Rejecting twice is a no-op.
        assert!(!session.reject_fix());
        sleep(Duration::from_millis(3000)).await;
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fix_without_a_parse_error_is_rejected_before_deduction() {
        let store = Arc::new(FakeStore::new());
        let ledger = Arc::new(FakeLedger::with_balance(5));
        let session = session_with(store, ledger.clone(), "graph TD\n    A --> B");

        sleep(Duration::from_millis(600)).await;
        assert!(!session.render_view().has_error());

        let err = session.request_fix().await.unwrap_err();
        assert!(matches!(err, FixError::Validation(_)));
        assert_eq!(ledger.deduct_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn visibility_toggle_reverts_on_failure() {
        let store = Arc::new(FakeStore::new());
        let ledger = Arc::new(FakeLedger::with_balance(5));
        let session = session_with(store.clone(), ledger, "graph TD\n    A");

        assert!(!session.is_public());
        assert!(session.toggle_visibility().await.unwrap());
        assert!(session.is_public());

        store.fail_visibility.store(true, Ordering::SeqCst);
        let err = session.toggle_visibility().await.unwrap_err();
        assert_eq!(err, StoreError::Unknown("network unreachable".to_string()));
        // Reverted to the confirmed state.
        assert!(session.is_public());
    }

    #[tokio::test(start_paused = true)]
    async fn divider_drag_adjusts_the_ratio() {
        let store = Arc::new(FakeStore::new());
        let ledger = Arc::new(FakeLedger::with_balance(5));
        let session = session_with(store, ledger, "graph TD\n    A");

        session.begin_divider_drag();
        session.drag_divider_to(700.0, 1000.0);
        session.end_divider_drag();
        assert_eq!(session.split_ratio(), 0.7);

        // Pointer moves after the drag ended are ignored.
        session.drag_divider_to(100.0, 1000.0);
        assert_eq!(session.split_ratio(), 0.7);
    }
}
