//! Debounced, sequence-gated preview rendering.
//!
//! Every edit bumps a session-scoped sequence counter and (re)arms a single
//! quiescence timer. When the timer matures the text is parsed and rendered;
//! the result is written to the observable view only if its sequence is still
//! the newest one issued. Render cost varies wildly between diagrams, so an
//! older render can finish after a newer one; the sequence check, not
//! completion order, decides what the user sees.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use nixie_core::collaborators::DiagramRenderer;
use nixie_core::RENDER_DEBOUNCE;

/// Observable preview state. A parse failure is display state here, not an
/// exceptional path: the next keystroke supersedes it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderView {
    pub markup: Option<String>,
    pub error_message: Option<String>,
    pub is_rendering: bool,
}

impl RenderView {
    /// Whether the AI-fix affordance should be offered.
    pub fn has_error(&self) -> bool {
        self.error_message.is_some()
    }
}

type RendererFuture = Pin<Box<dyn Future<Output = Arc<dyn DiagramRenderer>> + Send>>;
type RendererFactory = Box<dyn Fn() -> RendererFuture + Send + Sync>;

pub struct RenderGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    factory: RendererFactory,
    renderer: OnceCell<Arc<dyn DiagramRenderer>>,
    seq: AtomicU64,
    debounce: Duration,
    state: Mutex<GateState>,
}

#[derive(Default)]
struct GateState {
    view: RenderView,
    pending: Option<CancellationToken>,
}

enum Outcome {
    Ok(String),
    Err(String),
}

impl RenderGate {
    /// Build a gate around a lazily-initialized renderer. The factory runs
    /// at most once, on first need; concurrent first uses share the one
    /// initialization.
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Arc<dyn DiagramRenderer>> + Send + 'static,
    {
        Self {
            inner: Arc::new(GateInner {
                factory: Box::new(move || -> RendererFuture { Box::pin(factory()) }),
                renderer: OnceCell::new(),
                seq: AtomicU64::new(0),
                debounce: RENDER_DEBOUNCE,
                state: Mutex::new(GateState::default()),
            }),
        }
    }

    /// Gate over an already-constructed renderer instance.
    pub fn with_renderer(renderer: Arc<dyn DiagramRenderer>) -> Self {
        Self::new(move || {
            let renderer = Arc::clone(&renderer);
            async move { renderer }
        })
    }

    /// Accept an edit. Fire-and-forget: the result lands in `view()` after
    /// the quiescence interval, unless a newer edit supersedes it first.
    pub fn submit(&self, text: &str) {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        {
            let mut state = self.inner.state.lock().unwrap();
            // Cancel-and-restart: a single pending timer, never N racing ones.
            if let Some(prev) = state.pending.replace(token.clone()) {
                prev.cancel();
            }
            state.view.is_rendering = true;
        }

        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(inner.debounce) => {}
            }
            // Cancellation can race the timer; re-check before doing work.
            if inner.seq.load(Ordering::SeqCst) != seq {
                return;
            }
            let outcome = inner.render_once(seq, &text).await;
            inner.commit(seq, outcome);
        });
    }

    pub fn view(&self) -> RenderView {
        self.inner.state.lock().unwrap().view.clone()
    }
}

impl GateInner {
    async fn render_once(&self, seq: u64, text: &str) -> Outcome {
        if text.trim().is_empty() {
            return Outcome::Ok(String::new());
        }

        let renderer = self
            .renderer
            .get_or_init(|| (self.factory)())
            .await
            .clone();

        if let Err(e) = renderer.parse(text).await {
            return Outcome::Err(e.message);
        }
        match renderer.render(&format!("nixie-preview-{seq}"), text).await {
            Ok(markup) => Outcome::Ok(markup),
            Err(e) => Outcome::Err(e.message),
        }
    }

    fn commit(&self, seq: u64, outcome: Outcome) {
        let mut state = self.state.lock().unwrap();
        // Stale results are discarded silently, never an error.
        if self.seq.load(Ordering::SeqCst) != seq {
            return;
        }
        match outcome {
            Outcome::Ok(markup) => {
                state.view.markup = Some(markup);
                state.view.error_message = None;
            }
            Outcome::Err(message) => {
                state.view.error_message = Some(message);
                state.view.markup = None;
            }
        }
        state.view.is_rendering = false;
        state.pending = None;
    }
}
