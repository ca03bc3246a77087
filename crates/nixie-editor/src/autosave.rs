//! Debounced autosave with stale-write protection.
//!
//! One quiescence timer, cancel-and-restart on every qualifying edit. A
//! completed write only marks the text persisted if nothing newer arrived
//! while it was on the wire; an edit made during the round trip always gets
//! its own save cycle instead of being silently dropped. Failures are
//! surfaced and otherwise ignored: the next qualifying edit retries with the
//! full accumulated diff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use nixie_core::collaborators::DiagramStore;
use nixie_core::AUTOSAVE_DELAY;

/// Observable save status.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveView {
    pub is_saving: bool,
    pub last_saved_at: Option<SystemTime>,
    pub error: Option<String>,
}

pub struct Autosave {
    inner: Arc<SaveInner>,
}

struct SaveInner {
    store: Arc<dyn DiagramStore>,
    diagram_id: String,
    enabled: AtomicBool,
    state: Mutex<SaveState>,
}

struct SaveState {
    current: String,
    last_persisted: String,
    /// Text of the write currently on the wire, if any.
    in_flight: Option<String>,
    pending: Option<CancellationToken>,
    view: SaveView,
}

impl Autosave {
    /// `initial_text` is the text loaded at session start; it never triggers
    /// a save on its own.
    pub fn new(
        store: Arc<dyn DiagramStore>,
        diagram_id: impl Into<String>,
        initial_text: &str,
        enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(SaveInner {
                store,
                diagram_id: diagram_id.into(),
                enabled: AtomicBool::new(enabled),
                state: Mutex::new(SaveState {
                    current: initial_text.to_string(),
                    last_persisted: initial_text.to_string(),
                    in_flight: None,
                    pending: None,
                    view: SaveView::default(),
                }),
            }),
        }
    }

    /// Feed the current text after an edit. Arms (or re-arms) the debounce
    /// timer when there is something new to persist.
    pub fn observe(&self, text: &str) {
        let mut state = self.inner.state.lock().unwrap();
        state.current = text.to_string();

        if !self.inner.enabled.load(Ordering::SeqCst) {
            return;
        }
        if state.current == state.last_persisted {
            // Nothing new to persist; disarm any pending timer.
            if let Some(token) = state.pending.take() {
                token.cancel();
            }
            return;
        }

        let token = CancellationToken::new();
        if let Some(prev) = state.pending.replace(token.clone()) {
            prev.cancel();
        }
        drop(state);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(AUTOSAVE_DELAY) => {}
            }
            inner.save_due().await;
        });
    }

    pub fn view(&self) -> SaveView {
        self.inner.state.lock().unwrap().view.clone()
    }

    /// Whether the current text differs from the last persisted one.
    pub fn is_dirty(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        state.current != state.last_persisted
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }
}

impl SaveInner {
    async fn save_due(&self) {
        let text = {
            let mut state = self.state.lock().unwrap();
            state.pending = None;
            if !self.enabled.load(Ordering::SeqCst) {
                return;
            }
            if state.current == state.last_persisted {
                return;
            }
            if state.in_flight.as_deref() == Some(state.current.as_str()) {
                // An identical write is already on the wire.
                return;
            }
            let text = state.current.clone();
            state.in_flight = Some(text.clone());
            state.view.is_saving = true;
            state.view.error = None;
            text
        };

        let result = self.store.update_diagram(&self.diagram_id, &text).await;

        let mut state = self.state.lock().unwrap();
        match result {
            Ok(()) => {
                // Only mark persisted if the sent text is still current; an
                // edit that arrived mid-flight already armed its own cycle.
                if state.current == text {
                    state.last_persisted = text.clone();
                }
                state.view.last_saved_at = Some(SystemTime::now());
                state.view.error = None;
            }
            Err(e) => {
                log::warn!("autosave failed for {}: {e}", self.diagram_id);
                state.view.error = Some(e.to_string());
            }
        }
        if state.in_flight.as_deref() == Some(text.as_str()) {
            state.in_flight = None;
        }
        state.view.is_saving = state.in_flight.is_some();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nixie_core::collaborators::StoreError;
    use std::time::Duration;
    use tokio::time::sleep;

    struct FakeStore {
        calls: Mutex<Vec<String>>,
        delay: Duration,
        fail_next: AtomicBool,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                fail_next: AtomicBool::new(false),
            }
        }

        fn with_delay(mut self, millis: u64) -> Self {
            self.delay = Duration::from_millis(millis);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DiagramStore for FakeStore {
        async fn update_diagram(&self, _id: &str, code: &str) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push(code.to_string());
            if self.delay > Duration::ZERO {
                sleep(self.delay).await;
            }
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Unknown("network unreachable".to_string()));
            }
            Ok(())
        }

        async fn set_visibility(&self, _id: &str, _is_public: bool) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn autosave_with(store: Arc<FakeStore>) -> Autosave {
        Autosave::new(store, "d1", "seed", true)
    }

    #[tokio::test(start_paused = true)]
    async fn seed_text_never_saves() {
        let store = Arc::new(FakeStore::new());
        let autosave = autosave_with(store.clone());

        autosave.observe("seed");
        sleep(Duration::from_millis(3000)).await;
        assert!(store.calls().is_empty());
        assert!(!autosave.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_saves_once_with_the_last_text() {
        let store = Arc::new(FakeStore::new());
        let autosave = autosave_with(store.clone());

        autosave.observe("a");
        sleep(Duration::from_millis(100)).await;
        autosave.observe("ab");
        sleep(Duration::from_millis(100)).await;
        autosave.observe("abc");
        assert!(autosave.is_dirty());

        sleep(Duration::from_millis(2500)).await;
        assert_eq!(store.calls(), vec!["abc"]);
        assert!(!autosave.is_dirty());
        let view = autosave.view();
        assert!(view.last_saved_at.is_some());
        assert_eq!(view.error, None);
        assert!(!view.is_saving);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_text_is_saved_exactly_once() {
        let store = Arc::new(FakeStore::new());
        let autosave = autosave_with(store.clone());

        autosave.observe("v1");
        sleep(Duration::from_millis(2500)).await;
        autosave.observe("v1");
        sleep(Duration::from_millis(2500)).await;

        assert_eq!(store.calls(), vec!["v1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_surfaces_and_leaves_the_dirty_flag_set() {
        let store = Arc::new(FakeStore::new());
        store.fail_next.store(true, Ordering::SeqCst);
        let autosave = autosave_with(store.clone());

        autosave.observe("v1");
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(autosave.view().error.as_deref(), Some("network unreachable"));
        assert!(autosave.is_dirty());

        // No automatic retry loop...
        sleep(Duration::from_millis(5000)).await;
        assert_eq!(store.calls().len(), 1);

        // ...the next qualifying edit retries with the accumulated diff.
        autosave.observe("v2");
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(store.calls(), vec!["v1", "v2"]);
        assert_eq!(autosave.view().error, None);
        assert!(!autosave.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_the_round_trip_is_not_lost() {
        let store = Arc::new(FakeStore::new().with_delay(500));
        let autosave = autosave_with(store.clone());

        autosave.observe("v1");
        // Let the debounce mature so the v1 write is on the wire.
        sleep(Duration::from_millis(2050)).await;
        autosave.observe("v2");

        // v1 completes, but v2 arrived mid-flight: still dirty.
        sleep(Duration::from_millis(500)).await;
        assert!(autosave.is_dirty());

        sleep(Duration::from_millis(2600)).await;
        assert_eq!(store.calls(), vec!["v1", "v2"]);
        assert!(!autosave.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn identical_in_flight_write_is_not_duplicated() {
        let store = Arc::new(FakeStore::new().with_delay(3000));
        let autosave = autosave_with(store.clone());

        autosave.observe("v1");
        sleep(Duration::from_millis(2100)).await;
        // The v1 write is on the wire for another ~2.9s. Re-observing the
        // same text arms a timer whose maturation must not issue a duplicate.
        autosave.observe("v1");
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(store.calls().len(), 1);

        sleep(Duration::from_millis(2000)).await;
        assert_eq!(store.calls().len(), 1);
        assert!(!autosave.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_autosave_never_writes() {
        let store = Arc::new(FakeStore::new());
        let autosave = Autosave::new(store.clone(), "d1", "seed", false);

        autosave.observe("v1");
        sleep(Duration::from_millis(5000)).await;
        assert!(store.calls().is_empty());
    }
}
