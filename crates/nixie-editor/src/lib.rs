//! The split editing view core: debounced live preview, debounced autosave,
//! and the AI-fix review workflow, reconciled against their own sequence
//! tokens so stale async results never corrupt visible state.
//!
//! Everything here runs on cooperative tokio concurrency; the only
//! interleaving comes from collaborator round trips. Render and save write
//! disjoint state, so no ordering is imposed between them.

pub mod autosave;
pub mod render;
pub mod session;
pub mod split;

pub use autosave::{Autosave, SaveView};
pub use render::{RenderGate, RenderView};
pub use session::{EditorSession, SessionSeed};
pub use split::SplitPane;
