//! Split-pane sizing state.
//!
//! Pure state, no rendering: the UI layer reports pointer gestures and reads
//! the ratio back. The ratio is clamped so neither pane can collapse, and it
//! is not persisted across sessions.

use nixie_core::{DEFAULT_SPLIT_RATIO, MAX_SPLIT_RATIO, MIN_SPLIT_RATIO};

#[derive(Debug, Clone)]
pub struct SplitPane {
    ratio: f64,
    dragging: bool,
}

impl Default for SplitPane {
    fn default() -> Self {
        Self::new()
    }
}

impl SplitPane {
    pub fn new() -> Self {
        Self {
            ratio: DEFAULT_SPLIT_RATIO,
            dragging: false,
        }
    }

    pub fn with_ratio(ratio: f64) -> Self {
        Self {
            ratio: clamp_ratio(ratio),
            dragging: false,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = clamp_ratio(ratio);
    }

    pub fn begin_drag(&mut self) {
        self.dragging = true;
    }

    /// Pointer-move while dragging; ignored otherwise.
    pub fn drag_to(&mut self, pointer_x: f64, container_width: f64) {
        if !self.dragging || container_width <= 0.0 {
            return;
        }
        self.ratio = clamp_ratio(pointer_x / container_width);
    }

    pub fn end_drag(&mut self) {
        self.dragging = false;
    }
}

fn clamp_ratio(ratio: f64) -> f64 {
    ratio.clamp(MIN_SPLIT_RATIO, MAX_SPLIT_RATIO)
}
