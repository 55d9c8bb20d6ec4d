//! Scroll controller — pins the viewport to the newest message.
//!
//! DESIGN
//! ======
//! A buffer update only records a pending target row count. The scroll is
//! issued when the rendering layer reports that at least that many rows have
//! been laid out (`content_settled`), so the command never races layout.
//! Several updates before one settle collapse into a single scroll.

use std::time::Duration;

pub const DEFAULT_SCROLL_DURATION_MS: u64 = 200;

/// Instruction for the rendering layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollCommand {
    /// Smoothly scroll so row `last_index` is the bottom row.
    ToBottom { last_index: usize, duration: Duration },
}

#[derive(Clone, Debug)]
pub struct ScrollController {
    duration: Duration,
    pending: Option<usize>,
}

impl Default for ScrollController {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_SCROLL_DURATION_MS))
    }
}

impl ScrollController {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { duration, pending: None }
    }

    /// Request a scroll once `target_rows` rows are on screen.
    pub fn request(&mut self, target_rows: usize) {
        self.pending = Some(self.pending.map_or(target_rows, |p| p.max(target_rows)));
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Layout finished with `rendered_rows` rows. Emits the pending scroll,
    /// if any, once the rendered content has caught up.
    pub fn content_settled(&mut self, rendered_rows: usize) -> Option<ScrollCommand> {
        let target = self.pending?;
        if rendered_rows == 0 || rendered_rows < target {
            return None;
        }
        self.pending = None;
        Some(ScrollCommand::ToBottom { last_index: rendered_rows - 1, duration: self.duration })
    }
}

#[cfg(test)]
#[path = "scroll_test.rs"]
mod scroll_test;
