//! Fallback chain
//!
//! Each failed step retries with the next lower-ranked category until
//! `chat` fails. The chain is therefore at most one step per category long.

use crate::category::TaskCategory;

/// Iterator over the categories tried for one request
#[derive(Debug, Clone)]
pub struct FallbackChain {
    next: Option<TaskCategory>,
}

impl FallbackChain {
    /// Chain starting at `start`
    #[must_use]
    pub fn new(start: TaskCategory) -> Self {
        Self { next: Some(start) }
    }

    /// Upper bound on the number of steps of any chain
    #[must_use]
    pub const fn max_len() -> usize {
        TaskCategory::ALL.len()
    }
}

impl Iterator for FallbackChain {
    type Item = TaskCategory;

    fn next(&mut self) -> Option<TaskCategory> {
        let current = self.next?;
        self.next = current.degrade();
        Some(current)
    }
}
