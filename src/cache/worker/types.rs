//! Coordinator state and tick results

use serde::Serialize;

use crate::cache::recorder::CleanupReport;

/// Coordinator lifecycle: idle, then running, then stopped for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordinatorState {
    Idle,
    Running,
    Stopped,
}

/// What one promotion tick changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub promoted: usize,
    /// `None` on ticks that skip the demotion pass
    pub demoted: Option<usize>,
    pub cleanup: Option<CleanupReport>,
}

impl TickReport {
    #[inline]
    pub fn ran_demotion(&self) -> bool {
        self.demoted.is_some()
    }
}
