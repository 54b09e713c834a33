//! Bounded log of primary tooth gaps, drained by the telemetry layer.

use crate::consts::TOOTH_LOG_SIZE;

#[cfg(not(feature = "std"))]
use heapless::Vec;
#[cfg(feature = "std")]
use std::vec::Vec;

/// Fills with tooth gaps until full, then holds them until drained.
#[derive(Debug, Default)]
pub struct ToothLog {
    /// Only records while set.
    pub enabled: bool,
    #[cfg(feature = "std")]
    entries: Vec<u32>,
    #[cfg(not(feature = "std"))]
    entries: Vec<u32, TOOTH_LOG_SIZE>,
}

impl ToothLog {
    /// An empty, disabled log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a gap if the log is enabled and not yet full.
    pub fn record(&mut self, gap: u32) {
        if !self.enabled || self.is_ready() {
            return;
        }
        #[cfg(feature = "std")]
        self.entries.push(gap);
        #[cfg(not(feature = "std"))]
        let _ = self.entries.push(gap);
    }

    /// The log is full and waiting to be read.
    pub fn is_ready(&self) -> bool {
        self.entries.len() >= TOOTH_LOG_SIZE
    }

    /// Gaps recorded so far, oldest first.
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Empties the log so recording resumes.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
