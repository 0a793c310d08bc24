//! Liveness monitor configuration

use std::time::Duration;

/// Poll cadence and scan window for the liveness monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Interval between full snapshot refreshes
    pub poll_interval: Duration,
    /// Trailing blocks scanned for result events on each refresh.
    ///
    /// Stands in for "the last few minutes", so the right value depends on
    /// the chain's block time.
    pub scan_window_blocks: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl LivenessConfig {
    /// Build from `SENTIMARKET_LIVENESS_*` values supplied by `lookup`
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).and_then(|raw| raw.trim().parse::<u64>().ok());
        Self {
            poll_interval: Duration::from_secs(read("SENTIMARKET_LIVENESS_POLL_SECS").unwrap_or(30)),
            scan_window_blocks: read("SENTIMARKET_LIVENESS_WINDOW_BLOCKS")
                .unwrap_or(50)
                .max(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_scan_window(mut self, blocks: u64) -> Self {
        self.scan_window_blocks = blocks.max(1);
        self
    }
}
