//! Immutable liveness snapshot and its merge rules
//!
//! Every update produces a new [`LivenessSnapshot`]; the monitor publishes
//! it as a whole, so readers never see poll-derived and event-derived
//! fields from different moments.

use alloy_primitives::{Address, B256};
use chrono::{DateTime, Utc};
use sentimarket_types::{ErrorInfo, PlatformStats, PlatformStatsReading, SentimentResult};
use serde::{Deserialize, Serialize};

/// Worker identity registered on the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub app_id: B256,
    pub worker: Address,
}

/// Everything one refresh read from the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReading {
    pub stats: PlatformStatsReading,
    /// Read only when the worker is enabled; `None` with the worker enabled
    /// means the identity read failed
    pub identity: Option<WorkerIdentity>,
    /// Why the identity could not be read
    pub identity_error: Option<ErrorInfo>,
    /// Chain head the window was scanned up to
    pub head: u64,
    /// Result events found in the trailing window
    pub window_results: Vec<SentimentResult>,
}

/// Current belief about the off-chain worker
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LivenessSnapshot {
    pub worker_enabled: bool,
    pub worker_address: Option<Address>,
    pub app_id: Option<B256>,
    pub is_online: bool,
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Block of the most recent activity, when known
    pub last_activity_block: Option<u64>,
    /// Requests processed: the chain's request count as of the last
    /// refresh plus results observed live since then
    pub processed_count: u64,
    pub platform_stats: PlatformStats,
    pub last_error: Option<ErrorInfo>,
    /// Completed refresh attempts, successful or not
    pub refresh_seq: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub scanned_to_block: Option<u64>,
}

impl LivenessSnapshot {
    /// Merge a successful refresh
    pub fn with_refresh(&self, reading: &RefreshReading, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.worker_enabled = reading.stats.worker_enabled;
        next.platform_stats = reading.stats.stats;
        next.processed_count = reading.stats.stats.request_count;
        match (reading.stats.worker_enabled, reading.identity) {
            // identity unreadable this time; keep what was known
            (true, None) => {}
            (_, identity) => {
                next.app_id = identity.map(|id| id.app_id);
                next.worker_address = identity.map(|id| id.worker);
            }
        }

        // A live event from beyond the scanned head is newer than the scan.
        let newer_than_scan = self
            .last_activity_block
            .is_some_and(|block| block > reading.head);

        let latest = reading
            .window_results
            .iter()
            .max_by_key(|r| (r.block_number, r.observed_at));

        if !newer_than_scan {
            next.is_online = latest.is_some();
            if let Some(result) = latest {
                next.last_activity_at = Some(result.observed_at);
                next.last_activity_block = result.block_number;
            }
        }

        next.last_error = reading.identity_error.clone();
        next.refresh_seq += 1;
        next.refreshed_at = Some(at);
        next.scanned_to_block = Some(reading.head);
        next
    }

    /// Record a failed refresh, keeping every known-good field
    pub fn with_failure(&self, error: ErrorInfo) -> Self {
        Self {
            last_error: Some(error),
            refresh_seq: self.refresh_seq + 1,
            ..self.clone()
        }
    }

    /// Record a result event observed live at `at`
    pub fn with_result(&self, result: &SentimentResult, at: DateTime<Utc>) -> Self {
        Self {
            is_online: true,
            last_activity_at: Some(at),
            last_activity_block: result.block_number.max(self.last_activity_block),
            processed_count: self.processed_count + 1,
            ..self.clone()
        }
    }
}
