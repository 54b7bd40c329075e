use std::sync::atomic::{AtomicU64, Ordering};

pub mod api;
pub mod block_template;
pub mod errors;
pub mod manager;
pub mod model;
pub mod registry;
pub mod share;
pub mod store;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

/// Process-wide share outcome counters, reported periodically in the log.
#[derive(Default)]
pub struct ShareCounters {
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub stale: AtomicU64,
    pub blocks_found: AtomicU64,
}

impl ShareCounters {
    pub fn snapshot(&self) -> ShareCountersSnapshot {
        ShareCountersSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            blocks_found: self.blocks_found.load(Ordering::Relaxed),
        }
    }

    pub fn record(&self, verdict: &share::Verdict) {
        let counter = match verdict {
            share::Verdict::Accepted(_) => &self.accepted,
            share::Verdict::BlockFound(..) => &self.blocks_found,
            share::Verdict::Rejected(errors::ShareRejection::StaleJob) => &self.stale,
            share::Verdict::Rejected(_) => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShareCountersSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub stale: u64,
    pub blocks_found: u64,
}

impl core::ops::Sub for &ShareCountersSnapshot {
    type Output = ShareCountersSnapshot;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output {
            accepted: self.accepted.saturating_sub(rhs.accepted),
            rejected: self.rejected.saturating_sub(rhs.rejected),
            stale: self.stale.saturating_sub(rhs.stale),
            blocks_found: self.blocks_found.saturating_sub(rhs.blocks_found),
        }
    }
}
