//! Sliding-window token usage ledger.
//!
//! Every successful generation appends a record; records older than the
//! window are pruned lazily on the next read or write. The ledger lives in
//! memory only and starts empty on every process start.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::UsageLimitExceeded;

/// Time source for the tracker. Defaults to the wall clock.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// One accepted consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub cost: u64,
}

/// Tracks token usage within a trailing window and enforces a ceiling on it.
///
/// The prune and the sum (or append) happen under one lock acquisition, so a
/// concurrent writer can never make a check pass on a stale total.
pub struct UsageTracker {
    records: Mutex<VecDeque<UsageRecord>>,
    window: TimeDelta,
    limit: i64,
    clock: Clock,
}

impl UsageTracker {
    /// Create a tracker with the given window and ceiling.
    /// A ceiling of zero or below disables enforcement; usage is still tracked.
    pub fn new(window: Duration, limit: i64) -> Self {
        Self::with_clock(window, limit, Arc::new(Utc::now))
    }

    pub fn with_clock(window: Duration, limit: i64, clock: Clock) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            limit,
            clock,
        }
    }

    /// Whether `check_limit` enforces anything.
    pub fn is_enforced(&self) -> bool {
        self.limit > 0
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Append a record at the current time. Never rejects.
    pub fn record(&self, cost: u64) {
        let now = (self.clock)();
        let mut records = self.lock();
        Self::prune(&mut records, self.cutoff(now));
        records.push_back(UsageRecord {
            timestamp: now,
            cost,
        });
    }

    /// Total cost recorded within the window.
    pub fn current_usage(&self) -> u64 {
        let now = (self.clock)();
        let mut records = self.lock();
        Self::prune(&mut records, self.cutoff(now));
        Self::total(&records)
    }

    /// Check whether consuming `cost` more tokens stays within the ceiling.
    ///
    /// The boundary is inclusive: landing exactly on the ceiling passes. This
    /// does not record anything; callers record after the gated work succeeds.
    pub fn check_limit(&self, cost: u64) -> Result<(), UsageLimitExceeded> {
        if !self.is_enforced() {
            return Ok(());
        }

        let now = (self.clock)();
        let mut records = self.lock();
        Self::prune(&mut records, self.cutoff(now));
        let current = Self::total(&records);
        let limit = self.limit as u64;

        if current.saturating_add(cost) > limit {
            return Err(UsageLimitExceeded {
                current,
                requested: cost,
                limit,
            });
        }
        Ok(())
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    // Records are appended at "now", so they stay sorted and only the front can expire.
    fn prune(records: &mut VecDeque<UsageRecord>, cutoff: DateTime<Utc>) {
        while records.front().is_some_and(|r| r.timestamp < cutoff) {
            records.pop_front();
        }
    }

    fn total(records: &VecDeque<UsageRecord>) -> u64 {
        records.iter().fold(0u64, |acc, r| acc.saturating_add(r.cost))
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<UsageRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("window", &self.window)
            .field("limit", &self.limit)
            .field("records", &self.lock().len())
            .finish()
    }
}
