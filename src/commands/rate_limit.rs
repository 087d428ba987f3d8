use super::context::SyncContext;
use super::progress::SyncStage;
use crate::error::{Result, SyncError};
use chrono::{DateTime, Local, Utc};
use std::sync::Mutex;

/// Core API budget as reported by GitHub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    pub reset: DateTime<Utc>,
}

impl RateLimitSnapshot {
    /// Reset time in the user's local zone
    pub fn reset_local(&self) -> String {
        self.reset
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string()
    }

    pub fn summary(&self) -> String {
        format!(
            "GitHub API RATE LIMITS status: {} of {} calls used. {} remaining until the hourly limit reset at {}",
            self.used,
            self.limit,
            self.remaining,
            self.reset_local()
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct BudgetState {
    remaining: u32,
    reset: DateTime<Utc>,
}

/// Token bucket over the hourly API allowance.
///
/// Refilled from response headers and drained by one token per charged call.
/// Once the bucket is down to `reserve` the next call fails fast instead of
/// running the allowance dry mid-walk.
#[derive(Debug)]
pub struct ApiBudget {
    state: Mutex<Option<BudgetState>>,
    reserve: u32,
}

impl ApiBudget {
    pub fn new(reserve: u32) -> Self {
        Self {
            state: Mutex::new(None),
            reserve,
        }
    }

    /// Record the server-side view of the budget
    pub fn observe(&self, remaining: u32, reset: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = Some(BudgetState { remaining, reset });
    }

    /// Take one token for an upcoming call
    pub fn consume(&self) -> Result<()> {
        self.consume_at(Utc::now())
    }

    fn consume_at(&self, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(current) = state.as_mut() else {
            // Nothing observed yet
            return Ok(());
        };
        if now >= current.reset {
            // Window rolled over; the next response refills the bucket
            *state = None;
            return Ok(());
        }
        if current.remaining <= self.reserve {
            return Err(SyncError::RateLimitExhausted {
                remaining: current.remaining,
                reset: current.reset,
            });
        }
        current.remaining -= 1;
        Ok(())
    }

    pub fn remaining(&self) -> Option<u32> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.map(|s| s.remaining)
    }
}

/// Fetch and report the current rate limits; advisory, never fails the run
pub async fn report_rate_limits(ctx: &SyncContext) -> Option<RateLimitSnapshot> {
    match ctx.api.rate_limit().await {
        Ok(snapshot) => {
            ctx.emit(SyncStage::Preparing, snapshot.summary());
            Some(snapshot)
        }
        Err(e) => {
            tracing::warn!("rate limit query failed: {}", e);
            ctx.emit(SyncStage::Preparing, "Unable to retrieve rate limits.");
            None
        }
    }
}

/// Calls spent between two snapshots taken in the same window
pub fn calls_spent(before: &RateLimitSnapshot, after: &RateLimitSnapshot) -> Option<u32> {
    (before.reset == after.reset).then(|| before.remaining.saturating_sub(after.remaining))
}
