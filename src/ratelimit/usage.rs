//! Point-in-time usage reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request-count usage within the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUsage {
    pub current: u64,
    pub limit: i64,
    pub remaining: u64,
}

impl RequestUsage {
    pub(crate) fn new(current: usize, limit: i64) -> Self {
        let current = current as u64;
        let remaining = u64::try_from(limit).map_or(0, |limit| limit.saturating_sub(current));
        Self {
            current,
            limit,
            remaining,
        }
    }
}

/// Cost usage within the current window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostUsage {
    pub current: f64,
    pub limit: f64,
    pub remaining: f64,
}

impl CostUsage {
    pub(crate) fn new(current: f64, limit: f64) -> Self {
        Self {
            current,
            limit,
            remaining: (limit - current).max(0.0),
        }
    }
}

/// Best-effort snapshot returned by
/// [`RateLimiter::current_usage`](super::RateLimiter::current_usage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub requests: RequestUsage,
    pub cost: CostUsage,
    pub window_seconds: f64,
    /// Wall-clock time the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}
