//! Dual-budget sliding window rate limiter.

use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::usage::{CostUsage, RequestUsage, UsageSnapshot};
use super::window::{CostWindow, Event, RequestWindow, WeightedEvent};
use crate::config::LimitConfig;
use crate::error::Result;

/// Default length of the sliding window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Extra pause added to every computed wait so the retry does not land exactly
/// on the window boundary.
pub const DEFAULT_RETRY_BUFFER: Duration = Duration::from_millis(100);

/// The budget that is holding a caller back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Requests,
    Cost,
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Both budgets have room right now.
    Ready,
    /// `dimension` is exhausted until roughly `duration` from now.
    Wait { dimension: Dimension, duration: Duration },
}

/// Shared gate bounding both the number of admissions and their summed cost
/// over a trailing window.
///
/// One limiter is built per protected resource and shared through an `Arc`.
/// Callers either block their thread with [`admit_blocking`](Self::admit_blocking)
/// or suspend their task with [`admit`](Self::admit); both kinds may be mixed
/// on the same instance.
///
/// # Fail closed
///
/// A non-positive request limit blocks every admission forever. A non-positive
/// cost limit blocks every admission with a positive cost forever. Neither is a
/// construction error.
///
/// # Burst overshoot
///
/// The budget check and the recording of an admission happen under separate
/// lock acquisitions. Callers that pass the check concurrently are all admitted,
/// so right after a burst the recorded totals can exceed the configured limits.
/// Later callers wait until the overshoot has expired. Closing this gap would
/// require one lock held across check and record for both counters, which
/// serializes every admission.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: i64,
    max_cost: f64,
    window: Duration,
    retry_buffer: Duration,
    requests: Mutex<RequestWindow>,
    costs: Mutex<CostWindow>,
}

impl RateLimiter {
    /// Create a limiter over the default 60 second window.
    pub fn new(max_requests_per_window: i64, max_cost_per_window: f64) -> Self {
        Self::with_window(max_requests_per_window, max_cost_per_window, DEFAULT_WINDOW)
    }

    /// Create a limiter over a custom window.
    pub fn with_window(
        max_requests_per_window: i64,
        max_cost_per_window: f64,
        window: Duration,
    ) -> Self {
        info!(
            max_requests = max_requests_per_window,
            max_cost = max_cost_per_window,
            window_secs = window.as_secs_f64(),
            "Rate limiter initialized"
        );

        if max_requests_per_window <= 0 || max_cost_per_window <= 0.0 {
            warn!(
                max_requests = max_requests_per_window,
                max_cost = max_cost_per_window,
                "Non-positive limit configured, matching admissions will block indefinitely"
            );
        }

        Self {
            max_requests: max_requests_per_window,
            max_cost: max_cost_per_window,
            window,
            retry_buffer: DEFAULT_RETRY_BUFFER,
            requests: Mutex::new(RequestWindow::new(window)),
            costs: Mutex::new(CostWindow::new(window)),
        }
    }

    /// Build a limiter from a validated limit configuration.
    pub fn from_config(config: &LimitConfig) -> Result<Self> {
        let window = config.window()?;
        Ok(
            Self::with_window(config.requests_per_window, config.cost_per_window, window)
                .with_retry_buffer(config.retry_buffer()),
        )
    }

    /// Replace the pause added on top of every computed wait.
    pub fn with_retry_buffer(mut self, retry_buffer: Duration) -> Self {
        self.retry_buffer = retry_buffer;
        self
    }

    pub fn max_requests_per_window(&self) -> i64 {
        self.max_requests
    }

    pub fn max_cost_per_window(&self) -> f64 {
        self.max_cost
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn retry_buffer(&self) -> Duration {
        self.retry_buffer
    }

    /// Wait until both budgets admit `estimated_cost`, suspending only the
    /// calling task, then record the admission.
    ///
    /// Dropping the future before it completes records nothing.
    pub async fn admit(&self, estimated_cost: f64) {
        let cost = sanitize_cost(estimated_cost);
        while let Some(pause) = self.next_pause(cost) {
            tokio::time::sleep(pause).await;
        }
        self.record(cost);
    }

    /// Wait until both budgets admit `estimated_cost`, blocking the calling
    /// thread, then record the admission.
    ///
    /// Do not call this from an async runtime worker; use
    /// [`admit`](Self::admit) or `spawn_blocking` there.
    pub fn admit_blocking(&self, estimated_cost: f64) {
        let cost = sanitize_cost(estimated_cost);
        while let Some(pause) = self.next_pause(cost) {
            std::thread::sleep(pause);
        }
        self.record(cost);
    }

    /// Admit `estimated_cost` only if both budgets have room right now.
    ///
    /// Returns `false` without recording anything otherwise.
    pub fn try_admit(&self, estimated_cost: f64) -> bool {
        let cost = sanitize_cost(estimated_cost);
        match self.check_admission(cost) {
            Admission::Ready => {
                self.record(cost);
                true
            }
            Admission::Wait { .. } => false,
        }
    }

    /// How long an admission of `estimated_cost` would wait before its next
    /// check, excluding the retry buffer. Zero if it would be admitted now.
    pub fn time_until_ready(&self, estimated_cost: f64) -> Duration {
        match self.check_admission(sanitize_cost(estimated_cost)) {
            Admission::Ready => Duration::ZERO,
            Admission::Wait { duration, .. } => duration,
        }
    }

    /// Check both budgets once without waiting or recording.
    ///
    /// The request budget is checked first; the cost budget is only consulted
    /// when requests have room. Each counter lock is released before the next
    /// one is taken.
    pub fn check_admission(&self, cost: f64) -> Admission {
        let now = Instant::now();

        {
            let mut requests = self.requests.lock();
            requests.trim(now);

            let has_room =
                self.max_requests > 0 && (requests.len() as u64) < self.max_requests as u64;
            if !has_room {
                return Admission::Wait {
                    dimension: Dimension::Requests,
                    // Nothing to expire: re-check after a full window.
                    duration: requests.time_until_oldest_expires(now).unwrap_or(self.window),
                };
            }
        }

        if cost > 0.0 {
            let mut costs = self.costs.lock();
            costs.trim(now);

            if self.max_cost <= 0.0 {
                return Admission::Wait {
                    dimension: Dimension::Cost,
                    duration: costs.time_until_oldest_expires(now).unwrap_or(self.window),
                };
            }

            // Only the oldest entry is considered. When several entries have to
            // expire to fit `cost` this underestimates, and the next check waits
            // again. An empty window admits any cost so oversized work can run.
            if costs.current_total() + cost > self.max_cost {
                if let Some(duration) = costs.time_until_oldest_expires(now) {
                    return Admission::Wait {
                        dimension: Dimension::Cost,
                        duration,
                    };
                }
            }
        }

        Admission::Ready
    }

    /// Take a read-only snapshot of both budgets.
    ///
    /// Both counters are trimmed first. The request lock is always taken before
    /// the cost lock.
    pub fn current_usage(&self) -> UsageSnapshot {
        let now = Instant::now();

        let mut requests = self.requests.lock();
        let mut costs = self.costs.lock();
        requests.trim(now);
        costs.trim(now);

        UsageSnapshot {
            requests: RequestUsage::new(requests.len(), self.max_requests),
            cost: CostUsage::new(costs.current_total(), self.max_cost),
            window_seconds: self.window.as_secs_f64(),
            timestamp: Utc::now(),
        }
    }

    /// Run one admission check and turn a wait into the pause to sleep for.
    fn next_pause(&self, cost: f64) -> Option<Duration> {
        match self.check_admission(cost) {
            Admission::Ready => None,
            Admission::Wait {
                dimension,
                duration,
            } => {
                let pause = duration.saturating_add(self.retry_buffer);
                debug!(
                    ?dimension,
                    cost,
                    wait_ms = pause.as_millis() as u64,
                    "Budget exhausted, waiting"
                );
                Some(pause)
            }
        }
    }

    fn record(&self, cost: f64) {
        let now = Instant::now();

        self.requests.lock().append(Event(now));
        if cost > 0.0 {
            self.costs.lock().append(WeightedEvent { at: now, cost });
        }

        trace!(cost, "Admitted");
    }
}

/// Negative, NaN and infinite estimates cannot be recorded meaningfully and are
/// treated as zero cost.
fn sanitize_cost(estimated_cost: f64) -> f64 {
    if estimated_cost.is_finite() && estimated_cost >= 0.0 {
        estimated_cost
    } else {
        warn!(estimated_cost, "Invalid cost estimate, treating as zero");
        0.0
    }
}
