//! Sliding window counters.
//!
//! A window keeps every admitted event that happened within the trailing
//! `window` duration. Entries are appended in arrival order and expired lazily
//! from the head, so the stored sequence is always ordered by timestamp.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// An entry that can be stored in a [`SlidingWindow`].
pub trait WindowEntry {
    /// When the entry was admitted.
    fn timestamp(&self) -> Instant;

    /// How much of the budget the entry consumes.
    fn weight(&self) -> f64;
}

/// A single admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event(pub Instant);

impl WindowEntry for Event {
    fn timestamp(&self) -> Instant {
        self.0
    }

    fn weight(&self) -> f64 {
        1.0
    }
}

/// An admitted unit of work together with its estimated cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedEvent {
    pub at: Instant,
    pub cost: f64,
}

impl WindowEntry for WeightedEvent {
    fn timestamp(&self) -> Instant {
        self.at
    }

    fn weight(&self) -> f64 {
        self.cost
    }
}

/// Counter over a trailing time window.
///
/// The counter does no locking of its own. [`RateLimiter`](super::RateLimiter)
/// wraps each counter in a mutex and calls [`trim`](Self::trim) before every
/// read that needs an accurate view.
#[derive(Debug)]
pub struct SlidingWindow<E> {
    window: Duration,
    entries: VecDeque<E>,
    /// Running sum of retained weights.
    total: f64,
}

/// Request-rate window.
pub type RequestWindow = SlidingWindow<Event>;

/// Cost-budget window.
pub type CostWindow = SlidingWindow<WeightedEvent>;

impl<E: WindowEntry> SlidingWindow<E> {
    /// Create an empty window spanning `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
            total: 0.0,
        }
    }

    /// Drop every entry older than `now - window`.
    pub fn trim(&mut self, now: Instant) {
        // Early in the process lifetime the cutoff may precede the clock's epoch;
        // nothing can be older than that.
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };

        while let Some(head) = self.entries.front() {
            if head.timestamp() >= cutoff {
                break;
            }
            self.total -= head.weight();
            self.entries.pop_front();
        }

        if self.entries.is_empty() {
            self.total = 0.0;
        }
    }

    /// Record an entry at the tail.
    pub fn append(&mut self, entry: E) {
        self.total += entry.weight();
        self.entries.push_back(entry);
    }

    /// Sum of the weights of all retained entries.
    pub fn current_total(&self) -> f64 {
        self.total
    }

    /// Timestamp of the oldest retained entry.
    pub fn oldest_timestamp(&self) -> Option<Instant> {
        self.entries.front().map(WindowEntry::timestamp)
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Time left until the oldest retained entry leaves the window, measured
    /// from `now`. `None` when the window is empty.
    pub fn time_until_oldest_expires(&self, now: Instant) -> Option<Duration> {
        self.oldest_timestamp()
            .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
    }
}
