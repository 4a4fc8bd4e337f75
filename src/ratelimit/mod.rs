//! Sliding window admission control.

mod gate;
mod limiter;
mod registry;
mod usage;
mod window;

pub use gate::{AdmissionGate, Unmetered};
pub use limiter::{Admission, Dimension, RateLimiter, DEFAULT_RETRY_BUFFER, DEFAULT_WINDOW};
pub use registry::LimiterRegistry;
pub use usage::{CostUsage, RequestUsage, UsageSnapshot};
pub use window::{CostWindow, Event, RequestWindow, SlidingWindow, WeightedEvent, WindowEntry};
