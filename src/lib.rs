//! Gatekeeper - In-process Admission Control
//!
//! This crate implements a shared gate that bounds outbound calls to an
//! external resource by both a request count and a summed cost (for example
//! LLM tokens) over a sliding time window. Callers may block their thread or
//! suspend their async task while waiting, against the same limiter instance.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use ratelimit::{AdmissionGate, LimiterRegistry, RateLimiter, UsageSnapshot};
