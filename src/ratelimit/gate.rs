//! Admission gate trait for abstracting metered and unmetered resources.

use async_trait::async_trait;

use super::limiter::RateLimiter;

/// Trait for anything a caller must pass through before a metered call.
///
/// Callers hold an `Arc<dyn AdmissionGate>` and call one of the admit methods
/// exactly once, with their best cost estimate, before doing the work. The
/// gate handles all waiting; callers never retry it.
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Wait, suspending only the current task, until the work may proceed.
    async fn admit(&self, estimated_cost: f64);

    /// Wait, blocking the current thread, until the work may proceed.
    fn admit_blocking(&self, estimated_cost: f64);
}

#[async_trait]
impl AdmissionGate for RateLimiter {
    async fn admit(&self, estimated_cost: f64) {
        RateLimiter::admit(self, estimated_cost).await
    }

    fn admit_blocking(&self, estimated_cost: f64) {
        RateLimiter::admit_blocking(self, estimated_cost)
    }
}

/// Gate for resources without a configured limit. Admits immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmetered;

#[async_trait]
impl AdmissionGate for Unmetered {
    async fn admit(&self, _estimated_cost: f64) {}

    fn admit_blocking(&self, _estimated_cost: f64) {}
}
