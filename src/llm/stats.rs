//! Gateway call statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe gateway counters
#[derive(Debug, Default)]
pub struct GatewayStats {
    /// Gateway calls
    calls: AtomicU64,
    /// Calls some provider satisfied
    successes: AtomicU64,
    /// Times a later provider was tried
    fallbacks: AtomicU64,
    /// Calls every provider failed
    failures: AtomicU64,
}

impl GatewayStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a gateway call
    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a satisfied call
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fallback to a later provider
    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a call every provider failed
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get summary
    pub fn summary(&self) -> GatewayStatsSummary {
        let calls = self.calls.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        GatewayStatsSummary {
            calls,
            successes,
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            success_rate: if calls == 0 {
                1.0
            } else {
                successes as f64 / calls as f64
            },
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.successes.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }
}

/// Serializable stats snapshot
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatsSummary {
    /// Gateway calls
    pub calls: u64,
    /// Calls some provider satisfied
    pub successes: u64,
    /// Times a later provider was tried
    pub fallbacks: u64,
    /// Calls every provider failed
    pub failures: u64,
    /// successes / calls
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_and_reset() {
        let stats = GatewayStats::new();
        assert!((stats.summary().success_rate - 1.0).abs() < f64::EPSILON);

        stats.record_call();
        stats.record_call();
        stats.record_success();
        stats.record_fallback();
        stats.record_failure();

        let summary = stats.summary();
        assert_eq!(summary.calls, 2);
        assert_eq!(summary.fallbacks, 1);
        assert!((summary.success_rate - 0.5).abs() < f64::EPSILON);

        stats.reset();
        assert_eq!(stats.summary().calls, 0);
    }
}
