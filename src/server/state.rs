//! Server state and run counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::config::ServerConfig;
use crate::engine::SimulationEngine;
use crate::llm::{CompletionGateway, GatewayStatsSummary};

/// Application state shared across handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Simulation engine
    pub engine: SimulationEngine,
    /// Gateway behind the engine, absent for offline engines
    pub gateway: Option<CompletionGateway>,
    /// Trigger outcome counters
    pub runs: RunStats,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServerConfig, engine: SimulationEngine) -> Self {
        Self {
            config,
            engine,
            gateway: None,
            runs: RunStats::new(),
            start_time: Instant::now(),
        }
    }

    /// Report gateway statistics from `gateway`
    pub fn with_gateway(mut self, gateway: CompletionGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Get server uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Gateway counters, if a gateway is attached
    pub fn gateway_stats(&self) -> Option<GatewayStatsSummary> {
        self.gateway.as_ref().map(|g| g.stats().summary())
    }
}

/// Thread-safe trigger counters
#[derive(Debug, Default)]
pub struct RunStats {
    /// Trigger requests received
    triggered: AtomicU64,
    /// Runs that finished without failure
    succeeded: AtomicU64,
    /// Runs that ended `failed`
    failed: AtomicU64,
    /// Requests rejected before a run was created
    rejected: AtomicU64,
}

impl RunStats {
    /// Create new counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trigger request
    pub fn record_trigger(&self) {
        self.triggered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished run
    pub fn record_outcome(&self, success: bool) {
        let counter = if success { &self.succeeded } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected request
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get summary
    pub fn summary(&self) -> RunStatsSummary {
        RunStatsSummary {
            triggered: self.triggered.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Serializable run counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatsSummary {
    /// Trigger requests received
    pub triggered: u64,
    /// Runs that finished without failure
    pub succeeded: u64,
    /// Runs that ended `failed`
    pub failed: u64,
    /// Requests rejected before a run was created
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_stats() {
        let stats = RunStats::new();
        stats.record_trigger();
        stats.record_trigger();
        stats.record_trigger();
        stats.record_outcome(true);
        stats.record_outcome(false);
        stats.record_rejected();

        assert_eq!(
            stats.summary(),
            RunStatsSummary {
                triggered: 3,
                succeeded: 1,
                failed: 1,
                rejected: 1,
            }
        );
    }
}
