//! Run configuration, per-round context, persisted records and the trigger contract.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::{Coalition, CrossEntityAnalysis};
use super::entity::{Scenario, SimulationEntity};
use super::fulcrum::Fulcrum;
use super::memory::EntityRoundMemory;
use super::response::EntityResponse;
use crate::error::{FulcrumError, Result};

/// Run-time knobs for one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Hard upper bound on rounds
    pub max_rounds: u32,
    /// Stabilization is never checked before this round
    pub min_rounds: u32,
    /// Score at or above which the run counts as converged
    pub stabilization_threshold: f64,
    /// Max concurrent entity-response calls
    pub parallel_batch_size: usize,
    /// Per-entity response deadline
    pub entity_timeout_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            min_rounds: 2,
            stabilization_threshold: 0.8,
            parallel_batch_size: 5,
            entity_timeout_ms: 30_000,
        }
    }
}

impl SimulationConfig {
    /// Apply per-request overrides on top of these defaults.
    pub fn with_overrides(mut self, overrides: &SimulationOverrides) -> Self {
        if let Some(v) = overrides.max_rounds {
            self.max_rounds = v;
        }
        if let Some(v) = overrides.min_rounds {
            self.min_rounds = v;
        }
        if let Some(v) = overrides.stabilization_threshold {
            self.stabilization_threshold = v;
        }
        if let Some(v) = overrides.parallel_batch_size {
            self.parallel_batch_size = v;
        }
        if let Some(v) = overrides.entity_timeout_ms {
            self.entity_timeout_ms = v;
        }
        self
    }

    /// Reject configs the loop cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(FulcrumError::InvalidConfig("max_rounds must be >= 1".into()));
        }
        if self.min_rounds == 0 || self.min_rounds > self.max_rounds {
            return Err(FulcrumError::InvalidConfig(format!(
                "min_rounds must be in 1..={} (got {})",
                self.max_rounds, self.min_rounds
            )));
        }
        if !(0.0..=1.0).contains(&self.stabilization_threshold) {
            return Err(FulcrumError::InvalidConfig(format!(
                "stabilization_threshold must be in [0, 1] (got {})",
                self.stabilization_threshold
            )));
        }
        if self.parallel_batch_size == 0 {
            return Err(FulcrumError::InvalidConfig(
                "parallel_batch_size must be >= 1".into(),
            ));
        }
        if self.entity_timeout_ms == 0 {
            return Err(FulcrumError::InvalidConfig(
                "entity_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Optional per-request config values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationOverrides {
    /// Override for `max_rounds`
    #[serde(default)]
    pub max_rounds: Option<u32>,
    /// Override for `min_rounds`
    #[serde(default)]
    pub min_rounds: Option<u32>,
    /// Override for `stabilization_threshold`
    #[serde(default)]
    pub stabilization_threshold: Option<f64>,
    /// Override for `parallel_batch_size`
    #[serde(default)]
    pub parallel_batch_size: Option<usize>,
    /// Override for `entity_timeout_ms`
    #[serde(default)]
    pub entity_timeout_ms: Option<u64>,
}

/// Simulation state machine: `Running -> {Stabilized, MaxRoundsReached, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    /// Loop in progress
    Running,
    /// Converged before max rounds
    Stabilized,
    /// Ran every allowed round
    MaxRoundsReached,
    /// Stopped by a round-level failure
    Failed,
}

impl SimulationStatus {
    /// Whether the run has exited the loop
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SimulationStatus::Running)
    }
}

/// Input bundle assembled fresh for each round.
#[derive(Debug, Clone)]
pub struct RoundContext {
    /// Simulation id
    pub simulation_id: String,
    /// Round about to run (1-based)
    pub round_number: u32,
    /// Scenario under simulation
    pub scenario: Scenario,
    /// Responses from the immediately prior round only
    pub previous_responses: Vec<EntityResponse>,
    /// Themes from the latest analysis
    pub themes: Vec<super::analysis::Theme>,
    /// Rising-momentum narratives from the latest analysis
    pub dominant_narratives: Vec<String>,
    /// Gap descriptions from the latest analysis
    pub gaps: Vec<String>,
    /// Per-entity rolling memory
    pub entity_memory: BTreeMap<String, EntityRoundMemory>,
}

/// Why an entity contributed nothing to a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntity {
    /// Entity id
    pub entity_id: String,
    /// Timeout or failure message
    pub reason: String,
}

/// Persisted record of one completed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Owning simulation
    pub simulation_id: String,
    /// Round number (1-based)
    pub round_number: u32,
    /// Responses gathered
    pub responses: Vec<EntityResponse>,
    /// Cross-entity analysis
    pub analysis: CrossEntityAnalysis,
    /// Entities absent this round
    #[serde(default)]
    pub skipped: Vec<SkippedEntity>,
    /// Wall-clock duration
    pub duration_ms: u64,
    /// Round start
    pub started_at: DateTime<Utc>,
    /// Round end
    pub completed_at: DateTime<Utc>,
}

/// Persisted simulation aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    /// Simulation id
    pub id: String,
    /// Scenario simulated
    pub scenario_id: String,
    /// Requesting organization
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Current status
    pub status: SimulationStatus,
    /// Effective config
    pub config: SimulationConfig,
    /// Resolved entities
    pub entities: Vec<SimulationEntity>,
    /// Rounds completed so far
    pub rounds_completed: u32,
    /// Latest stabilization score
    #[serde(default)]
    pub stabilization_score: Option<f64>,
    /// Final dominant narratives
    #[serde(default)]
    pub dominant_narratives: Vec<String>,
    /// Final coalitions
    #[serde(default)]
    pub key_coalitions: Vec<Coalition>,
    /// Final gap descriptions
    #[serde(default)]
    pub gaps_identified: Vec<String>,
    /// Final fulcrums
    #[serde(default)]
    pub fulcrums: Vec<Fulcrum>,
    /// Failure message
    #[serde(default)]
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last progress update
    pub updated_at: DateTime<Utc>,
    /// Completion time
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SimulationRecord {
    /// New record in `Running` state.
    pub fn new(
        id: impl Into<String>,
        scenario_id: impl Into<String>,
        organization_id: Option<String>,
        config: SimulationConfig,
        entities: Vec<SimulationEntity>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            scenario_id: scenario_id.into(),
            organization_id,
            status: SimulationStatus::Running,
            config,
            entities,
            rounds_completed: 0,
            stabilization_score: None,
            dominant_narratives: Vec::new(),
            key_coalitions: Vec::new(),
            gaps_identified: Vec::new(),
            fulcrums: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Progress fields written after each round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationProgress {
    /// Rounds completed so far
    pub rounds_completed: u32,
    /// Latest stabilization score
    pub stabilization_score: Option<f64>,
}

/// Final fields written once when the loop exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationFinal {
    /// Terminal status
    pub status: SimulationStatus,
    /// Rounds completed
    pub rounds_completed: u32,
    /// Final stabilization score
    pub stabilization_score: Option<f64>,
    /// Dominant narratives
    pub dominant_narratives: Vec<String>,
    /// Coalitions from the latest round
    pub key_coalitions: Vec<Coalition>,
    /// Gaps from the latest round
    pub gaps_identified: Vec<String>,
    /// Fulcrums
    pub fulcrums: Vec<Fulcrum>,
    /// Failure message
    pub error: Option<String>,
}

/// Trigger request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Scenario to simulate (required)
    #[serde(default)]
    pub scenario_id: Option<String>,
    /// Requesting organization
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Explicit entity selection; authoritative when present
    #[serde(default)]
    pub entity_ids: Option<Vec<String>>,
    /// Add the requesting organization as a client entity
    #[serde(default)]
    pub include_client: bool,
    /// Config overrides
    #[serde(flatten)]
    pub overrides: SimulationOverrides,
}

/// Trigger response. Always produced, even when the run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Whether the run completed without a round-level failure
    pub success: bool,
    /// Simulation id
    pub simulation_id: String,
    /// Terminal status
    pub status: SimulationStatus,
    /// Rounds completed
    pub rounds_completed: u32,
    /// Final stabilization score
    pub stabilization_score: Option<f64>,
    /// Dominant narratives
    pub dominant_narratives: Vec<String>,
    /// Coalitions from the latest round
    pub key_coalitions: Vec<Coalition>,
    /// Gap descriptions from the latest round
    pub gaps_identified: Vec<String>,
    /// Fulcrums
    pub fulcrums: Vec<Fulcrum>,
    /// Wall-clock duration of the run
    pub duration_ms: u64,
    /// Failure message for `failed` runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
