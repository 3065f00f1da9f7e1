//! Simulation loop controller.
//!
//! ```text
//! trigger ─> validate ─> resolve entities ─> create record
//!                                               │
//!              ┌────────────────────────────────┘
//!              ▼
//!   ┌─> build context (latest analysis + memory)
//!   │   execute round ─> persist round ─> rebuild memory ─> check stabilization
//!   └────────── not stabilized and round < max_rounds
//!              │
//!              ▼
//!   derive narratives/gaps/coalitions ─> fulcrums ─> finalize
//! ```
//!
//! A [`SimulationRun`] is owned by the controller for the whole loop and only
//! mutated between rounds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use super::analyzer::{CrossEntityAnalyzer, HeuristicAnalyzer, LlmCrossEntityAnalyzer};
use super::fulcrum::{FulcrumIdentifier, LlmFulcrumSynthesizer};
use super::memory::build_entity_memory;
use super::resolver::{resolve_entities, ResolveRequest};
use super::responder::{EchoResponder, LlmEntityResponder};
use super::round::{EntityResponder, RoundExecutor, RoundSettings};
use super::stabilization::{RoundView, StabilizationCheck, StabilizationDetector};
use crate::config::AnalyzerKind;
use crate::domain::{
    CrossEntityAnalysis, EntityResponse, EntityRoundMemory, Fulcrum, RoundContext, RoundRecord,
    Scenario, SimulationConfig, SimulationEntity, SimulationFinal, SimulationProgress,
    SimulationRecord, SimulationResult, SimulationStatus, TriggerRequest,
};
use crate::error::{FulcrumError, Result};
use crate::llm::CompletionGateway;
use crate::store::{EntityCatalog, SimulationStore};

/// Run-scoped aggregate: everything one simulation has accumulated so far.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationRun {
    /// Simulation id
    pub simulation_id: String,
    /// Scenario simulated
    pub scenario: Scenario,
    /// Resolved entities, fixed for the run
    pub entities: Vec<SimulationEntity>,
    /// Effective config
    pub config: SimulationConfig,
    /// Current status
    pub status: SimulationStatus,
    rounds: Vec<Vec<EntityResponse>>,
    analyses: Vec<CrossEntityAnalysis>,
    checks: Vec<StabilizationCheck>,
    memory: BTreeMap<String, EntityRoundMemory>,
}

impl SimulationRun {
    /// Fresh `running` aggregate.
    pub fn new(
        simulation_id: impl Into<String>,
        scenario: Scenario,
        entities: Vec<SimulationEntity>,
        config: SimulationConfig,
    ) -> Self {
        Self {
            simulation_id: simulation_id.into(),
            scenario,
            entities,
            config,
            status: SimulationStatus::Running,
            rounds: Vec::new(),
            analyses: Vec::new(),
            checks: Vec::new(),
            memory: BTreeMap::new(),
        }
    }

    /// Completed rounds
    pub fn rounds_completed(&self) -> u32 {
        self.rounds.len() as u32
    }

    /// Responses per completed round
    pub fn rounds(&self) -> &[Vec<EntityResponse>] {
        &self.rounds
    }

    /// Analyses per completed round
    pub fn analyses(&self) -> &[CrossEntityAnalysis] {
        &self.analyses
    }

    /// Stabilization checks that ran
    pub fn checks(&self) -> &[StabilizationCheck] {
        &self.checks
    }

    /// Current entity memory
    pub fn memory(&self) -> &BTreeMap<String, EntityRoundMemory> {
        &self.memory
    }

    /// Latest analysis, if any round completed
    pub fn latest_analysis(&self) -> Option<&CrossEntityAnalysis> {
        self.analyses.last()
    }

    /// Latest round's responses
    pub fn latest_responses(&self) -> &[EntityResponse] {
        self.rounds.last().map(Vec::as_slice).unwrap_or_default()
    }

    /// Context for `round_number`, built from the latest analysis only.
    pub fn context(&self, round_number: u32) -> RoundContext {
        let latest = self.latest_analysis();
        RoundContext {
            simulation_id: self.simulation_id.clone(),
            round_number,
            scenario: self.scenario.clone(),
            previous_responses: self.latest_responses().to_vec(),
            themes: latest.map(|a| a.themes.clone()).unwrap_or_default(),
            dominant_narratives: latest.map(CrossEntityAnalysis::rising_themes).unwrap_or_default(),
            gaps: latest.map(CrossEntityAnalysis::gap_descriptions).unwrap_or_default(),
            entity_memory: self.memory.clone(),
        }
    }

    /// Append a completed round and rebuild memory from the full history.
    pub fn push_round(&mut self, responses: Vec<EntityResponse>, analysis: CrossEntityAnalysis) {
        self.rounds.push(responses);
        self.analyses.push(analysis);
        self.memory = build_entity_memory(&self.rounds.concat());
    }

    /// Round `n` (1-based) as the detector sees it.
    fn view(&self, n: u32) -> Option<RoundView<'_>> {
        let i = (n as usize).checked_sub(1)?;
        Some(RoundView {
            responses: self.rounds.get(i)?,
            analysis: self.analyses.get(i)?,
        })
    }

    /// Last detector score, else the last analysis score.
    pub fn stabilization_score(&self) -> Option<f64> {
        self.checks
            .last()
            .map(|c| c.score)
            .or_else(|| self.latest_analysis().map(|a| a.stabilization_score))
    }
}

/// Orchestrates resolution, rounds, stabilization and fulcrums for one trigger.
#[derive(Clone)]
pub struct SimulationEngine {
    catalog: Arc<dyn EntityCatalog>,
    store: Arc<dyn SimulationStore>,
    executor: RoundExecutor,
    fulcrums: FulcrumIdentifier,
    defaults: SimulationConfig,
}

impl SimulationEngine {
    /// Engine over explicit collaborators.
    pub fn new(
        catalog: Arc<dyn EntityCatalog>,
        store: Arc<dyn SimulationStore>,
        responder: Arc<dyn EntityResponder>,
        analyzer: Arc<dyn CrossEntityAnalyzer>,
        fulcrums: FulcrumIdentifier,
        defaults: SimulationConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            executor: RoundExecutor::new(responder, analyzer),
            fulcrums,
            defaults,
        }
    }

    /// Engine whose generative steps all go through `gateway`.
    pub fn with_gateway(
        catalog: Arc<dyn EntityCatalog>,
        store: Arc<dyn SimulationStore>,
        gateway: CompletionGateway,
        analyzer: AnalyzerKind,
        defaults: SimulationConfig,
    ) -> Self {
        let analyzer: Arc<dyn CrossEntityAnalyzer> = match analyzer {
            AnalyzerKind::Llm => Arc::new(LlmCrossEntityAnalyzer::new(gateway.clone())),
            AnalyzerKind::Heuristic => Arc::new(HeuristicAnalyzer::new()),
        };
        Self::new(
            catalog,
            store,
            Arc::new(LlmEntityResponder::new(gateway.clone())),
            analyzer,
            FulcrumIdentifier::new(Arc::new(LlmFulcrumSynthesizer::new(gateway))),
            defaults,
        )
    }

    /// Engine with no network dependencies.
    pub fn offline(
        catalog: Arc<dyn EntityCatalog>,
        store: Arc<dyn SimulationStore>,
        defaults: SimulationConfig,
    ) -> Self {
        Self::new(
            catalog,
            store,
            Arc::new(EchoResponder::new()),
            Arc::new(HeuristicAnalyzer::new()),
            FulcrumIdentifier::algorithmic(),
            defaults,
        )
    }

    /// Persistence collaborator
    pub fn store(&self) -> &Arc<dyn SimulationStore> {
        &self.store
    }

    /// Config applied when a request carries no overrides
    pub fn defaults(&self) -> &SimulationConfig {
        &self.defaults
    }

    /// Run one simulation end to end.
    ///
    /// Input errors are returned as `Err` and no run is created. Once the run
    /// exists, every outcome, including failure, comes back as `Ok` with the
    /// status and error recorded in the result.
    pub async fn trigger(&self, request: &TriggerRequest) -> Result<SimulationResult> {
        let started = Instant::now();

        let scenario_id = request
            .scenario_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FulcrumError::InvalidInput("scenario_id is required".into()))?;

        let scenario = self
            .catalog
            .get_scenario(scenario_id)
            .await?
            .ok_or_else(|| FulcrumError::ScenarioNotFound(scenario_id.to_string()))?;

        let config = self.defaults.clone().with_overrides(&request.overrides);
        config.validate()?;

        let entities = resolve_entities(
            self.catalog.as_ref(),
            ResolveRequest {
                scenario: &scenario,
                // an empty selection means "no selection"
                entity_ids: request.entity_ids.as_deref().filter(|ids| !ids.is_empty()),
                organization_id: request.organization_id.as_deref(),
                include_client: request.include_client,
            },
        )
        .await?;
        if !entities.iter().any(|e| e.included) {
            return Err(FulcrumError::NoEntities(scenario.id.clone()));
        }

        let simulation_id = uuid::Uuid::new_v4().to_string();
        let record = SimulationRecord::new(
            simulation_id.as_str(),
            scenario.id.as_str(),
            request.organization_id.clone(),
            config.clone(),
            entities.clone(),
        );
        self.store.create_simulation(&record).await?;

        tracing::info!(
            simulation = %simulation_id,
            scenario = %scenario.id,
            entities = entities.len(),
            max_rounds = config.max_rounds,
            min_rounds = config.min_rounds,
            "simulation started"
        );

        let mut run = SimulationRun::new(simulation_id, scenario, entities, config);
        let error = match self.run_loop(&mut run).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    simulation = %run.simulation_id,
                    rounds_completed = run.rounds_completed(),
                    error = %e,
                    "simulation failed"
                );
                run.status = SimulationStatus::Failed;
                Some(e.to_string())
            },
        };

        Ok(self.finish(run, error, started).await)
    }

    /// The round loop. Leaves `run.status` terminal on `Ok`.
    pub async fn run_loop(&self, run: &mut SimulationRun) -> Result<()> {
        let detector =
            StabilizationDetector::new(run.config.min_rounds, run.config.stabilization_threshold);
        let settings = RoundSettings::from(&run.config);

        while run.rounds_completed() < run.config.max_rounds {
            let round = run.rounds_completed() + 1;
            let context = run.context(round);
            let started_at = Utc::now();
            tracing::debug!(simulation = %run.simulation_id, round, "round started");

            let outcome = self.executor.execute(&run.entities, &context, settings).await?;

            let record = RoundRecord {
                simulation_id: run.simulation_id.clone(),
                round_number: round,
                responses: outcome.responses,
                analysis: outcome.analysis,
                skipped: outcome.skipped,
                duration_ms: outcome.duration_ms,
                started_at,
                completed_at: Utc::now(),
            };
            self.store.record_round(&record).await?;

            tracing::info!(
                simulation = %run.simulation_id,
                round,
                responses = record.responses.len(),
                skipped = record.skipped.len(),
                duration_ms = record.duration_ms,
                "round completed"
            );

            run.push_round(record.responses, record.analysis);

            let check = run
                .view(round)
                .and_then(|current| detector.check(round, current, run.view(round - 1)));

            let stabilized = match check {
                Some(check) => {
                    tracing::debug!(
                        round,
                        score = check.score,
                        stabilized = check.is_stabilized,
                        reasons = ?check.reasons,
                        "stabilization check"
                    );
                    let stabilized = check.is_stabilized;
                    run.checks.push(check);
                    stabilized
                },
                None => false,
            };

            self.store
                .update_progress(
                    &run.simulation_id,
                    &SimulationProgress {
                        rounds_completed: round,
                        stabilization_score: run.stabilization_score(),
                    },
                )
                .await?;

            if stabilized {
                run.status = SimulationStatus::Stabilized;
                return Ok(());
            }
        }

        run.status = SimulationStatus::MaxRoundsReached;
        Ok(())
    }

    async fn finish(
        &self,
        mut run: SimulationRun,
        mut error: Option<String>,
        started: Instant,
    ) -> SimulationResult {
        let latest = run.latest_analysis();
        let dominant_narratives = latest
            .map(CrossEntityAnalysis::dominant_narratives)
            .unwrap_or_default();
        let gaps_identified = latest
            .map(CrossEntityAnalysis::gap_descriptions)
            .unwrap_or_default();
        let key_coalitions = latest.map(|a| a.coalitions.clone()).unwrap_or_default();

        let fulcrums: Vec<Fulcrum> = if run.rounds_completed() > 0 {
            self.fulcrums
                .identify(&run.scenario, &run.entities, run.latest_responses(), latest)
                .await
        } else {
            Vec::new()
        };

        let outcome = SimulationFinal {
            status: run.status,
            rounds_completed: run.rounds_completed(),
            stabilization_score: run.stabilization_score(),
            dominant_narratives,
            key_coalitions,
            gaps_identified,
            fulcrums,
            error: error.clone(),
        };

        if let Err(e) = self.store.finalize(&run.simulation_id, &outcome).await {
            tracing::error!(simulation = %run.simulation_id, error = %e, "failed to finalize simulation");
            run.status = SimulationStatus::Failed;
            error.get_or_insert_with(|| e.to_string());
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            simulation = %run.simulation_id,
            status = ?run.status,
            rounds_completed = outcome.rounds_completed,
            fulcrums = outcome.fulcrums.len(),
            duration_ms,
            "simulation finished"
        );

        SimulationResult {
            success: run.status != SimulationStatus::Failed,
            simulation_id: run.simulation_id,
            status: run.status,
            rounds_completed: outcome.rounds_completed,
            stabilization_score: outcome.stabilization_score,
            dominant_narratives: outcome.dominant_narratives,
            key_coalitions: outcome.key_coalitions,
            gaps_identified: outcome.gaps_identified,
            fulcrums: outcome.fulcrums,
            duration_ms,
            error,
        }
    }
}
