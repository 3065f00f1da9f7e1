//! Shared fixtures for integration tests: a small catalog and scripted
//! collaborators whose behavior each test dials in.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use fulcrum::domain::{
    CrossEntityAnalysis, EntityProfile, EntityResponse, EntityType, PredictedReaction,
    ResponseDecision, RoundContext, Scenario, SimulationConfig, SimulationEntity,
};
use fulcrum::engine::{
    CrossEntityAnalyzer, EntityResponder, FulcrumIdentifier, FulcrumSynthesizer,
    HeuristicAnalyzer, SimulationEngine, SynthesisInput,
};
use fulcrum::store::{CatalogData, InMemoryCatalog, InMemorySimulationStore, SimulationStore};
use fulcrum::{FulcrumError, Result};

/// Catalog with one airline scenario naming three stakeholders, plus a
/// handful of unrelated profiles.
pub fn catalog() -> Arc<InMemoryCatalog> {
    let profile = |id: &str, name: &str, entity_type: EntityType| EntityProfile {
        id: id.into(),
        name: name.into(),
        entity_type,
        industry: Some("aviation".into()),
        description: format!("{name} profile"),
        relevance_score: 0.8,
    };

    Arc::new(InMemoryCatalog::new(CatalogData {
        scenarios: vec![Scenario {
            id: "merger".into(),
            title: "Regional merger".into(),
            scenario_type: "announcement".into(),
            action: "Merge with the largest regional carrier".into(),
            industry: Some("aviation".into()),
            stakeholders: vec![
                "SkyWays".into(),
                "Aviation Authority".into(),
                "Travel Weekly".into(),
            ],
        }],
        entities: vec![
            profile("sky", "SkyWays", EntityType::Company),
            profile("caa", "Aviation Authority", EntityType::Regulator),
            profile("tw", "Travel Weekly", EntityType::Media),
            profile("e1", "Jet Fuel Co", EntityType::Company),
            profile("e2", "Airport Group", EntityType::Company),
        ],
        organizations: vec![profile("us", "Our Airline", EntityType::Company)],
    }))
}

/// Trigger request for the catalog's scenario.
pub fn request(max_rounds: u32, min_rounds: u32) -> fulcrum::TriggerRequest {
    fulcrum::TriggerRequest {
        scenario_id: Some("merger".into()),
        overrides: fulcrum::domain::SimulationOverrides {
            max_rounds: Some(max_rounds),
            min_rounds: Some(min_rounds),
            entity_timeout_ms: Some(200),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Responder with a fixed stance per entity; entities in `hang` never answer.
pub struct ScriptedResponder {
    pub hang: HashSet<String>,
    pub calls: AtomicUsize,
}

impl ScriptedResponder {
    pub fn new() -> Self {
        Self {
            hang: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn hanging(ids: &[&str]) -> Self {
        Self {
            hang: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::new()
        }
    }
}

impl EntityResponder for ScriptedResponder {
    fn respond<'a>(
        &'a self,
        entity: &'a SimulationEntity,
        context: &'a RoundContext,
    ) -> BoxFuture<'a, Result<EntityResponse>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if self.hang.contains(&entity.entity_id) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            let decision = match entity.entity_type {
                EntityType::Regulator => ResponseDecision::Conditional,
                EntityType::Media => ResponseDecision::Conditional,
                _ => ResponseDecision::Oppose,
            };
            let cited = context
                .previous_responses
                .iter()
                .find(|r| r.entity_id != entity.entity_id);
            let mut key_claims = vec![format!("{} weighs in", entity.name)];
            let mut predicted_reactions = Vec::new();
            if let Some(other) = cited {
                key_claims.push(format!("As {} said, fares will rise", other.entity_name));
                predicted_reactions.push(PredictedReaction {
                    entity_id: other.entity_id.clone(),
                    predicted_response: "holds firm".into(),
                    confidence: 0.8,
                });
            }
            Ok(EntityResponse {
                entity_id: entity.entity_id.clone(),
                entity_name: entity.name.clone(),
                round_number: context.round_number,
                response_decision: decision,
                position_summary: format!("{} position on round {}", entity.name, context.round_number),
                key_claims,
                themes_championed: vec!["fare pressure".into()],
                predicted_reactions,
            })
        }
        .boxed()
    }
}

/// Heuristic structure with a scripted score; optionally fails on one round.
pub struct ScriptedAnalyzer {
    pub score: f64,
    pub fail_on_round: Option<u32>,
}

impl ScriptedAnalyzer {
    pub fn scoring(score: f64) -> Self {
        Self {
            score,
            fail_on_round: None,
        }
    }

    pub fn failing_on(round: u32) -> Self {
        Self {
            score: 0.0,
            fail_on_round: Some(round),
        }
    }
}

impl CrossEntityAnalyzer for ScriptedAnalyzer {
    fn analyze<'a>(
        &'a self,
        context: &'a RoundContext,
        responses: &'a [EntityResponse],
    ) -> BoxFuture<'a, Result<CrossEntityAnalysis>> {
        let outcome = if self.fail_on_round == Some(context.round_number) {
            Err(FulcrumError::AllProvidersFailed(vec![
                "openrouter: 503".into(),
                "openai: 500".into(),
            ]))
        } else {
            let mut analysis = HeuristicAnalyzer::new().analyze_round(context, responses);
            analysis.stabilization_score = self.score;
            Ok(analysis)
        };
        async move { outcome }.boxed()
    }
}

/// Synthesizer returning a canned value, or failing when `output` is `None`.
pub struct ScriptedSynthesizer {
    pub output: Option<Value>,
    pub calls: AtomicUsize,
}

impl ScriptedSynthesizer {
    pub fn returning(output: Value) -> Self {
        Self {
            output: Some(output),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            output: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FulcrumSynthesizer for ScriptedSynthesizer {
    fn synthesize<'a>(&'a self, _input: &'a SynthesisInput<'a>) -> BoxFuture<'a, Result<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let output = self
            .output
            .clone()
            .ok_or_else(|| FulcrumError::Network("connection reset".into()));
        async move { output }.boxed()
    }
}

/// Engine over the shared catalog, an in-memory store and the given collaborators.
pub fn engine(
    responder: Arc<dyn EntityResponder>,
    analyzer: Arc<dyn CrossEntityAnalyzer>,
    synthesizer: Option<Arc<dyn FulcrumSynthesizer>>,
) -> (SimulationEngine, Arc<InMemorySimulationStore>) {
    let store = Arc::new(InMemorySimulationStore::new());
    let engine = engine_with_store(responder, analyzer, synthesizer, store.clone());
    (engine, store)
}

/// Engine over the shared catalog and an explicit store.
pub fn engine_with_store(
    responder: Arc<dyn EntityResponder>,
    analyzer: Arc<dyn CrossEntityAnalyzer>,
    synthesizer: Option<Arc<dyn FulcrumSynthesizer>>,
    store: Arc<dyn SimulationStore>,
) -> SimulationEngine {
    let fulcrums = synthesizer.map_or_else(FulcrumIdentifier::algorithmic, FulcrumIdentifier::new);
    SimulationEngine::new(
        catalog(),
        store,
        responder,
        analyzer,
        fulcrums,
        SimulationConfig::default(),
    )
}
