//! Fulcrum identification.
//!
//! ```text
//!  history ──> extract_candidates (Phase A, pure) ──┬──> synthesizer (Phase B) ──> validate ──> fulcrums
//!                                                   │            │ error / nothing valid
//!                                                   └────────────┴──> fallback_fulcrums (templates)
//! ```
//!
//! Phase A always runs. Phase B is called at most once per run; whatever it
//! returns is validated against the run's own entities before use.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::fulcrum::MIN_REQUESTED_FULCRUMS;
use crate::domain::{
    CrossEntityAnalysis, EntityResponse, FlowType, Fulcrum, FulcrumType, Level, Scenario,
    SimulationEntity, Theme, MAX_FULCRUMS,
};
use crate::error::{FulcrumError, Result};
use crate::llm::{CompletionGateway, CompletionRequest};

/// Top-ranked entities considered for validator paths.
pub const VALIDATOR_POOL: usize = 5;
/// Citations an entity needs to count as a validator.
pub const MIN_VALIDATOR_CITATIONS: u32 = 2;
/// Preemption candidates kept.
pub const MAX_PREEMPTIONS: usize = 5;
/// Predictions at or below this confidence are ignored.
pub const PREEMPTION_MIN_CONFIDENCE: f64 = 0.5;

const VALIDATOR_CONFIDENCE: f64 = 0.6;
const GAP_CONFIDENCE: f64 = 0.5;
const WEDGE_CONFIDENCE: f64 = 0.4;

/// Influential entity others cite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorCandidate {
    /// Entity id
    pub entity_id: String,
    /// Display name
    pub entity_name: String,
    /// Citations received in the final round
    pub citations_received: u32,
    /// Frames adopted by others in the final round
    pub frames_adopted: u32,
    /// Entities that cited it
    pub cited_by: Vec<String>,
}

/// Medium- or high-value unclaimed territory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapCandidate {
    /// Gap description
    pub description: String,
    /// Strategic value
    pub strategic_value: Level,
    /// Entities positioned to fill it
    pub potential_fillers: Vec<String>,
}

/// A coalition member's final-round position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPosition {
    /// Entity id
    pub entity_id: String,
    /// Display name
    pub entity_name: String,
    /// Final-round position summary
    pub position: String,
}

/// Coalition whose members say different things.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WedgeCandidate {
    /// Coalition name
    pub coalition: String,
    /// Member positions
    pub positions: Vec<MemberPosition>,
}

/// Confident prediction about another entity's next move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreemptionCandidate {
    /// Entity making the prediction
    pub predicted_by: String,
    /// Entity the prediction is about
    pub target_entity: String,
    /// Predicted behavior
    pub predicted_response: String,
    /// Confidence in (0.5, 1]
    pub confidence: f64,
}

/// Phase A output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FulcrumCandidates {
    /// Validator paths
    pub validators: Vec<ValidatorCandidate>,
    /// Unoccupied positions
    pub gaps: Vec<GapCandidate>,
    /// Wedge issues
    pub wedges: Vec<WedgeCandidate>,
    /// Preemption opportunities
    pub preemptions: Vec<PreemptionCandidate>,
}

impl FulcrumCandidates {
    /// Whether Phase A found nothing
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
            && self.gaps.is_empty()
            && self.wedges.is_empty()
            && self.preemptions.is_empty()
    }
}

/// Phase A: derive candidates from the final round. Pure and deterministic.
pub fn extract_candidates(
    final_responses: &[EntityResponse],
    final_analysis: Option<&CrossEntityAnalysis>,
) -> FulcrumCandidates {
    let names: HashMap<&str, &str> = final_responses
        .iter()
        .map(|r| (r.entity_id.as_str(), r.entity_name.as_str()))
        .collect();
    let name_of = |id: &str| names.get(id).map_or_else(|| id.to_string(), |n| n.to_string());

    let mut candidates = FulcrumCandidates::default();

    if let Some(analysis) = final_analysis {
        candidates.validators = analysis
            .influence_rankings
            .iter()
            .take(VALIDATOR_POOL)
            .filter(|r| r.citations_received >= MIN_VALIDATOR_CITATIONS)
            .map(|r| {
                let mut cited_by: Vec<String> = analysis
                    .influence_flows
                    .iter()
                    .filter(|f| f.flow_type == FlowType::Citation && f.to_entity == r.entity_id)
                    .map(|f| f.from_entity.clone())
                    .collect();
                let mut seen = HashSet::new();
                cited_by.retain(|id| seen.insert(id.clone()));
                ValidatorCandidate {
                    entity_id: r.entity_id.clone(),
                    entity_name: name_of(&r.entity_id),
                    citations_received: r.citations_received,
                    frames_adopted: r.frames_adopted,
                    cited_by,
                }
            })
            .collect();

        candidates.gaps = analysis
            .gaps
            .iter()
            .filter(|g| g.strategic_value >= Level::Medium)
            .map(|g| GapCandidate {
                description: g.description.clone(),
                strategic_value: g.strategic_value,
                potential_fillers: g.potential_fillers.clone(),
            })
            .collect();

        candidates.wedges = analysis
            .coalitions
            .iter()
            .filter(|c| c.members.len() >= 2)
            .filter_map(|c| {
                let positions: Vec<MemberPosition> = c
                    .members
                    .iter()
                    .filter_map(|m| final_responses.iter().find(|r| &r.entity_id == m))
                    .map(|r| MemberPosition {
                        entity_id: r.entity_id.clone(),
                        entity_name: r.entity_name.clone(),
                        position: r.position_summary.clone(),
                    })
                    .collect();
                let diverges = positions
                    .iter()
                    .any(|p| p.position.trim() != positions[0].position.trim());
                (positions.len() >= 2 && diverges).then(|| WedgeCandidate {
                    coalition: c.name.clone(),
                    positions,
                })
            })
            .collect();
    }

    candidates.preemptions = final_responses
        .iter()
        .flat_map(|r| {
            r.predicted_reactions
                .iter()
                .filter(|p| p.confidence > PREEMPTION_MIN_CONFIDENCE)
                .map(move |p| PreemptionCandidate {
                    predicted_by: r.entity_id.clone(),
                    target_entity: p.entity_id.clone(),
                    predicted_response: p.predicted_response.clone(),
                    confidence: p.confidence.min(1.0),
                })
        })
        .take(MAX_PREEMPTIONS)
        .collect();

    candidates
}

/// Everything Phase B sees.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    /// Scenario simulated
    pub scenario: &'a Scenario,
    /// Resolved entities
    pub entities: &'a [SimulationEntity],
    /// Phase A output
    pub candidates: &'a FulcrumCandidates,
    /// Final-round responses
    pub final_responses: &'a [EntityResponse],
    /// Final-round themes with momentum
    pub themes: &'a [Theme],
}

/// Phase B: generative synthesis. Returns the raw JSON to be validated.
pub trait FulcrumSynthesizer: Send + Sync {
    /// Synthesize fulcrums from `input`.
    fn synthesize<'a>(&'a self, input: &'a SynthesisInput<'a>) -> BoxFuture<'a, Result<Value>>;
}

const SYNTHESIS_SYSTEM: &str = "You are a strategist identifying high-leverage intervention points. \
Every fulcrum must name specific entities from the simulation and cite their observed positions. \
Generic advice is rejected. Respond with a JSON array and nothing else.";

/// Synthesizer backed by the completion gateway.
#[derive(Debug, Clone)]
pub struct LlmFulcrumSynthesizer {
    gateway: CompletionGateway,
}

impl LlmFulcrumSynthesizer {
    /// Synthesizer calling through `gateway`.
    pub fn new(gateway: CompletionGateway) -> Self {
        Self { gateway }
    }

    fn prompt(input: &SynthesisInput<'_>) -> String {
        let mut prompt = format!("Scenario: {}\n\nFinal positions:\n", input.scenario.action);
        for r in input.final_responses {
            prompt.push_str(&format!(
                "- {} ({}): {}\n",
                r.entity_name, r.response_decision, r.position_summary
            ));
        }

        if !input.themes.is_empty() {
            prompt.push_str("\nTheme momentum:\n");
            for t in input.themes {
                prompt.push_str(&format!(
                    "- {}: {:?}, {} adopters\n",
                    t.label,
                    t.momentum,
                    t.adopters.len()
                ));
            }
        }

        let signals = serde_json::to_string_pretty(input.candidates).unwrap_or_default();
        prompt.push_str(&format!("\nCandidate signals:\n{signals}\n"));

        let types: Vec<&str> = FulcrumType::ALL.iter().map(|t| t.as_str()).collect();
        prompt.push_str(&format!(
            "\nReturn {MIN_REQUESTED_FULCRUMS}-{MAX_FULCRUMS} fulcrums as a JSON array of objects with: \
type ({}), description, target_entity, rationale, cascade_prediction [string], \
effort_level (low|medium|high), impact_level (low|medium|high), confidence (0-1).",
            types.join("|")
        ));
        prompt
    }
}

impl FulcrumSynthesizer for LlmFulcrumSynthesizer {
    fn synthesize<'a>(&'a self, input: &'a SynthesisInput<'a>) -> BoxFuture<'a, Result<Value>> {
        async move {
            let request = CompletionRequest::new(Self::prompt(input))
                .with_system(SYNTHESIS_SYSTEM)
                .with_temperature(0.4);
            self.gateway.complete_json(&request).await
        }
        .boxed()
    }
}

fn str_field<'v>(item: &'v Value, keys: &[&str]) -> Option<&'v str> {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn confidence_field(item: &Value) -> f64 {
    let raw = match item.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    raw.filter(|c| c.is_finite()).map_or(0.5, |c| c.clamp(0.0, 1.0))
}

fn cascade_field(item: &Value) -> Vec<String> {
    match item.get("cascade_prediction") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Validate Phase B output.
///
/// Accepts a bare array or an object wrapping one under `fulcrums`. Items
/// without a description, with an unknown type, or not mentioning any of
/// `entity_names` are dropped. At most [`MAX_FULCRUMS`] are kept.
pub fn validate_fulcrums(raw: &Value, entity_names: &[&str]) -> Vec<Fulcrum> {
    let items: &[Value] = match raw {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("fulcrums") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };
    let names: Vec<String> = entity_names
        .iter()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect();

    items
        .iter()
        .filter_map(|item| {
            let description = str_field(item, &["description"])?;
            let fulcrum_type = str_field(item, &["type", "fulcrum_type"]).and_then(FulcrumType::parse)?;
            let rationale = str_field(item, &["rationale"]).unwrap_or_default();

            let text = format!("{description} {rationale}").to_lowercase();
            if !names.iter().any(|n| text.contains(n.as_str())) {
                tracing::debug!(description, "dropping ungrounded fulcrum");
                return None;
            }

            Some(Fulcrum {
                fulcrum_id: uuid::Uuid::new_v4().to_string(),
                fulcrum_type,
                description: description.to_string(),
                target_entity: str_field(item, &["target_entity", "target"]).map(str::to_string),
                rationale: rationale.to_string(),
                cascade_prediction: cascade_field(item),
                effort_level: Level::parse_lenient(str_field(item, &["effort_level", "effort"]).unwrap_or("medium")),
                impact_level: Level::parse_lenient(str_field(item, &["impact_level", "impact"]).unwrap_or("medium")),
                confidence: confidence_field(item),
            })
        })
        .take(MAX_FULCRUMS)
        .collect()
}

/// Template fulcrums built from Phase A alone. Never fails.
pub fn fallback_fulcrums(candidates: &FulcrumCandidates) -> Vec<Fulcrum> {
    let validators = candidates.validators.iter().map(|v| Fulcrum {
        fulcrum_id: uuid::Uuid::new_v4().to_string(),
        fulcrum_type: FulcrumType::ValidatorPath,
        description: format!(
            "Engage {} as a validator; {} citations from other entities",
            v.entity_name, v.citations_received
        ),
        target_entity: Some(v.entity_id.clone()),
        rationale: format!("{} is cited by {}", v.entity_name, v.cited_by.join(", ")),
        cascade_prediction: vec![format!("Entities citing {} follow its lead", v.entity_name)],
        effort_level: Level::Medium,
        impact_level: Level::High,
        confidence: VALIDATOR_CONFIDENCE,
    });

    let gaps = candidates.gaps.iter().map(|g| Fulcrum {
        fulcrum_id: uuid::Uuid::new_v4().to_string(),
        fulcrum_type: FulcrumType::UnoccupiedPosition,
        description: format!("Occupy unclaimed territory: {}", g.description),
        target_entity: None,
        rationale: if g.potential_fillers.is_empty() {
            "No entity has taken this position".to_string()
        } else {
            format!("Could otherwise be filled by {}", g.potential_fillers.join(", "))
        },
        cascade_prediction: Vec::new(),
        effort_level: Level::Low,
        impact_level: g.strategic_value,
        confidence: GAP_CONFIDENCE,
    });

    let wedges = candidates.wedges.iter().map(|w| Fulcrum {
        fulcrum_id: uuid::Uuid::new_v4().to_string(),
        fulcrum_type: FulcrumType::WedgeIssue,
        description: format!("Probe the divergence inside {}", w.coalition),
        target_entity: w.positions.first().map(|p| p.entity_id.clone()),
        rationale: w
            .positions
            .iter()
            .map(|p| format!("{}: {}", p.entity_name, p.position))
            .collect::<Vec<_>>()
            .join(" / "),
        cascade_prediction: Vec::new(),
        effort_level: Level::Medium,
        impact_level: Level::Medium,
        confidence: WEDGE_CONFIDENCE,
    });

    validators.chain(gaps).chain(wedges).take(MAX_FULCRUMS).collect()
}

/// Runs Phase A, then Phase B with fallback.
#[derive(Clone, Default)]
pub struct FulcrumIdentifier {
    synthesizer: Option<Arc<dyn FulcrumSynthesizer>>,
}

impl FulcrumIdentifier {
    /// Identifier with a synthesis step.
    pub fn new(synthesizer: Arc<dyn FulcrumSynthesizer>) -> Self {
        Self {
            synthesizer: Some(synthesizer),
        }
    }

    /// Identifier that only ever uses the template fallback.
    pub fn algorithmic() -> Self {
        Self { synthesizer: None }
    }

    /// Produce the run's fulcrums. Never fails.
    pub async fn identify(
        &self,
        scenario: &Scenario,
        entities: &[SimulationEntity],
        final_responses: &[EntityResponse],
        final_analysis: Option<&CrossEntityAnalysis>,
    ) -> Vec<Fulcrum> {
        let candidates = extract_candidates(final_responses, final_analysis);
        tracing::debug!(
            validators = candidates.validators.len(),
            gaps = candidates.gaps.len(),
            wedges = candidates.wedges.len(),
            preemptions = candidates.preemptions.len(),
            "fulcrum candidates extracted"
        );

        let Some(synthesizer) = &self.synthesizer else {
            return fallback_fulcrums(&candidates);
        };

        let input = SynthesisInput {
            scenario,
            entities,
            candidates: &candidates,
            final_responses,
            themes: final_analysis.map(|a| a.themes.as_slice()).unwrap_or_default(),
        };

        // only entities that took part ground a fulcrum
        let names: Vec<&str> = entities
            .iter()
            .filter(|e| e.included)
            .map(|e| e.name.as_str())
            .collect();
        let outcome = synthesizer
            .synthesize(&input)
            .await
            .map(|raw| validate_fulcrums(&raw, &names));

        match outcome {
            Ok(fulcrums) if !fulcrums.is_empty() => {
                tracing::info!(count = fulcrums.len(), "fulcrums synthesized");
                fulcrums
            },
            Ok(_) => {
                tracing::warn!("synthesis produced no valid fulcrums, using fallback");
                fallback_fulcrums(&candidates)
            },
            Err(e) => {
                let e = FulcrumError::Synthesis(e.to_string());
                tracing::warn!(error = %e, "fulcrum synthesis failed, using fallback");
                fallback_fulcrums(&candidates)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::domain::{
        Coalition, CoalitionStability, EntityType, InfluenceFlow, InfluenceRanking, NarrativeGap,
        PredictedReaction, ResponseDecision,
    };

    fn response(id: &str, position: &str, predictions: &[(&str, f64)]) -> EntityResponse {
        EntityResponse {
            entity_id: id.into(),
            entity_name: format!("{} Inc", id.to_uppercase()),
            round_number: 3,
            response_decision: ResponseDecision::Oppose,
            position_summary: position.into(),
            key_claims: Vec::new(),
            themes_championed: Vec::new(),
            predicted_reactions: predictions
                .iter()
                .map(|(target, c)| PredictedReaction {
                    entity_id: target.to_string(),
                    predicted_response: "objects".into(),
                    confidence: *c,
                })
                .collect(),
        }
    }

    fn citation(from: &str, to: &str) -> InfluenceFlow {
        InfluenceFlow {
            from_entity: from.into(),
            to_entity: to.into(),
            flow_type: FlowType::Citation,
        }
    }

    fn analysis() -> CrossEntityAnalysis {
        CrossEntityAnalysis {
            round_number: 3,
            coalitions: vec![
                Coalition {
                    name: "Critics".into(),
                    members: vec!["a".into(), "b".into()],
                    stability: CoalitionStability::Stable,
                },
                Coalition {
                    name: "Echoes".into(),
                    members: vec!["c".into(), "d".into()],
                    stability: CoalitionStability::Stable,
                },
            ],
            gaps: vec![
                NarrativeGap {
                    description: "Consumer savings".into(),
                    strategic_value: Level::High,
                    potential_fillers: vec!["c".into()],
                },
                NarrativeGap {
                    description: "Minor footnote".into(),
                    strategic_value: Level::Low,
                    potential_fillers: Vec::new(),
                },
            ],
            influence_rankings: vec![
                InfluenceRanking { entity_id: "a".into(), citations_received: 2, frames_adopted: 1 },
                InfluenceRanking { entity_id: "b".into(), citations_received: 1, frames_adopted: 0 },
            ],
            influence_flows: vec![citation("b", "a"), citation("c", "a")],
            ..Default::default()
        }
    }

    fn final_responses() -> Vec<EntityResponse> {
        vec![
            response("a", "Fares will rise", &[("reg", 0.9), ("b", 0.5)]),
            response("b", "Routes will be cut", &[("reg", 0.7)]),
            response("c", "Same", &[]),
            response("d", "Same", &[]),
        ]
    }

    fn entities() -> Vec<SimulationEntity> {
        ["a", "b", "c", "d"]
            .iter()
            .map(|id| SimulationEntity {
                entity_id: id.to_string(),
                name: format!("{} Inc", id.to_uppercase()),
                entity_type: EntityType::Company,
                relevance_score: 0.5,
                included: true,
                description: String::new(),
            })
            .collect()
    }

    fn scenario() -> Scenario {
        Scenario {
            id: "s".into(),
            title: String::new(),
            scenario_type: String::new(),
            action: "Merge airlines".into(),
            industry: None,
            stakeholders: Vec::new(),
        }
    }

    #[test]
    fn test_extract_candidates() {
        let a = analysis();
        let candidates = extract_candidates(&final_responses(), Some(&a));

        assert_eq!(candidates.validators.len(), 1);
        assert_eq!(candidates.validators[0].entity_name, "A Inc");
        assert_eq!(candidates.validators[0].cited_by, vec!["b", "c"]);

        assert_eq!(candidates.gaps.len(), 1);
        assert_eq!(candidates.gaps[0].description, "Consumer savings");

        // identical positions are not a wedge
        assert_eq!(candidates.wedges.len(), 1);
        assert_eq!(candidates.wedges[0].coalition, "Critics");

        // 0.5 is not above the bar
        assert_eq!(candidates.preemptions.len(), 2);
    }

    #[test]
    fn test_extract_without_analysis() {
        let candidates = extract_candidates(&final_responses(), None);
        assert!(candidates.validators.is_empty());
        assert_eq!(candidates.preemptions.len(), 2);
        assert!(extract_candidates(&[], None).is_empty());
    }

    #[test]
    fn test_preemptions_capped() {
        let preds: Vec<(&str, f64)> = vec![("x", 0.9); 8];
        let candidates = extract_candidates(&[response("a", "p", &preds)], None);
        assert_eq!(candidates.preemptions.len(), MAX_PREEMPTIONS);
    }

    #[test]
    fn test_fallback_templates() {
        let a = analysis();
        let fulcrums = fallback_fulcrums(&extract_candidates(&final_responses(), Some(&a)));
        let types: Vec<_> = fulcrums.iter().map(|f| f.fulcrum_type).collect();
        assert_eq!(
            types,
            vec![FulcrumType::ValidatorPath, FulcrumType::UnoccupiedPosition, FulcrumType::WedgeIssue]
        );
        assert_eq!(fulcrums[0].confidence, 0.6);
        assert_eq!(fulcrums[1].confidence, 0.5);
        assert_eq!(fulcrums[1].impact_level, Level::High);
        assert_eq!(fulcrums[2].confidence, 0.4);
        assert!(fallback_fulcrums(&FulcrumCandidates::default()).is_empty());
    }

    #[test]
    fn test_validate_fulcrums() {
        let raw = json!({"fulcrums": [
            {"type": "wedge_issue", "description": "Split A Inc from B Inc on routes",
             "rationale": "B Inc fears cuts", "confidence": 3, "effort_level": "LOW",
             "cascade_prediction": "A Inc isolated"},
            {"type": "partnership", "description": "Partner with A Inc"},
            {"type": "preemption", "description": "   "},
            {"type": "validator_path", "description": "Find a champion", "rationale": "Generic"},
            {"fulcrum_type": "preemption", "description": "Pre-brief the regulator",
             "rationale": "A Inc predicts an inquiry", "confidence": "0.7", "impact": "high"}
        ]});
        let fulcrums = validate_fulcrums(&raw, &["A Inc", "B Inc"]);
        assert_eq!(fulcrums.len(), 2);
        assert_eq!(fulcrums[0].confidence, 1.0);
        assert_eq!(fulcrums[0].effort_level, Level::Low);
        assert_eq!(fulcrums[0].impact_level, Level::Medium);
        assert_eq!(fulcrums[0].cascade_prediction, vec!["A Inc isolated"]);
        assert_eq!(fulcrums[1].fulcrum_type, FulcrumType::Preemption);
        assert!((fulcrums[1].confidence - 0.7).abs() < f64::EPSILON);
        assert_eq!(fulcrums[1].impact_level, Level::High);

        assert!(validate_fulcrums(&json!("nope"), &["A Inc"]).is_empty());
    }

    struct Scripted {
        output: Option<Value>,
        calls: AtomicUsize,
    }

    impl FulcrumSynthesizer for Scripted {
        fn synthesize<'a>(&'a self, _input: &'a SynthesisInput<'a>) -> BoxFuture<'a, Result<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let output = self.output.clone();
            async move { output.ok_or_else(|| FulcrumError::AllProvidersFailed(vec!["x: down".into()])) }
                .boxed()
        }
    }

    #[tokio::test]
    async fn test_identify_uses_synthesis_when_valid() {
        let synth = Arc::new(Scripted {
            output: Some(json!([{"type": "validator_path", "description": "Court A Inc", "confidence": 0.9}])),
            calls: AtomicUsize::new(0),
        });
        let a = analysis();
        let fulcrums = FulcrumIdentifier::new(synth.clone())
            .identify(&scenario(), &entities(), &final_responses(), Some(&a))
            .await;
        assert_eq!(fulcrums.len(), 1);
        assert_eq!(fulcrums[0].description, "Court A Inc");
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_identify_ignores_excluded_entities() {
        let synth = Arc::new(Scripted {
            output: Some(json!([{"type": "validator_path",
                                 "description": "Recruit Zenith Backfill as validator"}])),
            calls: AtomicUsize::new(0),
        });
        let mut entities = entities();
        entities.push(SimulationEntity {
            entity_id: "z".into(),
            name: "Zenith Backfill".into(),
            entity_type: EntityType::Company,
            relevance_score: 0.2,
            included: false,
            description: String::new(),
        });
        let a = analysis();
        let fulcrums = FulcrumIdentifier::new(synth.clone())
            .identify(&scenario(), &entities, &final_responses(), Some(&a))
            .await;

        // ungrounded synthesis output falls back to the templates
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert!(fulcrums.iter().all(|f| !f.description.contains("Zenith")));
        assert_eq!(fulcrums.len(), 3);
    }

    #[tokio::test]
    async fn test_identify_falls_back_once() {
        for output in [None, Some(json!([{"type": "bogus", "description": "A Inc"}]))] {
            let synth = Arc::new(Scripted {
                output,
                calls: AtomicUsize::new(0),
            });
            let a = analysis();
            let fulcrums = FulcrumIdentifier::new(synth.clone())
                .identify(&scenario(), &entities(), &final_responses(), Some(&a))
                .await;
            assert_eq!(fulcrums.len(), 3);
            assert!(fulcrums.iter().all(|f| f.confidence <= 0.6));
            assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_prompt_lists_positions_and_candidates() {
        let a = analysis();
        let candidates = extract_candidates(&final_responses(), Some(&a));
        let responses = final_responses();
        let entities = entities();
        let scenario = scenario();
        let input = SynthesisInput {
            scenario: &scenario,
            entities: &entities,
            candidates: &candidates,
            final_responses: &responses,
            themes: &[],
        };
        let prompt = LlmFulcrumSynthesizer::prompt(&input);
        assert!(prompt.contains("A Inc (oppose): Fares will rise"));
        assert!(prompt.contains("Consumer savings"));
        assert!(prompt.contains("3-8 fulcrums"));
    }

    fn arb_item() -> impl Strategy<Value = Value> {
        (
            prop::sample::select(vec!["validator_path", "wedge_issue", "preemption", "other", ""]),
            prop::sample::select(vec!["", "Talk to A Inc", "generic move"]),
            any::<f64>(),
        )
            .prop_map(|(ty, desc, conf)| json!({"type": ty, "description": desc, "confidence": conf}))
    }

    proptest! {
        #[test]
        fn prop_validated_fulcrums_are_bounded(items in prop::collection::vec(arb_item(), 0..20)) {
            let fulcrums = validate_fulcrums(&Value::Array(items), &["A Inc"]);
            prop_assert!(fulcrums.len() <= MAX_FULCRUMS);
            for f in &fulcrums {
                prop_assert!(FulcrumType::ALL.contains(&f.fulcrum_type));
                prop_assert!((0.0..=1.0).contains(&f.confidence));
                prop_assert!(!f.description.is_empty());
            }
        }
    }
}
