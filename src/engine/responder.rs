//! Entity responders: the per-entity generation step of a round.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;

use super::round::EntityResponder;
use crate::domain::{
    EntityResponse, EntityType, PredictedReaction, ResponseDecision, RoundContext,
    SimulationEntity,
};
use crate::error::{FulcrumError, Result};
use crate::llm::{CompletionGateway, CompletionRequest};

/// Prior-round responses quoted back to each entity.
const MAX_QUOTED_RESPONSES: usize = 12;

const RESPONDER_SYSTEM: &str = "You role-play one organization reacting publicly to a scenario. \
Stay consistent with the organization's previous positions unless events justify a shift. \
Respond with a single JSON object and nothing else.";

/// Responder that asks the completion gateway to play each entity.
#[derive(Debug, Clone)]
pub struct LlmEntityResponder {
    gateway: CompletionGateway,
}

impl LlmEntityResponder {
    /// Responder calling through `gateway`.
    pub fn new(gateway: CompletionGateway) -> Self {
        Self { gateway }
    }

    fn prompt(entity: &SimulationEntity, context: &RoundContext) -> String {
        let scenario = &context.scenario;
        let mut prompt = format!(
            "You are {} ({}).\n{}\n\nScenario ({}): {}\n",
            entity.name, entity.entity_type, entity.description, scenario.scenario_type, scenario.action
        );
        if let Some(industry) = &scenario.industry {
            prompt.push_str(&format!("Industry: {industry}\n"));
        }
        prompt.push_str(&format!("Round {}.\n", context.round_number));

        if let Some(memory) = context.entity_memory.get(&entity.entity_id) {
            prompt.push_str("\nYour history so far:\n");
            for (round, decision) in &memory.decisions {
                prompt.push_str(&format!("- round {round}: {decision}\n"));
            }
            if !memory.latest_position.is_empty() {
                prompt.push_str(&format!("Latest position: {}\n", memory.latest_position));
            }
            if !memory.claims.is_empty() {
                prompt.push_str(&format!("Claims you made: {}\n", memory.claims.join(" | ")));
            }
            if !memory.themes.is_empty() {
                prompt.push_str(&format!("Themes you pushed: {}\n", memory.themes.join(", ")));
            }
        }

        let others: Vec<_> = context
            .previous_responses
            .iter()
            .filter(|r| r.entity_id != entity.entity_id)
            .take(MAX_QUOTED_RESPONSES)
            .collect();
        if !others.is_empty() {
            prompt.push_str("\nWhat others said last round:\n");
            for r in others {
                prompt.push_str(&format!(
                    "- [{}] {} ({}): {}\n",
                    r.entity_id, r.entity_name, r.response_decision, r.position_summary
                ));
            }
        }
        if !context.dominant_narratives.is_empty() {
            prompt.push_str(&format!(
                "\nDominant narratives: {}\n",
                context.dominant_narratives.join(", ")
            ));
        }
        if !context.gaps.is_empty() {
            prompt.push_str(&format!("Unclaimed territory: {}\n", context.gaps.join("; ")));
        }

        prompt.push_str(
            "\nReturn JSON with keys: \
response_decision (support|oppose|conditional|neutral|silent), \
position_summary, key_claims [string], themes_championed [string], \
predicted_reactions [{entity_id, predicted_response, confidence 0-1}].",
        );
        prompt
    }

    async fn run(&self, entity: &SimulationEntity, context: &RoundContext) -> Result<EntityResponse> {
        let request = CompletionRequest::new(Self::prompt(entity, context))
            .with_system(RESPONDER_SYSTEM)
            .with_temperature(0.7);
        let value = self.gateway.complete_json(&request).await?;
        let raw: RawResponse = serde_json::from_value(value)?;
        raw.into_response(entity, context.round_number)
    }
}

impl EntityResponder for LlmEntityResponder {
    fn respond<'a>(
        &'a self,
        entity: &'a SimulationEntity,
        context: &'a RoundContext,
    ) -> BoxFuture<'a, Result<EntityResponse>> {
        self.run(entity, context).boxed()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawResponse {
    #[serde(alias = "decision")]
    response_decision: String,
    #[serde(alias = "position")]
    position_summary: String,
    #[serde(alias = "claims")]
    key_claims: Vec<String>,
    #[serde(alias = "themes")]
    themes_championed: Vec<String>,
    #[serde(alias = "predictions")]
    predicted_reactions: Vec<RawPrediction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPrediction {
    entity_id: String,
    #[serde(alias = "prediction")]
    predicted_response: String,
    confidence: Option<f64>,
}

impl RawResponse {
    fn into_response(self, entity: &SimulationEntity, round_number: u32) -> Result<EntityResponse> {
        if self.position_summary.trim().is_empty() {
            return Err(FulcrumError::JsonExtraction(format!(
                "response for {} has no position_summary",
                entity.entity_id
            )));
        }
        Ok(EntityResponse {
            entity_id: entity.entity_id.clone(),
            entity_name: entity.name.clone(),
            round_number,
            response_decision: ResponseDecision::parse_lenient(&self.response_decision),
            position_summary: self.position_summary.trim().to_string(),
            key_claims: self.key_claims,
            themes_championed: self.themes_championed,
            predicted_reactions: self
                .predicted_reactions
                .into_iter()
                .filter(|p| !p.entity_id.trim().is_empty())
                .map(|p| PredictedReaction {
                    entity_id: p.entity_id,
                    predicted_response: p.predicted_response,
                    confidence: p
                        .confidence
                        .filter(|c| c.is_finite())
                        .map_or(0.5, |c| c.clamp(0.0, 1.0)),
                })
                .collect(),
        })
    }
}

/// Deterministic responder for offline dry runs.
///
/// Each entity type takes a fixed stance, keeps it across rounds, picks up
/// the current dominant narrative and cites the first other voice it heard.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoResponder;

impl EchoResponder {
    /// New echo responder
    pub fn new() -> Self {
        Self
    }

    fn stance(entity: &SimulationEntity) -> ResponseDecision {
        match entity.entity_type {
            EntityType::Client => ResponseDecision::Support,
            EntityType::Regulator => ResponseDecision::Conditional,
            EntityType::Media => ResponseDecision::Neutral,
            EntityType::Stakeholder => ResponseDecision::Silent,
            EntityType::Company if entity.relevance_score >= 0.5 => ResponseDecision::Oppose,
            EntityType::Company => ResponseDecision::Conditional,
        }
    }

    /// Build the response synchronously.
    pub fn respond_now(&self, entity: &SimulationEntity, context: &RoundContext) -> EntityResponse {
        let decision = context
            .entity_memory
            .get(&entity.entity_id)
            .and_then(|m| m.latest_decision())
            .unwrap_or_else(|| Self::stance(entity));

        let mut themes = vec![format!("{} impact", entity.entity_type)];
        if let Some(narrative) = context.dominant_narratives.first() {
            if !themes.iter().any(|t| t.eq_ignore_ascii_case(narrative)) {
                themes.push(narrative.clone());
            }
        }

        let heard = context
            .previous_responses
            .iter()
            .find(|r| r.entity_id != entity.entity_id);

        let mut key_claims = vec![format!("{} {} the plan to {}", entity.name, decision, context.scenario.action)];
        let mut predicted_reactions = Vec::new();
        if let Some(other) = heard {
            key_claims.push(format!("{} has framed this correctly", other.entity_name));
            predicted_reactions.push(PredictedReaction {
                entity_id: other.entity_id.clone(),
                predicted_response: format!("stay {}", other.response_decision),
                confidence: 0.6,
            });
        }

        EntityResponse {
            entity_id: entity.entity_id.clone(),
            entity_name: entity.name.clone(),
            round_number: context.round_number,
            response_decision: decision,
            position_summary: format!(
                "{} takes a {} stance on: {}",
                entity.name, decision, context.scenario.action
            ),
            key_claims,
            themes_championed: themes,
            predicted_reactions,
        }
    }
}

impl EntityResponder for EchoResponder {
    fn respond<'a>(
        &'a self,
        entity: &'a SimulationEntity,
        context: &'a RoundContext,
    ) -> BoxFuture<'a, Result<EntityResponse>> {
        let response = self.respond_now(entity, context);
        async move { Ok(response) }.boxed()
    }
}
