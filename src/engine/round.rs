//! Round execution: gather every included entity's response, then analyze.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture};

use super::analyzer::CrossEntityAnalyzer;
use crate::domain::{
    CrossEntityAnalysis, EntityResponse, RoundContext, SimulationConfig, SimulationEntity,
    SkippedEntity,
};
use crate::error::{FulcrumError, Result};

/// Produces one entity's simulated reaction for a round.
pub trait EntityResponder: Send + Sync {
    /// Generate `entity`'s response to `context`.
    fn respond<'a>(
        &'a self,
        entity: &'a SimulationEntity,
        context: &'a RoundContext,
    ) -> BoxFuture<'a, Result<EntityResponse>>;
}

/// Concurrency and deadline settings for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSettings {
    /// Max concurrent responder calls
    pub parallel_batch_size: usize,
    /// Per-entity deadline
    pub entity_timeout: Duration,
}

impl From<&SimulationConfig> for RoundSettings {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            parallel_batch_size: config.parallel_batch_size.max(1),
            entity_timeout: Duration::from_millis(config.entity_timeout_ms),
        }
    }
}

/// Everything one round produced.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// Responses that arrived in time
    pub responses: Vec<EntityResponse>,
    /// Analysis of those responses
    pub analysis: CrossEntityAnalysis,
    /// Entities absent from this round
    pub skipped: Vec<SkippedEntity>,
    /// Wall-clock duration
    pub duration_ms: u64,
}

/// Runs a single round against a responder and an analyzer.
#[derive(Clone)]
pub struct RoundExecutor {
    responder: Arc<dyn EntityResponder>,
    analyzer: Arc<dyn CrossEntityAnalyzer>,
}

impl RoundExecutor {
    /// Executor over the given collaborators.
    pub fn new(responder: Arc<dyn EntityResponder>, analyzer: Arc<dyn CrossEntityAnalyzer>) -> Self {
        Self {
            responder,
            analyzer,
        }
    }

    /// Run one round.
    ///
    /// Per-entity failures and timeouts become [`SkippedEntity`] entries. An
    /// analyzer failure fails the round.
    pub async fn execute(
        &self,
        entities: &[SimulationEntity],
        context: &RoundContext,
        settings: RoundSettings,
    ) -> Result<RoundOutcome> {
        let started = Instant::now();
        let round = context.round_number;
        let included: Vec<&SimulationEntity> = entities.iter().filter(|e| e.included).collect();

        let mut responses = Vec::with_capacity(included.len());
        let mut skipped = Vec::new();

        for batch in included.chunks(settings.parallel_batch_size.max(1)) {
            let calls = batch.iter().map(|entity| async move {
                let result =
                    tokio::time::timeout(settings.entity_timeout, self.responder.respond(entity, context))
                        .await;
                (*entity, result)
            });

            for (entity, result) in join_all(calls).await {
                match result {
                    Ok(Ok(response)) => responses.push(stamp(response, entity, round)),
                    Ok(Err(e)) => {
                        tracing::warn!(round, entity = %entity.entity_id, error = %e, "entity response failed");
                        skipped.push(SkippedEntity {
                            entity_id: entity.entity_id.clone(),
                            reason: e.to_string(),
                        });
                    },
                    Err(_) => {
                        let ms = settings.entity_timeout.as_millis() as u64;
                        tracing::warn!(round, entity = %entity.entity_id, timeout_ms = ms, "entity response timed out");
                        skipped.push(SkippedEntity {
                            entity_id: entity.entity_id.clone(),
                            reason: FulcrumError::Timeout(ms).to_string(),
                        });
                    },
                }
            }
        }

        tracing::debug!(round, responses = responses.len(), skipped = skipped.len(), "responses gathered");

        let mut analysis = self
            .analyzer
            .analyze(context, &responses)
            .await
            .map_err(|e| match e {
                FulcrumError::Analyzer(_) => e,
                other => FulcrumError::Analyzer(format!("round {round}: {other}")),
            })?;
        analysis.round_number = round;
        analysis.stabilization_score = analysis.stabilization_score.clamp(0.0, 1.0);

        Ok(RoundOutcome {
            responses,
            analysis,
            skipped,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Pin identity fields to the entity and round that were asked for.
fn stamp(mut response: EntityResponse, entity: &SimulationEntity, round: u32) -> EntityResponse {
    response.entity_id = entity.entity_id.clone();
    if response.entity_name.trim().is_empty() {
        response.entity_name = entity.name.clone();
    }
    response.round_number = round;
    for prediction in &mut response.predicted_reactions {
        prediction.confidence = prediction.confidence.clamp(0.0, 1.0);
    }
    response
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;

    use super::*;
    use crate::domain::{EntityType, ResponseDecision, Scenario};

    struct SlowFor {
        slow_id: &'static str,
        failing_id: &'static str,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl EntityResponder for SlowFor {
        fn respond<'a>(
            &'a self,
            entity: &'a SimulationEntity,
            context: &'a RoundContext,
        ) -> BoxFuture<'a, Result<EntityResponse>> {
            async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                let _guard = InFlight(&self.in_flight);
                self.peak.fetch_max(now, Ordering::SeqCst);
                if entity.entity_id == self.slow_id {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                if entity.entity_id == self.failing_id {
                    return Err(FulcrumError::JsonExtraction("garbled".into()));
                }
                Ok(EntityResponse {
                    entity_id: "wrong".into(),
                    entity_name: String::new(),
                    round_number: context.round_number + 50,
                    response_decision: ResponseDecision::Support,
                    position_summary: format!("{} agrees", entity.name),
                    key_claims: Vec::new(),
                    themes_championed: vec!["growth".into()],
                    predicted_reactions: Vec::new(),
                })
            }
            .boxed()
        }
    }

    struct CountingAnalyzer {
        fail: bool,
    }

    impl CrossEntityAnalyzer for CountingAnalyzer {
        fn analyze<'a>(
            &'a self,
            _context: &'a RoundContext,
            responses: &'a [EntityResponse],
        ) -> BoxFuture<'a, Result<CrossEntityAnalysis>> {
            let fail = self.fail;
            let n = responses.len();
            async move {
                if fail {
                    return Err(FulcrumError::AllProvidersFailed(vec!["a: down".into()]));
                }
                Ok(CrossEntityAnalysis {
                    stabilization_score: n as f64,
                    ..Default::default()
                })
            }
            .boxed()
        }
    }

    fn entity(id: &str, included: bool) -> SimulationEntity {
        SimulationEntity {
            entity_id: id.into(),
            name: id.to_uppercase(),
            entity_type: EntityType::Company,
            relevance_score: 0.5,
            included,
            description: String::new(),
        }
    }

    fn context() -> RoundContext {
        RoundContext {
            simulation_id: "sim".into(),
            round_number: 2,
            scenario: Scenario {
                id: "s".into(),
                title: String::new(),
                scenario_type: String::new(),
                action: "act".into(),
                industry: None,
                stakeholders: Vec::new(),
            },
            previous_responses: Vec::new(),
            themes: Vec::new(),
            dominant_narratives: Vec::new(),
            gaps: Vec::new(),
            entity_memory: BTreeMap::new(),
        }
    }

    fn responder() -> Arc<SlowFor> {
        Arc::new(SlowFor {
            slow_id: "slow",
            failing_id: "bad",
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_timeouts_and_failures_are_skipped() {
        let responder = responder();
        let executor = RoundExecutor::new(responder.clone(), Arc::new(CountingAnalyzer { fail: false }));
        let entities = vec![
            entity("a", true),
            entity("slow", true),
            entity("bad", true),
            entity("b", true),
            entity("excluded", false),
        ];
        let settings = RoundSettings {
            parallel_batch_size: 2,
            entity_timeout: Duration::from_millis(100),
        };

        let outcome = executor.execute(&entities, &context(), settings).await.unwrap();

        let ids: Vec<_> = outcome.responses.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(outcome.responses.iter().all(|r| r.round_number == 2));
        assert_eq!(outcome.responses[0].entity_name, "A");

        let skipped: Vec<_> = outcome.skipped.iter().map(|s| s.entity_id.as_str()).collect();
        assert_eq!(skipped, vec!["slow", "bad"]);
        assert!(outcome.skipped[0].reason.contains("Timed out"));

        assert_eq!(outcome.analysis.round_number, 2);
        // analyzer saw two responses, score clamped into [0, 1]
        assert!((outcome.analysis.stabilization_score - 1.0).abs() < f64::EPSILON);
        assert!(responder.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_analyzer_failure_fails_round() {
        let executor = RoundExecutor::new(responder(), Arc::new(CountingAnalyzer { fail: true }));
        let err = executor
            .execute(
                &[entity("a", true)],
                &context(),
                RoundSettings::from(&SimulationConfig::default()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FulcrumError::Analyzer(_)));
        assert!(err.to_string().contains("round 2"));
    }

    #[test]
    fn test_settings_from_config() {
        let settings = RoundSettings::from(&SimulationConfig {
            parallel_batch_size: 3,
            entity_timeout_ms: 250,
            ..Default::default()
        });
        assert_eq!(settings.parallel_batch_size, 3);
        assert_eq!(settings.entity_timeout, Duration::from_millis(250));
    }
}
