//! Cross-entity analysis of a round's responses.
//!
//! Two implementations share the [`CrossEntityAnalyzer`] seam:
//!
//! - [`LlmCrossEntityAnalyzer`] asks the completion gateway for the analysis
//!   and normalizes whatever shape comes back.
//! - [`HeuristicAnalyzer`] derives it deterministically from the responses,
//!   with no network access.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use futures::future::BoxFuture;
use futures::FutureExt;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Deserialize;

use super::stabilization::{jaccard, normalize_label, position_stability};
use crate::domain::{
    Coalition, CoalitionStability, CrossEntityAnalysis, EntityResponse, FlowType, InfluenceFlow,
    InfluenceRanking, Level, Momentum, NarrativeGap, ResponseDecision, RoundContext, Theme,
};
use crate::error::{FulcrumError, Result};
use crate::llm::{CompletionGateway, CompletionRequest};

/// Weight of theme overlap in the heuristic stabilization score.
const THEME_OVERLAP_WEIGHT: f64 = 0.6;
/// Weight of unchanged decisions in the heuristic stabilization score.
const DECISION_STABILITY_WEIGHT: f64 = 0.4;

/// Turns a round's responses into a [`CrossEntityAnalysis`].
pub trait CrossEntityAnalyzer: Send + Sync {
    /// Analyze `responses` against the themes and gaps carried in `context`.
    fn analyze<'a>(
        &'a self,
        context: &'a RoundContext,
        responses: &'a [EntityResponse],
    ) -> BoxFuture<'a, Result<CrossEntityAnalysis>>;
}

/// Rank entities by incoming influence edges.
///
/// Every participant gets a ranking, even with no edges. Ordered by combined
/// score, then id.
pub fn rank_influence<'a>(
    participants: impl IntoIterator<Item = &'a str>,
    flows: &'a [InfluenceFlow],
) -> Vec<InfluenceRanking> {
    let mut graph: DiGraph<&'a str, FlowType> = DiGraph::new();
    let mut nodes: BTreeMap<&'a str, NodeIndex> = BTreeMap::new();

    let endpoints = flows
        .iter()
        .flat_map(|f| [f.from_entity.as_str(), f.to_entity.as_str()]);
    for id in participants.into_iter().chain(endpoints) {
        nodes.entry(id).or_insert_with(|| graph.add_node(id));
    }
    for flow in flows {
        let from = nodes[flow.from_entity.as_str()];
        let to = nodes[flow.to_entity.as_str()];
        graph.add_edge(from, to, flow.flow_type);
    }

    let mut rankings: Vec<InfluenceRanking> = graph
        .node_indices()
        .map(|idx| {
            let (citations, frames) = graph.edges_directed(idx, Direction::Incoming).fold(
                (0u32, 0u32),
                |(c, f), edge| match edge.weight() {
                    FlowType::Citation => (c + 1, f),
                    FlowType::FrameAdoption => (c, f + 1),
                },
            );
            InfluenceRanking {
                entity_id: graph[idx].to_string(),
                citations_received: citations,
                frames_adopted: frames,
            }
        })
        .collect();

    rankings.sort_by(|a, b| b.score().cmp(&a.score()).then_with(|| a.entity_id.cmp(&b.entity_id)));
    rankings
}

// ---------------------------------------------------------------------------
// Heuristic analyzer
// ---------------------------------------------------------------------------

/// Deterministic analyzer for offline runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    /// New heuristic analyzer
    pub fn new() -> Self {
        Self
    }

    /// Synchronous analysis; the trait impl wraps this.
    pub fn analyze_round(
        &self,
        context: &RoundContext,
        responses: &[EntityResponse],
    ) -> CrossEntityAnalysis {
        let themes = Self::themes(context, responses);
        let coalitions = Self::coalitions(&context.previous_responses, responses);
        let gaps = Self::gaps(context, responses, &themes);
        let influence_flows = Self::flows(context, responses, &themes);
        let influence_rankings =
            rank_influence(responses.iter().map(|r| r.entity_id.as_str()), &influence_flows);
        let stabilization_score = Self::score(context, responses);

        CrossEntityAnalysis {
            round_number: context.round_number,
            themes,
            coalitions,
            gaps,
            influence_rankings,
            influence_flows,
            stabilization_score,
        }
    }

    fn themes(context: &RoundContext, responses: &[EntityResponse]) -> Vec<Theme> {
        // key -> (display label, adopters in response order)
        let mut current: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();
        for response in responses {
            for label in &response.themes_championed {
                let key = normalize_label(label);
                if key.is_empty() {
                    continue;
                }
                let (_, adopters) = current
                    .entry(key)
                    .or_insert_with(|| (label.trim().to_string(), Vec::new()));
                if !adopters.contains(&response.entity_id) {
                    adopters.push(response.entity_id.clone());
                }
            }
        }

        let prior: HashMap<String, &Theme> = context
            .themes
            .iter()
            .map(|t| (normalize_label(&t.label), t))
            .collect();

        let mut themes: Vec<Theme> = current
            .iter()
            .map(|(key, (label, adopters))| {
                let carried = prior.get(key);
                let momentum = match carried {
                    None => Momentum::Rising,
                    Some(t) if adopters.len() > t.adopters.len() => Momentum::Rising,
                    Some(t) if adopters.len() < t.adopters.len() => Momentum::Fading,
                    Some(_) => Momentum::Stable,
                };
                Theme {
                    label: carried.map_or_else(|| label.clone(), |t| t.label.clone()),
                    momentum,
                    owner: carried
                        .and_then(|t| t.owner.clone())
                        .or_else(|| adopters.first().cloned()),
                    adopters: adopters.clone(),
                }
            })
            .collect();

        // abandoned this round: keep one more round as fading, then drop
        for theme in &context.themes {
            let key = normalize_label(&theme.label);
            if !current.contains_key(&key) && !theme.adopters.is_empty() {
                themes.push(Theme {
                    label: theme.label.clone(),
                    momentum: Momentum::Fading,
                    owner: theme.owner.clone(),
                    adopters: Vec::new(),
                });
            }
        }
        themes
    }

    fn coalitions(previous: &[EntityResponse], current: &[EntityResponse]) -> Vec<Coalition> {
        let group = |responses: &[EntityResponse]| {
            let mut groups: BTreeMap<ResponseDecision, BTreeSet<String>> = BTreeMap::new();
            for r in responses {
                if r.response_decision != ResponseDecision::Silent {
                    groups
                        .entry(r.response_decision)
                        .or_default()
                        .insert(r.entity_id.clone());
                }
            }
            groups
        };

        let before = group(previous);
        group(current)
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .map(|(decision, members)| {
                let stability = match before.get(&decision) {
                    Some(prev) if *prev == members => CoalitionStability::Stable,
                    Some(prev) if members.is_subset(prev) => CoalitionStability::Fracturing,
                    _ => CoalitionStability::Forming,
                };
                Coalition {
                    name: format!("{decision} bloc"),
                    members: members.into_iter().collect(),
                    stability,
                }
            })
            .collect()
    }

    fn gaps(context: &RoundContext, responses: &[EntityResponse], themes: &[Theme]) -> Vec<NarrativeGap> {
        let uncommitted: Vec<String> = responses
            .iter()
            .filter(|r| {
                matches!(
                    r.response_decision,
                    ResponseDecision::Neutral | ResponseDecision::Conditional
                )
            })
            .map(|r| r.entity_id.clone())
            .collect();
        let live_labels: Vec<String> = themes
            .iter()
            .filter(|t| !t.adopters.is_empty())
            .map(|t| normalize_label(&t.label))
            .collect();
        let addressed = |description: &str| {
            let description = description.to_lowercase();
            live_labels.iter().any(|l| description.contains(l.as_str()))
        };

        let mut gaps: Vec<NarrativeGap> = Vec::new();
        let mut push = |gap: NarrativeGap| {
            if !gaps.iter().any(|g| g.description == gap.description) {
                gaps.push(gap);
            }
        };

        // carried gaps still unclaimed have proven durable
        for description in context.gaps.iter().filter(|d| !addressed(d)) {
            push(NarrativeGap {
                description: description.clone(),
                strategic_value: Level::Medium,
                potential_fillers: uncommitted.clone(),
            });
        }

        // themes dropped by everyone leave their territory open
        for theme in themes.iter().filter(|t| t.adopters.is_empty()) {
            push(NarrativeGap {
                description: format!("Abandoned framing: {}", theme.label),
                strategic_value: Level::Medium,
                potential_fillers: uncommitted.clone(),
            });
        }

        // predicted reactions aimed at entities that stayed quiet
        let voiced: HashMap<&str, ResponseDecision> = responses
            .iter()
            .map(|r| (r.entity_id.as_str(), r.response_decision))
            .collect();
        for response in responses {
            for prediction in &response.predicted_reactions {
                let silent = voiced
                    .get(prediction.entity_id.as_str())
                    .map_or(true, |d| *d == ResponseDecision::Silent);
                if silent && prediction.entity_id != response.entity_id {
                    push(NarrativeGap {
                        description: format!(
                            "No public position from {} (expected to {})",
                            prediction.entity_id, prediction.predicted_response
                        ),
                        strategic_value: Level::Low,
                        potential_fillers: vec![response.entity_id.clone()],
                    });
                }
            }
        }

        gaps
    }

    fn flows(context: &RoundContext, responses: &[EntityResponse], themes: &[Theme]) -> Vec<InfluenceFlow> {
        let mut flows: Vec<InfluenceFlow> = Vec::new();
        let mut push = |flow: InfluenceFlow| {
            if !flows.contains(&flow) {
                flows.push(flow);
            }
        };

        for theme in themes {
            if let Some(owner) = &theme.owner {
                for adopter in theme.adopters.iter().filter(|a| *a != owner) {
                    push(InfluenceFlow {
                        from_entity: adopter.clone(),
                        to_entity: owner.clone(),
                        flow_type: FlowType::FrameAdoption,
                    });
                }
            }
        }

        let mut known: BTreeMap<&str, String> = BTreeMap::new();
        for r in context.previous_responses.iter().chain(responses) {
            if !r.entity_name.trim().is_empty() {
                known.insert(r.entity_id.as_str(), r.entity_name.to_lowercase());
            }
        }

        for response in responses {
            for claim in &response.key_claims {
                let claim = claim.to_lowercase();
                for (id, name) in &known {
                    if *id != response.entity_id && claim.contains(name.as_str()) {
                        push(InfluenceFlow {
                            from_entity: response.entity_id.clone(),
                            to_entity: id.to_string(),
                            flow_type: FlowType::Citation,
                        });
                    }
                }
            }
        }

        flows
    }

    fn score(context: &RoundContext, responses: &[EntityResponse]) -> f64 {
        if context.round_number <= 1 {
            return 0.0;
        }
        let overlap = jaccard(
            context
                .themes
                .iter()
                .filter(|t| !t.adopters.is_empty())
                .map(|t| t.label.as_str()),
            responses
                .iter()
                .flat_map(|r| r.themes_championed.iter().map(String::as_str)),
        );
        let stability = position_stability(&context.previous_responses, responses);
        THEME_OVERLAP_WEIGHT * overlap + DECISION_STABILITY_WEIGHT * stability
    }
}

impl CrossEntityAnalyzer for HeuristicAnalyzer {
    fn analyze<'a>(
        &'a self,
        context: &'a RoundContext,
        responses: &'a [EntityResponse],
    ) -> BoxFuture<'a, Result<CrossEntityAnalysis>> {
        let analysis = self.analyze_round(context, responses);
        async move { Ok(analysis) }.boxed()
    }
}

// ---------------------------------------------------------------------------
// LLM analyzer
// ---------------------------------------------------------------------------

const ANALYZER_SYSTEM: &str = "You analyze how a set of organizations react to a scenario. \
Respond with a single JSON object and nothing else.";

/// Analyzer backed by the completion gateway.
#[derive(Debug, Clone)]
pub struct LlmCrossEntityAnalyzer {
    gateway: CompletionGateway,
}

impl LlmCrossEntityAnalyzer {
    /// Analyzer calling through `gateway`.
    pub fn new(gateway: CompletionGateway) -> Self {
        Self { gateway }
    }

    fn prompt(context: &RoundContext, responses: &[EntityResponse]) -> String {
        let mut prompt = format!(
            "Scenario: {}\nRound: {}\n\n",
            context.scenario.action, context.round_number
        );

        if !context.themes.is_empty() {
            prompt.push_str("Themes from the previous round:\n");
            for theme in &context.themes {
                prompt.push_str(&format!(
                    "- {} ({:?}, owner: {}, adopters: {})\n",
                    theme.label,
                    theme.momentum,
                    theme.owner.as_deref().unwrap_or("none"),
                    theme.adopters.join(", ")
                ));
            }
            prompt.push('\n');
        }
        if !context.gaps.is_empty() {
            prompt.push_str(&format!("Open gaps: {}\n\n", context.gaps.join("; ")));
        }

        prompt.push_str("Responses this round:\n");
        for r in responses {
            prompt.push_str(&format!(
                "- [{}] {} ({}): {}\n  claims: {}\n  themes: {}\n",
                r.entity_id,
                r.entity_name,
                r.response_decision,
                r.position_summary,
                r.key_claims.join(" | "),
                r.themes_championed.join(", ")
            ));
        }

        prompt.push_str(
            "\nReturn JSON with keys: \
themes [{label, momentum: rising|stable|fading, owner, adopters}], \
coalitions [{name, members, stability: stable|fracturing|forming}], \
gaps [{description, strategic_value: low|medium|high, potential_fillers}], \
influence_flows [{from_entity, to_entity, type: citation|frame_adoption}], \
influence_rankings [{entity_id, citations_received, frames_adopted}], \
stabilization_score (0-1, how little the landscape changed since the previous round). \
Use entity ids from the brackets.",
        );
        prompt
    }

    async fn run(&self, context: &RoundContext, responses: &[EntityResponse]) -> Result<CrossEntityAnalysis> {
        let request = CompletionRequest::new(Self::prompt(context, responses))
            .with_system(ANALYZER_SYSTEM)
            .with_temperature(0.2);
        let value = self.gateway.complete_json(&request).await?;
        let raw: RawAnalysis = serde_json::from_value(value)
            .map_err(|e| FulcrumError::Analyzer(format!("malformed analysis: {e}")))?;
        Ok(raw.normalize(context.round_number, responses))
    }
}

impl CrossEntityAnalyzer for LlmCrossEntityAnalyzer {
    fn analyze<'a>(
        &'a self,
        context: &'a RoundContext,
        responses: &'a [EntityResponse],
    ) -> BoxFuture<'a, Result<CrossEntityAnalysis>> {
        self.run(context, responses).boxed()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
    themes: Vec<RawTheme>,
    coalitions: Vec<RawCoalition>,
    gaps: Vec<RawGap>,
    influence_rankings: Vec<InfluenceRanking>,
    influence_flows: Vec<RawFlow>,
    stabilization_score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTheme {
    #[serde(alias = "theme", alias = "name")]
    label: String,
    momentum: String,
    owner: Option<String>,
    adopters: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCoalition {
    name: String,
    members: Vec<String>,
    stability: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawGap {
    #[serde(alias = "gap")]
    description: String,
    strategic_value: String,
    potential_fillers: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFlow {
    #[serde(alias = "from")]
    from_entity: String,
    #[serde(alias = "to")]
    to_entity: String,
    #[serde(rename = "type", alias = "flow_type")]
    kind: String,
}

fn parse_momentum(s: &str) -> Momentum {
    match s.trim().to_lowercase().as_str() {
        "rising" | "emerging" | "growing" | "new" => Momentum::Rising,
        "fading" | "declining" | "falling" => Momentum::Fading,
        _ => Momentum::Stable,
    }
}

fn parse_stability(s: &str) -> CoalitionStability {
    match s.trim().to_lowercase().as_str() {
        "stable" | "solid" => CoalitionStability::Stable,
        "fracturing" | "weakening" | "splitting" => CoalitionStability::Fracturing,
        _ => CoalitionStability::Forming,
    }
}

fn parse_flow_type(s: &str) -> Option<FlowType> {
    match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
        "citation" | "cite" | "cites" => Some(FlowType::Citation),
        "frame_adoption" | "adoption" | "frame" | "adopted_frame" => Some(FlowType::FrameAdoption),
        _ => None,
    }
}

impl RawAnalysis {
    fn normalize(self, round_number: u32, responses: &[EntityResponse]) -> CrossEntityAnalysis {
        let themes = self
            .themes
            .into_iter()
            .filter(|t| !t.label.trim().is_empty())
            .map(|t| Theme {
                label: t.label.trim().to_string(),
                momentum: parse_momentum(&t.momentum),
                owner: t.owner.filter(|o| !o.trim().is_empty()),
                adopters: t.adopters,
            })
            .collect();

        let coalitions = self
            .coalitions
            .into_iter()
            .filter(|c| !c.members.is_empty())
            .map(|c| Coalition {
                name: c.name,
                members: c.members,
                stability: parse_stability(&c.stability),
            })
            .collect();

        let gaps = self
            .gaps
            .into_iter()
            .filter(|g| !g.description.trim().is_empty())
            .map(|g| NarrativeGap {
                description: g.description,
                strategic_value: Level::parse_lenient(&g.strategic_value),
                potential_fillers: g.potential_fillers,
            })
            .collect();

        let influence_flows: Vec<InfluenceFlow> = self
            .influence_flows
            .into_iter()
            .filter_map(|f| {
                let flow_type = parse_flow_type(&f.kind)?;
                (!f.from_entity.is_empty() && !f.to_entity.is_empty()).then_some(InfluenceFlow {
                    from_entity: f.from_entity,
                    to_entity: f.to_entity,
                    flow_type,
                })
            })
            .collect();

        let influence_rankings = if self.influence_rankings.is_empty() {
            rank_influence(
                responses.iter().map(|r| r.entity_id.as_str()),
                &influence_flows,
            )
        } else {
            let mut rankings = self.influence_rankings;
            rankings.sort_by(|a, b| b.score().cmp(&a.score()).then_with(|| a.entity_id.cmp(&b.entity_id)));
            rankings
        };

        let stabilization_score = self
            .stabilization_score
            .filter(|s| s.is_finite())
            .map_or(0.0, |s| s.clamp(0.0, 1.0));

        CrossEntityAnalysis {
            round_number,
            themes,
            coalitions,
            gaps,
            influence_rankings,
            influence_flows,
            stabilization_score,
        }
    }
}
