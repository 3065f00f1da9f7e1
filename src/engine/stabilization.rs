//! Convergence gate for the simulation loop.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{CrossEntityAnalysis, EntityResponse};

const ANALYZER_WEIGHT: f64 = 0.5;
const THEME_WEIGHT: f64 = 0.25;
const POSITION_WEIGHT: f64 = 0.25;

/// One round's output as the detector sees it.
#[derive(Debug, Clone, Copy)]
pub struct RoundView<'a> {
    /// Responses gathered in the round
    pub responses: &'a [EntityResponse],
    /// Analysis of those responses
    pub analysis: &'a CrossEntityAnalysis,
}

/// Detector verdict for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilizationCheck {
    /// Round checked
    pub round_number: u32,
    /// Combined score in [0, 1]
    pub score: f64,
    /// `score >= threshold`
    pub is_stabilized: bool,
    /// Contributing factors
    pub reasons: Vec<String>,
}

/// Decides when successive rounds stop changing the narrative landscape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizationDetector {
    min_rounds: u32,
    threshold: f64,
}

impl StabilizationDetector {
    /// Detector gated at `min_rounds` with a convergence `threshold`.
    pub fn new(min_rounds: u32, threshold: f64) -> Self {
        Self {
            min_rounds,
            threshold,
        }
    }

    /// Check round `current_round`. Returns `None` before `min_rounds`.
    pub fn check(
        &self,
        current_round: u32,
        current: RoundView<'_>,
        previous: Option<RoundView<'_>>,
    ) -> Option<StabilizationCheck> {
        if current_round < self.min_rounds {
            return None;
        }

        let analyzer_score = current.analysis.stabilization_score.clamp(0.0, 1.0);
        let mut reasons = vec![format!("analyzer score {analyzer_score:.2}")];

        let score = match previous {
            Some(previous) => {
                let themes = theme_similarity(previous.analysis, current.analysis);
                let positions = position_stability(previous.responses, current.responses);
                reasons.push(format!("theme overlap {themes:.2}"));
                reasons.push(format!("positions unchanged {positions:.2}"));
                ANALYZER_WEIGHT * analyzer_score + THEME_WEIGHT * themes + POSITION_WEIGHT * positions
            },
            None => {
                reasons.push("no prior round to compare".to_string());
                analyzer_score
            },
        };

        let is_stabilized = score >= self.threshold;
        reasons.push(if is_stabilized {
            format!("score {score:.2} meets threshold {:.2}", self.threshold)
        } else {
            format!("score {score:.2} below threshold {:.2}", self.threshold)
        });

        tracing::debug!(round = current_round, score, is_stabilized, "stabilization check");

        Some(StabilizationCheck {
            round_number: current_round,
            score,
            is_stabilized,
            reasons,
        })
    }
}

/// Jaccard similarity of two label sets. Two empty sets are identical.
pub(crate) fn jaccard<'a>(
    a: impl IntoIterator<Item = &'a str>,
    b: impl IntoIterator<Item = &'a str>,
) -> f64 {
    let a: BTreeSet<String> = a.into_iter().map(normalize_label).collect();
    let b: BTreeSet<String> = b.into_iter().map(normalize_label).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

pub(crate) fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

fn theme_similarity(previous: &CrossEntityAnalysis, current: &CrossEntityAnalysis) -> f64 {
    jaccard(
        previous.themes.iter().map(|t| t.label.as_str()),
        current.themes.iter().map(|t| t.label.as_str()),
    )
}

/// Fraction of entities present in both rounds whose decision did not change.
pub(crate) fn position_stability(previous: &[EntityResponse], current: &[EntityResponse]) -> f64 {
    let before: HashMap<&str, _> = previous
        .iter()
        .map(|r| (r.entity_id.as_str(), r.response_decision))
        .collect();

    let (same, shared) = current
        .iter()
        .filter_map(|r| before.get(r.entity_id.as_str()).map(|d| *d == r.response_decision))
        .fold((0usize, 0usize), |(same, shared), unchanged| {
            (same + usize::from(unchanged), shared + 1)
        });

    if shared == 0 {
        0.0
    } else {
        same as f64 / shared as f64
    }
}
