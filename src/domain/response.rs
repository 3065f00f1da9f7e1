//! Per-entity, per-round simulated reactions.

use serde::{Deserialize, Serialize};

/// Categorical stance an entity takes in a round.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ResponseDecision {
    /// Publicly backs the action
    Support,
    /// Publicly opposes the action
    Oppose,
    /// Backs the action with conditions attached
    Conditional,
    /// Declines to engage
    Silent,
    /// Engages without taking a side
    #[default]
    #[serde(other)]
    Neutral,
}

impl ResponseDecision {
    /// Lenient parse of model output; unknown labels map to `Neutral`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "support" | "supports" | "endorse" | "endorses" | "agree" => Self::Support,
            "oppose" | "opposes" | "reject" | "rejects" | "criticize" | "criticise" => {
                Self::Oppose
            },
            "conditional" | "conditional_support" | "qualified" => Self::Conditional,
            "silent" | "no_comment" | "ignore" | "decline" => Self::Silent,
            _ => Self::Neutral,
        }
    }

    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Oppose => "oppose",
            Self::Conditional => "conditional",
            Self::Silent => "silent",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for ResponseDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entity's guess about how another entity will behave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedReaction {
    /// Entity the prediction is about
    pub entity_id: String,
    /// Predicted behavior
    pub predicted_response: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// One entity's simulated reaction in one round. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityResponse {
    /// Responding entity
    pub entity_id: String,
    /// Responding entity's display name
    pub entity_name: String,
    /// Round the response belongs to (1-based)
    pub round_number: u32,
    /// Categorical stance
    pub response_decision: ResponseDecision,
    /// Free-text position
    pub position_summary: String,
    /// Claims the entity makes
    #[serde(default)]
    pub key_claims: Vec<String>,
    /// Themes the entity pushes
    #[serde(default)]
    pub themes_championed: Vec<String>,
    /// Predictions about other entities
    #[serde(default)]
    pub predicted_reactions: Vec<PredictedReaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lenient() {
        assert_eq!(ResponseDecision::parse_lenient(" Supports "), ResponseDecision::Support);
        assert_eq!(ResponseDecision::parse_lenient("REJECT"), ResponseDecision::Oppose);
        assert_eq!(ResponseDecision::parse_lenient("whatever"), ResponseDecision::Neutral);
    }

    #[test]
    fn test_unknown_decision_deserializes_neutral() {
        let d: ResponseDecision = serde_json::from_str(r#""ambivalent""#).unwrap();
        assert_eq!(d, ResponseDecision::Neutral);
    }
}
