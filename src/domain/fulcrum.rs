//! Strategic leverage points produced once per run.

use serde::{Deserialize, Serialize};

use super::analysis::Level;

/// Maximum fulcrums a run may produce.
pub const MAX_FULCRUMS: usize = 8;

/// Minimum fulcrums requested from synthesis.
pub const MIN_REQUESTED_FULCRUMS: usize = 3;

/// Kind of leverage point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulcrumType {
    /// Win over an influential entity others cite
    ValidatorPath,
    /// Claim narrative territory nobody holds
    UnoccupiedPosition,
    /// Exploit divergence inside an apparent coalition
    WedgeIssue,
    /// Get ahead of a predicted reaction
    Preemption,
}

impl FulcrumType {
    /// All types, in prompt order.
    pub const ALL: [FulcrumType; 4] = [
        FulcrumType::ValidatorPath,
        FulcrumType::UnoccupiedPosition,
        FulcrumType::WedgeIssue,
        FulcrumType::Preemption,
    ];

    /// Wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            FulcrumType::ValidatorPath => "validator_path",
            FulcrumType::UnoccupiedPosition => "unoccupied_position",
            FulcrumType::WedgeIssue => "wedge_issue",
            FulcrumType::Preemption => "preemption",
        }
    }

    /// Strict parse from a wire label. Only the four defined labels are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for FulcrumType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An evidence-grounded intervention point. Never revised after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fulcrum {
    /// Fulcrum id
    pub fulcrum_id: String,
    /// Fulcrum kind
    #[serde(rename = "type")]
    pub fulcrum_type: FulcrumType,
    /// Specific action description
    pub description: String,
    /// Entity the action targets, if any
    #[serde(default)]
    pub target_entity: Option<String>,
    /// Why, grounded in observed behavior
    pub rationale: String,
    /// Predicted knock-on effects
    #[serde(default)]
    pub cascade_prediction: Vec<String>,
    /// Effort to execute
    pub effort_level: Level,
    /// Expected impact
    pub impact_level: Level,
    /// Confidence in [0, 1]
    pub confidence: f64,
}
