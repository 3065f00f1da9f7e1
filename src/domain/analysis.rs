//! Per-round structural analysis of the entity response set.

use serde::{Deserialize, Serialize};

/// Direction a theme is moving in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Momentum {
    /// Gaining adopters
    Rising,
    /// Losing adopters
    Fading,
    /// Holding steady
    #[default]
    #[serde(other)]
    Stable,
}

/// A narrative theme with its owner and adopters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    /// Theme label
    pub label: String,
    /// Momentum classification
    #[serde(default)]
    pub momentum: Momentum,
    /// Entity that introduced the framing
    #[serde(default)]
    pub owner: Option<String>,
    /// Entities that picked the framing up
    #[serde(default)]
    pub adopters: Vec<String>,
}

/// How durable a coalition looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoalitionStability {
    /// Same membership as the previous round
    Stable,
    /// Members pulling apart
    Fracturing,
    /// New or changing membership
    #[default]
    #[serde(other)]
    Forming,
}

/// A named group of aligned entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coalition {
    /// Coalition name
    pub name: String,
    /// Member entity ids
    pub members: Vec<String>,
    /// Stability label
    #[serde(default)]
    pub stability: CoalitionStability,
}

/// Three-tier value scale shared by gaps and fulcrum effort/impact.
///
/// Deserialization is lenient: unknown labels map to `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Low
    Low,
    /// Medium
    #[default]
    Medium,
    /// High
    High,
}

impl Level {
    /// Lenient parse; unknown labels map to `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Level::Low,
            "high" => Level::High,
            _ => Level::Medium,
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(Level::parse_lenient(&label))
    }
}

/// Unclaimed narrative territory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeGap {
    /// What nobody is saying
    pub description: String,
    /// Value of occupying it
    #[serde(default)]
    pub strategic_value: Level,
    /// Entities positioned to fill it
    #[serde(default)]
    pub potential_fillers: Vec<String>,
}

/// Influence tally for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluenceRanking {
    /// Entity id
    pub entity_id: String,
    /// Times other entities cited it
    #[serde(default)]
    pub citations_received: u32,
    /// Times other entities adopted its framing
    #[serde(default)]
    pub frames_adopted: u32,
}

impl InfluenceRanking {
    /// Combined influence score used for ordering
    pub fn score(&self) -> u32 {
        self.citations_received + self.frames_adopted
    }
}

/// Kind of influence edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// `from` cited `to`
    Citation,
    /// `from` adopted `to`'s framing
    FrameAdoption,
}

/// Directed influence edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluenceFlow {
    /// Source entity
    pub from_entity: String,
    /// Target entity
    pub to_entity: String,
    /// Edge kind
    #[serde(rename = "type")]
    pub flow_type: FlowType,
}

/// One round's structural summary. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CrossEntityAnalysis {
    /// Round analysed
    #[serde(default)]
    pub round_number: u32,
    /// Themes with momentum
    #[serde(default)]
    pub themes: Vec<Theme>,
    /// Entity coalitions
    #[serde(default)]
    pub coalitions: Vec<Coalition>,
    /// Narrative gaps
    #[serde(default)]
    pub gaps: Vec<NarrativeGap>,
    /// Influence tallies, most influential first
    #[serde(default)]
    pub influence_rankings: Vec<InfluenceRanking>,
    /// Influence edges
    #[serde(default)]
    pub influence_flows: Vec<InfluenceFlow>,
    /// Convergence signal in [0, 1], comparable only within one run
    #[serde(default)]
    pub stabilization_score: f64,
}

impl CrossEntityAnalysis {
    /// Themes that count as dominant narratives: rising, or adopted by more than two entities.
    pub fn dominant_narratives(&self) -> Vec<String> {
        self.themes
            .iter()
            .filter(|t| t.momentum == Momentum::Rising || t.adopters.len() > 2)
            .map(|t| t.label.clone())
            .collect()
    }

    /// Rising themes only, carried into the next round's context
    pub fn rising_themes(&self) -> Vec<String> {
        self.themes
            .iter()
            .filter(|t| t.momentum == Momentum::Rising)
            .map(|t| t.label.clone())
            .collect()
    }

    /// Gap descriptions
    pub fn gap_descriptions(&self) -> Vec<String> {
        self.gaps.iter().map(|g| g.description.clone()).collect()
    }
}
