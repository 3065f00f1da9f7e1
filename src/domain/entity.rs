//! Scenarios and the entities that react to them.

use serde::{Deserialize, Serialize};

/// Kind of participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Company in the scenario's industry (default backfill pool)
    #[default]
    Company,
    /// The requesting organization itself
    Client,
    /// Regulator or government body
    Regulator,
    /// Media outlet or journalist
    Media,
    /// Advocacy group, investor, or other stakeholder
    #[serde(other)]
    Stakeholder,
}

impl EntityType {
    /// Lowercase label used in prompts and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Company => "company",
            EntityType::Client => "client",
            EntityType::Regulator => "regulator",
            EntityType::Media => "media",
            EntityType::Stakeholder => "stakeholder",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of the situation being simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario id
    pub id: String,
    /// Short title
    #[serde(default)]
    pub title: String,
    /// Scenario type (announcement, crisis, product launch, ...)
    #[serde(default)]
    pub scenario_type: String,
    /// The action or event the entities react to
    pub action: String,
    /// Industry used for default entity sampling
    #[serde(default)]
    pub industry: Option<String>,
    /// Declared stakeholder names, looked up in the entity catalog
    #[serde(default)]
    pub stakeholders: Vec<String>,
}

/// Catalog record for an entity or organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProfile {
    /// Profile id
    pub id: String,
    /// Display name
    pub name: String,
    /// Entity kind
    #[serde(default)]
    pub entity_type: EntityType,
    /// Industry the entity operates in
    #[serde(default)]
    pub industry: Option<String>,
    /// Free-text background fed into prompts
    #[serde(default)]
    pub description: String,
    /// Relevance hint in [0, 1]
    #[serde(default = "default_relevance")]
    pub relevance_score: f64,
}

fn default_relevance() -> f64 {
    0.5
}

/// A resolved participant, fixed for the duration of a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEntity {
    /// Entity id
    pub entity_id: String,
    /// Display name
    pub name: String,
    /// Entity kind
    pub entity_type: EntityType,
    /// Relevance in [0, 1]
    pub relevance_score: f64,
    /// Whether the entity actively participates in rounds
    pub included: bool,
    /// Background for prompts
    #[serde(default)]
    pub description: String,
}

impl SimulationEntity {
    /// Build from a catalog profile.
    pub fn from_profile(profile: &EntityProfile, included: bool) -> Self {
        Self {
            entity_id: profile.id.clone(),
            name: profile.name.clone(),
            entity_type: profile.entity_type,
            relevance_score: profile.relevance_score.clamp(0.0, 1.0),
            included,
            description: profile.description.clone(),
        }
    }

    /// Build the distinguished client entity for the requesting organization.
    pub fn client(profile: &EntityProfile) -> Self {
        Self {
            entity_type: EntityType::Client,
            relevance_score: 1.0,
            ..Self::from_profile(profile, true)
        }
    }
}
