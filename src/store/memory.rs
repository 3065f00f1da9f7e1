//! In-process catalog and simulation store.

use std::collections::HashMap;
use std::path::Path;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{apply_final, apply_progress, EntityCatalog, SimulationStore};
use crate::domain::{
    EntityProfile, EntityType, RoundRecord, Scenario, SimulationFinal, SimulationProgress,
    SimulationRecord,
};
use crate::error::{FulcrumError, Result};

/// Catalog file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogData {
    /// Scenarios
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    /// Entity profiles
    #[serde(default)]
    pub entities: Vec<EntityProfile>,
    /// Organizations that may request simulations
    #[serde(default)]
    pub organizations: Vec<EntityProfile>,
}

/// Read-only catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    data: CatalogData,
}

impl InMemoryCatalog {
    /// Catalog over `data`.
    pub fn new(data: CatalogData) -> Self {
        Self { data }
    }

    /// Load a JSON catalog file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FulcrumError::Storage(format!("Failed to read catalog {}: {e}", path.display()))
        })?;
        let data: CatalogData = serde_json::from_str(&content)?;
        tracing::info!(
            scenarios = data.scenarios.len(),
            entities = data.entities.len(),
            organizations = data.organizations.len(),
            "catalog loaded"
        );
        Ok(Self::new(data))
    }

    /// Underlying data
    pub fn data(&self) -> &CatalogData {
        &self.data
    }
}

/// How well `name` matches `query`; 0 means no match.
fn name_match_score(query: &str, name: &str) -> u8 {
    let query = query.trim().to_lowercase();
    let name = name.trim().to_lowercase();
    if query.is_empty() {
        return 0;
    }
    if query == name {
        return 3;
    }
    if name.contains(&query) || query.contains(&name) {
        return 2;
    }
    let shares_word = query
        .split_whitespace()
        .filter(|w| w.len() >= 3)
        .any(|w| name.split_whitespace().any(|n| n == w));
    u8::from(shares_word)
}

impl EntityCatalog for InMemoryCatalog {
    fn get_scenario<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Scenario>>> {
        let found = self.data.scenarios.iter().find(|s| s.id == id).cloned();
        async move { Ok(found) }.boxed()
    }

    fn find_by_ids<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<EntityProfile>>> {
        let found = ids
            .iter()
            .filter_map(|id| self.data.entities.iter().find(|e| &e.id == id).cloned())
            .collect();
        async move { Ok(found) }.boxed()
    }

    fn find_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<EntityProfile>>> {
        let best = self
            .data
            .entities
            .iter()
            .map(|e| (name_match_score(name, &e.name), e))
            .filter(|(score, _)| *score > 0)
            .max_by(|(sa, a), (sb, b)| {
                sa.cmp(sb)
                    .then(a.relevance_score.total_cmp(&b.relevance_score))
            })
            .map(|(_, e)| e.clone());
        async move { Ok(best) }.boxed()
    }

    fn find_by_type_and_industry<'a>(
        &'a self,
        entity_type: EntityType,
        industry: Option<&'a str>,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<EntityProfile>>> {
        let mut found: Vec<EntityProfile> = self
            .data
            .entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .filter(|e| match (industry, e.industry.as_deref()) {
                (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        found.truncate(limit);
        async move { Ok(found) }.boxed()
    }

    fn find_organization<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<EntityProfile>>> {
        let found = self.data.organizations.iter().find(|o| o.id == id).cloned();
        async move { Ok(found) }.boxed()
    }
}

#[derive(Debug, Default)]
struct StoredSimulation {
    record: Option<SimulationRecord>,
    rounds: Vec<RoundRecord>,
}

/// Simulation store backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct InMemorySimulationStore {
    simulations: RwLock<HashMap<String, StoredSimulation>>,
}

impl InMemorySimulationStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of simulations held
    pub async fn len(&self) -> usize {
        self.simulations.read().await.len()
    }

    /// Whether the store holds nothing
    pub async fn is_empty(&self) -> bool {
        self.simulations.read().await.is_empty()
    }
}

fn missing(id: &str) -> FulcrumError {
    FulcrumError::Storage(format!("unknown simulation {id}"))
}

impl SimulationStore for InMemorySimulationStore {
    fn create_simulation<'a>(&'a self, record: &'a SimulationRecord) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut sims = self.simulations.write().await;
            if sims.contains_key(&record.id) {
                return Err(FulcrumError::Storage(format!(
                    "simulation {} already exists",
                    record.id
                )));
            }
            sims.insert(
                record.id.clone(),
                StoredSimulation {
                    record: Some(record.clone()),
                    rounds: Vec::new(),
                },
            );
            Ok(())
        }
        .boxed()
    }

    fn record_round<'a>(&'a self, round: &'a RoundRecord) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut sims = self.simulations.write().await;
            let sim = sims
                .get_mut(&round.simulation_id)
                .ok_or_else(|| missing(&round.simulation_id))?;
            sim.rounds.push(round.clone());
            Ok(())
        }
        .boxed()
    }

    fn update_progress<'a>(
        &'a self,
        simulation_id: &'a str,
        progress: &'a SimulationProgress,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut sims = self.simulations.write().await;
            let record = sims
                .get_mut(simulation_id)
                .and_then(|s| s.record.as_mut())
                .ok_or_else(|| missing(simulation_id))?;
            apply_progress(record, progress);
            Ok(())
        }
        .boxed()
    }

    fn finalize<'a>(
        &'a self,
        simulation_id: &'a str,
        outcome: &'a SimulationFinal,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut sims = self.simulations.write().await;
            let record = sims
                .get_mut(simulation_id)
                .and_then(|s| s.record.as_mut())
                .ok_or_else(|| missing(simulation_id))?;
            apply_final(record, outcome);
            Ok(())
        }
        .boxed()
    }

    fn get_simulation<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<SimulationRecord>>> {
        async move {
            Ok(self
                .simulations
                .read()
                .await
                .get(id)
                .and_then(|s| s.record.clone()))
        }
        .boxed()
    }

    fn get_rounds<'a>(&'a self, simulation_id: &'a str) -> BoxFuture<'a, Result<Vec<RoundRecord>>> {
        async move {
            Ok(self
                .simulations
                .read()
                .await
                .get(simulation_id)
                .map(|s| s.rounds.clone())
                .unwrap_or_default())
        }
        .boxed()
    }
}
