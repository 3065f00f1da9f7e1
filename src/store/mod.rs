//! Storage collaborators.
//!
//! The engine reads scenarios and entity profiles through [`EntityCatalog`]
//! and writes run state through [`SimulationStore`]. Both are object-safe so
//! a database-backed implementation can replace the bundled ones.
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────────┐
//! │    EntityCatalog     │      │     SimulationStore      │
//! │  (read-only lookups) │      │ (create/append/update)   │
//! └──────────┬───────────┘      └────────────┬─────────────┘
//!            │                    ┌──────────┴───────────┐
//!            ▼                    ▼                      ▼
//!   ┌─────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//!   │ InMemoryCatalog │  │ InMemorySimStore │  │ FileSimStore     │
//!   │ (JSON seeded)   │  │ (RwLock<HashMap>)│  │ (<dir>/<id>/...) │
//!   └─────────────────┘  └──────────────────┘  └──────────────────┘
//! ```

mod file;
mod memory;

pub use file::FileSimulationStore;
pub use memory::{CatalogData, InMemoryCatalog, InMemorySimulationStore};

use futures::future::BoxFuture;

use crate::domain::{
    EntityProfile, EntityType, RoundRecord, Scenario, SimulationFinal, SimulationProgress,
    SimulationRecord,
};
use crate::error::Result;

/// Read access to scenarios, entity profiles and organizations.
pub trait EntityCatalog: Send + Sync {
    /// Scenario by id.
    fn get_scenario<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Scenario>>>;

    /// Profiles for `ids`, in request order. Unknown ids are skipped.
    fn find_by_ids<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<EntityProfile>>>;

    /// Best fuzzy match for a display name.
    fn find_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<EntityProfile>>>;

    /// Profiles of one type, optionally restricted to an industry, most relevant first.
    fn find_by_type_and_industry<'a>(
        &'a self,
        entity_type: EntityType,
        industry: Option<&'a str>,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<EntityProfile>>>;

    /// Organization profile by id.
    fn find_organization<'a>(&'a self, id: &'a str)
        -> BoxFuture<'a, Result<Option<EntityProfile>>>;
}

/// Durable run state. Writes are append/update only.
pub trait SimulationStore: Send + Sync {
    /// Persist a new `running` simulation.
    fn create_simulation<'a>(&'a self, record: &'a SimulationRecord) -> BoxFuture<'a, Result<()>>;

    /// Append one completed round.
    fn record_round<'a>(&'a self, round: &'a RoundRecord) -> BoxFuture<'a, Result<()>>;

    /// Update progress fields after a round.
    fn update_progress<'a>(
        &'a self,
        simulation_id: &'a str,
        progress: &'a SimulationProgress,
    ) -> BoxFuture<'a, Result<()>>;

    /// Write the terminal state once the loop exits.
    fn finalize<'a>(
        &'a self,
        simulation_id: &'a str,
        outcome: &'a SimulationFinal,
    ) -> BoxFuture<'a, Result<()>>;

    /// Load a simulation record.
    fn get_simulation<'a>(&'a self, id: &'a str)
        -> BoxFuture<'a, Result<Option<SimulationRecord>>>;

    /// Rounds recorded for a simulation, in round order.
    fn get_rounds<'a>(&'a self, simulation_id: &'a str) -> BoxFuture<'a, Result<Vec<RoundRecord>>>;
}

/// Apply progress fields to a record.
pub(crate) fn apply_progress(record: &mut SimulationRecord, progress: &SimulationProgress) {
    record.rounds_completed = progress.rounds_completed;
    record.stabilization_score = progress.stabilization_score;
    record.updated_at = chrono::Utc::now();
}

/// Apply terminal fields to a record.
pub(crate) fn apply_final(record: &mut SimulationRecord, outcome: &SimulationFinal) {
    let now = chrono::Utc::now();
    record.status = outcome.status;
    record.rounds_completed = outcome.rounds_completed;
    record.stabilization_score = outcome.stabilization_score;
    record.dominant_narratives = outcome.dominant_narratives.clone();
    record.key_coalitions = outcome.key_coalitions.clone();
    record.gaps_identified = outcome.gaps_identified.clone();
    record.fulcrums = outcome.fulcrums.clone();
    record.error = outcome.error.clone();
    record.updated_at = now;
    record.completed_at = Some(now);
}
