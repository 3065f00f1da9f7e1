//! Entity resolution: who takes part in a simulation.

use std::collections::HashSet;

use crate::domain::{EntityType, Scenario, SimulationEntity};
use crate::error::Result;
use crate::store::EntityCatalog;

/// Resolved entities below this count trigger an industry backfill.
pub const MIN_STAKEHOLDER_ENTITIES: usize = 3;

/// Backfilled entities beyond this many are resolved but not included.
pub const MAX_BACKFILL_INCLUDED: usize = 10;

/// Upper bound on entities pulled from the industry pool.
pub const BACKFILL_POOL_SIZE: usize = 20;

/// Resolution input for one run.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    /// Scenario under simulation
    pub scenario: &'a Scenario,
    /// Explicit selection; authoritative when present
    pub entity_ids: Option<&'a [String]>,
    /// Requesting organization
    pub organization_id: Option<&'a str>,
    /// Append the organization as a client entity
    pub include_client: bool,
}

/// Resolve the entity set for a run.
///
/// An empty result means nothing could be resolved; the caller rejects the run.
pub async fn resolve_entities(
    catalog: &dyn EntityCatalog,
    request: ResolveRequest<'_>,
) -> Result<Vec<SimulationEntity>> {
    let mut entities = match request.entity_ids {
        Some(ids) => {
            let profiles = catalog.find_by_ids(ids).await?;
            tracing::debug!(requested = ids.len(), found = profiles.len(), "explicit entity selection");
            profiles
                .iter()
                .map(|p| SimulationEntity::from_profile(p, true))
                .collect()
        },
        None => resolve_from_scenario(catalog, request.scenario).await?,
    };

    if request.include_client {
        if let Some(org_id) = request.organization_id {
            match catalog.find_organization(org_id).await? {
                Some(org) => entities.push(SimulationEntity::client(&org)),
                None => tracing::warn!(organization = org_id, "client organization not found"),
            }
        }
    }

    let mut seen = HashSet::new();
    entities.retain(|e| seen.insert(e.entity_id.clone()));

    tracing::info!(
        scenario = %request.scenario.id,
        resolved = entities.len(),
        included = entities.iter().filter(|e| e.included).count(),
        "entities resolved"
    );
    Ok(entities)
}

async fn resolve_from_scenario(
    catalog: &dyn EntityCatalog,
    scenario: &Scenario,
) -> Result<Vec<SimulationEntity>> {
    let mut entities: Vec<SimulationEntity> = Vec::new();

    for name in &scenario.stakeholders {
        match catalog.find_by_name(name).await? {
            Some(profile) if !entities.iter().any(|e| e.entity_id == profile.id) => {
                entities.push(SimulationEntity::from_profile(&profile, true));
            },
            Some(_) => {},
            None => tracing::debug!(stakeholder = %name, "stakeholder not in catalog"),
        }
    }

    if entities.len() < MIN_STAKEHOLDER_ENTITIES {
        let pool = catalog
            .find_by_type_and_industry(
                EntityType::Company,
                scenario.industry.as_deref(),
                BACKFILL_POOL_SIZE,
            )
            .await?;

        let fresh: Vec<_> = pool
            .iter()
            .filter(|p| !entities.iter().any(|e| e.entity_id == p.id))
            .collect();
        tracing::debug!(
            stakeholders = entities.len(),
            backfill = fresh.len(),
            industry = ?scenario.industry,
            "backfilling from industry pool"
        );

        for (i, profile) in fresh.into_iter().enumerate() {
            entities.push(SimulationEntity::from_profile(profile, i < MAX_BACKFILL_INCLUDED));
        }
    }

    Ok(entities)
}
