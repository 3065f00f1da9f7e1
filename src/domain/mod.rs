//! Domain types shared by every layer of the engine.
//!
//! - [`entity`]: scenarios, catalog profiles, resolved participants
//! - [`response`]: per-entity, per-round reactions
//! - [`memory`]: per-entity digest of prior responses
//! - [`analysis`]: per-round cross-entity structure
//! - [`fulcrum`]: final leverage points
//! - [`simulation`]: config, round context, persisted records, trigger contract

pub mod analysis;
pub mod entity;
pub mod fulcrum;
pub mod memory;
pub mod response;
pub mod simulation;

pub use analysis::{
    Coalition, CoalitionStability, CrossEntityAnalysis, FlowType, InfluenceFlow, InfluenceRanking,
    Level, Momentum, NarrativeGap, Theme,
};
pub use entity::{EntityProfile, EntityType, Scenario, SimulationEntity};
pub use fulcrum::{Fulcrum, FulcrumType, MAX_FULCRUMS};
pub use memory::{EntityRoundMemory, MAX_REMEMBERED_CLAIMS};
pub use response::{EntityResponse, PredictedReaction, ResponseDecision};
pub use simulation::{
    RoundContext, RoundRecord, SimulationConfig, SimulationFinal, SimulationOverrides,
    SimulationProgress, SimulationRecord, SimulationResult, SimulationStatus, SkippedEntity,
    TriggerRequest,
};
