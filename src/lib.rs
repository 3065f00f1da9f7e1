//! # Fulcrum - Narrative Simulation Engine
//!
//! Simulates how a set of interested parties (competitors, regulators, media,
//! stakeholders) react to a scenario over several rounds, detects when the
//! conversation stabilizes, and distills a handful of strategic fulcrums:
//! high-leverage intervention points grounded in what the simulated entities
//! actually said.
//!
//! ## Architecture
//!
//! ```text
//!  TriggerRequest
//!       │
//!       v
//!  SimulationEngine ──> resolve_entities (once)
//!       │
//!       │  for each round
//!       ├──> RoundExecutor ──> EntityResponder  (batched, per-entity timeout)
//!       │          └─────────> CrossEntityAnalyzer
//!       ├──> SimulationStore::record_round
//!       ├──> build_entity_memory
//!       └──> StabilizationDetector ──(stabilized / max rounds)──┐
//!                                                                │
//!  SimulationResult <── finalize <── FulcrumIdentifier <─────────┘
//!                                     (Phase A candidates, Phase B synthesis,
//!                                      template fallback)
//! ```
//!
//! Every generative step goes through [`llm::CompletionGateway`]: ordered
//! provider fallback, retry with backoff and jitter, tolerant JSON extraction.
//!
//! ### State Machine
//!
//! ```text
//!     [Running] ──(score >= threshold, round >= min_rounds)──> [Stabilized]
//!         │
//!         ├──(round == max_rounds)──────────────────────────> [MaxRoundsReached]
//!         │
//!         └──(analyzer or storage failure)──────────────────> [Failed]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fulcrum::{
//!     store::{InMemoryCatalog, InMemorySimulationStore},
//!     SimulationConfig, SimulationEngine, TriggerRequest,
//! };
//!
//! let catalog = Arc::new(InMemoryCatalog::from_file("catalog.json")?);
//! let store = Arc::new(InMemorySimulationStore::new());
//! let engine = SimulationEngine::offline(catalog, store, SimulationConfig::default());
//!
//! let result = engine
//!     .trigger(&TriggerRequest {
//!         scenario_id: Some("price-cut".into()),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{:?} after {} rounds", result.status, result.rounds_completed);
//! ```
//!
//! ## Modules
//!
//! - [`domain`]: shared data model
//! - [`engine`]: resolver, rounds, analysis, memory, stabilization, loop, fulcrums
//! - [`llm`]: completion gateway and providers
//! - [`store`]: catalog and persistence collaborators
//! - [`server`]: HTTP API
//! - [`config`]: TOML and environment configuration

#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod llm;
pub mod server;
pub mod store;

// Re-exports for convenience
pub use config::{AnalyzerKind, Config};
pub use domain::{
    CrossEntityAnalysis, EntityResponse, Fulcrum, FulcrumType, Scenario, SimulationConfig,
    SimulationEntity, SimulationResult, SimulationStatus, TriggerRequest,
};
pub use engine::{FulcrumIdentifier, SimulationEngine, StabilizationDetector};
pub use error::{FulcrumError, Result};
pub use llm::{extract_json, CompletionGateway, CompletionProvider, CompletionRequest};
pub use server::{AppState, ServerConfig};
pub use store::{EntityCatalog, SimulationStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
