//! Simulation engine.
//!
//! Components, leaves first:
//!
//! - [`resolver`]: which entities take part in a run
//! - [`round`]: batched, time-bounded response gathering plus analysis
//! - [`responder`]: per-entity response generation (LLM or offline echo)
//! - [`analyzer`]: cross-entity structure per round (LLM or heuristic)
//! - [`memory`]: per-entity rolling memory derived from response history
//! - [`stabilization`]: convergence gate
//! - [`simulation`]: the loop controller tying the above together
//! - [`fulcrum`]: leverage points from the finished history
//!
//! Every generative collaborator sits behind an object-safe trait
//! ([`EntityResponder`], [`CrossEntityAnalyzer`], [`FulcrumSynthesizer`]) so
//! runs can be driven offline or by scripted implementations in tests.

pub mod analyzer;
pub mod fulcrum;
pub mod memory;
pub mod resolver;
pub mod responder;
pub mod round;
pub mod simulation;
pub mod stabilization;

pub use analyzer::{rank_influence, CrossEntityAnalyzer, HeuristicAnalyzer, LlmCrossEntityAnalyzer};
pub use fulcrum::{
    extract_candidates, fallback_fulcrums, validate_fulcrums, FulcrumCandidates,
    FulcrumIdentifier, FulcrumSynthesizer, LlmFulcrumSynthesizer, SynthesisInput,
};
pub use memory::build_entity_memory;
pub use resolver::{resolve_entities, ResolveRequest};
pub use responder::{EchoResponder, LlmEntityResponder};
pub use round::{EntityResponder, RoundExecutor, RoundOutcome, RoundSettings};
pub use simulation::{SimulationEngine, SimulationRun};
pub use stabilization::{RoundView, StabilizationCheck, StabilizationDetector};
