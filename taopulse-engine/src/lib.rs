//! TaoPulse Engine - Query Orchestration
//!
//! The orchestration engine serving dividend queries, the staged action
//! pipeline it triggers, and the policy sizing stake adjustments.

pub mod engine;
mod persist;
pub mod pipeline;
pub mod policy;

pub use engine::{EngineConfig, OrchestrationEngine};
pub use pipeline::{ActionPipeline, StageTimeouts};
pub use policy::TradePolicy;
