//! TaoPulse Providers - External Collaborator Clients
//!
//! Concrete implementations of the collaborator traits from `taopulse-core`:
//! - [`datura`]: tweet search as a [`taopulse_core::SignalSource`]
//! - [`chutes`]: LLM sentiment scoring as a [`taopulse_core::Scorer`]
//! - [`ledger`]: ledger sidecar reads and stake adjustments
//! - [`mock`]: deterministic stand-ins for local runs

pub mod chutes;
pub mod datura;
mod http;
pub mod ledger;
pub mod mock;
pub mod sentiment;

pub use chutes::{ChutesClient, ChutesScorer};
pub use datura::{DaturaConfig, DaturaSignalSource};
pub use ledger::{HttpLedgerGateway, HttpLedgerMutator};
pub use mock::{MockLedger, MockScorer, MockSignalSource};
pub use sentiment::{clean_tweet, extract_score, SCORE_MAX, SCORE_MIN};
