//! Ledger sidecar clients
//!
//! The ledger itself is reached through a sidecar service that owns the
//! chain connection and wallet. `GET /subnets/{netuid}/dividends` reads
//! dividends and `POST /stake` submits stake adjustments.

pub mod gateway;
pub mod mutator;
pub mod types;

pub use gateway::HttpLedgerGateway;
pub use mutator::HttpLedgerMutator;
