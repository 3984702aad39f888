//! Datura social search provider
//!
//! Searches recent tweets mentioning a subnet and turns them into signal
//! items for scoring.

pub mod client;
pub mod types;

pub use client::{DaturaConfig, DaturaSignalSource};
