//! Chutes provider implementation
//!
//! Sentiment scoring through Chutes' OpenAI-compatible chat completions API.

pub mod client;
pub mod scorer;
pub mod types;

pub use client::ChutesClient;
pub use scorer::{ChutesScorer, DEFAULT_MODEL};
