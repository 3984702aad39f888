//! Chutes sentiment scorer

use async_trait::async_trait;
use std::time::{Duration, Instant};
use taopulse_core::{ScoreError, Scorer, SignalItem, SignedScore};

use super::client::{ChutesClient, PROVIDER};
use super::types::{CompletionRequest, CompletionResponse, Message};
use crate::http::elapsed_ms;
use crate::sentiment::{build_prompt, clean_items, extract_score};

pub const DEFAULT_MODEL: &str = "unsloth/Llama-3.2-3B-Instruct";

/// Scores tweets by asking a Chutes-hosted model for a sentiment score.
#[derive(Debug)]
pub struct ChutesScorer {
    client: ChutesClient,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChutesScorer {
    pub fn new(client: ChutesClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: 2048,
            temperature: 0.7,
        }
    }

    /// Scorer with the default model and a 30 second timeout.
    pub fn with_default_model(token: impl Into<String>) -> Self {
        Self::new(
            ChutesClient::new(token, 60, Duration::from_secs(30)),
            DEFAULT_MODEL,
        )
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completion_request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt)],
            stream: false,
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        }
    }
}

#[async_trait]
impl Scorer for ChutesScorer {
    async fn score(&self, items: &[SignalItem]) -> Result<SignedScore, ScoreError> {
        let started = Instant::now();
        let tweets = clean_items(items);
        if tweets.is_empty() {
            return Err(ScoreError::NoItems);
        }

        let request = self.completion_request(build_prompt(&tweets));
        let response: CompletionResponse =
            self.client.request("chat/completions", &request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ScoreError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "No completion in response".to_string(),
            })?;

        let score = extract_score(&content).inspect_err(|e| {
            tracing::error!(error = %e, content = %content, "failed to extract sentiment score");
        })?;

        tracing::info!(
            tweets = tweets.len(),
            score,
            elapsed_ms = elapsed_ms(started),
            "scored tweets"
        );
        Ok(SignedScore::from(score))
    }
}
