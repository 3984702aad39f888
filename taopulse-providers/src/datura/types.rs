//! Datura social search request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taopulse_core::SignalItem;

/// Format of `created_at` in search results, e.g. `Tue Oct 14 09:21:07 +0000 2025`.
pub const TWEET_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Date format for the search window.
pub const SEARCH_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub blue_verified: bool,
    pub end_date: String,
    pub is_image: bool,
    pub is_quote: bool,
    pub is_video: bool,
    pub lang: String,
    pub min_likes: u32,
    pub min_replies: u32,
    pub min_retweets: u32,
    pub sort: String,
    pub start_date: String,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Tweet {
    /// Convert to a signal item. An unreadable timestamp is dropped.
    pub fn into_item(self) -> SignalItem {
        let created_at = self
            .created_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_str(raw, TWEET_TIME_FORMAT).ok())
            .map(|dt| dt.with_timezone(&Utc));

        SignalItem {
            text: self.text,
            created_at,
        }
    }
}
