//! Service Configuration
//!
//! Loaded from environment variables with development defaults. Every
//! variable carries the `TAOPULSE_` prefix except `PORT` and
//! `TWITTER_BEARER_TOKEN`, which are read as fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use taopulse_core::{ConfigError, SubnetId};
use taopulse_engine::{EngineConfig, StageTimeouts, TradePolicy};
use taopulse_storage::{BatchSinkConfig, ReadThroughConfig};

use crate::error::{ApiError, ApiResult};

const DEFAULT_DATURA_URL: &str = "https://apis.datura.ai/twitter";
const DEFAULT_CHUTES_URL: &str = "https://llm.chutes.ai/v1";

/// Configuration for the whole service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // ========================================================================
    // Server
    // ========================================================================
    pub bind: String,
    /// Kept unparsed; a bad value surfaces when the address is resolved.
    pub port: String,
    /// Allowed CORS origins. Empty allows all.
    pub cors_origins: Vec<String>,

    // ========================================================================
    // Query defaults and cache
    // ========================================================================
    pub default_netuid: SubnetId,
    pub default_hotkey: Option<String>,
    /// Zero or negative disables cache reads.
    pub cache_ttl_secs: i64,

    // ========================================================================
    // Ledger sidecar
    // ========================================================================
    pub ledger_url: Option<String>,
    pub ledger_timeout_ms: u64,
    pub mock_ledger: bool,

    // ========================================================================
    // Signals and scoring
    // ========================================================================
    pub datura_url: String,
    pub datura_token: Option<String>,
    pub mock_signals: bool,
    pub chutes_url: String,
    pub chutes_token: Option<String>,
    pub chutes_model: String,
    pub chutes_requests_per_minute: u32,

    // ========================================================================
    // Action pipeline
    // ========================================================================
    pub signal_timeout_ms: u64,
    pub score_timeout_ms: u64,
    pub mutation_timeout_ms: u64,
    pub stake_per_point: f64,
    pub max_stake_amount: f64,

    // ========================================================================
    // Persistence
    // ========================================================================
    pub sink_flush_interval_ms: u64,
    pub sink_max_queue: usize,
    /// Records kept per kind while the record store is failing.
    pub sink_max_backlog: usize,
    /// LMDB directory. Unset keeps records in memory.
    pub records_path: Option<PathBuf>,
    pub records_max_size_mb: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: "8000".to_string(),
            cors_origins: Vec::new(),
            default_netuid: 18,
            default_hotkey: None,
            cache_ttl_secs: 120,
            ledger_url: None,
            ledger_timeout_ms: 10_000,
            mock_ledger: false,
            datura_url: DEFAULT_DATURA_URL.to_string(),
            datura_token: None,
            mock_signals: false,
            chutes_url: DEFAULT_CHUTES_URL.to_string(),
            chutes_token: None,
            chutes_model: taopulse_providers::chutes::DEFAULT_MODEL.to_string(),
            chutes_requests_per_minute: 60,
            signal_timeout_ms: 15_000,
            score_timeout_ms: 30_000,
            mutation_timeout_ms: 30_000,
            stake_per_point: 0.01,
            max_stake_amount: 1.0,
            sink_flush_interval_ms: 1_000,
            sink_max_queue: 1_000,
            sink_max_backlog: 10_000,
            records_path: None,
            records_max_size_mb: 1_024,
        }
    }
}

impl AppConfig {
    /// Create AppConfig from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create AppConfig from any variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let flag = |key: &str| {
            string(key)
                .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };

        let cors_origins = string("TAOPULSE_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind: string("TAOPULSE_BIND").unwrap_or(defaults.bind),
            port: string("PORT")
                .or_else(|| string("TAOPULSE_PORT"))
                .unwrap_or(defaults.port),
            cors_origins,
            default_netuid: parsed(string("TAOPULSE_DEFAULT_NETUID")).unwrap_or(defaults.default_netuid),
            default_hotkey: string("TAOPULSE_DEFAULT_HOTKEY"),
            cache_ttl_secs: parsed(string("TAOPULSE_CACHE_TTL_SECS")).unwrap_or(defaults.cache_ttl_secs),
            ledger_url: string("TAOPULSE_LEDGER_URL"),
            ledger_timeout_ms: parsed(string("TAOPULSE_LEDGER_TIMEOUT_MS"))
                .unwrap_or(defaults.ledger_timeout_ms),
            mock_ledger: flag("TAOPULSE_MOCK_LEDGER"),
            datura_url: string("TAOPULSE_DATURA_URL").unwrap_or(defaults.datura_url),
            datura_token: string("TAOPULSE_DATURA_TOKEN")
                .or_else(|| string("TWITTER_BEARER_TOKEN")),
            mock_signals: flag("TAOPULSE_MOCK_SIGNALS"),
            chutes_url: string("TAOPULSE_CHUTES_URL").unwrap_or(defaults.chutes_url),
            chutes_token: string("TAOPULSE_CHUTES_TOKEN"),
            chutes_model: string("TAOPULSE_CHUTES_MODEL").unwrap_or(defaults.chutes_model),
            chutes_requests_per_minute: parsed(string("TAOPULSE_CHUTES_RPM"))
                .unwrap_or(defaults.chutes_requests_per_minute),
            signal_timeout_ms: parsed(string("TAOPULSE_SIGNAL_TIMEOUT_MS"))
                .unwrap_or(defaults.signal_timeout_ms),
            score_timeout_ms: parsed(string("TAOPULSE_SCORE_TIMEOUT_MS"))
                .unwrap_or(defaults.score_timeout_ms),
            mutation_timeout_ms: parsed(string("TAOPULSE_MUTATION_TIMEOUT_MS"))
                .unwrap_or(defaults.mutation_timeout_ms),
            stake_per_point: parsed(string("TAOPULSE_STAKE_PER_POINT")).unwrap_or(defaults.stake_per_point),
            max_stake_amount: parsed(string("TAOPULSE_MAX_STAKE_AMOUNT"))
                .unwrap_or(defaults.max_stake_amount),
            sink_flush_interval_ms: parsed(string("TAOPULSE_SINK_FLUSH_INTERVAL_MS"))
                .unwrap_or(defaults.sink_flush_interval_ms),
            sink_max_queue: parsed(string("TAOPULSE_SINK_MAX_QUEUE")).unwrap_or(defaults.sink_max_queue),
            sink_max_backlog: parsed(string("TAOPULSE_SINK_MAX_BACKLOG"))
                .unwrap_or(defaults.sink_max_backlog),
            records_path: string("TAOPULSE_RECORDS_PATH").map(PathBuf::from),
            records_max_size_mb: parsed(string("TAOPULSE_RECORDS_MAX_MB"))
                .unwrap_or(defaults.records_max_size_mb),
        }
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("TAOPULSE_STAKE_PER_POINT", self.stake_per_point)?;
        non_negative("TAOPULSE_MAX_STAKE_AMOUNT", self.max_stake_amount)?;

        if self.sink_max_queue == 0 {
            return Err(invalid("TAOPULSE_SINK_MAX_QUEUE", "0", "must be at least 1"));
        }
        if self.sink_max_backlog == 0 {
            return Err(invalid("TAOPULSE_SINK_MAX_BACKLOG", "0", "must be at least 1"));
        }
        if self.sink_flush_interval_ms == 0 {
            return Err(invalid(
                "TAOPULSE_SINK_FLUSH_INTERVAL_MS",
                "0",
                "must be at least 1",
            ));
        }
        if !self.mock_ledger && self.ledger_url.is_none() {
            return Err(ConfigError::MissingRequired {
                field: "TAOPULSE_LEDGER_URL".to_string(),
            });
        }
        if !self.mock_signals && self.datura_token.is_none() {
            return Err(ConfigError::MissingRequired {
                field: "TAOPULSE_DATURA_TOKEN".to_string(),
            });
        }
        Ok(())
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let port = u16::from_str(&self.port)
            .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", self.port)))?;
        let addr = format!("{}:{}", self.bind, port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }

    pub fn read_through_config(&self) -> ReadThroughConfig {
        ReadThroughConfig::new()
            .with_ttl(TimeDelta::seconds(self.cache_ttl_secs))
            .with_fetch_timeout(Duration::from_millis(self.ledger_timeout_ms))
    }

    pub fn stage_timeouts(&self) -> StageTimeouts {
        StageTimeouts::new()
            .with_signal(Duration::from_millis(self.signal_timeout_ms))
            .with_score(Duration::from_millis(self.score_timeout_ms))
            .with_mutation(Duration::from_millis(self.mutation_timeout_ms))
    }

    pub fn trade_policy(&self) -> TradePolicy {
        TradePolicy::new()
            .with_stake_per_point(self.stake_per_point)
            .with_max_amount(self.max_stake_amount)
    }

    pub fn sink_config(&self) -> BatchSinkConfig {
        BatchSinkConfig::new()
            .with_flush_interval(Duration::from_millis(self.sink_flush_interval_ms))
            .with_max_queue_size(self.sink_max_queue)
            .with_max_backlog(self.sink_max_backlog)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig::new().with_default_subnet(self.default_netuid);
        match &self.default_hotkey {
            Some(hotkey) => config.with_default_account(hotkey.clone()),
            None => config,
        }
    }
}

fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|s| s.parse().ok())
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, &value.to_string(), "must be a non-negative number"))
    }
}
