use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AppError, Result};

pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";
pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1";

pub const DEFAULT_LLM_MODEL: &str = "openai/o4-mini";

/// Records requested per market-listing page.
pub const PAGE_SIZE: usize = 250;

/// Assumed catalog size when the provider omits the `total` header.
pub const DEFAULT_CATALOG_TOTAL: usize = 20_000;

/// Added on top of the provider's rate-limit reset time (seconds).
pub const RATE_LIMIT_MARGIN_SECS: u64 = 5;

/// Wait used when a 429 carries no usable reset header (seconds).
pub const RATE_LIMIT_FALLBACK_SECS: u64 = 60;

/// Request timeout for every outbound HTTP client (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Coin detail retry: attempt ceiling and backoff bounds.
pub const DETAIL_MAX_ATTEMPTS: u32 = 6;
pub const DETAIL_BACKOFF_BASE_MS: u64 = 1_000;
pub const DETAIL_BACKOFF_CAP_MS: u64 = 60_000;

/// Delay before the single retry of an in-band reasoning service error (seconds).
pub const LLM_INLINE_ERROR_RETRY_SECS: u64 = 10;

/// Failed analyses tolerated per run before the remaining coins are skipped.
pub const ANALYSIS_ERROR_BUDGET: u32 = 2;

/// Dead score assumed for coins without an analysis. Above any sane ceiling.
pub const MISSING_DEAD_SCORE: f64 = 10.0;

/// Rows per push message (Pushover caps a message at 1024 chars).
pub const NOTIFICATION_CHUNK_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Root of every persisted artifact (DATA_DIR).
    pub data_dir: PathBuf,
    pub coingecko_api_url: String,
    /// Optional demo key (COINGECKO_API_KEY).
    pub coingecko_api_key: Option<String>,
    pub openrouter_api_url: String,
    pub openrouter_api_key: String,
    pub llm_model: String,
    pub superprompt_path: PathBuf,
    pub response_schema_path: PathBuf,
    /// Negative 24h change a coin has to fall below (DIVE_THRESHOLD_PCT).
    pub dive_threshold_pct: f64,
    /// Top-K cutoff after sorting (DIVE_LIMIT).
    pub dive_limit: usize,
    /// Highest dead score still worth a notification (MAX_DEAD_SCORE).
    pub max_dead_score: f64,
    pub pushover_api_url: String,
    pub pushover_token: Option<String>,
    pub pushover_user: Option<String>,
    pub pushover_device: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let openrouter_api_key = non_empty_var("OPENROUTER_API_KEY")
            .ok_or_else(|| AppError::Config("OPENROUTER_API_KEY must be set".to_string()))?;

        let dive_threshold_pct: f64 = parse_setting("DIVE_THRESHOLD_PCT", non_empty_var("DIVE_THRESHOLD_PCT"), -75.0)?;
        if dive_threshold_pct >= 0.0 {
            return Err(AppError::Config(
                "DIVE_THRESHOLD_PCT must be negative".to_string(),
            ));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            data_dir: PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string())),
            coingecko_api_url: std::env::var("COINGECKO_API_URL")
                .unwrap_or_else(|_| COINGECKO_API_URL.to_string()),
            coingecko_api_key: non_empty_var("COINGECKO_API_KEY"),
            openrouter_api_url: std::env::var("OPENROUTER_API_URL")
                .unwrap_or_else(|_| OPENROUTER_API_URL.to_string()),
            openrouter_api_key,
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            superprompt_path: PathBuf::from(
                std::env::var("SUPERPROMPT_PATH")
                    .unwrap_or_else(|_| "assets/superprompt.md".to_string()),
            ),
            response_schema_path: PathBuf::from(
                std::env::var("RESPONSE_SCHEMA_PATH")
                    .unwrap_or_else(|_| "assets/analytics_schema.json".to_string()),
            ),
            dive_threshold_pct,
            dive_limit: parse_setting("DIVE_LIMIT", non_empty_var("DIVE_LIMIT"), 10)?,
            max_dead_score: parse_setting("MAX_DEAD_SCORE", non_empty_var("MAX_DEAD_SCORE"), 7.0)?,
            pushover_api_url: std::env::var("PUSHOVER_API_URL")
                .unwrap_or_else(|_| PUSHOVER_API_URL.to_string()),
            pushover_token: non_empty_var("PUSHOVER_TOKEN"),
            pushover_user: non_empty_var("PUSHOVER_USER"),
            pushover_device: non_empty_var("PUSHOVER_DEVICE"),
        })
    }
}

/// Parse an operator setting, `default` when unset. A value that does not
/// parse is a configuration error, never silently replaced.
fn parse_setting<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {value:?}"))),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_setting_uses_default() {
        assert_eq!(parse_setting::<usize>("DIVE_LIMIT", None, 10).unwrap(), 10);
        assert_eq!(parse_setting::<f64>("MAX_DEAD_SCORE", None, 7.0).unwrap(), 7.0);
    }

    #[test]
    fn set_setting_is_parsed() {
        assert_eq!(parse_setting::<usize>("DIVE_LIMIT", Some("25".to_string()), 10).unwrap(), 25);
        assert_eq!(parse_setting::<f64>("DIVE_THRESHOLD_PCT", Some("-80.5".to_string()), -75.0).unwrap(), -80.5);
    }

    #[test]
    fn unparseable_settings_are_config_errors() {
        let limit = parse_setting::<usize>("DIVE_LIMIT", Some("ten".to_string()), 10);
        assert!(matches!(limit, Err(AppError::Config(msg)) if msg.contains("DIVE_LIMIT")));

        let ceiling = parse_setting::<f64>("MAX_DEAD_SCORE", Some("seven".to_string()), 7.0);
        assert!(matches!(ceiling, Err(AppError::Config(msg)) if msg.contains("MAX_DEAD_SCORE")));

        let threshold = parse_setting::<f64>("DIVE_THRESHOLD_PCT", Some("-75%".to_string()), -75.0);
        assert!(matches!(threshold, Err(AppError::Config(_))));
    }
}
