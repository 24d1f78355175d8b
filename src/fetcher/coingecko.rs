use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::config::{Config, HTTP_TIMEOUT_SECS, PAGE_SIZE};
use crate::error::{AppError, Result};
use crate::fetcher::{CoinSource, MarketSource, PageResponse};
use crate::types::MarketEntry;

/// Format of CoinGecko's `x-ratelimit-reset` header, e.g. `2025-08-20 14:03:00 +0000`.
const RESET_HEADER_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// REST client for the CoinGecko v3 API.
#[derive(Clone)]
pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.coingecko_api_url.trim_end_matches('/').to_string(),
            api_key: cfg.coingecko_api_key.clone(),
        })
    }
}

#[async_trait]
impl MarketSource for CoinGeckoClient {
    async fn fetch_page(&self, page: u32) -> Result<PageResponse> {
        let url = format!("{}/coins/markets", self.base_url);

        let mut query: Vec<(&str, String)> = vec![
            ("vs_currency", "usd".to_string()),
            ("price_change_percentage", "24h".to_string()),
            ("per_page", PAGE_SIZE.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("x_cg_demo_api_key", key.clone()));
        }

        let resp = self
            .http
            .get(&url)
            .header("accept", "application/json")
            .query(&query)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset_at = resp
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|h| h.to_str().ok())
                .and_then(parse_reset_header);
            return Ok(PageResponse::RateLimited { reset_at });
        }
        if !status.is_success() {
            return Ok(PageResponse::Rejected {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let total = resp
            .headers()
            .get("total")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<usize>().ok());

        let body = resp.text().await?;
        let entries: Vec<MarketEntry> = serde_json::from_str(&body)?;
        debug!(page, count = entries.len(), ?total, "markets page received");

        Ok(PageResponse::Page { entries, total })
    }
}

#[async_trait]
impl CoinSource for CoinGeckoClient {
    async fn fetch_coin(&self, coin_id: &str) -> Result<Value> {
        let url = format!("{}/coins/{}", self.base_url, coin_id);

        let mut req = self.http.get(&url).header("accept", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Status {
                endpoint: format!("coins/{coin_id}"),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await?;
        let data: Value = serde_json::from_str(&body)?;
        if !data.is_object() {
            return Err(AppError::InvalidResponse(format!(
                "coins/{coin_id} did not return an object"
            )));
        }
        Ok(data)
    }
}

pub fn parse_reset_header(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value.trim(), RESET_HEADER_FORMAT).ok()
}
