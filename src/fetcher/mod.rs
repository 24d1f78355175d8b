pub mod catalog;
pub mod coingecko;
pub mod detail;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use crate::error::Result;
use crate::types::MarketEntry;

pub use catalog::get_catalog;
pub use coingecko::CoinGeckoClient;
pub use detail::{DetailFetcher, DetailOptions};

/// Outcome of one market-listing page request that reached the provider.
#[derive(Debug)]
pub enum PageResponse {
    Page {
        entries: Vec<MarketEntry>,
        /// Provider-reported catalog size (`total` header).
        total: Option<usize>,
    },
    /// HTTP 429, with the provider's reset time when it sent one.
    RateLimited {
        reset_at: Option<DateTime<FixedOffset>>,
    },
    /// Any other non-success status.
    Rejected { status: u16, reason: String },
}

/// Paginated market listing. Transport failures surface as `AppError::Http`.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<PageResponse>;
}

/// Full detail record of a single coin.
#[async_trait]
pub trait CoinSource: Send + Sync {
    async fn fetch_coin(&self, coin_id: &str) -> Result<Value>;
}
