use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{error, info, warn};

use crate::config::{DEFAULT_CATALOG_TOTAL, RATE_LIMIT_FALLBACK_SECS, RATE_LIMIT_MARGIN_SECS};
use crate::error::{AppError, Result};
use crate::fetcher::{MarketSource, PageResponse};
use crate::storage::{read_json, write_json};
use crate::types::MarketEntry;

/// Return the day's catalog, reading `path` when it exists and fetching it
/// otherwise.
///
/// A snapshot that exists but does not parse is an error: it is left on disk
/// for inspection and never silently replaced by a refetch.
pub async fn get_catalog<S>(source: &S, path: &Path) -> Result<Vec<MarketEntry>>
where
    S: MarketSource + ?Sized,
{
    if path.exists() {
        info!("Market snapshot for today already exists, loading {}", path.display());
        let entries: Vec<MarketEntry> = read_json(path)?;
        info!(count = entries.len(), "Loaded {} market entries from cache", entries.len());
        return Ok(entries);
    }

    info!("No market snapshot for today, fetching the full listing");
    fetch_all_market_entries(source, path).await
}

/// Page through the market listing until the provider's reported total is
/// reached or a page adds nothing. The accumulated list is written to `path`
/// when non-empty.
///
/// Rate-limited pages are retried in place after waiting for the provider's
/// reset time. Any other rejection aborts with `CatalogRejected`. A transport
/// failure stops paging and keeps what was gathered so far.
pub async fn fetch_all_market_entries<S>(source: &S, path: &Path) -> Result<Vec<MarketEntry>>
where
    S: MarketSource + ?Sized,
{
    let mut entries: Vec<MarketEntry> = Vec::new();
    let mut page = 0u32;

    loop {
        let response = match source.fetch_page(page).await {
            Ok(r) => r,
            Err(AppError::Http(e)) => {
                warn!(page, gathered = entries.len(), "Market listing request failed, keeping partial catalog: {e}");
                break;
            }
            Err(e) => return Err(e),
        };

        match response {
            PageResponse::RateLimited { reset_at } => {
                let wait = rate_limit_wait(reset_at, Utc::now());
                info!(page, "Rate limit hit, sleeping for {} seconds", wait.as_secs());
                tokio::time::sleep(wait).await;
            }
            PageResponse::Rejected { status, reason } => {
                error!(page, status, "Market listing rejected: {reason}");
                return Err(AppError::CatalogRejected { status, reason });
            }
            PageResponse::Page { entries: batch, total } => {
                let before = entries.len();
                entries.extend(batch);

                if entries.len() == before {
                    info!(page, "Page added no entries, finished gathering markets");
                    break;
                }

                let total = total.unwrap_or(DEFAULT_CATALOG_TOTAL);
                info!(page, so_far = entries.len(), total, "Markets so far: {}", entries.len());

                if entries.len() >= total {
                    info!("Finished gathering markets");
                    break;
                }
                page += 1;
            }
        }
    }

    if !entries.is_empty() {
        match write_json(path, &entries) {
            Ok(()) => info!("Wrote {} market entries to {}", entries.len(), path.display()),
            Err(e) => error!("Failed writing market snapshot {}: {e}", path.display()),
        }
    }

    Ok(entries)
}

/// Time to wait before retrying a rate-limited page: until the reset time
/// plus a margin, or a fixed fallback when the provider gave no reset time.
pub fn rate_limit_wait(reset_at: Option<DateTime<FixedOffset>>, now: DateTime<Utc>) -> Duration {
    match reset_at {
        Some(reset) => {
            let until_reset = (reset.with_timezone(&Utc) - now).num_seconds().max(0) as u64;
            Duration::from_secs(until_reset + RATE_LIMIT_MARGIN_SECS)
        }
        None => Duration::from_secs(RATE_LIMIT_FALLBACK_SECS),
    }
}
