use std::collections::HashSet;
use std::path::Path;

use tracing::{error, info, warn};

use crate::error::Result;
use crate::storage::{read_json, write_json};
use crate::types::{DiveRecord, DiverIndex, MarketEntry};

/// Pick the coins whose 24h change is below `threshold_pct`, sort them by
/// symbol and keep the first `limit`. A coin listed more than once counts
/// once, with its first listing. The result is written to `path` (an
/// empty index included); a failed write is logged and the index is still
/// returned.
///
/// Ordering is by symbol, not by drop size, so the cutoff is reproducible
/// across runs on the same snapshot.
pub fn select_divers(
    entries: &[MarketEntry],
    threshold_pct: f64,
    limit: usize,
    path: &Path,
) -> DiverIndex {
    info!(
        "Criteria: coins dropped more than {}% in the last 24h",
        threshold_pct.abs().trunc()
    );

    let mut seen = HashSet::new();
    let mut divers: Vec<DiveRecord> = entries
        .iter()
        .filter_map(|entry| {
            let change = entry.price_change_percentage_24h?;
            if change == 0.0 || !change.is_finite() || change >= threshold_pct {
                return None;
            }
            if !seen.insert(entry.id.as_str()) {
                warn!(coin_id = %entry.id, "Coin listed more than once, keeping the first listing");
                return None;
            }
            Some(DiveRecord {
                id: entry.id.clone(),
                symbol: entry.symbol.clone(),
                price_change_pct_24h: change.trunc() as i64,
            })
        })
        .collect();

    if divers.is_empty() {
        warn!("No coins matching the dive criteria");
    } else {
        info!(
            matched = divers.len(),
            limit,
            "Found {} coins matching the criteria, keeping the top {limit}",
            divers.len()
        );
    }

    // stable: equal symbols keep discovery order
    divers.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    divers.truncate(limit);
    let index = DiverIndex::new(divers);

    match write_json(path, &index) {
        Ok(()) => info!("Wrote {} divers to {}", index.len(), path.display()),
        Err(e) => error!("Failed writing dive list to {}: {e}", path.display()),
    }

    index
}

/// Reload a persisted dive list. A corrupt file is an error for the run.
pub fn load_divers(path: &Path) -> Result<DiverIndex> {
    let index: DiverIndex = read_json(path)?;
    info!("Loaded {} divers from {}", index.len(), path.display());
    Ok(index)
}

/// The day's dive list: reloaded when `path` already exists, selected from
/// `catalog` otherwise. An empty catalog yields an empty list and nothing is
/// persisted.
pub fn divers_for_day(
    catalog: &[MarketEntry],
    threshold_pct: f64,
    limit: usize,
    path: &Path,
) -> Result<DiverIndex> {
    if path.exists() {
        info!("Dive list for today already exists, loading {}", path.display());
        return load_divers(path);
    }
    if catalog.is_empty() {
        warn!("Market catalog is empty, no divers to select");
        return Ok(DiverIndex::default());
    }
    Ok(select_divers(catalog, threshold_pct, limit, path))
}
