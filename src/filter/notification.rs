use tracing::info;

use crate::config::MISSING_DEAD_SCORE;
use crate::types::{Candidate, CoinDetail, DeadScoreIndex, DiverIndex, NotificationRow};

/// Keep only coins listed on at least one exchange. Coins without active
/// listings are not worth an analysis and can never be notified.
pub fn actively_traded(details: Vec<CoinDetail>) -> Vec<CoinDetail> {
    details
        .into_iter()
        .filter(|d| {
            if d.exchanges.is_empty() {
                info!(coin_id = %d.id, "No active exchange listings, skipping analysis");
                return false;
            }
            true
        })
        .collect()
}

/// Join each diver with its fetched detail. Divers whose detail could not be
/// fetched are left out, so an empty exchange set always means "no listings".
pub fn build_candidates(divers: &DiverIndex, details: &[CoinDetail]) -> Vec<Candidate> {
    divers
        .records()
        .iter()
        .filter_map(|record| {
            let detail = details.iter().find(|d| d.id == record.id)?;
            Some(Candidate {
                record: record.clone(),
                exchanges: detail.exchanges.clone(),
            })
        })
        .collect()
}

/// Rows for every candidate whose dead score is at or below `max_dead_score`.
/// Coins without a score count as `MISSING_DEAD_SCORE` and are left out.
pub fn select_for_notification(
    candidates: &[Candidate],
    dead_scores: &DeadScoreIndex,
    max_dead_score: f64,
) -> Vec<NotificationRow> {
    let rows: Vec<NotificationRow> = candidates
        .iter()
        .filter(|c| {
            let score = dead_scores
                .get(&c.record.id)
                .copied()
                .unwrap_or(MISSING_DEAD_SCORE);
            score <= max_dead_score
        })
        .map(|c| NotificationRow {
            coin_id: c.record.id.clone(),
            drop_percent: format!("{}%", c.record.price_change_pct_24h),
            dead_score: format!(
                "deadscore: {}",
                dead_scores
                    .get(&c.record.id)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "?".to_string())
            ),
            exchange_list: c.exchanges.joined(),
        })
        .collect();

    info!(
        selected = rows.len(),
        candidates = candidates.len(),
        "Selected {} coins with dead score <= {max_dead_score}",
        rows.len()
    );
    rows
}
