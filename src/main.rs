mod config;
mod display;
mod error;
mod fetcher;
mod filter;
mod llm;
mod notify;
mod retry;
mod storage;
mod types;

use chrono::Local;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{get_catalog, CoinGeckoClient, DetailFetcher, DetailOptions};
use crate::filter::{actively_traded, build_candidates, divers_for_day, select_for_notification};
use crate::llm::{scores_or_reload, Analyzer, LlmConfig, OpenRouterClient};
use crate::notify::{deliver, PushoverNotifier};
use crate::storage::{day_partition, DataLayout};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let layout = DataLayout::new(&cfg.data_dir);
    layout.ensure_dirs()?;
    let day = day_partition(&Local::now());
    info!("Starting run for {day}, data under {}", cfg.data_dir.display());

    // --- Market catalog ---
    let coingecko = CoinGeckoClient::new(&cfg)?;
    let catalog = get_catalog(&coingecko, &layout.market_snapshot(&day)).await?;

    // --- Dive selection ---
    let divers = divers_for_day(&catalog, cfg.dive_threshold_pct, cfg.dive_limit, &layout.dives(&day))?;
    if divers.is_empty() {
        info!("No coins dived below {}% today", cfg.dive_threshold_pct);
        return Ok(());
    }
    info!(count = divers.len(), "Divers selected");

    // --- Coin details ---
    let fetcher = DetailFetcher::new(coingecko, &layout);
    let active = actively_traded(fetcher.get_details(&divers, DetailOptions::default()).await);
    let candidates = build_candidates(&divers, &active);
    if candidates.is_empty() {
        info!("No actively traded divers left to analyse");
        return Ok(());
    }

    // --- Analysis ---
    let llm = LlmConfig::load(&cfg.llm_model, &cfg.superprompt_path, &cfg.response_schema_path);
    let analyzer = Analyzer::new(OpenRouterClient::new(&cfg)?, llm);
    let report = analyzer.analyze(&active, &layout.analytics_root(), &day).await;
    let dead_scores = scores_or_reload(report, &layout.analytics_root(), &day, &analyzer.llm().model_slug());

    if let Err(e) = display::print_summary(&candidates, &dead_scores) {
        warn!("Could not render summary table: {e}");
    }

    // --- Notification ---
    let rows = select_for_notification(&candidates, &dead_scores, cfg.max_dead_score);
    match PushoverNotifier::from_config(&cfg)? {
        Some(notifier) => {
            deliver(&notifier, &rows).await;
        }
        None => info!("Pushover is not configured, skipping {} notifications", rows.len()),
    }

    info!("Run complete");
    Ok(())
}
