use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::ANALYSIS_ERROR_BUDGET;
use crate::error::{AppError, Result};
use crate::llm::client::ReasoningService;
use crate::llm::model::{known_model_slugs, LlmConfig};
use crate::storage::{read_json, write_json};
use crate::types::{AnalysisArtifact, CoinDetail, DeadScoreIndex, TokenUsage};

#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub dead_scores: DeadScoreIndex,
    /// Tokens billed across every live call of the run.
    pub usage: TokenUsage,
    pub failures: u32,
}

/// Scores each coin with the reasoning service, reusing the day's persisted
/// artifacts. After `error_budget` failed coins the remaining ones are skipped.
pub struct Analyzer<S> {
    service: S,
    llm: LlmConfig,
    error_budget: u32,
}

impl<S: ReasoningService> Analyzer<S> {
    pub fn new(service: S, llm: LlmConfig) -> Self {
        Self {
            service,
            llm,
            error_budget: ANALYSIS_ERROR_BUDGET,
        }
    }

    pub fn llm(&self) -> &LlmConfig {
        &self.llm
    }

    pub fn artifact_path(&self, analytics_root: &Path, day: &str, coin_id: &str) -> PathBuf {
        analytics_root
            .join(day)
            .join(format!("{}-{coin_id}.json", self.llm.model_slug()))
    }

    pub async fn analyze(&self, details: &[CoinDetail], analytics_root: &Path, day: &str) -> AnalysisReport {
        let mut report = AnalysisReport::default();

        for (i, detail) in details.iter().enumerate() {
            if report.failures >= self.error_budget {
                error!(
                    failures = report.failures,
                    skipped = details.len() - i,
                    "Too many analysis errors, skipping the remaining coins"
                );
                break;
            }

            let coin_id = detail.id.as_str();
            let path = self.artifact_path(analytics_root, day, coin_id);

            if path.exists() {
                match load_score(&path) {
                    Ok(score) => {
                        info!(coin_id, "Analytics already exists as {}, loaded", path.display());
                        report.dead_scores.insert(coin_id.to_string(), score);
                    }
                    Err(e) => warn!(coin_id, "Could not load analytics from {}: {e}", path.display()),
                }
                continue;
            }

            let request = self.llm.build_request(&detail.prompt_payload());
            let completion = match self.service.complete(&request).await {
                Ok(c) => c,
                Err(e) => {
                    report.failures += 1;
                    error!(coin_id, failures = report.failures, "Analysis request failed: {e}");
                    continue;
                }
            };
            report.usage += completion.usage;

            let (content, score) = match parse_report(&completion.content) {
                Ok(parsed) => parsed,
                Err(e) => {
                    report.failures += 1;
                    error!(coin_id, failures = report.failures, "Could not get structured output from {}: {e}", self.llm.model_name);
                    continue;
                }
            };
            info!(coin_id, dead_score = score, "Coin analytics returned from {}", self.llm.model_name);

            let artifact = AnalysisArtifact {
                content,
                exchange_info: detail.platforms(),
                links: detail.links(),
            };
            match write_json(&path, &artifact) {
                Ok(()) => info!(coin_id, "Analytics saved to {}", path.display()),
                Err(e) => error!(coin_id, "Could not save analytics to {}: {e}", path.display()),
            }

            report.dead_scores.insert(coin_id.to_string(), score);
        }

        self.log_cost(report.usage);
        report
    }

    fn log_cost(&self, usage: TokenUsage) {
        let (prompt_cost, completion_cost) = self.llm.pricing().cost(usage);
        info!(
            model = %self.llm.model_name,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "LLM usage cost: ${:.4} prompt + ${:.4} completion = ${:.4}",
            prompt_cost,
            completion_cost,
            prompt_cost + completion_cost,
        );
    }
}

/// Structured report from the model's raw content: a JSON object, possibly
/// string-encoded, with a numeric `dead_score`.
pub fn parse_report(content: &Value) -> Result<(Value, f64)> {
    let report = match content {
        Value::String(text) => serde_json::from_str::<Value>(text)?,
        other => other.clone(),
    };
    if !report.is_object() {
        return Err(AppError::InvalidResponse("report is not a JSON object".to_string()));
    }
    let score = report
        .get("dead_score")
        .and_then(|s| s.as_f64())
        .ok_or_else(|| AppError::InvalidResponse("report has no numeric dead_score".to_string()))?;
    Ok((report, score))
}

fn load_score(path: &Path) -> Result<f64> {
    let artifact: AnalysisArtifact = read_json(path)?;
    artifact
        .dead_score()
        .ok_or_else(|| AppError::InvalidResponse("artifact has no numeric dead_score".to_string()))
}

/// Rebuild the dead-score index from every artifact `model_slug` produced in
/// the day's partition. Unreadable artifacts are logged and skipped, and so
/// are files of a listed model whose slug extends `model_slug`
/// (`openai-o4-mini-high-*` is not an `openai-o4-mini` artifact).
pub fn load_dead_scores(analytics_root: &Path, day: &str, model_slug: &str) -> DeadScoreIndex {
    let dir = analytics_root.join(day);
    let mut scores = DeadScoreIndex::new();

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("No analytics to reload from {}: {e}", dir.display());
            return scores;
        }
    };

    let prefix = format!("{model_slug}-");
    let longer_prefixes: Vec<String> = known_model_slugs()
        .filter(|slug| slug.starts_with(&prefix))
        .map(|slug| format!("{slug}-"))
        .collect();

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if longer_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            continue;
        }
        let Some(coin_id) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".json"))
        else {
            continue;
        };

        match load_score(&entry.path()) {
            Ok(score) => {
                scores.insert(coin_id.to_string(), score);
            }
            Err(e) => warn!(coin_id, "Skipping analytics {name}: {e}"),
        }
    }

    info!("Reloaded {} dead scores from {}", scores.len(), dir.display());
    scores
}

/// Scores of this run, or the day's persisted scores when the run produced
/// none (every coin failed or was skipped).
pub fn scores_or_reload(report: AnalysisReport, analytics_root: &Path, day: &str, model_slug: &str) -> DeadScoreIndex {
    if !report.dead_scores.is_empty() {
        return report.dead_scores;
    }
    warn!(failures = report.failures, "Analysis produced no scores, reloading today's artifacts");
    load_dead_scores(analytics_root, day, model_slug)
}
