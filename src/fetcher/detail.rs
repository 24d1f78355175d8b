use std::path::PathBuf;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::fetcher::CoinSource;
use crate::retry::RetryPolicy;
use crate::storage::{read_json, write_json, DataLayout};
use crate::types::{CoinDetail, DiverIndex, ExchangeSet};

#[derive(Debug, Clone, Copy, Default)]
pub struct DetailOptions {
    /// Ignore cached files and always hit the provider.
    pub refresh: bool,
    /// Persist only the exchange set, never the full detail record.
    pub exchange_only: bool,
}

/// Per-coin detail lookup backed by two cache files: the full provider record
/// (`coindata/{id}.json`) and the derived exchange set (`exchangedata/{id}.json`).
pub struct DetailFetcher<S> {
    source: S,
    coin_dir: PathBuf,
    exchange_dir: PathBuf,
    retry: RetryPolicy,
}

impl<S: CoinSource> DetailFetcher<S> {
    pub fn new(source: S, layout: &DataLayout) -> Self {
        Self {
            source,
            coin_dir: layout.coin_data_dir(),
            exchange_dir: layout.exchange_data_dir(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn coin_path(&self, coin_id: &str) -> PathBuf {
        self.coin_dir.join(format!("{coin_id}.json"))
    }

    pub fn exchange_path(&self, coin_id: &str) -> PathBuf {
        self.exchange_dir.join(format!("{coin_id}.json"))
    }

    /// Return the coin's detail record and exchange set.
    ///
    /// Both cache files must exist and parse for a cache hit; otherwise, or
    /// when `refresh` is set, the provider is queried under the retry policy.
    pub async fn get_detail(&self, coin_id: &str, opts: DetailOptions) -> Result<CoinDetail> {
        if !opts.refresh {
            if let Some(cached) = self.load_cached(coin_id) {
                info!(coin_id, "Coin and exchange data already cached, loaded from file");
                return Ok(cached);
            }
        } else if self.coin_path(coin_id).exists() {
            info!(coin_id, "Coin data cached but refresh is set, fetching again");
        }

        let label = format!("coin detail {coin_id}");
        self.retry
            .run(&label, move || self.fetch_live(coin_id, opts))
            .await
    }

    /// Details for every diver, in dive-list order. A coin whose fetch fails
    /// after retries is logged and left out.
    pub async fn get_details(&self, divers: &DiverIndex, opts: DetailOptions) -> Vec<CoinDetail> {
        let mut details = Vec::with_capacity(divers.len());
        for record in divers.records() {
            match self.get_detail(&record.id, opts).await {
                Ok(detail) => details.push(detail),
                Err(e) => error!(coin_id = %record.id, "Could not fetch coin detail, skipping: {e}"),
            }
        }
        info!(fetched = details.len(), divers = divers.len(), "Coin details ready");
        details
    }

    fn load_cached(&self, coin_id: &str) -> Option<CoinDetail> {
        let coin_path = self.coin_path(coin_id);
        let exchange_path = self.exchange_path(coin_id);
        if !coin_path.exists() || !exchange_path.exists() {
            return None;
        }

        let data = read_json::<Value>(&coin_path)
            .map_err(|e| warn!(coin_id, "Could not load cached coin data: {e}"))
            .ok();
        let exchanges = read_json::<ExchangeSet>(&exchange_path)
            .map_err(|e| warn!(coin_id, "Could not load cached exchange data: {e}"))
            .ok();

        match (data, exchanges) {
            (Some(data), Some(exchanges)) => Some(CoinDetail {
                id: coin_id.to_string(),
                data,
                exchanges,
            }),
            _ => None,
        }
    }

    async fn fetch_live(&self, coin_id: &str, opts: DetailOptions) -> Result<CoinDetail> {
        let data = self.source.fetch_coin(coin_id).await?;
        let exchanges = ExchangeSet::from_detail(coin_id, &data);

        let exchange_path = self.exchange_path(coin_id);
        match write_json(&exchange_path, &exchanges) {
            Ok(()) if exchanges.is_empty() => {
                warn!(coin_id, "Saved empty exchange info to {} (no active listings)", exchange_path.display())
            }
            Ok(()) => info!(coin_id, count = exchanges.exchanges.len(), "Saved exchange info to {}", exchange_path.display()),
            Err(e) => error!(coin_id, "Could not write exchange data: {e}"),
        }

        let coin_path = self.coin_path(coin_id);
        if !opts.exchange_only && !coin_path.exists() {
            if let Err(e) = write_json(&coin_path, &data) {
                error!(coin_id, "Could not write coin data: {e}");
            }
        }

        Ok(CoinDetail {
            id: coin_id.to_string(),
            data,
            exchanges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::storage::scratch_dir;
    use crate::types::DiveRecord;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves scripted results first, then `fallback` forever.
    struct FakeCoins {
        calls: AtomicUsize,
        script: Mutex<VecDeque<Result<Value>>>,
        fallback: Value,
    }

    impl FakeCoins {
        fn new(fallback: Value) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: Mutex::new(VecDeque::new()),
                fallback,
            }
        }

        fn then(self, result: Result<Value>) -> Self {
            self.script.lock().unwrap().push_back(result);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CoinSource for FakeCoins {
        async fn fetch_coin(&self, _coin_id: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    fn live_record() -> Value {
        serde_json::json!({
            "id": "deadcoin",
            "links": {"homepage": ["https://dead.example"]},
            "tickers": [
                {"market": {"name": "MEXC"}},
                {"market": {"name": "Gate"}},
                {"market": {"name": "MEXC"}}
            ]
        })
    }

    fn fetcher(name: &str, source: FakeCoins) -> DetailFetcher<FakeCoins> {
        let layout = DataLayout::new(scratch_dir(name));
        layout.ensure_dirs().unwrap();
        DetailFetcher::new(source, &layout)
    }

    fn seed_cache(f: &DetailFetcher<FakeCoins>, id: &str, data: &Value, exchanges: &[&str]) {
        write_json(&f.coin_path(id), data).unwrap();
        let set = ExchangeSet {
            coin_id: id.to_string(),
            exchanges: exchanges.iter().map(|s| s.to_string()).collect(),
        };
        write_json(&f.exchange_path(id), &set).unwrap();
    }

    fn unavailable() -> AppError {
        AppError::Status {
            endpoint: "coins/deadcoin".to_string(),
            status: 503,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn cache_hit_issues_no_request() {
        let f = fetcher("detail-hit", FakeCoins::new(live_record()));
        let cached = serde_json::json!({"id": "deadcoin", "cached": true});
        seed_cache(&f, "deadcoin", &cached, &["Binance"]);

        let detail = f.get_detail("deadcoin", DetailOptions::default()).await.unwrap();

        assert_eq!(f.source.calls(), 0);
        assert_eq!(detail.data, cached);
        assert_eq!(detail.exchanges.joined(), "Binance");
        let on_disk = std::fs::read_to_string(f.coin_path("deadcoin")).unwrap();
        assert_eq!(on_disk, serde_json::to_string_pretty(&cached).unwrap());
    }

    #[tokio::test]
    async fn refresh_always_fetches_and_keeps_full_record() {
        let f = fetcher("detail-refresh", FakeCoins::new(live_record()));
        let cached = serde_json::json!({"id": "deadcoin", "cached": true});
        seed_cache(&f, "deadcoin", &cached, &["Binance"]);

        let opts = DetailOptions { refresh: true, exchange_only: false };
        let detail = f.get_detail("deadcoin", opts).await.unwrap();

        assert_eq!(f.source.calls(), 1);
        assert_eq!(detail.exchanges.joined(), "Gate, MEXC");
        let saved_detail: Value = read_json(&f.coin_path("deadcoin")).unwrap();
        assert_eq!(saved_detail, cached);
        let saved_set: ExchangeSet = read_json(&f.exchange_path("deadcoin")).unwrap();
        assert_eq!(saved_set, detail.exchanges);
    }

    #[tokio::test]
    async fn corrupt_cache_file_triggers_fetch() {
        let f = fetcher("detail-corrupt", FakeCoins::new(live_record()));
        seed_cache(&f, "deadcoin", &live_record(), &["Gate"]);
        std::fs::write(f.exchange_path("deadcoin"), "{\"coin_id\":").unwrap();

        let detail = f.get_detail("deadcoin", DetailOptions::default()).await.unwrap();

        assert_eq!(f.source.calls(), 1);
        assert_eq!(detail.exchanges.joined(), "Gate, MEXC");
    }

    #[tokio::test]
    async fn missing_half_of_cache_triggers_fetch() {
        let f = fetcher("detail-half", FakeCoins::new(live_record()));
        write_json(&f.coin_path("deadcoin"), &live_record()).unwrap();

        f.get_detail("deadcoin", DetailOptions::default()).await.unwrap();

        assert_eq!(f.source.calls(), 1);
        assert!(f.exchange_path("deadcoin").exists());
    }

    #[tokio::test]
    async fn empty_ticker_list_persists_empty_set() {
        let f = fetcher("detail-empty", FakeCoins::new(serde_json::json!({"id": "ghost", "tickers": []})));

        let detail = f.get_detail("ghost", DetailOptions::default()).await.unwrap();

        assert!(detail.exchanges.is_empty());
        let saved: ExchangeSet = read_json(&f.exchange_path("ghost")).unwrap();
        assert!(saved.is_empty());
        assert!(f.coin_path("ghost").exists());
    }

    #[tokio::test]
    async fn exchange_only_skips_full_record() {
        let f = fetcher("detail-exonly", FakeCoins::new(live_record()));

        let opts = DetailOptions { refresh: false, exchange_only: true };
        f.get_detail("deadcoin", opts).await.unwrap();

        assert!(f.exchange_path("deadcoin").exists());
        assert!(!f.coin_path("deadcoin").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let source = FakeCoins::new(live_record())
            .then(Err(unavailable()))
            .then(Err(unavailable()));
        let f = fetcher("detail-retry", source);

        let detail = f.get_detail("deadcoin", DetailOptions::default()).await.unwrap();

        assert_eq!(f.source.calls(), 3);
        assert_eq!(detail.id, "deadcoin");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_attempt_ceiling() {
        let mut source = FakeCoins::new(live_record());
        for _ in 0..10 {
            source = source.then(Err(unavailable()));
        }
        let f = fetcher("detail-exhausted", source);

        let res = f.get_detail("deadcoin", DetailOptions::default()).await;

        assert!(matches!(res, Err(AppError::Status { status: 503, .. })));
        assert_eq!(f.source.calls(), 6);
        assert!(!f.exchange_path("deadcoin").exists());
    }

    /// Fails every request for `bad_id`, serves `live_record` otherwise.
    struct OneBadCoin {
        bad_id: &'static str,
    }

    #[async_trait]
    impl CoinSource for OneBadCoin {
        async fn fetch_coin(&self, coin_id: &str) -> Result<Value> {
            if coin_id == self.bad_id {
                Err(AppError::InvalidResponse("not an object".to_string()))
            } else {
                Ok(live_record())
            }
        }
    }

    #[tokio::test]
    async fn failed_coin_is_left_out_of_batch() {
        let layout = DataLayout::new(scratch_dir("detail-batch"));
        layout.ensure_dirs().unwrap();
        let f = DetailFetcher::new(OneBadCoin { bad_id: "broken" }, &layout);
        let divers = DiverIndex::new(vec![
            DiveRecord { id: "alpha".into(), symbol: "a".into(), price_change_pct_24h: -80 },
            DiveRecord { id: "broken".into(), symbol: "b".into(), price_change_pct_24h: -85 },
            DiveRecord { id: "gamma".into(), symbol: "g".into(), price_change_pct_24h: -90 },
        ]);

        let details = f.get_details(&divers, DetailOptions::default()).await;

        let ids: Vec<&str> = details.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "gamma"]);
    }

    #[tokio::test]
    async fn malformed_body_is_not_retried() {
        let source = FakeCoins::new(live_record())
            .then(Err(AppError::InvalidResponse("not an object".to_string())));
        let f = fetcher("detail-malformed", source);

        let res = f.get_detail("deadcoin", DetailOptions::default()).await;

        assert!(res.is_err());
        assert_eq!(f.source.calls(), 1);
    }
}
