use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Market catalog
// ---------------------------------------------------------------------------

/// One row of the provider's market listing. Unknown provider fields are kept
/// so the day's snapshot is persisted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEntry {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Dive selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiveRecord {
    pub id: String,
    pub symbol: String,
    /// 24h change truncated toward zero.
    pub price_change_pct_24h: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct DiveFields {
    symbol: String,
    price_change_pct_24h: i64,
}

/// Ordered top-K divers keyed by coin id. Persisted as a JSON object whose key
/// order is the selection order. Ids are unique: a repeated id keeps its first
/// record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct DiverIndex(Vec<DiveRecord>);

impl DiverIndex {
    pub fn new(records: Vec<DiveRecord>) -> Self {
        let mut seen = HashSet::with_capacity(records.len());
        let records = records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        Self(records)
    }

    pub fn records(&self) -> &[DiveRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Map<String, Value>> for DiverIndex {
    type Error = serde_json::Error;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut records = Vec::with_capacity(map.len());
        for (id, value) in map {
            let fields: DiveFields = serde_json::from_value(value)?;
            records.push(DiveRecord {
                id,
                symbol: fields.symbol,
                price_change_pct_24h: fields.price_change_pct_24h,
            });
        }
        Ok(Self(records))
    }
}

impl From<DiverIndex> for Map<String, Value> {
    fn from(index: DiverIndex) -> Self {
        index
            .0
            .into_iter()
            .map(|r| {
                let fields = serde_json::json!({
                    "symbol": r.symbol,
                    "price_change_pct_24h": r.price_change_pct_24h,
                });
                (r.id, fields)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Coin detail
// ---------------------------------------------------------------------------

/// Unique exchange names a coin is listed on. An empty set means "no active
/// listings", which is different from "never fetched".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSet {
    pub coin_id: String,
    pub exchanges: BTreeSet<String>,
}

impl ExchangeSet {
    /// Collect `tickers[].market.name` from a provider detail record.
    pub fn from_detail(coin_id: &str, data: &Value) -> Self {
        let exchanges = data
            .get("tickers")
            .and_then(|t| t.as_array())
            .map(|tickers| {
                tickers
                    .iter()
                    .filter_map(|t| t.get("market")?.get("name")?.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            coin_id: coin_id.to_string(),
            exchanges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn joined(&self) -> String {
        self.exchanges.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoinDetail {
    pub id: String,
    /// Full provider record as returned by the detail endpoint.
    pub data: Value,
    pub exchanges: ExchangeSet,
}

impl CoinDetail {
    pub fn links(&self) -> Value {
        self.data.get("links").cloned().unwrap_or(Value::Null)
    }

    pub fn platforms(&self) -> Value {
        self.data.get("detail_platforms").cloned().unwrap_or(Value::Null)
    }

    /// Detail record as sent to the reasoning service: the raw ticker list is
    /// replaced by the derived exchange names.
    pub fn prompt_payload(&self) -> Value {
        let mut payload = self.data.clone();
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("tickers");
            obj.insert(
                "exchanges".to_string(),
                Value::from(self.exchanges.exchanges.iter().cloned().collect::<Vec<_>>()),
            );
        }
        payload
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    pub content: Value,
    #[serde(default)]
    pub exchange_info: Value,
    #[serde(default)]
    pub links: Value,
}

impl AnalysisArtifact {
    pub fn dead_score(&self) -> Option<f64> {
        self.content.get("dead_score").and_then(|s| s.as_f64())
    }
}

/// Coin id to dead score (0 = healthy, 10 = dead).
pub type DeadScoreIndex = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
    }
}

// ---------------------------------------------------------------------------
// Candidates and notifications
// ---------------------------------------------------------------------------

/// A diver joined with its exchange listings.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record: DiveRecord,
    pub exchanges: ExchangeSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRow {
    pub coin_id: String,
    pub drop_percent: String,
    pub dead_score: String,
    pub exchange_list: String,
}

impl NotificationRow {
    pub fn to_line(&self) -> String {
        [
            self.coin_id.as_str(),
            self.drop_percent.as_str(),
            self.dead_score.as_str(),
            self.exchange_list.as_str(),
        ]
        .join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn market_entry_keeps_provider_fields() {
        let raw = r#"{"id":"bitcoin","symbol":"btc","price_change_percentage_24h":-1.5,"current_price":60000.0,"image":"x.png"}"#;
        let entry: MarketEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.id, "bitcoin");
        assert_eq!(entry.price_change_percentage_24h, Some(-1.5));
        assert_eq!(entry.extra.get("current_price"), Some(&Value::from(60000.0)));

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["image"], "x.png");
    }

    #[test]
    fn market_entry_accepts_null_change() {
        let raw = r#"{"id":"dust","symbol":"dst","price_change_percentage_24h":null}"#;
        let entry: MarketEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.price_change_percentage_24h, None);
    }

    #[test]
    fn diver_index_round_trip_keeps_order() {
        let index = DiverIndex::new(vec![
            DiveRecord { id: "zeta".into(), symbol: "aaa".into(), price_change_pct_24h: -80 },
            DiveRecord { id: "alpha".into(), symbol: "bbb".into(), price_change_pct_24h: -91 },
        ]);
        let text = serde_json::to_string_pretty(&index).unwrap();
        assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());

        let back: DiverIndex = serde_json::from_str(&text).unwrap();
        assert_eq!(back, index);
    }

    #[test]
    fn diver_index_keeps_first_record_per_id() {
        let index = DiverIndex::new(vec![
            DiveRecord { id: "x".into(), symbol: "x".into(), price_change_pct_24h: -80 },
            DiveRecord { id: "z".into(), symbol: "z".into(), price_change_pct_24h: -90 },
            DiveRecord { id: "x".into(), symbol: "x".into(), price_change_pct_24h: -81 },
        ]);

        let ids: Vec<&str> = index.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "z"]);
        assert_eq!(index.records()[0].price_change_pct_24h, -80);

        let back: DiverIndex = serde_json::from_str(&serde_json::to_string(&index).unwrap()).unwrap();
        assert_eq!(back, index);
    }

    #[test]
    fn exchange_set_is_unique_and_present_when_empty() {
        let data = serde_json::json!({
            "tickers": [
                {"market": {"name": "Binance"}},
                {"market": {"name": "Gate"}},
                {"market": {"name": "Binance"}},
                {"base": "no market"}
            ]
        });
        let set = ExchangeSet::from_detail("coin", &data);
        assert_eq!(set.joined(), "Binance, Gate");

        let empty = ExchangeSet::from_detail("coin", &serde_json::json!({"tickers": []}));
        assert!(empty.is_empty());
        let saved = serde_json::to_value(&empty).unwrap();
        assert_eq!(saved["exchanges"], serde_json::json!([]));
    }

    #[test]
    fn prompt_payload_replaces_tickers() {
        let data = serde_json::json!({
            "id": "coin",
            "links": {"homepage": ["https://coin.example"]},
            "tickers": [{"market": {"name": "MEXC"}}]
        });
        let detail = CoinDetail {
            id: "coin".into(),
            exchanges: ExchangeSet::from_detail("coin", &data),
            data,
        };
        let payload = detail.prompt_payload();
        assert!(payload.get("tickers").is_none());
        assert_eq!(payload["exchanges"], serde_json::json!(["MEXC"]));
        assert_eq!(detail.links()["homepage"][0], "https://coin.example");
    }

    #[test]
    fn notification_row_line() {
        let row = NotificationRow {
            coin_id: "coin".into(),
            drop_percent: "-80%".into(),
            dead_score: "deadscore: 5".into(),
            exchange_list: "Gate, MEXC".into(),
        };
        assert_eq!(row.to_line(), "coin | -80% | deadscore: 5 | Gate, MEXC");
    }
}
