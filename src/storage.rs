use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AppError, Result};

/// On-disk layout of the day's caches, rooted at the data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.coin_data_dir(), self.exchange_data_dir(), self.analytics_root()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn market_snapshot(&self, day: &str) -> PathBuf {
        self.root.join(format!("market-snapshot-{day}.json"))
    }

    pub fn dives(&self, day: &str) -> PathBuf {
        self.root.join(format!("dives-{day}.json"))
    }

    pub fn coin_data_dir(&self) -> PathBuf {
        self.root.join("coindata")
    }

    pub fn exchange_data_dir(&self) -> PathBuf {
        self.root.join("exchangedata")
    }

    pub fn analytics_root(&self) -> PathBuf {
        self.root.join("analytics")
    }
}

/// `YYYYMMDD` key that namespaces every per-day artifact.
pub fn day_partition<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%Y%m%d").to_string()
}

/// Read and parse a JSON file. Parse failures are reported as cache corruption.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| AppError::CacheCorrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Write pretty-printed JSON, creating the parent directory when missing.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Unique empty directory under the OS temp dir for filesystem tests.
#[cfg(test)]
pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("coin-diver-{}-{name}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn layout_paths() {
        let layout = DataLayout::new("data");
        assert_eq!(
            layout.market_snapshot("20250820"),
            PathBuf::from("data/market-snapshot-20250820.json")
        );
        assert_eq!(layout.dives("20250820"), PathBuf::from("data/dives-20250820.json"));
        assert_eq!(layout.coin_data_dir(), PathBuf::from("data/coindata"));
        assert_eq!(layout.exchange_data_dir(), PathBuf::from("data/exchangedata"));
        assert_eq!(layout.analytics_root(), PathBuf::from("data/analytics"));
    }

    #[test]
    fn day_partition_format() {
        let ts = Utc.with_ymd_and_hms(2025, 8, 2, 23, 59, 0).unwrap();
        assert_eq!(day_partition(&ts), "20250802");
    }

    #[test]
    fn corrupt_file_reports_path() {
        let dir = scratch_dir("corrupt");
        let path = dir.join("broken.json");
        std::fs::write(&path, "{ nope").unwrap();

        match read_json::<serde_json::Value>(&path) {
            Err(AppError::CacheCorrupt { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected CacheCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn write_creates_parent_and_pretty_prints() {
        let dir = scratch_dir("write");
        let path = dir.join("nested").join("value.json");
        write_json(&path, &serde_json::json!({"a": 1})).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
        let back: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(back["a"], 1);
    }
}
