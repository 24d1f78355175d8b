use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-success HTTP status from an endpoint that may recover on retry.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Non-success status during catalog paging. The day's catalog is unusable.
    #[error("Market listing rejected with {status} ({reason})")]
    CatalogRejected { status: u16, reason: String },

    #[error("Corrupt cache file {path}: {source}")]
    CacheCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Service-side error carried inside an HTTP 200 body.
    #[error("Reasoning service error: {0}")]
    RateLimited(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AppError {
    /// Network failures, non-success statuses and in-band service errors.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Http(_) | AppError::Status { .. } | AppError::RateLimited(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_rate_limit_are_transient() {
        let status = AppError::Status {
            endpoint: "coins/bitcoin".to_string(),
            status: 503,
            body: String::new(),
        };
        assert!(status.is_transient());
        assert!(AppError::RateLimited("slow down".to_string()).is_transient());
    }

    #[test]
    fn malformed_body_is_not_transient() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(!AppError::Json(err).is_transient());
        assert!(!AppError::InvalidResponse("no choices".to_string()).is_transient());
    }
}
