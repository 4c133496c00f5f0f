use crate::types::Timeframe;
use thiserror::Error;

/// Signal engine error types.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Every provider and the disk fallback came up empty.
    #[error("No data available for {symbol} {timeframe}")]
    NoDataAvailable { symbol: String, timeframe: Timeframe },

    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Insufficient history: need {required} periods, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    /// Data came from a fallback copy older than its fresh TTL.
    #[error("Stale fallback data for {symbol} {timeframe} ({age_secs}s old)")]
    StaleFallback {
        symbol: String,
        timeframe: Timeframe,
        age_secs: i64,
    },

    #[error("Provider {provider} error: {message}")]
    Provider { provider: String, message: String },

    #[error("Provider {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        EngineError::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Whether the fallback chain should move on to the next provider.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            EngineError::MalformedData(_)
                | EngineError::Provider { .. }
                | EngineError::Timeout { .. }
                | EngineError::Http(_)
                | EngineError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
