use thiserror::Error;

/// Errors raised inside the screener.
///
/// Fetch-related variants are retried by the clients and never escape their
/// public API; configuration variants surface to the caller of the analysis.
#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Malformed payload for {symbol}: {reason}")]
    MalformedPayload { symbol: String, reason: String },

    #[error("Empty price series for {0}")]
    EmptySeries(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Universe unavailable: {0}")]
    Universe(String),

    #[error("Dividend override table unusable: {0}")]
    Overrides(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scoring failed: {0}")]
    Scoring(String),
}

impl ScreenerError {
    pub fn malformed<S: Into<String>, R: Into<String>>(symbol: S, reason: R) -> Self {
        ScreenerError::MalformedPayload {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// True for failures a later attempt may not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScreenerError::Http(_)
                | ScreenerError::Status { .. }
                | ScreenerError::MalformedPayload { .. }
                | ScreenerError::EmptySeries(_)
                | ScreenerError::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ScreenerError::malformed("sh600000", "short").is_transient());
        assert!(ScreenerError::EmptySeries("sz000001".into()).is_transient());
        assert!(!ScreenerError::Universe("missing".into()).is_transient());
        assert!(!ScreenerError::Scoring("nan".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = ScreenerError::Status {
            status: 503,
            url: "https://qt.gtimg.cn/q=sh600000".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unexpected HTTP status 503 from https://qt.gtimg.cn/q=sh600000"
        );
    }
}
