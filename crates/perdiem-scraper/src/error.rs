use perdiem_cache::CacheError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Network stage of the lookup pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Redirect request that issues the session cookie
    Session,
    /// Form page fetch that exposes the hidden country/post codes
    FormFields,
    /// Form submission that returns the rates page
    Submit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Session => "session",
            Self::FormFields => "form fields",
            Self::Submit => "submit",
        };
        write!(f, "{name}")
    }
}

/// Failure raised by an [`HttpTransport`](crate::transport::HttpTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("{0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("location code {location_code} does not resolve to a post")]
    InvalidLocationCode { location_code: String },

    #[error("network error during {stage}: {message}")]
    Network { stage: Stage, message: String },

    #[error("{stage} request timed out after {seconds}s")]
    Timeout { stage: Stage, seconds: u64 },

    #[error("no rate data found for {location_code} ({rejected} candidates rejected on bounds)")]
    NoDataFound {
        location_code: String,
        rejected: usize,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Coarse classification of a [`ScrapeError`], used for retry decisions
/// and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidLocationCode,
    Network,
    NoDataFound,
    InvalidInput,
    Cache,
}

impl ScrapeError {
    /// Attach the pipeline stage to a transport failure.
    #[must_use]
    pub fn from_transport(stage: Stage, err: TransportError) -> Self {
        match err {
            TransportError::Timeout { seconds } => Self::Timeout { stage, seconds },
            TransportError::Request(message) => Self::Network { stage, message },
        }
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidLocationCode { .. } => FailureKind::InvalidLocationCode,
            Self::Network { .. } | Self::Timeout { .. } => FailureKind::Network,
            Self::NoDataFound { .. } => FailureKind::NoDataFound,
            Self::InvalidInput(_) => FailureKind::InvalidInput,
            Self::Cache(_) => FailureKind::Cache,
        }
    }

    /// Whether another pipeline attempt may succeed.
    ///
    /// Parser misses are retried under the same budget as network faults,
    /// since the upstream page content can vary between requests.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), FailureKind::Network | FailureKind::NoDataFound)
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let invalid = ScrapeError::InvalidLocationCode {
            location_code: "99999".to_string(),
        };
        assert!(!invalid.is_retryable());

        let timeout = ScrapeError::Timeout {
            stage: Stage::Submit,
            seconds: 15,
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.kind(), FailureKind::Network);

        let no_data = ScrapeError::NoDataFound {
            location_code: "11410".to_string(),
            rejected: 0,
        };
        assert!(no_data.is_retryable());
        assert_eq!(no_data.kind(), FailureKind::NoDataFound);
    }

    #[test]
    fn test_transport_error_mapping() {
        let err = ScrapeError::from_transport(Stage::Session, TransportError::Timeout { seconds: 15 });
        assert_eq!(err.to_string(), "session request timed out after 15s");

        let err = ScrapeError::from_transport(
            Stage::FormFields,
            TransportError::Request("connection refused".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "network error during form fields: connection refused"
        );
    }
}
