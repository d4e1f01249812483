//! Error payloads for command output.

use perdiem_scraper::{BatchFailure, ScrapeError};
use serde::Serialize;

/// Serializable error for `--json` output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    /// Stable error code for scripts (e.g., "INVALID_LOCATION_CODE")
    pub code: String,
    /// User-facing error message
    pub message: String,
    /// Location code the error belongs to, when there is one
    pub location_code: Option<String>,
}

impl CommandError {
    /// Create a new command error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            location_code: None,
        }
    }

    /// Attach the location code the error belongs to.
    #[must_use]
    pub fn for_location(mut self, location_code: impl Into<String>) -> Self {
        self.location_code = Some(location_code.into());
        self
    }
}

impl From<&ScrapeError> for CommandError {
    fn from(err: &ScrapeError) -> Self {
        match err {
            ScrapeError::InvalidLocationCode { location_code } => Self::new(
                "INVALID_LOCATION_CODE",
                format!("Location code {location_code} is not known to the rate site"),
            )
            .for_location(location_code.clone()),
            ScrapeError::Network { .. } => Self::new("NETWORK_ERROR", err.to_string()),
            ScrapeError::Timeout { .. } => Self::new("TIMEOUT", err.to_string()),
            ScrapeError::NoDataFound { location_code, .. } => {
                Self::new("NO_DATA_FOUND", err.to_string()).for_location(location_code.clone())
            }
            ScrapeError::InvalidInput(msg) => {
                Self::new("INVALID_INPUT", format!("Invalid input: {msg}"))
            }
            ScrapeError::Cache(e) => Self::new("CACHE_ERROR", format!("Cache error: {e}")),
        }
    }
}

impl From<&BatchFailure> for CommandError {
    fn from(failure: &BatchFailure) -> Self {
        Self::from(&failure.error).for_location(failure.location_code.clone())
    }
}
