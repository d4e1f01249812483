use crate::error::{Result, ScrapeError};
use perdiem_core::config::CODE_PLACEHOLDER;
use perdiem_core::{LocationCode, UpstreamConfig};

/// Upstream URLs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    session_template: String,
    form_url: String,
}

impl Endpoints {
    pub fn new(session_template: impl Into<String>, form_url: impl Into<String>) -> Result<Self> {
        let session_template = session_template.into();
        if !session_template.contains(CODE_PLACEHOLDER) {
            return Err(ScrapeError::InvalidInput(format!(
                "session URL template must contain {CODE_PLACEHOLDER}: {session_template}"
            )));
        }

        Ok(Self {
            session_template,
            form_url: form_url.into(),
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        Self::new(config.session_url.clone(), config.form_url.clone())
    }

    /// Redirect URL that issues the session cookie for `code`.
    #[must_use]
    pub fn session_url(&self, code: &LocationCode) -> String {
        self.session_template.replace(CODE_PLACEHOLDER, code.as_str())
    }

    #[must_use]
    pub fn form_url(&self) -> &str {
        &self.form_url
    }
}
