//! HTTP access to the upstream rate site.
//!
//! The pipeline talks to the network only through [`HttpTransport`], so the
//! cookie, form and parsing logic above it can be exercised against canned
//! responses.

use crate::error::{Result, ScrapeError, TransportError};
use async_trait::async_trait;
use perdiem_core::UpstreamConfig;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;

/// A raw upstream response.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Every `Set-Cookie` header value, in order
    pub set_cookies: Vec<String>,
    /// Response body
    pub body: String,
}

impl HttpResponse {
    /// 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 3xx
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Minimal HTTP client surface used by the pipeline.
///
/// Implementations must not follow redirects: the session cookie arrives on
/// the redirect response itself.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET, attaching `cookie` as the `Cookie` header when given.
    async fn get(
        &self,
        url: &str,
        cookie: Option<&str>,
    ) -> std::result::Result<HttpResponse, TransportError>;

    /// POST `form` URL-encoded, in the given field order.
    async fn post_form(
        &self,
        url: &str,
        cookie: Option<&str>,
        form: &[(&str, &str)],
    ) -> std::result::Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport with the configured timeout and user agent.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ScrapeError::InvalidInput(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    async fn send(
        &self,
        request: RequestBuilder,
        cookie: Option<&str>,
    ) -> std::result::Result<HttpResponse, TransportError> {
        let request = match cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        };

        let response = request.send().await.map_err(|e| self.map_error(&e))?;

        let status = response.status().as_u16();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(ToString::to_string)
            .collect();
        let body = response.text().await.map_err(|e| self.map_error(&e))?;

        Ok(HttpResponse {
            status,
            set_cookies,
            body,
        })
    }

    fn map_error(&self, err: &reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        cookie: Option<&str>,
    ) -> std::result::Result<HttpResponse, TransportError> {
        self.send(self.client.get(url), cookie).await
    }

    async fn post_form(
        &self,
        url: &str,
        cookie: Option<&str>,
        form: &[(&str, &str)],
    ) -> std::result::Result<HttpResponse, TransportError> {
        self.send(self.client.post(url).form(form), cookie).await
    }
}
