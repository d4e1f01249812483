//! Session establishment, form field extraction and form submission.
//!
//! These are the three network stages of a lookup. Each performs exactly
//! one request and never retries; retry policy belongs to the orchestrator.

use crate::endpoints::Endpoints;
use crate::error::{Result, ScrapeError, Stage};
use crate::transport::{HttpResponse, HttpTransport};
use perdiem_core::LocationCode;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

const COUNTRY_FIELD: &str = "CountryCode";
const POST_FIELD: &str = "PostCode";

/// State carried from the form page to the submission.
///
/// Owned by a single lookup and dropped when it ends.
#[derive(Debug)]
pub struct SessionContext {
    cookie: String,
    country_code: String,
    post_code: String,
}

impl SessionContext {
    /// Cookie header value; empty for cookie-less sessions.
    #[must_use]
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    #[must_use]
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    #[must_use]
    pub fn post_code(&self) -> &str {
        &self.post_code
    }

    fn cookie_header(&self) -> Option<&str> {
        cookie_header(&self.cookie)
    }
}

/// Hidden form values needed to submit the rate form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFields {
    pub country_code: String,
    pub post_code: String,
}

/// Request the redirect endpoint for `code` and return the session cookie.
///
/// A response without `Set-Cookie` headers yields an empty string.
pub async fn establish_session(
    transport: &dyn HttpTransport,
    endpoints: &Endpoints,
    code: &LocationCode,
) -> Result<String> {
    let url = endpoints.session_url(code);
    tracing::debug!(location_code = %code, "Establishing upstream session");

    let response = transport
        .get(&url, None)
        .await
        .map_err(|e| ScrapeError::from_transport(Stage::Session, e))?;

    if !(response.is_success() || response.is_redirect()) {
        return Err(status_error(Stage::Session, &response));
    }

    let cookie = join_set_cookies(&response.set_cookies);
    if cookie.is_empty() {
        tracing::debug!(location_code = %code, "Upstream issued no session cookie");
    }
    Ok(cookie)
}

/// Fetch the form page with the session cookie and read its hidden fields.
pub async fn extract_form_fields(
    transport: &dyn HttpTransport,
    endpoints: &Endpoints,
    cookie: String,
    code: &LocationCode,
) -> Result<SessionContext> {
    let response = transport
        .get(endpoints.form_url(), cookie_header(&cookie))
        .await
        .map_err(|e| ScrapeError::from_transport(Stage::FormFields, e))?;

    if !response.is_success() {
        return Err(status_error(Stage::FormFields, &response));
    }

    let fields = parse_form_fields(&response.body, code)?;
    tracing::debug!(
        location_code = %code,
        country_code = %fields.country_code,
        post_code = %fields.post_code,
        "Extracted form fields"
    );

    Ok(SessionContext {
        cookie,
        country_code: fields.country_code,
        post_code: fields.post_code,
    })
}

/// Submit the rate form and return the raw HTML of the result page.
pub async fn submit_rate_form(
    transport: &dyn HttpTransport,
    endpoints: &Endpoints,
    session: &SessionContext,
) -> Result<String> {
    let form = [
        ("MenuHide", "1"),
        (COUNTRY_FIELD, session.country_code()),
        (POST_FIELD, session.post_code()),
    ];

    let response = transport
        .post_form(endpoints.form_url(), session.cookie_header(), &form)
        .await
        .map_err(|e| ScrapeError::from_transport(Stage::Submit, e))?;

    if !response.is_success() {
        return Err(status_error(Stage::Submit, &response));
    }

    Ok(response.body)
}

/// Read the `CountryCode` and `PostCode` hidden inputs from a form page.
///
/// A missing post code falls back to the location code itself; a missing
/// country code means the site does not know the location.
pub fn parse_form_fields(html: &str, code: &LocationCode) -> Result<FormFields> {
    let document = Html::parse_document(html);

    let country_code = input_value(&document, html, COUNTRY_FIELD).ok_or_else(|| {
        ScrapeError::InvalidLocationCode {
            location_code: code.to_string(),
        }
    })?;

    let post_code = input_value(&document, html, POST_FIELD).unwrap_or_else(|| {
        tracing::debug!(location_code = %code, "No PostCode field, using location code");
        code.to_string()
    });

    Ok(FormFields {
        country_code,
        post_code,
    })
}

/// Reduce `Set-Cookie` values to their `name=value` pairs and join them into
/// a single `Cookie` header.
#[must_use]
pub fn join_set_cookies(values: &[String]) -> String {
    values
        .iter()
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('=') && !pair.starts_with('='))
        .collect::<Vec<_>>()
        .join("; ")
}

fn cookie_header(cookie: &str) -> Option<&str> {
    if cookie.is_empty() {
        None
    } else {
        Some(cookie)
    }
}

fn status_error(stage: Stage, response: &HttpResponse) -> ScrapeError {
    ScrapeError::Network {
        stage,
        message: format!("unexpected HTTP status {}", response.status),
    }
}

fn input_value(document: &Html, raw: &str, name: &str) -> Option<String> {
    dom_input_value(document, name).or_else(|| raw_input_value(raw, name))
}

fn dom_input_value(document: &Html, name: &str) -> Option<String> {
    static INPUT: OnceLock<Selector> = OnceLock::new();
    let selector = INPUT.get_or_init(|| Selector::parse("input[name]").expect("valid selector"));

    document
        .select(selector)
        .filter(|input| {
            input
                .value()
                .attr("name")
                .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
        })
        .find_map(|input| non_empty(input.value().attr("value")))
}

// Inputs the HTML parser drops, e.g. ones written out by inline script.
fn raw_input_value(raw: &str, name: &str) -> Option<String> {
    static INPUT_TAG: OnceLock<Regex> = OnceLock::new();
    static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
    let input_tag = INPUT_TAG.get_or_init(|| Regex::new(r"(?is)<input\b[^>]*>").expect("valid regex"));
    let attribute = ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"(?i)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid regex")
    });

    input_tag.find_iter(raw).find_map(|tag| {
        let mut tag_name = None;
        let mut tag_value = None;
        for caps in attribute.captures_iter(tag.as_str()) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            match caps[1].to_ascii_lowercase().as_str() {
                "name" => tag_name = Some(value),
                "value" => tag_value = Some(value),
                _ => {}
            }
        }

        if tag_name.is_some_and(|n| n.trim().eq_ignore_ascii_case(name)) {
            non_empty(tag_value)
        } else {
            None
        }
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
