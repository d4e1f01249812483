//! Scripted stand-in for the upstream rate site.

#![allow(dead_code)]

use async_trait::async_trait;
use perdiem_cache::{CacheEntry, CacheError, MemoryCache, RateCache};
use perdiem_core::{ExtractionStrategy, LocationCode, RateRecord, Timestamp};
use perdiem_scraper::{
    Endpoints, HttpResponse, HttpTransport, LookupOrchestrator, RetryPolicy, TransportError,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const AUSTRIA_PAGE: &str = include_str!("../fixtures/austria_11410.html");
pub const GERMANY_PAGE: &str = include_str!("../fixtures/germany_10450.html");
pub const FORM_PAGE: &str = include_str!("../fixtures/form_page.html");
pub const EMPTY_PAGE: &str = "<html><body><p>No rates are available.</p></body></html>";

pub const SESSION_URL: &str = "https://rates.test/Web920/location_action.asp?MenuHide=1&PostCode={code}";
pub const FORM_URL: &str = "https://rates.test/Web920/per_diem_action.asp";

/// How the fake answers one form submission.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The rates page for the submitted post code
    Page,
    /// A specific body
    Body(String),
    /// A non-success status
    Status(u16),
    /// A transport timeout
    Timeout,
}

/// Fake site keyed by the session cookie, the way the real one keeps the
/// location in its server-side session.
pub struct FakeSite {
    pages: HashMap<String, String>,
    unknown_codes: HashSet<String>,
    submit_script: Mutex<VecDeque<Reply>>,
    default_reply: Reply,
    session_calls: AtomicUsize,
    form_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    session_times: Mutex<Vec<Instant>>,
    submitted_forms: Mutex<Vec<Vec<(String, String)>>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self {
            pages: HashMap::from([
                ("11410".to_string(), AUSTRIA_PAGE.to_string()),
                ("10450".to_string(), GERMANY_PAGE.to_string()),
            ]),
            unknown_codes: HashSet::new(),
            submit_script: Mutex::new(VecDeque::new()),
            default_reply: Reply::Page,
            session_calls: AtomicUsize::new(0),
            form_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            session_times: Mutex::new(Vec::new()),
            submitted_forms: Mutex::new(Vec::new()),
        }
    }

    /// Serve `html` as the rates page for `code`.
    pub fn with_page(mut self, code: &str, html: &str) -> Self {
        self.pages.insert(code.to_string(), html.to_string());
        self
    }

    /// Make the form page for `code` omit `CountryCode`.
    pub fn with_unknown_code(mut self, code: &str) -> Self {
        self.unknown_codes.insert(code.to_string());
        self
    }

    /// Answer the next submissions with `replies`, in order.
    pub fn with_script(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.submit_script.lock().unwrap().extend(replies);
        self
    }

    /// Answer submissions with `reply` once the script is used up.
    pub fn with_default_reply(mut self, reply: Reply) -> Self {
        self.default_reply = reply;
        self
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn form_calls(&self) -> usize {
        self.form_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.session_calls() + self.form_calls() + self.submit_calls()
    }

    pub fn session_times(&self) -> Vec<Instant> {
        self.session_times.lock().unwrap().clone()
    }

    pub fn submitted_forms(&self) -> Vec<Vec<(String, String)>> {
        self.submitted_forms.lock().unwrap().clone()
    }

    fn code_from_cookie(cookie: Option<&str>) -> Option<String> {
        cookie?
            .split("; ")
            .find_map(|pair| pair.strip_prefix("ASPSESSIONIDRATES="))
            .map(ToString::to_string)
    }
}

fn respond(status: u16, body: impl Into<String>) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status,
        set_cookies: Vec::new(),
        body: body.into(),
    })
}

#[async_trait]
impl HttpTransport for FakeSite {
    async fn get(&self, url: &str, cookie: Option<&str>) -> Result<HttpResponse, TransportError> {
        if let Some((_, code)) = url.split_once("PostCode=") {
            self.session_calls.fetch_add(1, Ordering::SeqCst);
            self.session_times.lock().unwrap().push(Instant::now());
            return Ok(HttpResponse {
                status: 302,
                set_cookies: vec![
                    format!("ASPSESSIONIDRATES={code}; path=/"),
                    "lang=en; Secure; HttpOnly".to_string(),
                ],
                body: String::new(),
            });
        }

        assert_eq!(url, FORM_URL, "unexpected GET");
        self.form_calls.fetch_add(1, Ordering::SeqCst);

        let Some(code) = Self::code_from_cookie(cookie) else {
            return respond(200, "<html><body>Session expired</body></html>");
        };
        if self.unknown_codes.contains(&code) {
            return respond(200, "<html><body><form></form></body></html>");
        }
        respond(
            200,
            FORM_PAGE
                .replace("{country}", "1009")
                .replace("{post}", &code),
        )
    }

    async fn post_form(
        &self,
        url: &str,
        cookie: Option<&str>,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        assert_eq!(url, FORM_URL, "unexpected POST");
        assert!(cookie.is_some(), "submission without session cookie");
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted_forms.lock().unwrap().push(
            form.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );

        let reply = self
            .submit_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());

        match reply {
            Reply::Page => {
                let post = form
                    .iter()
                    .find(|(k, _)| *k == "PostCode")
                    .map(|(_, v)| *v)
                    .unwrap_or_default();
                let page = self.pages.get(post).map_or(EMPTY_PAGE, String::as_str);
                respond(200, page)
            }
            Reply::Body(body) => respond(200, body),
            Reply::Status(status) => respond(status, "Server Error"),
            Reply::Timeout => Err(TransportError::Timeout { seconds: 15 }),
        }
    }
}

/// A cache whose every operation fails.
pub struct BrokenCache;

#[async_trait]
impl RateCache for BrokenCache {
    async fn entry(&self, _code: &LocationCode) -> perdiem_cache::Result<Option<CacheEntry>> {
        Err(CacheError::Open("disk unavailable".to_string()))
    }

    async fn store(&self, _entry: CacheEntry) -> perdiem_cache::Result<()> {
        Err(CacheError::Open("disk unavailable".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "broken"
    }
}

pub fn code(value: &str) -> LocationCode {
    LocationCode::new(value).expect("valid location code")
}

pub fn endpoints() -> Endpoints {
    Endpoints::new(SESSION_URL, FORM_URL).expect("valid endpoints")
}

pub fn record(value: &str, lodging: u32, mie: u32) -> RateRecord {
    RateRecord {
        location_code: code(value),
        country: "AUSTRIA".to_string(),
        post: "Linz".to_string(),
        lodging_rate: lodging,
        mie_rate: mie,
        total_rate: lodging + mie,
        extracted_at: Timestamp::now(),
        strategy_used: ExtractionStrategy::StructuredTable,
    }
}

pub fn hours_ago(hours: i64) -> Timestamp {
    Timestamp::from_datetime(chrono::Utc::now() - chrono::Duration::hours(hours))
}

/// Orchestrator over `site` and `cache` with the default retry policy.
pub fn orchestrator(site: &Arc<FakeSite>, cache: &Arc<MemoryCache>) -> LookupOrchestrator {
    LookupOrchestrator::new(site.clone(), cache.clone(), endpoints())
}

/// Orchestrator that retries without waiting.
pub fn fast_orchestrator(site: &Arc<FakeSite>, cache: &Arc<MemoryCache>) -> LookupOrchestrator {
    orchestrator(site, cache)
        .with_retry_policy(RetryPolicy::new(3, Duration::ZERO))
        .with_request_gap(Duration::ZERO)
}
