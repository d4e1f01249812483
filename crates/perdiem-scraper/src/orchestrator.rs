//! Lookup orchestrator.
//!
//! Coordinates the cache and the upstream pipeline (session, form fields,
//! submission, parsing) for single and batch lookups. The retry policy and
//! the stale-record fallback live here and nowhere below.

use crate::endpoints::Endpoints;
use crate::error::{FailureKind, Result, ScrapeError};
use crate::parser::{BoundsRejection, ParseReport, RateParser};
use crate::session::{establish_session, extract_form_fields, submit_rate_form};
use crate::throttle::RequestGap;
use crate::transport::HttpTransport;
use perdiem_cache::RateCache;
use perdiem_core::{AppConfig, LocationCode, RateBounds, RateRecord, RetryConfig};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Default number of pipeline attempts per lookup.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for retry backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(2000);

/// Default freshness window for cached records.
pub const DEFAULT_STALENESS_HOURS: i64 = 24;

/// Default spacing between upstream-bound lookups in a batch.
pub const DEFAULT_REQUEST_GAP: Duration = Duration::from_millis(1000);

/// Bounds rejections kept for review; the oldest are dropped beyond this.
pub const REVIEW_QUEUE_CAPACITY: usize = 256;

/// Linear backoff between pipeline attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first; at least 1
    pub max_attempts: u32,
    /// Delay unit; retry `n` waits `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        )
    }

    /// Delay before retry `retry` (1-based: the second attempt is retry 1).
    #[must_use]
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }
}

/// Per-call lookup options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Skip the fresh-cache check and always go upstream
    pub force_refresh: bool,
}

impl LookupOptions {
    #[must_use]
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// Where a returned record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSource {
    /// Fresh cache entry; no network calls were made
    Cache,
    /// Extracted from the upstream site on this call
    Upstream,
    /// Cached entry of any age, returned after the upstream pipeline failed
    StaleFallback,
}

/// Result of [`LookupOrchestrator::lookup_rate`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLookup {
    /// The rates
    pub record: RateRecord,
    /// Where the rates came from
    pub source: LookupSource,
    /// True when the upstream failed and a cached record was used instead
    pub fallback: bool,
    /// Kind of the last upstream error behind a fallback
    pub fallback_cause: Option<FailureKind>,
    /// Pipeline attempts made (0 for a cache hit)
    pub attempts: u32,
}

/// One failed entry of a batch.
#[derive(Debug)]
pub struct BatchFailure {
    /// The code as given, trimmed
    pub location_code: String,
    /// Why the lookup failed
    pub error: ScrapeError,
}

impl BatchFailure {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

/// Result of [`LookupOrchestrator::lookup_batch`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Records in input order, skipping failures
    pub results: Vec<RateRecord>,
    /// Source of each record, index-aligned with `results`
    pub sources: Vec<LookupSource>,
    /// Codes that produced no record
    pub errors: Vec<BatchFailure>,
    /// Codes whose record in `results` is a stale fallback
    pub stale: Vec<LocationCode>,
}

impl BatchOutcome {
    /// Whether every code produced a record.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records paired with where each came from.
    pub fn sourced(&self) -> impl Iterator<Item = (&RateRecord, LookupSource)> {
        self.results.iter().zip(self.sources.iter().copied())
    }

    fn push(&mut self, record: RateRecord, source: LookupSource) {
        self.results.push(record);
        self.sources.push(source);
    }
}

/// Coordinates cache and upstream pipeline for rate lookups.
///
/// `Send + Sync`; share it between tasks with an [`Arc`].
pub struct LookupOrchestrator {
    transport: Arc<dyn HttpTransport>,
    cache: Arc<dyn RateCache>,
    endpoints: Endpoints,
    parser: RateParser,
    retry: RetryPolicy,
    staleness: chrono::Duration,
    request_gap: Duration,
    review_queue: Mutex<VecDeque<BoundsRejection>>,
}

impl LookupOrchestrator {
    /// Create an orchestrator with default policy.
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        cache: Arc<dyn RateCache>,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            transport,
            cache,
            endpoints,
            parser: RateParser::default(),
            retry: RetryPolicy::default(),
            staleness: chrono::Duration::hours(DEFAULT_STALENESS_HOURS),
            request_gap: DEFAULT_REQUEST_GAP,
            review_queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Create an orchestrator with every policy taken from `config`.
    pub fn from_config(
        config: &AppConfig,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<dyn RateCache>,
    ) -> Result<Self> {
        let endpoints = Endpoints::from_config(&config.upstream)?;
        Ok(Self::new(transport, cache, endpoints)
            .with_retry_policy(RetryPolicy::from_config(&config.retry))
            .with_bounds(config.bounds)
            .with_staleness(config.cache.staleness_window())
            .with_request_gap(config.batch.request_gap()))
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: RateBounds) -> Self {
        self.parser = RateParser::new(bounds);
        self
    }

    #[must_use]
    pub fn with_staleness(mut self, staleness: chrono::Duration) -> Self {
        self.staleness = staleness;
        self
    }

    #[must_use]
    pub fn with_request_gap(mut self, request_gap: Duration) -> Self {
        self.request_gap = request_gap;
        self
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Name of the cache backend in use.
    #[must_use]
    pub fn cache_backend(&self) -> &'static str {
        self.cache.backend_name()
    }

    /// Look up the rates for one location.
    ///
    /// A fresh cache hit returns without any network call unless
    /// `force_refresh` is set. Otherwise the upstream pipeline runs under the
    /// retry policy; when every attempt fails, a cached record of any age is
    /// returned flagged as a fallback.
    pub async fn lookup_rate(
        &self,
        code: &LocationCode,
        options: LookupOptions,
    ) -> Result<RateLookup> {
        if !options.force_refresh {
            if let Some(record) = self.fresh_cached(code).await {
                tracing::info!(location_code = %code, "Cache hit");
                return Ok(RateLookup {
                    record,
                    source: LookupSource::Cache,
                    fallback: false,
                    fallback_cause: None,
                    attempts: 0,
                });
            }
        }

        self.refresh(code).await
    }

    /// Look up several codes one after another.
    ///
    /// Upstream-bound lookups are spaced by the request gap; cache hits are
    /// not. Malformed codes are reported without any request.
    pub async fn lookup_batch<S: AsRef<str>>(&self, codes: &[S]) -> BatchOutcome {
        let mut gap = RequestGap::new(self.request_gap);
        let mut outcome = BatchOutcome::default();

        for raw in codes {
            let raw = raw.as_ref().trim();
            let code = match LocationCode::new(raw) {
                Ok(code) => code,
                Err(e) => {
                    tracing::warn!(location_code = raw, "Skipping malformed location code");
                    outcome.errors.push(BatchFailure {
                        location_code: raw.to_string(),
                        error: ScrapeError::InvalidInput(e.to_string()),
                    });
                    continue;
                }
            };

            if let Some(record) = self.fresh_cached(&code).await {
                tracing::info!(location_code = %code, "Cache hit");
                outcome.push(record, LookupSource::Cache);
                continue;
            }

            let waited = gap.wait().await;
            if !waited.is_zero() {
                tracing::debug!(
                    location_code = %code,
                    delay_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                    "Waited for request gap"
                );
            }
            let result = self.refresh(&code).await;
            gap.mark();

            match result {
                Ok(lookup) => {
                    if lookup.fallback {
                        outcome.stale.push(code);
                    }
                    outcome.push(lookup.record, lookup.source);
                }
                Err(error) => outcome.errors.push(BatchFailure {
                    location_code: code.to_string(),
                    error,
                }),
            }
        }

        tracing::info!(
            succeeded = outcome.results.len(),
            failed = outcome.errors.len(),
            stale = outcome.stale.len(),
            "Batch lookup finished"
        );
        outcome
    }

    /// Bounds-only rejections seen so far, oldest first.
    ///
    /// At most [`REVIEW_QUEUE_CAPACITY`] entries are kept. Long-lived callers
    /// should drain the queue with [`Self::take_flagged_for_review`].
    #[must_use]
    pub fn flagged_for_review(&self) -> Vec<BoundsRejection> {
        self.review_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Drain the review queue.
    pub fn take_flagged_for_review(&self) -> Vec<BoundsRejection> {
        let mut queue = self
            .review_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *queue).into()
    }

    fn flag_for_review(&self, rejected: Vec<BoundsRejection>) {
        let mut queue = self
            .review_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.extend(rejected);

        let overflow = queue.len().saturating_sub(REVIEW_QUEUE_CAPACITY);
        if overflow > 0 {
            queue.drain(..overflow);
            tracing::warn!(dropped = overflow, "Review queue full, dropped oldest entries");
        }
    }

    /// Run one pass of the upstream pipeline without retries or caching.
    pub async fn run_pipeline(&self, code: &LocationCode) -> Result<RateRecord> {
        let transport = self.transport.as_ref();

        let cookie = establish_session(transport, &self.endpoints, code).await?;
        let session = extract_form_fields(transport, &self.endpoints, cookie, code).await?;
        let html = submit_rate_form(transport, &self.endpoints, &session).await?;

        let ParseReport { record, rejected } = self.parser.parse(&html, code);
        let rejected_count = rejected.len();
        if rejected_count > 0 {
            self.flag_for_review(rejected);
        }

        record.ok_or_else(|| ScrapeError::NoDataFound {
            location_code: code.to_string(),
            rejected: rejected_count,
        })
    }

    async fn refresh(&self, code: &LocationCode) -> Result<RateLookup> {
        match self.fetch_with_retry(code).await {
            Ok((record, attempts)) => {
                if let Err(e) = self.cache.put(record.clone()).await {
                    tracing::warn!(location_code = %code, error = %e, "Failed to cache rates");
                }
                tracing::info!(
                    location_code = %code,
                    attempts,
                    strategy = %record.strategy_used,
                    "Fetched rates from upstream"
                );
                Ok(RateLookup {
                    record,
                    source: LookupSource::Upstream,
                    fallback: false,
                    fallback_cause: None,
                    attempts,
                })
            }
            Err(err) if !err.is_retryable() => {
                tracing::error!(location_code = %code, error = %err, "Rate lookup failed");
                Err(err)
            }
            Err(err) => self.stale_fallback(code, err).await,
        }
    }

    async fn stale_fallback(&self, code: &LocationCode, err: ScrapeError) -> Result<RateLookup> {
        match self.cache.entry(code).await {
            Ok(Some(entry)) => {
                tracing::warn!(
                    location_code = %code,
                    error = %err,
                    stored_at = %entry.stored_at.to_rfc3339(),
                    "Upstream failed, returning cached rates"
                );
                Ok(RateLookup {
                    record: entry.record,
                    source: LookupSource::StaleFallback,
                    fallback: true,
                    fallback_cause: Some(err.kind()),
                    attempts: self.retry.max_attempts,
                })
            }
            Ok(None) => {
                tracing::error!(location_code = %code, error = %err, "Rate lookup failed");
                Err(err)
            }
            Err(cache_err) => {
                tracing::warn!(location_code = %code, error = %cache_err, "Cache read failed");
                tracing::error!(location_code = %code, error = %err, "Rate lookup failed");
                Err(err)
            }
        }
    }

    /// Run the pipeline under the retry policy.
    ///
    /// Returns the record and the attempt that produced it. Errors that are
    /// not retryable surface immediately.
    async fn fetch_with_retry(&self, code: &LocationCode) -> Result<(RateRecord, u32)> {
        let max_attempts = self.retry.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.run_pipeline(code).await {
                Ok(record) => return Ok((record, attempt)),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if matches!(err, ScrapeError::NoDataFound { .. }) {
                        tracing::warn!(
                            location_code = %code,
                            attempt,
                            error = %err,
                            "No rates found in upstream page, possible parser drift"
                        );
                    }

                    if attempt < max_attempts {
                        let delay = self.retry.delay_before_retry(attempt);
                        tracing::warn!(
                            location_code = %code,
                            attempt,
                            max_attempts,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %err,
                            "Lookup attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }

                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ScrapeError::InvalidInput("retry policy allowed no attempts".to_string())
        }))
    }

    async fn fresh_cached(&self, code: &LocationCode) -> Option<RateRecord> {
        match self.cache.get(code, self.staleness).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(location_code = %code, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_before_retry(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_before_retry(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_policy_needs_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 5,
            base_delay_ms: 250,
        });
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_before_retry(3), Duration::from_millis(750));
    }

    #[test]
    fn test_orchestrator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LookupOrchestrator>();
    }

    #[test]
    fn test_review_queue_keeps_newest_entries() {
        use crate::transport::ReqwestTransport;
        use perdiem_cache::MemoryCache;
        use perdiem_core::{BoundsViolation, ExtractionStrategy};

        let config = AppConfig::default();
        let transport = ReqwestTransport::new(&config.upstream).expect("build transport");
        let orchestrator = LookupOrchestrator::from_config(
            &config,
            Arc::new(transport),
            Arc::new(MemoryCache::new()),
        )
        .expect("build orchestrator");

        let rejection = |lodging| BoundsRejection {
            location_code: LocationCode::new("11410").expect("valid code"),
            strategy: ExtractionStrategy::BareNumbers,
            lodging,
            mie: 10,
            total: 20,
            reason: BoundsViolation::Lodging {
                value: lodging,
                max: 2000,
            },
        };
        let total = u32::try_from(REVIEW_QUEUE_CAPACITY).expect("fits") + 10;
        orchestrator.flag_for_review((0..total).map(|n| rejection(3000 + n)).collect());

        let flagged = orchestrator.flagged_for_review();
        assert_eq!(flagged.len(), REVIEW_QUEUE_CAPACITY);
        assert_eq!(flagged[0].lodging, 3010);
        assert_eq!(flagged.last().map(|r| r.lodging), Some(3000 + total - 1));

        assert_eq!(orchestrator.take_flagged_for_review().len(), REVIEW_QUEUE_CAPACITY);
        assert!(orchestrator.flagged_for_review().is_empty());
    }
}
