//! Batch lookups: ordering, malformed input and the upstream request gap.

mod common;

use common::{code, hours_ago, orchestrator, record, FakeSite, Reply};
use perdiem_cache::{CacheEntry, MemoryCache, RateCache};
use perdiem_scraper::{FailureKind, LookupSource, RetryPolicy, ScrapeError};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_batch_collects_results_and_errors() {
    let site = Arc::new(FakeSite::new());
    let cache = Arc::new(MemoryCache::new());
    let orchestrator = orchestrator(&site, &cache).with_request_gap(Duration::ZERO);

    let outcome = orchestrator
        .lookup_batch(&["11410", "1141", " 10450 ", "ABCDE"])
        .await;

    let posts: Vec<_> = outcome.results.iter().map(|r| r.post.as_str()).collect();
    assert_eq!(posts, ["Linz", "Berlin"]);
    assert_eq!(outcome.results[1].country, "GERMANY");
    assert_eq!(outcome.results[1].total_rate, 372);

    assert_eq!(outcome.errors.len(), 2);
    assert_eq!(outcome.errors[0].location_code, "1141");
    assert_eq!(outcome.errors[1].location_code, "ABCDE");
    assert!(outcome
        .errors
        .iter()
        .all(|f| f.kind() == FailureKind::InvalidInput));
    assert!(!outcome.is_complete());

    // Malformed codes never reach the site.
    assert_eq!(site.session_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_batch_spaces_upstream_requests() {
    let site = Arc::new(FakeSite::new().with_page("10100", common::AUSTRIA_PAGE));
    let cache = Arc::new(MemoryCache::new());
    let orchestrator = orchestrator(&site, &cache);

    let outcome = orchestrator
        .lookup_batch(&["11410", "10450", "10100"])
        .await;
    assert!(outcome.is_complete());
    assert_eq!(outcome.results.len(), 3);

    let times = site.session_times();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_cache_hits_skip_gap_and_network() {
    let site = Arc::new(FakeSite::new());
    let cache = Arc::new(MemoryCache::new());
    cache.put(record("10450", 239, 133)).await.expect("seed cache");
    let orchestrator = orchestrator(&site, &cache);

    let start = tokio::time::Instant::now();
    let outcome = orchestrator.lookup_batch(&["10450", "11410"]).await;

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(
        outcome.sources,
        [LookupSource::Cache, LookupSource::Upstream]
    );
    assert_eq!(site.session_calls(), 1);
    // Only one upstream-bound lookup, so nothing to wait for.
    assert!(start.elapsed() < Duration::from_millis(1000));
}

#[tokio::test]
async fn test_batch_reports_stale_fallbacks() {
    let site = Arc::new(FakeSite::new().with_default_reply(Reply::Status(502)));
    let cache = Arc::new(MemoryCache::new());
    cache
        .store(CacheEntry::stored_at(record("11410", 193, 152), hours_ago(40)))
        .await
        .expect("seed cache");
    let orchestrator = orchestrator(&site, &cache)
        .with_retry_policy(RetryPolicy::new(2, Duration::ZERO))
        .with_request_gap(Duration::ZERO);

    let outcome = orchestrator.lookup_batch(&["11410", "10450"]).await;

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.stale, vec![code("11410")]);
    assert_eq!(outcome.sources, [LookupSource::StaleFallback]);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].location_code, "10450");
    assert!(matches!(
        outcome.errors[0].error,
        ScrapeError::Network { .. }
    ));
    assert_eq!(site.submit_calls(), 4);
}

#[tokio::test]
async fn test_empty_batch() {
    let site = Arc::new(FakeSite::new());
    let cache = Arc::new(MemoryCache::new());
    let outcome = orchestrator(&site, &cache)
        .lookup_batch::<String>(&[])
        .await;

    assert!(outcome.results.is_empty());
    assert!(outcome.is_complete());
    assert_eq!(site.total_calls(), 0);
}
