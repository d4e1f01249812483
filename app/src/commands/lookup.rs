use anyhow::Context;
use perdiem_core::LocationCode;
use perdiem_scraper::{LookupOptions, LookupOrchestrator, RateLookup};

/// Look up the rates for a single location code.
pub async fn lookup(
    orchestrator: &LookupOrchestrator,
    code: &str,
    force_refresh: bool,
) -> anyhow::Result<RateLookup> {
    let code = LocationCode::new(code).context("invalid location code")?;
    let options = LookupOptions { force_refresh };

    let result = orchestrator.lookup_rate(&code, options).await;

    let flagged = orchestrator.take_flagged_for_review();
    if !flagged.is_empty() {
        tracing::warn!(
            location_code = %code,
            count = flagged.len(),
            "Rate candidates rejected on bounds need manual review"
        );
    }
    result.with_context(|| format!("rate lookup for {code} failed"))
}
