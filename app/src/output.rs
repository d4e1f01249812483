//! Table and JSON rendering of command results.

use crate::error::CommandError;
use perdiem_core::{LocationCode, RateRecord};
use perdiem_scraper::{BatchOutcome, LookupSource, RateLookup};
use serde::Serialize;
use std::fmt::Write;

const HEADER: [&str; 9] = [
    "CODE", "COUNTRY", "POST", "LODGING", "M&IE", "TOTAL", "STRATEGY", "CONF", "SOURCE",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchJson<'a> {
    results: &'a [RateRecord],
    sources: &'a [LookupSource],
    stale: &'a [LocationCode],
    errors: Vec<CommandError>,
}

/// Render a single lookup.
pub fn render_lookup(lookup: &RateLookup, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(lookup)?);
    }

    let mut out = render_table(&[(&lookup.record, lookup.source)]);
    if let Some(cause) = lookup.fallback_cause {
        let cause = serde_json::to_value(cause)?;
        let _ = writeln!(
            out,
            "\nwarning: upstream unavailable ({}), showing cached rates from {}",
            cause.as_str().unwrap_or("unknown"),
            lookup.record.extracted_at.as_datetime().format("%Y-%m-%d %H:%M UTC")
        );
    }
    Ok(out)
}

/// Render a batch outcome; failures are listed after the table.
pub fn render_batch(outcome: &BatchOutcome, json: bool) -> anyhow::Result<String> {
    if json {
        let payload = BatchJson {
            results: &outcome.results,
            sources: &outcome.sources,
            stale: &outcome.stale,
            errors: outcome.errors.iter().map(CommandError::from).collect(),
        };
        return Ok(serde_json::to_string_pretty(&payload)?);
    }

    let rows: Vec<_> = outcome.sourced().collect();
    let mut out = render_table(&rows);
    if !outcome.errors.is_empty() {
        out.push_str("\nFailed:\n");
        for failure in &outcome.errors {
            let _ = writeln!(out, "  {}: {}", failure.location_code, failure.error);
        }
    }
    Ok(out)
}

fn source_label(source: LookupSource) -> &'static str {
    match source {
        LookupSource::Cache => "cache",
        LookupSource::Upstream => "upstream",
        LookupSource::StaleFallback => "stale",
    }
}

fn render_table(rows: &[(&RateRecord, LookupSource)]) -> String {
    let cells: Vec<[String; 9]> = rows
        .iter()
        .map(|(record, source)| {
            [
                record.location_code.to_string(),
                record.country.clone(),
                record.post.clone(),
                record.lodging_rate.to_string(),
                record.mie_rate.to_string(),
                record.total_rate.to_string(),
                record.strategy_used.to_string(),
                format!("{:.2}", record.strategy_used.confidence()),
                source_label(*source).to_string(),
            ]
        })
        .collect();

    let mut widths = HEADER.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADER.map(ToString::to_string), &widths);
    for row in &cells {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, row: &[String; 9], widths: &[usize; 9]) {
    let line = row
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}
