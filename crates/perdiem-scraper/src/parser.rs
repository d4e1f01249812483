//! Rate extraction from the upstream results page.
//!
//! The page is not a versioned API, so [`RateParser`] runs an ordered
//! cascade of strategies, from structurally anchored to purely positional.
//! Every candidate is checked against [`RateBounds`]; the first candidate
//! that passes wins and lower strategies are never consulted.

use perdiem_core::{
    BoundsViolation, ExtractionStrategy, LocationCode, RateBounds, RateRecord, Timestamp, UNKNOWN,
};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::sync::OnceLock;

const HEADER_KEYWORDS: [&str; 4] = ["country", "post", "lodging", "per diem"];
const MIN_TABLE_CELLS: usize = 7;

const LODGING_TITLE: &str = "maximumlodgingrate";
const MIE_TITLE: &str = "m&ierate";
const TOTAL_TITLE: &str = "maximumperdiemrate";

/// A candidate rejected only because a rate fell outside the bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundsRejection {
    pub location_code: LocationCode,
    pub strategy: ExtractionStrategy,
    pub lodging: u32,
    pub mie: u32,
    pub total: u32,
    pub reason: BoundsViolation,
}

/// Outcome of running the cascade over one page.
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    /// The accepted record, if any strategy produced one
    pub record: Option<RateRecord>,
    /// Candidates rejected on bounds alone, in the order they were seen
    pub rejected: Vec<BoundsRejection>,
}

impl ParseReport {
    #[must_use]
    pub fn strategy(&self) -> Option<ExtractionStrategy> {
        self.record.as_ref().map(|r| r.strategy_used)
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    country: String,
    post: String,
    lodging: u32,
    mie: u32,
    total: u32,
}

impl Candidate {
    fn unresolved(lodging: u32, mie: u32, total: u32) -> Self {
        Self {
            country: UNKNOWN.to_string(),
            post: UNKNOWN.to_string(),
            lodging,
            mie,
            total,
        }
    }
}

/// Ordered extraction cascade.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateParser {
    bounds: RateBounds,
}

impl RateParser {
    #[must_use]
    pub fn new(bounds: RateBounds) -> Self {
        Self { bounds }
    }

    #[must_use]
    pub fn bounds(&self) -> &RateBounds {
        &self.bounds
    }

    /// Run the cascade over `html`.
    ///
    /// Never fails: an empty report means no strategy found bounds-valid
    /// rates.
    pub fn parse(&self, html: &str, code: &LocationCode) -> ParseReport {
        let document = Html::parse_document(html);
        let mut report = ParseReport::default();

        for strategy in ExtractionStrategy::CASCADE {
            let candidates = match strategy {
                ExtractionStrategy::StructuredTable => structured_table(&document),
                ExtractionStrategy::TitleAttribute => title_attribute(&document),
                ExtractionStrategy::GenericPattern => generic_pattern(html),
                ExtractionStrategy::BareNumbers => bare_numbers(&document),
            };

            for candidate in candidates {
                match self
                    .bounds
                    .check(candidate.lodging, candidate.mie, candidate.total)
                {
                    Ok(()) => {
                        tracing::debug!(
                            location_code = %code,
                            strategy = %strategy,
                            confidence = strategy.confidence(),
                            "Extracted rates"
                        );
                        report.record = Some(RateRecord {
                            location_code: code.clone(),
                            country: candidate.country,
                            post: candidate.post,
                            lodging_rate: candidate.lodging,
                            mie_rate: candidate.mie,
                            total_rate: candidate.total,
                            extracted_at: Timestamp::now(),
                            strategy_used: strategy,
                        });
                        return report;
                    }
                    Err(reason) => {
                        tracing::warn!(
                            location_code = %code,
                            strategy = %strategy,
                            lodging = candidate.lodging,
                            mie = candidate.mie,
                            total = candidate.total,
                            %reason,
                            "Rate candidate rejected on bounds, flagged for review"
                        );
                        report.rejected.push(BoundsRejection {
                            location_code: code.clone(),
                            strategy,
                            lodging: candidate.lodging,
                            mie: candidate.mie,
                            total: candidate.total,
                            reason,
                        });
                    }
                }
            }

            tracing::debug!(location_code = %code, strategy = %strategy, "Strategy found no rates");
        }

        report
    }
}

/// Parse a rate amount, tolerating `$`, thousands separators and padding.
fn parse_amount(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .filter(|c| !(c.is_whitespace() || *c == '$' || *c == ','))
        .collect();
    if digits.is_empty() || digits.len() > 9 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn name_or_unknown(text: &str) -> String {
    let text = collapse_whitespace(text);
    if text.is_empty() {
        UNKNOWN.to_string()
    } else {
        text
    }
}

// Direct cells only, so nested tables do not shift column positions.
fn row_cells<'a>(row: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .collect()
}

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("valid selector"))
}

fn structured_table(document: &Html) -> Vec<Candidate> {
    static TABLE: OnceLock<Selector> = OnceLock::new();
    static ROW: OnceLock<Selector> = OnceLock::new();
    let table_selector = selector(&TABLE, "table");
    let row_selector = selector(&ROW, "tr");

    let mut candidates = Vec::new();
    for table in document.select(table_selector) {
        let rows: Vec<ElementRef<'_>> = table.select(row_selector).collect();
        let Some(header) = rows.iter().position(is_header_row) else {
            continue;
        };

        for row in &rows[header + 1..] {
            let cells: Vec<String> = row_cells(row).iter().map(element_text).collect();
            if cells.len() < MIN_TABLE_CELLS {
                continue;
            }
            let (Some(lodging), Some(mie), Some(total)) = (
                parse_amount(&cells[4]),
                parse_amount(&cells[5]),
                parse_amount(&cells[6]),
            ) else {
                continue;
            };

            // Only the first qualifying row speaks for the requested code.
            candidates.push(Candidate {
                country: name_or_unknown(&cells[0].to_uppercase()),
                post: name_or_unknown(&cells[1]),
                lodging,
                mie,
                total,
            });
            break;
        }
    }
    candidates
}

fn is_header_row(row: &ElementRef<'_>) -> bool {
    let text = row_cells(row)
        .iter()
        .map(element_text)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    HEADER_KEYWORDS.iter().all(|keyword| text.contains(keyword))
}

fn title_attribute(document: &Html) -> Vec<Candidate> {
    static TITLED: OnceLock<Selector> = OnceLock::new();
    let titled = selector(&TITLED, "[title]");

    let mut lodging = None;
    let mut mie = None;
    let mut total = None;

    for element in document.select(titled) {
        let Some(title) = element.value().attr("title") else {
            continue;
        };
        let key: String = title
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let slot = match key.as_str() {
            LODGING_TITLE => &mut lodging,
            MIE_TITLE => &mut mie,
            TOTAL_TITLE => &mut total,
            _ => continue,
        };
        if slot.is_none() {
            *slot = parse_amount(&element_text(&element));
        }
    }

    match (lodging, mie) {
        (Some(lodging), Some(mie)) => {
            let total = total.unwrap_or_else(|| lodging.saturating_add(mie));
            vec![Candidate::unresolved(lodging, mie, total)]
        }
        _ => Vec::new(),
    }
}

fn generic_pattern(html: &str) -> Vec<Candidate> {
    static ROW_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = ROW_PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"(?s)<(?i:td)\b[^>]*>\s*([A-Z][A-Z .,'()-]{2,})\s*</(?i:td)>",
            r"\s*<(?i:td)\b[^>]*>\s*([^<]*?)\s*</(?i:td)>",
            r".*?<(?i:td)\b[^>]*>\s*\$?\s*([0-9]{1,4})\s*</(?i:td)>",
            r"\s*<(?i:td)\b[^>]*>\s*\$?\s*([0-9]{1,4})\s*</(?i:td)>",
            r"\s*<(?i:td)\b[^>]*>\s*\$?\s*([0-9]{1,4})\s*</(?i:td)>",
        ))
        .expect("valid regex")
    });

    pattern
        .captures_iter(html)
        .filter_map(|caps| {
            Some(Candidate {
                country: name_or_unknown(&caps[1]),
                post: name_or_unknown(&caps[2]),
                lodging: parse_amount(&caps[3])?,
                mie: parse_amount(&caps[4])?,
                total: parse_amount(&caps[5])?,
            })
        })
        .collect()
}

fn bare_numbers(document: &Html) -> Vec<Candidate> {
    let mut tokens = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style"))
        });
        if !hidden {
            tokens.extend(text.split_whitespace().map(small_integer));
        }
    }

    tokens
        .windows(3)
        .filter_map(|window| match window {
            [Some(lodging), Some(mie), Some(total)] => {
                Some(Candidate::unresolved(*lodging, *mie, *total))
            }
            _ => None,
        })
        .collect()
}

/// A 1-4 digit integer token, optionally with `$` and a thousands separator.
fn small_integer(token: &str) -> Option<u32> {
    let trimmed = token.trim_start_matches('$');
    let digits: String = trimmed.chars().filter(|c| *c != ',').collect();
    let well_formed = !digits.is_empty()
        && digits.len() <= 4
        && trimmed.bytes().all(|b| b.is_ascii_digit() || b == b',')
        && !trimmed.starts_with(',')
        && !trimmed.ends_with(',');
    if well_formed {
        digits.parse().ok()
    } else {
        None
    }
}
