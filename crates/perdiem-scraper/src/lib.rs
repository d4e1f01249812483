//! Perdiem Scraper - per-diem rate extraction from the upstream site.
//!
//! This crate drives the session-based scraping pipeline: it obtains a
//! session cookie, reads the hidden form fields, submits the rate form and
//! runs the results page through an ordered parser cascade. The
//! [`LookupOrchestrator`] wraps the pipeline with caching, retries and a
//! stale-record fallback.
//!
//! # Features
//!
//! - One parameterized pipeline over an injectable [`HttpTransport`]
//! - Parser cascade with bounds validation and per-strategy confidence
//! - Linear retry backoff; invalid location codes are never retried
//! - Stale cached records offered when the upstream is unavailable
//! - Sequential batch lookups with a minimum gap between upstream requests
//!
//! # Example
//!
//! ```rust,ignore
//! use perdiem_scraper::{LookupOptions, LookupOrchestrator, ReqwestTransport};
//! use std::sync::Arc;
//!
//! let transport = Arc::new(ReqwestTransport::new(&config.upstream)?);
//! let orchestrator = LookupOrchestrator::from_config(&config, transport, cache)?;
//!
//! let lookup = orchestrator
//!     .lookup_rate(&LocationCode::new("11410")?, LookupOptions::default())
//!     .await?;
//! println!("{} {}: {}", lookup.record.country, lookup.record.post, lookup.record.total_rate);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod endpoints;
#[allow(missing_docs)]
pub mod error;
pub mod orchestrator;
#[allow(missing_docs)]
pub mod parser;
#[allow(missing_docs)]
pub mod session;
#[allow(missing_docs)]
pub mod throttle;
pub mod transport;

// Re-export commonly used types
pub use endpoints::Endpoints;
pub use error::{FailureKind, Result, ScrapeError, Stage, TransportError};
pub use orchestrator::{
    BatchFailure, BatchOutcome, LookupOptions, LookupOrchestrator, LookupSource, RateLookup,
    RetryPolicy, REVIEW_QUEUE_CAPACITY,
};
pub use parser::{BoundsRejection, ParseReport, RateParser};
pub use session::{
    establish_session, extract_form_fields, join_set_cookies, parse_form_fields,
    submit_rate_form, FormFields, SessionContext,
};
pub use throttle::RequestGap;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
