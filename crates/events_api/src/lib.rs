//! HTTP client for the paginated session-events backfill endpoint.
//!
//! This crate owns request building, response decoding, and cooperative
//! cancellation for `GET …/sessions/events` only. It performs no retries:
//! backfill retry policy belongs to the coordinator that drives it, and a
//! superseded fetch must die quietly, not re-arm itself.

pub mod client;
pub mod config;
pub mod error;
pub mod url;

pub use client::{BackfillSource, CancellationSignal, EventsApiClient};
pub use config::EventsApiConfig;
pub use error::EventsApiError;
pub use url::normalize_events_url;
