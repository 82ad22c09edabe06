use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use tracing::debug;

use session_wire::EventsPage;

use crate::config::EventsApiConfig;
use crate::error::{parse_error_message, EventsApiError};
use crate::url::normalize_events_url;

/// Optional cancellation signal shared across a request's await points.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Source of backfill pages, kept as a seam so the engine can be driven by a
/// scripted source in tests.
#[async_trait]
pub trait BackfillSource: Send + Sync {
    async fn fetch_page(
        &self,
        session_id: &str,
        revision: u64,
        after_seq: u64,
        limit: u32,
        cancellation: &CancellationSignal,
    ) -> Result<EventsPage, EventsApiError>;
}

#[derive(Debug)]
pub struct EventsApiClient {
    http: Client,
    config: EventsApiConfig,
}

impl EventsApiClient {
    pub fn new(config: EventsApiConfig) -> Result<Self, EventsApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(EventsApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &EventsApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> String {
        normalize_events_url(&self.config.base_url)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, EventsApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(user_agent) = self.config.user_agent.as_deref() {
            headers.insert(
                USER_AGENT,
                HeaderValue::from_str(user_agent.trim()).map_err(|_| {
                    EventsApiError::InvalidBaseUrl(format!("invalid user agent: {user_agent}"))
                })?,
            );
        }
        for (key, value) in &self.config.extra_headers {
            headers.insert(
                HeaderName::from_bytes(key.trim().as_bytes()).map_err(|_| {
                    EventsApiError::InvalidBaseUrl(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(value.trim()).map_err(|_| {
                    EventsApiError::InvalidBaseUrl(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(headers)
    }

    pub fn build_request(
        &self,
        session_id: &str,
        revision: u64,
        after_seq: u64,
        limit: u32,
    ) -> Result<reqwest::RequestBuilder, EventsApiError> {
        let headers = self.build_headers()?;
        Ok(self
            .http
            .get(self.normalized_endpoint())
            .headers(headers)
            .query(&[
                ("sessionId", session_id),
                ("revision", &revision.to_string()),
                ("afterSeq", &after_seq.to_string()),
                ("limit", &limit.to_string()),
            ]))
    }
}

#[async_trait]
impl BackfillSource for EventsApiClient {
    async fn fetch_page(
        &self,
        session_id: &str,
        revision: u64,
        after_seq: u64,
        limit: u32,
        cancellation: &CancellationSignal,
    ) -> Result<EventsPage, EventsApiError> {
        if is_cancelled(cancellation) {
            return Err(EventsApiError::Cancelled);
        }

        let request = self.build_request(session_id, revision, after_seq, limit)?;
        let response = await_or_cancel(request.send(), cancellation)
            .await?
            .map_err(EventsApiError::from)?;

        let status = response.status();
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .map_err(EventsApiError::from)?;

        if !status.is_success() {
            return Err(EventsApiError::Status(
                status,
                parse_error_message(status, &body),
            ));
        }

        let page = serde_json::from_str::<EventsPage>(&body)?;
        debug!(
            session_id,
            revision = page.revision,
            after_seq,
            events = page.events.len(),
            has_more = page.has_more,
            "fetched events page"
        );
        Ok(page)
    }
}

fn is_cancelled(cancel: &CancellationSignal) -> bool {
    cancel.load(Ordering::Acquire)
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: &CancellationSignal,
) -> Result<F::Output, EventsApiError>
where
    F: Future,
{
    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(EventsApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(EventsApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::{await_or_cancel, EventsApiClient, EventsApiError};
    use crate::config::EventsApiConfig;

    #[test]
    fn request_targets_normalized_endpoint_with_query() {
        let config = EventsApiConfig::new("http://localhost:4020/api");
        let client = EventsApiClient::new(config).expect("client");
        let request = client
            .build_request("s-1", 2, 7, 50)
            .expect("build request")
            .build()
            .expect("request");

        assert_eq!(request.method(), "GET");
        let url = request.url();
        assert_eq!(url.path(), "/api/sessions/events");
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        assert!(query.contains(&("sessionId".to_string(), "s-1".to_string())));
        assert!(query.contains(&("revision".to_string(), "2".to_string())));
        assert!(query.contains(&("afterSeq".to_string(), "7".to_string())));
        assert!(query.contains(&("limit".to_string(), "50".to_string())));
    }

    #[tokio::test]
    async fn pre_signalled_cancellation_short_circuits() {
        let cancellation = Arc::new(AtomicBool::new(false));
        cancellation.store(true, Ordering::Release);

        let result = await_or_cancel(std::future::pending::<()>(), &cancellation).await;
        assert!(matches!(result, Err(EventsApiError::Cancelled)));
    }

    #[tokio::test]
    async fn completed_future_resolves_when_not_cancelled() {
        let cancellation = Arc::new(AtomicBool::new(false));
        let result = await_or_cancel(async { 41 + 1 }, &cancellation).await;
        assert!(matches!(result, Ok(42)));
    }
}
