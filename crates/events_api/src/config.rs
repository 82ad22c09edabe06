use std::collections::BTreeMap;
use std::time::Duration;

use crate::url::DEFAULT_EVENTS_BASE_URL;

/// Default page size requested from the backfill endpoint.
pub const DEFAULT_PAGE_LIMIT: u32 = 200;

/// Transport configuration for backfill requests.
#[derive(Debug, Clone)]
pub struct EventsApiConfig {
    /// Base URL for the events endpoint.
    pub base_url: String,
    /// Maximum events requested per page.
    pub page_limit: u32,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional per-request timeout.
    pub timeout: Option<Duration>,
}

impl Default for EventsApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EVENTS_BASE_URL.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl EventsApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{EventsApiConfig, DEFAULT_PAGE_LIMIT};

    #[test]
    fn default_config_uses_default_limit() {
        let config = EventsApiConfig::default();
        assert_eq!(config.page_limit, DEFAULT_PAGE_LIMIT);
        assert!(config.extra_headers.is_empty());
    }

    #[test]
    fn page_limit_is_clamped_to_at_least_one() {
        let config = EventsApiConfig::new("http://localhost:4020").with_page_limit(0);
        assert_eq!(config.page_limit, 1);
    }
}
