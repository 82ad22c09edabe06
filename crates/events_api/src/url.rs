/// Default base URL for the local agent backend.
pub const DEFAULT_EVENTS_BASE_URL: &str = "http://127.0.0.1:4020/api";

/// Normalize a base URL to the session events endpoint.
///
/// Normalization rules:
/// 1) keep `/sessions/events` unchanged
/// 2) append `/events` when path ends in `/sessions`
/// 3) append `/sessions/events` otherwise
pub fn normalize_events_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_EVENTS_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/sessions/events") {
        return trimmed.to_string();
    }
    if trimmed.ends_with("/sessions") {
        return format!("{trimmed}/events");
    }
    format!("{trimmed}/sessions/events")
}

#[cfg(test)]
mod tests {
    use super::normalize_events_url;

    #[test]
    fn normalizes_every_base_shape() {
        assert_eq!(
            normalize_events_url("http://host/api"),
            "http://host/api/sessions/events"
        );
        assert_eq!(
            normalize_events_url("http://host/api/sessions/"),
            "http://host/api/sessions/events"
        );
        assert_eq!(
            normalize_events_url("http://host/api/sessions/events"),
            "http://host/api/sessions/events"
        );
    }

    #[test]
    fn empty_input_falls_back_to_default() {
        assert_eq!(
            normalize_events_url("  "),
            "http://127.0.0.1:4020/api/sessions/events"
        );
    }
}
