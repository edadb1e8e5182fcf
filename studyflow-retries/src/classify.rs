//! Error classification.
//!
//! Explicit [`RetryableError`](crate::RetryableError)s are trusted as-is. Anything else is matched
//! against keyword tables in a fixed priority order, because a message can
//! mention more than one kind of failure ("network error: 429 too many
//! requests" is a network error).

use crate::error::{ErrorCategory, RetryError};

/// Keyword table, checked top to bottom. First hit wins.
const KEYWORDS: &[(ErrorCategory, &[&str])] = &[
    (ErrorCategory::Network, &["network", "fetch", "connection"]),
    (
        ErrorCategory::RateLimit,
        &["rate limit", "too many requests", "quota", "429"],
    ),
    (ErrorCategory::Timeout, &["timeout", "timed out", "aborted"]),
    (
        ErrorCategory::Authentication,
        &["unauthorized", "invalid token", "401"],
    ),
    (ErrorCategory::Authorization, &["forbidden", "403", "permission"]),
    (
        ErrorCategory::ServerError,
        &[
            "server error",
            "internal error",
            "service unavailable",
            "bad gateway",
        ],
    ),
    (
        ErrorCategory::ClientError,
        &["400", "bad request", "invalid", "malformed"],
    ),
];

/// Determine the category of an error.
pub fn categorize_error(error: &RetryError) -> ErrorCategory {
    if let Some(explicit) = error.as_retryable() {
        return explicit.category();
    }

    match error {
        RetryError::Other(err) => categorize_message(&format!("{err:#}")),
        RetryError::CircuitOpen { .. } | RetryError::Retryable(_) => ErrorCategory::Unknown,
    }
}

/// Classify free text using the keyword table.
pub fn categorize_message(message: &str) -> ErrorCategory {
    let message = message.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(category, words)| {
            words.iter().any(|w| message.contains(w))
                || (*category == ErrorCategory::ServerError && has_server_status(&message))
        })
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Whether the text holds a standalone 5xx status code.
fn has_server_status(message: &str) -> bool {
    message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 3)
        .filter_map(|token| token.parse::<u16>().ok())
        .any(|code| (500..=599).contains(&code))
}

/// Default retry eligibility for an error at a 1-based attempt number.
pub fn should_retry_error(error: &RetryError, attempt: u32) -> bool {
    if let Some(explicit) = error.as_retryable() {
        return explicit.is_retryable();
    }
    if matches!(error, RetryError::CircuitOpen { .. }) {
        return false;
    }
    category_allows_retry(categorize_error(error), attempt)
}

/// Retry eligibility by category alone.
pub(crate) fn category_allows_retry(category: ErrorCategory, attempt: u32) -> bool {
    match category {
        ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::ServerError => true,
        ErrorCategory::RateLimit => attempt <= 5,
        ErrorCategory::Authentication
        | ErrorCategory::Authorization
        | ErrorCategory::ClientError => false,
        ErrorCategory::Unknown => attempt <= 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetryableError;
    use rstest::rstest;

    fn opaque(msg: &str) -> RetryError {
        RetryError::msg(msg.to_string())
    }

    #[rstest]
    #[case("Failed to fetch", ErrorCategory::Network)]
    #[case("Connection reset by peer", ErrorCategory::Network)]
    #[case("Rate limit exceeded", ErrorCategory::RateLimit)]
    #[case("Too Many Requests", ErrorCategory::RateLimit)]
    #[case("monthly quota used up", ErrorCategory::RateLimit)]
    #[case("status 429", ErrorCategory::RateLimit)]
    #[case("request timeout", ErrorCategory::Timeout)]
    #[case("The operation was aborted", ErrorCategory::Timeout)]
    #[case("Unauthorized", ErrorCategory::Authentication)]
    #[case("invalid token supplied", ErrorCategory::Authentication)]
    #[case("Forbidden", ErrorCategory::Authorization)]
    #[case("missing permission: chat.write", ErrorCategory::Authorization)]
    #[case("HTTP 503", ErrorCategory::ServerError)]
    #[case("Internal Server Error", ErrorCategory::ServerError)]
    #[case("HTTP 505", ErrorCategory::ServerError)]
    #[case("HTTP 529 overloaded", ErrorCategory::ServerError)]
    #[case("upstream returned 507", ErrorCategory::ServerError)]
    #[case("request id 25001 dropped", ErrorCategory::Unknown)]
    #[case("Bad Request", ErrorCategory::ClientError)]
    #[case("malformed JSON body", ErrorCategory::ClientError)]
    #[case("something odd happened", ErrorCategory::Unknown)]
    fn test_categorize_message(#[case] message: &str, #[case] expected: ErrorCategory) {
        assert_eq!(categorize_error(&opaque(message)), expected);
    }

    #[rstest]
    #[case("network error: 429 too many requests", ErrorCategory::Network)]
    #[case("rate limit hit, request timeout", ErrorCategory::RateLimit)]
    #[case("invalid token", ErrorCategory::Authentication)]
    #[case("403 invalid scope", ErrorCategory::Authorization)]
    fn test_priority_order(#[case] message: &str, #[case] expected: ErrorCategory) {
        assert_eq!(categorize_message(message), expected);
    }

    #[test]
    fn test_explicit_category_wins() {
        let err: RetryError = RetryableError::new(ErrorCategory::ServerError, "Unauthorized").into();
        assert_eq!(categorize_error(&err), ErrorCategory::ServerError);
    }

    #[test]
    fn test_context_chain_is_searched() {
        let err = RetryError::Other(
            anyhow::anyhow!("connection refused").context("sending tutor prompt"),
        );
        assert_eq!(categorize_error(&err), ErrorCategory::Network);
    }

    #[rstest]
    #[case("Unauthorized")]
    #[case("Forbidden")]
    #[case("Bad Request")]
    fn test_never_retry_client_side(#[case] message: &str) {
        let err = opaque(message);
        for attempt in 1..=20 {
            assert!(!should_retry_error(&err, attempt));
        }
    }

    #[test]
    fn test_rate_limit_window() {
        let err = opaque("rate limit exceeded");
        assert!(should_retry_error(&err, 1));
        assert!(should_retry_error(&err, 5));
        assert!(!should_retry_error(&err, 6));
    }

    #[test]
    fn test_any_5xx_is_always_retryable() {
        let err = opaque("HTTP 529 overloaded");
        assert!(should_retry_error(&err, 3));
        assert!(should_retry_error(&err, 10));
    }

    #[test]
    fn test_unknown_is_conservative() {
        let err = opaque("something odd happened");
        assert!(should_retry_error(&err, 1));
        assert!(should_retry_error(&err, 2));
        assert!(!should_retry_error(&err, 3));
    }

    #[test]
    fn test_transient_always_retryable() {
        for message in ["network down", "timeout", "502 bad gateway"] {
            assert!(should_retry_error(&opaque(message), 50));
        }
    }

    #[test]
    fn test_explicit_flag_is_authoritative() {
        let err: RetryError = RetryableError::http(401, "expired").with_retryable(true).into();
        assert!(should_retry_error(&err, 10));

        let err: RetryError = RetryableError::network("down").with_retryable(false).into();
        assert!(!should_retry_error(&err, 1));
    }

    #[test]
    fn test_circuit_open_is_not_retryable() {
        let err = RetryError::CircuitOpen {
            operation_id: "ai-chat".into(),
        };
        assert!(!should_retry_error(&err, 1));
    }
}
