//! Shared HTTP plumbing for gateway-backed adapters: client construction
//! and response classification.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};

use herald_core::error::{AppError, ErrorKind};
use herald_entity::DeliveryError;

/// Provider error codes meaning the recipient will never be reachable.
const PERMANENT_CODES: &[&str] = &[
    "NOTREGISTERED",
    "NOT_REGISTERED",
    "UNREGISTERED",
    "INVALIDREGISTRATION",
    "INVALID_REGISTRATION",
    "MISMATCHSENDERID",
    "INVALID_NUMBER",
    "INVALID_RECIPIENT",
];

/// Provider error codes for temporary unavailability.
const RETRYABLE_CODES: &[&str] = &[
    "UNAVAILABLE",
    "INTERNALSERVERERROR",
    "INTERNAL",
    "CLIENT_NOT_READY",
    "SESSION_NOT_READY",
];

/// Provider error codes for quota exhaustion.
const QUOTA_CODES: &[&str] = &[
    "QUOTAEXCEEDED",
    "QUOTA_EXCEEDED",
    "DEVICEMESSAGERATEEXCEEDED",
    "RATE_LIMITED",
    "TOO_MANY_REQUESTS",
];

/// Build a client whose own timeout matches the adapter's.
pub fn build_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e))
}

/// Parse a `Retry-After` header given in seconds.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Pull a provider error code out of a JSON body (`error`, `code` or
/// `results[0].error`).
fn provider_code(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        json.get("error").and_then(|v| v.as_str()),
        json.get("error")
            .and_then(|v| v.get("code"))
            .and_then(|v| v.as_str()),
        json.get("code").and_then(|v| v.as_str()),
        json.get("results")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("error"))
            .and_then(|v| v.as_str()),
    ];
    candidates
        .into_iter()
        .flatten()
        .next()
        .map(|code| code.trim().to_ascii_uppercase())
}

/// Classify a gateway answer. Known provider codes in the body win over
/// the status line, since several gateways report per-message failures
/// inside a `200 OK`.
pub fn classify_response(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> Result<(), DeliveryError> {
    if let Some(code) = provider_code(body) {
        let detail = format!("gateway answered {status} with {code}");
        if PERMANENT_CODES.contains(&code.as_str()) {
            return Err(DeliveryError::permanent(code, detail));
        }
        if QUOTA_CODES.contains(&code.as_str()) {
            return Err(DeliveryError::quota_exceeded(detail, retry_after));
        }
        if RETRYABLE_CODES.contains(&code.as_str()) {
            return Err(DeliveryError::retryable(code, detail));
        }
    }

    if status.is_success() {
        return Ok(());
    }

    let detail = format!("gateway answered {status}: {}", snippet(body));
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(DeliveryError::quota_exceeded(detail, retry_after)),
        StatusCode::REQUEST_TIMEOUT => Err(DeliveryError::retryable("HTTP_408", detail)),
        s if s.is_server_error() => {
            Err(DeliveryError::retryable(format!("HTTP_{}", s.as_u16()), detail))
        }
        s => Err(DeliveryError::permanent(format!("HTTP_{}", s.as_u16()), detail)),
    }
}

/// Classify a failed request. Timeouts and connection problems are
/// retryable; a request that could not even be built is not.
pub fn classify_error(err: &reqwest::Error, timeout: Duration) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::timeout(timeout)
    } else if err.is_builder() {
        DeliveryError::permanent("REQUEST_INVALID", err.to_string())
    } else if err.is_connect() {
        DeliveryError::retryable("CONNECT", err.to_string())
    } else {
        DeliveryError::retryable("NETWORK", err.to_string())
    }
}

/// Read and classify a response.
pub async fn classify(response: Response) -> Result<(), DeliveryError> {
    let status = response.status();
    let hint = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    classify_response(status, hint, &body)
}

fn snippet(body: &str) -> String {
    crate::truncate::truncate_chars(body.trim(), 200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_entity::ErrorClass;

    #[test]
    fn test_success() {
        assert!(classify_response(StatusCode::OK, None, r#"{"success":1}"#).is_ok());
        assert!(classify_response(StatusCode::ACCEPTED, None, "").is_ok());
    }

    #[test]
    fn test_not_registered_in_ok_body_is_permanent() {
        let err = classify_response(
            StatusCode::OK,
            None,
            r#"{"results":[{"error":"NotRegistered"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.class, ErrorClass::PermanentTransport);
        assert_eq!(err.code, "NOTREGISTERED");
    }

    #[test]
    fn test_client_not_ready_is_retryable() {
        let err = classify_response(
            StatusCode::SERVICE_UNAVAILABLE,
            None,
            r#"{"error":"CLIENT_NOT_READY"}"#,
        )
        .unwrap_err();
        assert_eq!(err.class, ErrorClass::RetryableTransport);
    }

    #[test]
    fn test_status_mapping() {
        let quota = classify_response(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(7)),
            "",
        )
        .unwrap_err();
        assert_eq!(quota.class, ErrorClass::QuotaExceeded);
        assert_eq!(quota.retry_after(), Some(Duration::from_secs(7)));

        let gone = classify_response(StatusCode::GONE, None, "").unwrap_err();
        assert_eq!(gone.class, ErrorClass::PermanentTransport);
        assert_eq!(gone.code, "HTTP_410");

        let bad_gateway = classify_response(StatusCode::BAD_GATEWAY, None, "oops").unwrap_err();
        assert_eq!(bad_gateway.class, ErrorClass::RetryableTransport);
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(30)));
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }
}
