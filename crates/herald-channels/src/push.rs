//! Mobile push through an HTTP gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use herald_core::config::channels::PushChannelConfig;
use herald_core::error::AppError;
use herald_entity::{Channel, DeliveryError};

use crate::adapter::{ChannelAdapter, DeliveryPayload, OutboundMessage};
use crate::contact::normalize_push_token;
use crate::http;
use crate::truncate::truncate_chars;

/// Sends push notifications as `POST <gateway_url>` JSON requests.
#[derive(Debug, Clone)]
pub struct PushAdapter {
    config: PushChannelConfig,
    client: Client,
}

impl PushAdapter {
    /// Build the adapter and its HTTP client.
    pub fn new(config: PushChannelConfig) -> Result<Self, AppError> {
        let client = http::build_client(Duration::from_millis(config.timeout_ms))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ChannelAdapter for PushAdapter {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    fn prepare(&self, payload: &DeliveryPayload) -> Result<OutboundMessage, DeliveryError> {
        let token = normalize_push_token(
            payload.require_destination("push device token")?,
            self.config.min_token_length,
        )?;
        Ok(OutboundMessage::from_payload(
            payload,
            token,
            truncate_chars(&payload.title, self.config.max_title_chars),
            truncate_chars(&payload.body, self.config.max_body_chars),
        ))
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let body = json!({
            "to": message.destination,
            "priority": message.importance.push_priority(),
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "data": {
                "notification_id": message.notification_id,
                "action_url": message.action_url,
                "payload": message.data,
            },
        });

        let mut request = self.client.post(&self.config.gateway_url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| http::classify_error(&e, self.timeout()))?;

        debug!(
            notification_id = %message.notification_id,
            status = response.status().as_u16(),
            "Push gateway answered"
        );
        http::classify(response).await
    }
}

#[cfg(test)]
mod tests {
    use herald_core::types::{NotificationId, UserId};
    use herald_entity::{ErrorClass, Importance};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(url: String) -> PushChannelConfig {
        PushChannelConfig {
            enabled: true,
            gateway_url: url,
            api_key: Some("secret".into()),
            timeout_ms: 500,
            ..PushChannelConfig::default()
        }
    }

    fn payload(token: &str) -> DeliveryPayload {
        DeliveryPayload {
            notification_id: NotificationId::new(),
            user_id: UserId::new(),
            destination: Some(token.to_string()),
            title: "Task overdue".into(),
            body: "x".repeat(500),
            action_url: Some("/tasks/7".into()),
            importance: Importance::High,
            data: json!({"task": "Audit"}),
        }
    }

    #[tokio::test]
    async fn test_sends_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = PushAdapter::new(config(format!("{}/send", server.uri()))).unwrap();
        let message = adapter.prepare(&payload(&"t".repeat(40))).unwrap();
        assert_eq!(message.body.chars().count(), 240);
        adapter.deliver(&message).await.unwrap();
    }

    #[tokio::test]
    async fn test_short_token_is_validation_error() {
        let adapter = PushAdapter::new(config("http://127.0.0.1:9".into())).unwrap();
        let err = adapter.prepare(&payload("abc")).unwrap_err();
        assert_eq!(err.class, ErrorClass::Validation);
    }

    #[tokio::test]
    async fn test_not_registered_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": [{"error": "NotRegistered"}]})),
            )
            .mount(&server)
            .await;

        let adapter = PushAdapter::new(config(server.uri())).unwrap();
        let message = adapter.prepare(&payload(&"t".repeat(40))).unwrap();
        let err = adapter.deliver(&message).await.unwrap_err();
        assert_eq!(err.class, ErrorClass::PermanentTransport);
    }

    #[tokio::test]
    async fn test_slow_gateway_is_retryable_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let adapter = PushAdapter::new(config(server.uri())).unwrap();
        let message = adapter.prepare(&payload(&"t".repeat(40))).unwrap();
        let err = adapter.deliver(&message).await.unwrap_err();
        assert_eq!(err.class, ErrorClass::RetryableTransport);
        assert_eq!(err.code, "TIMEOUT");
    }

    #[tokio::test]
    async fn test_quota_keeps_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "12"))
            .mount(&server)
            .await;

        let adapter = PushAdapter::new(config(server.uri())).unwrap();
        let message = adapter.prepare(&payload(&"t".repeat(40))).unwrap();
        let err = adapter.deliver(&message).await.unwrap_err();
        assert_eq!(err.class, ErrorClass::QuotaExceeded);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
    }
}
