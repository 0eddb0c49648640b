//! WhatsApp-style chat messages through an HTTP session bridge.
//!
//! The bridge holds the chat client session. It answers `503` with
//! `CLIENT_NOT_READY` while the session is (re)connecting and reports
//! numbers without an account as `NOT_REGISTERED`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use herald_core::config::channels::WhatsAppChannelConfig;
use herald_core::error::AppError;
use herald_entity::{Channel, DeliveryError};

use crate::adapter::{ChannelAdapter, DeliveryPayload, OutboundMessage};
use crate::contact::normalize_chat_phone;
use crate::http;
use crate::truncate::truncate_chars;

/// Chat-app adapter.
#[derive(Debug, Clone)]
pub struct WhatsAppAdapter {
    config: WhatsAppChannelConfig,
    client: Client,
}

impl WhatsAppAdapter {
    /// Build the adapter and its HTTP client.
    pub fn new(config: WhatsAppChannelConfig) -> Result<Self, AppError> {
        let client = http::build_client(Duration::from_millis(config.timeout_ms))?;
        Ok(Self { config, client })
    }

    fn compose(payload: &DeliveryPayload) -> String {
        let mut text = format!("*{}*\n{}", payload.title, payload.body);
        if let Some(url) = &payload.action_url {
            text.push_str("\n\n");
            text.push_str(url);
        }
        text
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppAdapter {
    fn channel(&self) -> Channel {
        Channel::WhatsApp
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    fn prepare(&self, payload: &DeliveryPayload) -> Result<OutboundMessage, DeliveryError> {
        let phone = normalize_chat_phone(
            payload.require_destination("phone number")?,
            &self.config.default_country_code,
        )?;
        Ok(OutboundMessage::from_payload(
            payload,
            phone,
            payload.title.clone(),
            truncate_chars(&Self::compose(payload), self.config.max_body_chars),
        ))
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let url = format!("{}/messages", self.config.bridge_url.trim_end_matches('/'));
        let mut request = self.client.post(url).json(&json!({
            "phone": message.destination,
            "message": message.body,
        }));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| http::classify_error(&e, self.timeout()))?;
        http::classify(response).await
    }
}

#[cfg(test)]
mod tests {
    use herald_core::types::{NotificationId, UserId};
    use herald_entity::{ErrorClass, Importance};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn adapter(url: String) -> WhatsAppAdapter {
        WhatsAppAdapter::new(WhatsAppChannelConfig {
            enabled: true,
            bridge_url: url,
            ..WhatsAppChannelConfig::default()
        })
        .unwrap()
    }

    fn payload(phone: &str) -> DeliveryPayload {
        DeliveryPayload {
            notification_id: NotificationId::new(),
            user_id: UserId::new(),
            destination: Some(phone.to_string()),
            title: "Out of stock".into(),
            body: "Gloves reached zero".into(),
            action_url: Some("https://erp.local/items/42".into()),
            importance: Importance::High,
            data: json!({}),
        }
    }

    #[test]
    fn test_local_number_gets_country_code() {
        let message = adapter("http://bridge".into())
            .prepare(&payload("11999999999"))
            .unwrap();
        assert_eq!(message.destination, "5511999999999");
        assert!(message.body.starts_with("*Out of stock*\nGloves reached zero"));
        assert!(message.body.ends_with("https://erp.local/items/42"));
    }

    #[test]
    fn test_short_number_is_validation_error() {
        let err = adapter("http://bridge".into())
            .prepare(&payload("123"))
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Validation);
    }

    #[tokio::test]
    async fn test_bridge_outcomes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(json!({"phone": "5511999999999"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "wamid.1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(json!({"phone": "5511988887777"})))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "NOT_REGISTERED"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(json!({"phone": "5511977776666"})))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"error": "CLIENT_NOT_READY"})),
            )
            .mount(&server)
            .await;

        let adapter = adapter(server.uri());

        let ok = adapter.prepare(&payload("11999999999")).unwrap();
        adapter.deliver(&ok).await.unwrap();

        let unregistered = adapter.prepare(&payload("11988887777")).unwrap();
        let err = adapter.deliver(&unregistered).await.unwrap_err();
        assert_eq!(err.class, ErrorClass::PermanentTransport);

        let not_ready = adapter.prepare(&payload("11977776666")).unwrap();
        let err = adapter.deliver(&not_ready).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
