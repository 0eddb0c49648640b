//! SMS through an HTTP gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use herald_core::config::channels::SmsChannelConfig;
use herald_core::error::AppError;
use herald_entity::{Channel, DeliveryError};

use crate::adapter::{ChannelAdapter, DeliveryPayload, OutboundMessage};
use crate::contact::normalize_e164;
use crate::http;
use crate::truncate::truncate_chars;

/// SMS adapter. Bodies are cut to `max_body_chars` (160 by default).
#[derive(Debug, Clone)]
pub struct SmsAdapter {
    config: SmsChannelConfig,
    client: Client,
}

impl SmsAdapter {
    /// Build the adapter and its HTTP client.
    pub fn new(config: SmsChannelConfig) -> Result<Self, AppError> {
        let client = http::build_client(Duration::from_millis(config.timeout_ms))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ChannelAdapter for SmsAdapter {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    fn prepare(&self, payload: &DeliveryPayload) -> Result<OutboundMessage, DeliveryError> {
        let phone = normalize_e164(
            payload.require_destination("phone number")?,
            &self.config.default_country_code,
        )?;
        let text = format!("{}: {}", payload.title, payload.body);
        Ok(OutboundMessage::from_payload(
            payload,
            phone,
            payload.title.clone(),
            truncate_chars(&text, self.config.max_body_chars),
        ))
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let mut request = self.client.post(&self.config.gateway_url).json(&json!({
            "to": message.destination,
            "from": self.config.sender_id,
            "text": message.body,
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
