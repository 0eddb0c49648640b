//! Shared fixtures for the integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use herald_channels::contact::normalize_chat_phone;
use herald_channels::{ChannelAdapter, DeliveryPayload, OutboundMessage};
use herald_core::config::AppConfig;
use herald_core::types::{NotificationId, UserId};
use herald_dispatch::{EngineBuilder, NotificationEngine};
use herald_entity::{Channel, DeliveryError, DeliveryRecord, NotificationIntent};
use herald_service::StaticAudienceProvider;

/// Configuration with maintenance off and only the in-app transport built
/// from config.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.maintenance.enabled = false;
    config
}

/// What a scripted call does.
#[derive(Debug, Clone)]
pub enum Step {
    Accept,
    Reject(DeliveryError),
    Stall,
}

/// Adapter replaying a script, then accepting. Records the virtual time
/// of every transport call.
#[derive(Debug)]
pub struct ScriptedAdapter {
    channel: Channel,
    timeout: Duration,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedAdapter {
    pub fn accepting(channel: Channel) -> Arc<Self> {
        Self::scripted(channel, Vec::new())
    }

    pub fn scripted(channel: Channel, script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            timeout: Duration::from_millis(200),
            script: Mutex::new(script.into()),
            fallback: Step::Accept,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always(channel: Channel, step: Step) -> Arc<Self> {
        Arc::new(Self {
            channel,
            timeout: Duration::from_millis(200),
            script: Mutex::new(VecDeque::new()),
            fallback: step,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelAdapter for ScriptedAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn prepare(&self, payload: &DeliveryPayload) -> Result<OutboundMessage, DeliveryError> {
        let raw = payload.require_destination("address")?;
        let destination = match self.channel {
            Channel::WhatsApp => normalize_chat_phone(raw, "55")?,
            _ => raw.to_string(),
        };
        Ok(OutboundMessage::from_payload(
            payload,
            destination,
            payload.title.clone(),
            payload.body.clone(),
        ))
    }

    async fn send(&self, _message: &OutboundMessage) -> Result<(), DeliveryError> {
        self.calls.lock().unwrap().push(tokio::time::Instant::now());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Step::Accept => Ok(()),
            Step::Reject(err) => Err(err),
            Step::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Engine over a fresh in-memory store with the given audience and extra
/// adapters.
pub fn engine(
    config: AppConfig,
    audience: StaticAudienceProvider,
    adapters: Vec<Arc<ScriptedAdapter>>,
) -> NotificationEngine {
    let mut builder = EngineBuilder::new(config).audience(Arc::new(audience));
    for adapter in adapters {
        builder = builder.adapter(adapter);
    }
    builder.build().unwrap()
}

/// An out-of-stock intent for item 42.
pub fn out_of_stock() -> NotificationIntent {
    NotificationIntent::new("item.out_of_stock".parse().unwrap())
        .for_entity("item", "42")
        .with_data("item", "Gloves")
        .with_data("item_id", 42)
}

/// A borrowed-item reminder sent to exactly `recipients`.
pub fn unreturned(recipients: Vec<UserId>) -> NotificationIntent {
    NotificationIntent::new("borrow.unreturned".parse().unwrap())
        .with_data("item", "Drill")
        .with_data("borrowed_at", "2026-10-01")
        .to_recipients(recipients)
}

/// Wait until every delivery settles and return the records.
pub async fn settle(engine: &NotificationEngine, id: NotificationId) -> Vec<DeliveryRecord> {
    let report = engine
        .wait_settled(id, Duration::from_secs(600))
        .await
        .unwrap();
    assert!(report.is_settled(), "deliveries did not settle: {report:?}");
    report.records
}

/// The single record on `channel`.
pub fn on_channel(records: &[DeliveryRecord], channel: Channel) -> &DeliveryRecord {
    let matching: Vec<_> = records.iter().filter(|r| r.channel == channel).collect();
    assert_eq!(matching.len(), 1, "expected one {channel} record");
    matching[0]
}
