//! Channel to adapter lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use herald_core::config::ChannelsConfig;
use herald_core::error::AppError;
use herald_entity::Channel;

use crate::adapter::ChannelAdapter;
use crate::email::EmailAdapter;
use crate::in_app::{InAppAdapter, InAppHub};
use crate::push::PushAdapter;
use crate::sms::SmsAdapter;
use crate::whatsapp::WhatsAppAdapter;

/// The adapters available to the engine, one per enabled channel.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every enabled channel in `config`.
    pub fn from_config(config: &ChannelsConfig, hub: Arc<InAppHub>) -> Result<Self, AppError> {
        let mut registry = Self::new();

        if config.in_app.enabled {
            registry.register(Arc::new(InAppAdapter::new(hub)));
        }
        if config.push.enabled {
            registry.register(Arc::new(PushAdapter::new(config.push.clone())?));
        }
        if config.whatsapp.enabled {
            registry.register(Arc::new(WhatsAppAdapter::new(config.whatsapp.clone())?));
        }
        if config.email.enabled {
            registry.register(Arc::new(EmailAdapter::smtp(config.email.clone())?));
        }
        if config.sms.enabled {
            registry.register(Arc::new(SmsAdapter::new(config.sms.clone())?));
        }

        info!(channels = ?registry.channels(), "Channel adapters registered");
        Ok(registry)
    }

    /// Add or replace the adapter for its channel.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) -> &mut Self {
        self.adapters.insert(adapter.channel(), adapter);
        self
    }

    /// The adapter for `channel`, if one is registered.
    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&channel).cloned()
    }

    /// Whether `channel` has an adapter.
    pub fn contains(&self, channel: Channel) -> bool {
        self.adapters.contains_key(&channel)
    }

    /// Registered channels, in stable order.
    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.adapters.contains_key(c))
            .collect()
    }
}
