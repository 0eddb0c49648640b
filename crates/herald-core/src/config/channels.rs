//! Channel transport configuration.

use serde::{Deserialize, Serialize};

use super::default_true;

/// Settings for every delivery channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// SMTP email channel.
    #[serde(default)]
    pub email: EmailChannelConfig,
    /// Push gateway channel.
    #[serde(default)]
    pub push: PushChannelConfig,
    /// WhatsApp-style chat channel.
    #[serde(default)]
    pub whatsapp: WhatsAppChannelConfig,
    /// In-app socket channel.
    #[serde(default)]
    pub in_app: InAppChannelConfig,
    /// SMS gateway channel.
    #[serde(default)]
    pub sms: SmsChannelConfig,
}

impl ChannelsConfig {
    /// Report enabled channels that lack the settings they need.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.email.enabled {
            if self.email.smtp_host.is_empty() {
                problems.push("channels.email.smtp_host is required when enabled".to_string());
            }
            if self.email.from_address.is_empty() {
                problems.push("channels.email.from_address is required when enabled".to_string());
            }
        }
        if self.push.enabled && self.push.gateway_url.is_empty() {
            problems.push("channels.push.gateway_url is required when enabled".to_string());
        }
        if self.whatsapp.enabled && self.whatsapp.bridge_url.is_empty() {
            problems.push("channels.whatsapp.bridge_url is required when enabled".to_string());
        }
        if self.sms.enabled && self.sms.gateway_url.is_empty() {
            problems.push("channels.sms.gateway_url is required when enabled".to_string());
        }

        for (name, concurrency) in [
            ("email", self.email.concurrency),
            ("push", self.push.concurrency),
            ("whatsapp", self.whatsapp.concurrency),
            ("in_app", self.in_app.concurrency),
            ("sms", self.sms.concurrency),
        ] {
            if concurrency == 0 {
                problems.push(format!("channels.{name}.concurrency must be at least 1"));
            }
        }

        problems
    }
}

/// SMTP submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChannelConfig {
    /// Whether the channel is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum concurrent deliveries.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-send timeout in milliseconds.
    #[serde(default = "default_email_timeout")]
    pub timeout_ms: u64,
    /// SMTP relay host.
    #[serde(default)]
    pub smtp_host: String,
    /// SMTP relay port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username, if the relay requires authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// SMTP password.
    #[serde(default)]
    pub password: Option<String>,
    /// Sender mailbox, e.g. `"ERP <no-reply@example.com>"`.
    #[serde(default)]
    pub from_address: String,
    /// Maximum subject length in characters.
    #[serde(default = "default_subject_chars")]
    pub max_subject_chars: usize,
}

impl Default for EmailChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            concurrency: default_concurrency(),
            timeout_ms: default_email_timeout(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from_address: String::new(),
            max_subject_chars: default_subject_chars(),
        }
    }
}

/// Push gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushChannelConfig {
    /// Whether the channel is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum concurrent deliveries.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-send timeout in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,
    /// Gateway send endpoint.
    #[serde(default)]
    pub gateway_url: String,
    /// Bearer token for the gateway.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Minimum accepted device-token length.
    #[serde(default = "default_min_token_length")]
    pub min_token_length: usize,
    /// Maximum title length in characters.
    #[serde(default = "default_push_title_chars")]
    pub max_title_chars: usize,
    /// Maximum body length in characters.
    #[serde(default = "default_push_body_chars")]
    pub max_body_chars: usize,
}

impl Default for PushChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            concurrency: default_concurrency(),
            timeout_ms: default_http_timeout(),
            gateway_url: String::new(),
            api_key: None,
            min_token_length: default_min_token_length(),
            max_title_chars: default_push_title_chars(),
            max_body_chars: default_push_body_chars(),
        }
    }
}

/// WhatsApp-style session bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppChannelConfig {
    /// Whether the channel is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum concurrent deliveries.
    #[serde(default = "default_single_concurrency")]
    pub concurrency: usize,
    /// Per-send timeout in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,
    /// Base URL of the chat client session bridge.
    #[serde(default)]
    pub bridge_url: String,
    /// Bearer token for the bridge.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Country code prepended to national numbers.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    /// Maximum message length in characters.
    #[serde(default = "default_chat_body_chars")]
    pub max_body_chars: usize,
}

impl Default for WhatsAppChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            concurrency: default_single_concurrency(),
            timeout_ms: default_http_timeout(),
            bridge_url: String::new(),
            api_key: None,
            default_country_code: default_country_code(),
            max_body_chars: default_chat_body_chars(),
        }
    }
}

/// In-app socket hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InAppChannelConfig {
    /// Whether the channel is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum concurrent deliveries.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Outbound buffer per connection.
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
    /// Maximum live connections per user; the oldest is dropped beyond it.
    #[serde(default = "default_connections_per_user")]
    pub max_connections_per_user: usize,
}

impl Default for InAppChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_concurrency(),
            connection_buffer: default_connection_buffer(),
            max_connections_per_user: default_connections_per_user(),
        }
    }
}

/// SMS gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsChannelConfig {
    /// Whether the channel is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum concurrent deliveries.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-send timeout in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,
    /// Gateway send endpoint.
    #[serde(default)]
    pub gateway_url: String,
    /// Bearer token for the gateway.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sender identifier shown to the recipient.
    #[serde(default)]
    pub sender_id: Option<String>,
    /// Country code prepended to numbers given without one.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    /// Maximum body length in characters.
    #[serde(default = "default_sms_body_chars")]
    pub max_body_chars: usize,
}

impl Default for SmsChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            concurrency: default_concurrency(),
            timeout_ms: default_http_timeout(),
            gateway_url: String::new(),
            api_key: None,
            sender_id: None,
            default_country_code: default_country_code(),
            max_body_chars: default_sms_body_chars(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_single_concurrency() -> usize {
    1
}

fn default_email_timeout() -> u64 {
    15_000
}

fn default_http_timeout() -> u64 {
    10_000
}

fn default_smtp_port() -> u16 {
    25
}

fn default_subject_chars() -> usize {
    200
}

fn default_min_token_length() -> usize {
    32
}

fn default_push_title_chars() -> usize {
    65
}

fn default_push_body_chars() -> usize {
    240
}

fn default_country_code() -> String {
    "55".to_string()
}

fn default_chat_body_chars() -> usize {
    4096
}

fn default_connection_buffer() -> usize {
    64
}

fn default_connections_per_user() -> usize {
    5
}

fn default_sms_body_chars() -> usize {
    160
}
