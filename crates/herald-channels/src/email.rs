//! Email over SMTP.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use herald_core::config::channels::EmailChannelConfig;
use herald_core::error::AppError;
use herald_entity::{Channel, DeliveryError};

use crate::adapter::{ChannelAdapter, DeliveryPayload, OutboundMessage};
use crate::contact::normalize_email;
use crate::truncate::truncate_chars;

/// A plain-text mail ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Mail submission backend.
#[async_trait]
pub trait MailSender: Send + Sync + std::fmt::Debug {
    /// Submit one mail, classifying any failure.
    async fn send_mail(&self, mail: &MailMessage) -> Result<(), DeliveryError>;
}

/// SMTP submission via `lettre` to a relay.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build a mailer for the configured relay.
    pub fn new(config: &EmailChannelConfig) -> Result<Self, AppError> {
        let from: Mailbox = config.from_address.parse().map_err(|e| {
            AppError::configuration(format!(
                "channels.email.from_address '{}' is invalid: {e}",
                config.from_address
            ))
        })?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
            .port(config.smtp_port)
            .timeout(Some(Duration::from_millis(config.timeout_ms)));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

/// Map an SMTP failure: 5xx replies are hard bounces, 4xx replies and
/// connection problems are retryable.
fn classify_smtp(err: &lettre::transport::smtp::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::retryable("TIMEOUT", err.to_string())
    } else if err.is_permanent() {
        DeliveryError::permanent("HARD_BOUNCE", err.to_string())
    } else if err.is_transient() {
        DeliveryError::retryable("SMTP_TRANSIENT", err.to_string())
    } else {
        DeliveryError::retryable("SMTP_CONNECTION", err.to_string())
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send_mail(&self, mail: &MailMessage) -> Result<(), DeliveryError> {
        let to: Mailbox = mail.to.parse().map_err(|e| {
            DeliveryError::validation("INVALID_EMAIL", format!("'{}': {e}", mail.to))
        })?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| DeliveryError::permanent("MESSAGE_INVALID", e.to_string()))?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| classify_smtp(&e))?;
        debug!(code = %response.code(), "SMTP relay accepted message");
        Ok(())
    }
}

/// Email adapter over any [`MailSender`].
#[derive(Debug)]
pub struct EmailAdapter<M: MailSender = SmtpMailer> {
    config: EmailChannelConfig,
    mailer: M,
}

impl EmailAdapter<SmtpMailer> {
    /// Email adapter submitting to the configured SMTP relay.
    pub fn smtp(config: EmailChannelConfig) -> Result<Self, AppError> {
        let mailer = SmtpMailer::new(&config)?;
        Ok(Self { config, mailer })
    }
}

impl<M: MailSender> EmailAdapter<M> {
    /// Email adapter with a custom mail backend.
    pub fn with_mailer(config: EmailChannelConfig, mailer: M) -> Self {
        Self { config, mailer }
    }
}

#[async_trait]
impl<M: MailSender> ChannelAdapter for EmailAdapter<M> {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    fn prepare(&self, payload: &DeliveryPayload) -> Result<OutboundMessage, DeliveryError> {
        let address = normalize_email(payload.require_destination("email address")?)?;
        let mut body = payload.body.clone();
        if let Some(url) = &payload.action_url {
            body.push_str("\n\n");
            body.push_str(url);
        }
        Ok(OutboundMessage::from_payload(
            payload,
            address,
            truncate_chars(&payload.title, self.config.max_subject_chars),
            body,
        ))
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        self.mailer
            .send_mail(&MailMessage {
                to: message.destination.clone(),
                subject: message.title.clone(),
                body: message.body.clone(),
            })
            .await
    }
}
