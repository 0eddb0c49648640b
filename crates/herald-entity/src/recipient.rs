//! Resolved recipient contact data.

use serde::{Deserialize, Serialize};

use herald_core::types::UserId;

use crate::channel::Channel;

/// A user together with the contact data each channel needs. Supplied by
/// the audience provider; the dispatcher never edits it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// The user.
    pub user_id: UserId,
    /// Display name used in greetings.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Email address, unvalidated.
    #[serde(default)]
    pub email: Option<String>,
    /// Phone number as entered, unnormalized.
    #[serde(default)]
    pub phone: Option<String>,
    /// Push device token.
    #[serde(default)]
    pub push_token: Option<String>,
}

impl Recipient {
    /// A recipient with no contact data beyond the in-app socket.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the phone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Set the push device token.
    pub fn with_push_token(mut self, token: impl Into<String>) -> Self {
        self.push_token = Some(token.into());
        self
    }

    /// The raw address used on `channel`. In-app delivery addresses the
    /// user id itself.
    pub fn destination_for(&self, channel: Channel) -> Option<String> {
        match channel {
            Channel::InApp => Some(self.user_id.to_string()),
            Channel::Push => self.push_token.clone(),
            Channel::WhatsApp | Channel::Sms => self.phone.clone(),
            Channel::Email => self.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_per_channel() {
        let user = UserId::new();
        let recipient = Recipient::new(user)
            .with_email("ana@example.com")
            .with_phone("11999999999");

        assert_eq!(recipient.destination_for(Channel::InApp), Some(user.to_string()));
        assert_eq!(
            recipient.destination_for(Channel::Email).as_deref(),
            Some("ana@example.com")
        );
        assert_eq!(
            recipient.destination_for(Channel::WhatsApp),
            recipient.destination_for(Channel::Sms)
        );
        assert_eq!(recipient.destination_for(Channel::Push), None);
    }
}
