//! Delivery channels.
//!
//! This module provides the ways a rendered message can reach a recipient:
//! - SMS text via the messaging provider
//! - Synthesized speech, stored and played locally

mod sms;
mod speech;

pub use sms::{SmsChannel, SmsConfig};
pub use speech::{SpeechChannel, SpeechConfig, SpeechParams, SpokenAudio};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::context::DeliveryContext;
use super::events::ChannelOptions;
use crate::Result;

/// Kind of delivery channel.
///
/// The declaration order is the channel priority used when several
/// channels fail in the same dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Sms,
    Speech,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Speech => "speech",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for delivery channels.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Get the channel kind.
    fn kind(&self) -> ChannelKind;

    /// Deliver a rendered message to one recipient.
    async fn deliver(
        &self,
        ctx: &DeliveryContext,
        recipient: &str,
        body: &str,
        options: &ChannelOptions,
    ) -> Result<()>;
}

/// Mask a phone number for logging, keeping the country prefix and last digits.
pub(crate) fn mask_recipient(recipient: &str) -> String {
    let chars: Vec<char> = recipient.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_priority_order() {
        assert!(ChannelKind::Sms < ChannelKind::Speech);
        assert_eq!(ChannelKind::Speech.to_string(), "speech");
    }

    #[test]
    fn test_mask_recipient() {
        assert_eq!(mask_recipient("+15551234567"), "+155***4567");
        assert_eq!(mask_recipient("12345"), "***");
        assert_eq!(mask_recipient(""), "***");
    }
}
