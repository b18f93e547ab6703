//! SMS channel backed by the Twilio Messages API.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ChannelKind, DeliveryChannel, mask_recipient};
use crate::notification::client::{ClientConfig, ProviderResponse, ResilientClient};
use crate::notification::context::DeliveryContext;
use crate::notification::events::ChannelOptions;
use crate::notification::rate_limiter::RateLimiterConfig;
use crate::notification::retry::RetryPolicy;
use crate::{Error, Result};

/// SMS channel configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    /// Messaging account identifier.
    pub account_sid: String,
    /// Messaging auth secret.
    pub auth_token: String,
    /// Messaging service identifier used as the sender.
    pub messaging_service_sid: String,
    /// Provider base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Client-side rate limit.
    #[serde(default = "default_max_per_second")]
    pub max_per_second: f64,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_api_base() -> String {
    "https://api.twilio.com".to_string()
}

fn default_max_per_second() -> f64 {
    5.0
}

fn default_timeout() -> u64 {
    10
}

impl SmsConfig {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        messaging_service_sid: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            messaging_service_sid: messaging_service_sid.into(),
            api_base: default_api_base(),
            max_per_second: default_max_per_second(),
            timeout_secs: default_timeout(),
            retry: RetryPolicy::default(),
        }
    }

    /// Messages endpoint for this account.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }
}

impl fmt::Debug for SmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmsConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("messaging_service_sid", &self.messaging_service_sid)
            .field("api_base", &self.api_base)
            .field("max_per_second", &self.max_per_second)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Subset of the provider's message resource we log.
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
    status: Option<String>,
}

/// SMS delivery channel.
pub struct SmsChannel {
    config: SmsConfig,
    client: Arc<ResilientClient>,
}

impl SmsChannel {
    /// Create a new SMS channel with its own resilient client.
    pub fn new(config: SmsConfig) -> Result<Self> {
        let rate_limit = RateLimiterConfig::with_rps(config.max_per_second)?;
        let client = ResilientClient::new(ClientConfig {
            timeout: Duration::from_secs(config.timeout_secs),
            rate_limit,
            retry: config.retry.clone(),
            ..Default::default()
        })?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    /// Create a channel that sends through an existing client.
    pub fn with_client(config: SmsConfig, client: Arc<ResilientClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &SmsConfig {
        &self.config
    }

    /// Send one text message.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for an empty recipient or body, otherwise whatever
    /// the resilient client surfaces.
    pub async fn send(
        &self,
        ctx: &DeliveryContext,
        to: &str,
        body: &str,
    ) -> Result<ProviderResponse> {
        if to.trim().is_empty() {
            return Err(Error::invalid_request("missing recipient"));
        }
        if body.trim().is_empty() {
            return Err(Error::invalid_request("missing message body"));
        }

        let request = self
            .client
            .http()
            .post(self.config.endpoint())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("MessagingServiceSid", self.config.messaging_service_sid.as_str()),
                ("Body", body),
            ])
            .build()?;

        let response = self.client.send(ctx, request).await?;

        match serde_json::from_str::<MessageResource>(&response.body) {
            Ok(resource) => info!(
                to = %mask_recipient(to),
                len = body.len(),
                attempts = response.attempts,
                sid = resource.sid.as_deref().unwrap_or("-"),
                provider_status = resource.status.as_deref().unwrap_or("-"),
                "SMS sent"
            ),
            Err(_) => info!(
                to = %mask_recipient(to),
                len = body.len(),
                attempts = response.attempts,
                "SMS sent"
            ),
        }

        Ok(response)
    }
}

#[async_trait]
impl DeliveryChannel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn deliver(
        &self,
        ctx: &DeliveryContext,
        recipient: &str,
        body: &str,
        _options: &ChannelOptions,
    ) -> Result<()> {
        debug!(to = %mask_recipient(recipient), "Delivering SMS");
        self.send(ctx, recipient, body).await.map(|_| ())
    }
}
