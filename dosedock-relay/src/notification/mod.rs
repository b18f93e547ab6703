//! Notification relay core.
//!
//! Renders reminder events into message text and delivers it over every
//! configured channel (SMS, speech) concurrently, bounded by a deadline.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use dosedock_relay::notification::{DeliveryContext, Dispatcher, Event, SmsChannel, SmsConfig};
//!
//! let sms = SmsChannel::new(SmsConfig::new("AC...", "token", "MG..."))?;
//! let dispatcher = Dispatcher::new(Arc::new(sms), None);
//!
//! let event = Event::parse("DOSE_DUE", "+15551234567", fields)?;
//! let ctx = DeliveryContext::with_timeout(Duration::from_secs(10));
//! dispatcher.dispatch(&ctx, &event, &event.render()).await?.into_result()?;
//! ```

pub mod channels;
pub mod client;
pub mod context;
pub mod dispatch;
pub mod events;
pub mod rate_limiter;
pub mod retry;

pub use channels::{
    ChannelKind, DeliveryChannel, SmsChannel, SmsConfig, SpeechChannel, SpeechConfig,
};
pub use client::{ClientConfig, ProviderResponse, ResilientClient};
pub use context::DeliveryContext;
pub use dispatch::{DeliveryOutcome, DispatchResult, Dispatcher};
pub use events::{ChannelOptions, Emotion, Event, EventFields, EventKind, render};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{RetryPolicy, StatusClass};
