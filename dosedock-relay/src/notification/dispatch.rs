//! Multi-channel dispatch.
//!
//! The [`Dispatcher`] fans one rendered message out to every configured
//! channel concurrently and aggregates the outcomes:
//! - one spawned task per channel, never chained
//! - outcomes collected in channel-priority order
//! - the context deadline bounds the wait, not the tasks themselves

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use super::channels::{ChannelKind, DeliveryChannel};
use super::context::DeliveryContext;
use super::events::{ChannelOptions, Event};
use crate::{Error, Result};

/// Outcome of one channel's delivery attempt.
#[derive(Debug)]
pub struct DeliveryOutcome {
    pub channel: ChannelKind,
    pub error: Option<Error>,
    pub elapsed: Duration,
}

impl DeliveryOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated outcomes of one dispatch, one per started channel task.
#[derive(Debug)]
pub struct DispatchResult {
    outcomes: Vec<DeliveryOutcome>,
}

impl DispatchResult {
    /// True iff every started channel succeeded.
    pub fn is_ok(&self) -> bool {
        self.outcomes.iter().all(DeliveryOutcome::is_ok)
    }

    /// Outcomes in channel-priority order.
    pub fn outcomes(&self) -> &[DeliveryOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, channel: ChannelKind) -> Option<&DeliveryOutcome> {
        self.outcomes.iter().find(|o| o.channel == channel)
    }

    /// The failure of the highest-priority failing channel.
    ///
    /// Independent of which channel failed first in wall-clock time.
    pub fn first_error(&self) -> Option<(ChannelKind, &Error)> {
        self.outcomes
            .iter()
            .find_map(|o| o.error.as_ref().map(|e| (o.channel, e)))
    }

    /// Collapse into a single result, attributing a failure to its channel.
    pub fn into_result(self) -> Result<()> {
        match self
            .outcomes
            .into_iter()
            .find_map(|o| o.error.map(|e| (o.channel, e)))
        {
            Some((channel, error)) => Err(error.in_channel(channel)),
            None => Ok(()),
        }
    }
}

/// Fans rendered messages out to the configured delivery channels.
pub struct Dispatcher {
    /// Sorted by channel priority.
    channels: Vec<Arc<dyn DeliveryChannel>>,
}

impl Dispatcher {
    /// SMS is always dispatched; speech only when a channel is provided.
    pub fn new(sms: Arc<dyn DeliveryChannel>, speech: Option<Arc<dyn DeliveryChannel>>) -> Self {
        let mut channels = vec![sms];
        channels.extend(speech);
        Self::with_channels(channels)
    }

    pub fn with_channels(mut channels: Vec<Arc<dyn DeliveryChannel>>) -> Self {
        channels.sort_by_key(|c| c.kind());
        Self { channels }
    }

    pub fn channel_kinds(&self) -> Vec<ChannelKind> {
        self.channels.iter().map(|c| c.kind()).collect()
    }

    pub fn has_channel(&self, kind: ChannelKind) -> bool {
        self.channels.iter().any(|c| c.kind() == kind)
    }

    /// Deliver `text` for `event` over every channel.
    ///
    /// Waits for all channel tasks or for the context to end, whichever
    /// comes first. When the context ends first its error is returned and
    /// the tasks keep running detached; their outcomes are dropped.
    ///
    /// # Errors
    ///
    /// `Timeout` or `Cancelled` when the context ends before every channel
    /// finished. Channel failures are reported through [`DispatchResult`].
    pub async fn dispatch(
        &self,
        ctx: &DeliveryContext,
        event: &Event,
        text: &str,
    ) -> Result<DispatchResult> {
        let span = info_span!("dispatch", event = %event.kind());
        self.dispatch_to(ctx, event.recipient(), text, event.options())
            .instrument(span)
            .await
    }

    /// Deliver `text` to `recipient` over every channel.
    pub async fn dispatch_to(
        &self,
        ctx: &DeliveryContext,
        recipient: &str,
        text: &str,
        options: &ChannelOptions,
    ) -> Result<DispatchResult> {
        if !self.has_channel(ChannelKind::Speech) {
            info!("Speech channel not configured, skipping voice delivery");
        }

        let text: Arc<str> = Arc::from(text);
        let recipient: Arc<str> = Arc::from(recipient);
        let options = Arc::new(options.clone());

        // One slot per started task, in channel order.
        let mut kinds = Vec::with_capacity(self.channels.len());
        let mut handles = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let kind = channel.kind();
            let channel = channel.clone();
            let ctx = ctx.clone();
            let text = text.clone();
            let recipient = recipient.clone();
            let options = options.clone();

            let task = async move {
                let started = Instant::now();
                let result = channel.deliver(&ctx, &recipient, &text, &options).await;
                let elapsed = started.elapsed();

                match &result {
                    Ok(()) => debug!(elapsed = ?elapsed, "Channel delivered"),
                    Err(e) => warn!(
                        elapsed = ?elapsed,
                        kind = %e.kind(),
                        error = %e,
                        "Channel delivery failed"
                    ),
                }

                DeliveryOutcome {
                    channel: kind,
                    error: result.err(),
                    elapsed,
                }
            };

            kinds.push(kind);
            handles.push(tokio::spawn(task.instrument(info_span!("channel", channel = %kind))));
        }

        let started = Instant::now();
        tokio::select! {
            biased;

            results = join_all(handles) => {
                let outcomes = results
                    .into_iter()
                    .zip(kinds)
                    .map(|(joined, kind)| match joined {
                        Ok(outcome) => outcome,
                        Err(e) => DeliveryOutcome {
                            channel: kind,
                            error: Some(Error::Other(format!("channel task failed: {}", e))),
                            elapsed: started.elapsed(),
                        },
                    })
                    .collect();
                Ok(DispatchResult { outcomes })
            }
            err = ctx.done() => {
                warn!(
                    error = %err,
                    waited = ?started.elapsed(),
                    "Dispatch ended before all channels finished; in-flight deliveries continue detached"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeChannel {
        kind: ChannelKind,
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
        completed: AtomicUsize,
    }

    impl FakeChannel {
        fn new(kind: ChannelKind) -> Self {
            Self {
                kind,
                delay: Duration::ZERO,
                fail: false,
                calls: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl DeliveryChannel for FakeChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn deliver(
            &self,
            _ctx: &DeliveryContext,
            _recipient: &str,
            _body: &str,
            _options: &ChannelOptions,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::transient(format!("{} provider down", self.kind)))
            } else {
                Ok(())
            }
        }
    }

    fn event() -> Event {
        Event::parse("TEST_REMINDER", "+15551234567", Default::default()).unwrap()
    }

    fn ctx() -> DeliveryContext {
        DeliveryContext::with_timeout(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_all_channels_succeed() {
        let sms = Arc::new(FakeChannel::new(ChannelKind::Sms));
        let speech = Arc::new(FakeChannel::new(ChannelKind::Speech));
        let dispatcher = Dispatcher::new(sms.clone(), Some(speech.clone() as Arc<dyn DeliveryChannel>));

        let result = dispatcher.dispatch(&ctx(), &event(), "hi").await.unwrap();
        assert!(result.is_ok());
        assert_eq!(result.outcomes().len(), 2);
        assert_eq!(sms.calls.load(Ordering::SeqCst), 1);
        assert_eq!(speech.calls.load(Ordering::SeqCst), 1);
        assert!(result.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_other_channel() {
        let sms = Arc::new(FakeChannel::new(ChannelKind::Sms).failing());
        let speech = Arc::new(FakeChannel::new(ChannelKind::Speech));
        let dispatcher = Dispatcher::new(sms.clone(), Some(speech.clone() as Arc<dyn DeliveryChannel>));

        let result = dispatcher.dispatch(&ctx(), &event(), "hi").await.unwrap();
        assert!(!result.is_ok());
        assert!(result.outcome(ChannelKind::Speech).unwrap().is_ok());
        assert_eq!(speech.completed.load(Ordering::SeqCst), 1);

        let err = result.into_result().unwrap_err();
        assert_eq!(err.channel(), Some(ChannelKind::Sms));
    }

    #[tokio::test]
    async fn test_speech_failure_is_attributed() {
        let sms = Arc::new(FakeChannel::new(ChannelKind::Sms));
        let speech = Arc::new(FakeChannel::new(ChannelKind::Speech).failing());
        let dispatcher = Dispatcher::new(sms.clone(), Some(speech as Arc<dyn DeliveryChannel>));

        let result = dispatcher.dispatch(&ctx(), &event(), "hi").await.unwrap();
        let (channel, _) = result.first_error().unwrap();
        assert_eq!(channel, ChannelKind::Speech);
        assert_eq!(sms.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_error_follows_channel_priority() {
        // SMS fails last in wall-clock time but still wins the tie-break.
        let sms = Arc::new(
            FakeChannel::new(ChannelKind::Sms)
                .failing()
                .delayed(Duration::from_millis(300)),
        );
        let speech = Arc::new(FakeChannel::new(ChannelKind::Speech).failing());
        let dispatcher = Dispatcher::new(sms, Some(speech as Arc<dyn DeliveryChannel>));

        let result = dispatcher.dispatch(&ctx(), &event(), "hi").await.unwrap();
        assert_eq!(result.first_error().unwrap().0, ChannelKind::Sms);
    }

    #[tokio::test]
    async fn test_missing_speech_channel_is_skipped() {
        let sms = Arc::new(FakeChannel::new(ChannelKind::Sms));
        let dispatcher = Dispatcher::new(sms.clone(), None);

        let result = dispatcher.dispatch(&ctx(), &event(), "hi").await.unwrap();
        assert!(result.is_ok());
        assert_eq!(result.outcomes().len(), 1);
        assert!(result.outcome(ChannelKind::Speech).is_none());
        assert_eq!(dispatcher.channel_kinds(), vec![ChannelKind::Sms]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_slow_channel() {
        let sms = Arc::new(FakeChannel::new(ChannelKind::Sms).delayed(Duration::from_secs(5)));
        let dispatcher = Dispatcher::new(sms.clone(), None);
        let ctx = DeliveryContext::with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let err = dispatcher.dispatch(&ctx, &event(), "hi").await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(sms.completed.load(Ordering::SeqCst), 0);

        // The abandoned task is not killed.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sms.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let sms = Arc::new(FakeChannel::new(ChannelKind::Sms).delayed(Duration::from_secs(5)));
        let dispatcher = Dispatcher::new(sms, None);
        let ctx = ctx();
        ctx.cancel();

        let err = dispatcher.dispatch(&ctx, &event(), "hi").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_channels_sorted_by_priority() {
        let channels: Vec<Arc<dyn DeliveryChannel>> = vec![
            Arc::new(FakeChannel::new(ChannelKind::Speech)),
            Arc::new(FakeChannel::new(ChannelKind::Sms)),
        ];
        let dispatcher = Dispatcher::with_channels(channels);
        assert_eq!(
            dispatcher.channel_kinds(),
            vec![ChannelKind::Sms, ChannelKind::Speech]
        );
    }
}
