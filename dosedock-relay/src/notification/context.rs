//! Deadline and cancellation scope shared by every suspending call of a dispatch.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Deadline plus cancellation token for one logical operation.
///
/// Cloning is cheap; clones observe the same deadline and the same token.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    deadline: Instant,
    token: CancellationToken,
}

impl DeliveryContext {
    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline,
            token: CancellationToken::new(),
        }
    }

    /// Context that also ends when `parent` is cancelled.
    pub fn child_of(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            token: parent.child_token(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the error the context has ended with, if it has.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(Error::Timeout);
        }
        Ok(())
    }

    /// Resolves once the context ends, yielding `Timeout` or `Cancelled`.
    pub async fn done(&self) -> Error {
        tokio::select! {
            _ = self.token.cancelled() => Error::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => Error::Timeout,
        }
    }

    /// Sleep for `duration` unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.sleep_until(Instant::now() + duration).await
    }

    pub async fn sleep_until(&self, until: Instant) -> Result<()> {
        self.check()?;
        tokio::select! {
            err = self.done() => Err(err),
            _ = tokio::time::sleep_until(until) => Ok(()),
        }
    }
}

impl DeliveryContext {
    /// Run `work` on its own task and wait for it until the context ends.
    ///
    /// When the context ends first its error is returned and the task keeps
    /// running detached; an issued provider call is abandoned, not aborted.
    pub async fn run_detached<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.check()?;
        let handle = tokio::spawn(work);
        tokio::select! {
            biased;

            joined = handle => match joined {
                Ok(result) => result,
                Err(e) => Err(Error::Other(format!("detached task failed: {}", e))),
            },
            err = self.done() => Err(err),
        }
    }
}
