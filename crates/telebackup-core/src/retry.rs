//! Flood-wait retry policy.
//!
//! The platform tells us exactly how long to back off; we never add jitter or
//! our own backoff on top of it.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive flood waits tolerated for one message. `None` waits as often as told.
    pub max_flood_waits: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_flood_waits: None,
        }
    }

    pub fn bounded(max_flood_waits: u32) -> Self {
        Self {
            max_flood_waits: Some(max_flood_waits),
        }
    }

    /// Whether another wait is allowed after `waits_so_far` waits for the same message.
    pub fn allows_wait(&self, waits_so_far: u32) -> bool {
        self.max_flood_waits.map_or(true, |max| waits_so_far < max)
    }
}

/// Injectable suspension point so tests can observe flood waits without sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleep unless the run is cancelled first.
pub async fn sleep_or_cancel(
    sleeper: &dyn Sleeper,
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = sleeper.sleep(duration) => Ok(()),
    }
}
