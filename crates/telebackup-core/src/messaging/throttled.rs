use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::ChannelRef,
    messaging::{port::ChannelClient, types::ResolvedChannel},
    Result,
};

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// ChannelClient decorator that spaces out outbound sends.
///
/// Pacing lowers how often the platform answers with a flood wait; it does not
/// replace the copier's flood-wait handling.
pub struct ThrottledClient<C> {
    inner: C,
    sends: Mutex<IntervalLimiter>,
}

impl<C> ThrottledClient<C> {
    pub fn new(inner: C, min_interval: Duration) -> Self {
        Self {
            inner,
            sends: Mutex::new(IntervalLimiter::new(min_interval)),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn throttle(&self) {
        let wait = { self.sends.lock().await.reserve() };
        if wait > Duration::from_millis(0) {
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl<C: ChannelClient> ChannelClient for ThrottledClient<C> {
    type Handle = C::Handle;
    type Media = C::Media;
    type History = C::History;

    async fn join_invite(&self, token: &str) -> Result<()> {
        self.inner.join_invite(token).await
    }

    async fn resolve(&self, reference: &ChannelRef) -> Result<ResolvedChannel<Self::Handle>> {
        self.inner.resolve(reference).await
    }

    async fn history(&self, channel: &Self::Handle) -> Result<Self::History> {
        self.inner.history(channel).await
    }

    async fn send_text(&self, destination: &Self::Handle, text: &str) -> Result<()> {
        self.throttle().await;
        self.inner.send_text(destination, text).await
    }

    async fn send_media(
        &self,
        destination: &Self::Handle,
        media: &Self::Media,
        caption: &str,
    ) -> Result<()> {
        self.throttle().await;
        self.inner.send_media(destination, media, caption).await
    }
}
