use async_trait::async_trait;

use crate::{
    domain::ChannelRef,
    messaging::types::{ResolvedChannel, SourceMessage},
    Result,
};

/// Lazy cursor over a channel's history, oldest message first.
#[async_trait]
pub trait HistoryCursor: Send {
    type Media: Send + Sync;

    async fn next(&mut self) -> Result<Option<SourceMessage<Self::Media>>>;
}

/// Capabilities the copier needs from a messaging platform client.
///
/// The MTProto adapter is the production implementation; tests substitute an
/// in-memory fake. Send failures must be mapped to `Error::FloodWait` and
/// `Error::CaptionTooLong` where the platform reports them.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Opaque, cheap-to-clone address of a resolved channel.
    type Handle: Clone + Send + Sync;
    type Media: Send + Sync;
    type History: HistoryCursor<Media = Self::Media>;

    /// Join a channel through an invite token.
    async fn join_invite(&self, token: &str) -> Result<()>;

    async fn resolve(&self, reference: &ChannelRef) -> Result<ResolvedChannel<Self::Handle>>;

    /// Full history of `channel`, walked from oldest to newest.
    async fn history(&self, channel: &Self::Handle) -> Result<Self::History>;

    async fn send_text(&self, destination: &Self::Handle, text: &str) -> Result<()>;

    async fn send_media(
        &self,
        destination: &Self::Handle,
        media: &Self::Media,
        caption: &str,
    ) -> Result<()>;
}
