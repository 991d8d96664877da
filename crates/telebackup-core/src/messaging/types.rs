use crate::domain::{ChannelIdentity, MessageId};

/// A channel handle returned by resolution, plus the identity used for dedup keys.
#[derive(Clone, Debug)]
pub struct ResolvedChannel<H> {
    pub handle: H,
    pub identity: ChannelIdentity,
}

/// Media attached to a source message.
///
/// `M` is the adapter's opaque media token; the core only ever hands it back
/// to `send_media`.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaPayload<M> {
    /// Link preview card generated from the text. Not a real attachment.
    WebPage,
    Attachment(M),
}

/// A message read from a source channel's history.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceMessage<M> {
    pub id: MessageId,
    pub text: String,
    pub media: Option<MediaPayload<M>>,
}

impl<M> SourceMessage<M> {
    /// Neither text nor media. Whitespace-only text still counts as content.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.media.is_none()
    }
}
