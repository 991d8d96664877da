//! MTProto adapter (grammers).
//!
//! This crate implements the `telebackup-core` ChannelClient port over a
//! Telegram user account. A bot account cannot read channel history or join
//! through invite links, so the Bot API is not an option here.

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use grammers_client::{
    types::{Chat, Media, Message},
    Client, InputMessage, InvocationError,
};
use grammers_session::{PackedChat, PackedType};
use grammers_tl_types as tl;
use tracing::debug;

pub mod auth;

use telebackup_core::{
    domain::{ChannelIdentity, ChannelRef, MessageId},
    errors::Error,
    messaging::{
        paging::{OldestFirst, Page, PageSource},
        port::ChannelClient,
        types::{MediaPayload, ResolvedChannel, SourceMessage},
    },
    Result,
};

pub struct MtprotoClient {
    client: Client,
    session_path: PathBuf,
}

impl MtprotoClient {
    pub fn new(client: Client, session_path: PathBuf) -> Self {
        Self {
            client,
            session_path,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Persist the session so the next run skips sign-in.
    pub fn save_session(&self) -> Result<()> {
        self.client.session().save_to_file(&self.session_path)?;
        Ok(())
    }

    async fn resolve_invite(&self, token: &str) -> Result<ResolvedChannel<PackedChat>> {
        let invite = self
            .client
            .invoke(&tl::functions::messages::CheckChatInvite {
                hash: token.to_string(),
            })
            .await
            .map_err(map_err)?;

        match invite {
            tl::enums::ChatInvite::Already(tl::types::ChatInviteAlready { chat })
            | tl::enums::ChatInvite::Peek(tl::types::ChatInvitePeek { chat, .. }) => {
                resolved_from_raw(chat)
            }
            tl::enums::ChatInvite::Invite(_) => Err(Error::External(format!(
                "not a member of the chat behind invite {token}"
            ))),
        }
    }

    async fn resolve_id(&self, id: i64) -> Result<ResolvedChannel<PackedChat>> {
        let bare = bare_chat_id(id);
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await.map_err(map_err)? {
            let chat = dialog.chat();
            if chat.id() == bare {
                return Ok(resolved_from_chat(chat));
            }
        }
        Err(Error::External(format!("no dialog with id {id}")))
    }
}

/// Strip the Bot API `-100` channel prefix (or the `-` group sign) from an id.
pub fn bare_chat_id(id: i64) -> i64 {
    if id >= 0 {
        return id;
    }
    let digits = id.unsigned_abs().to_string();
    digits
        .strip_prefix("100")
        .filter(|rest| !rest.is_empty())
        .and_then(|rest| rest.parse::<i64>().ok())
        .unwrap_or_else(|| id.saturating_abs())
}

/// Map grammers errors onto the variants the copier understands.
pub fn map_err(e: InvocationError) -> Error {
    match &e {
        InvocationError::Rpc(rpc) if is_flood_wait(&rpc.name) => {
            Error::FloodWait(Duration::from_secs(u64::from(rpc.value.unwrap_or(0))))
        }
        InvocationError::Rpc(rpc) if rpc.name == "MEDIA_CAPTION_TOO_LONG" => Error::CaptionTooLong,
        _ => Error::External(format!("telegram error: {e}")),
    }
}

fn is_flood_wait(name: &str) -> bool {
    matches!(name, "FLOOD_WAIT" | "FLOOD_PREMIUM_WAIT" | "SLOWMODE_WAIT")
}

fn resolved_from_chat(chat: &Chat) -> ResolvedChannel<PackedChat> {
    ResolvedChannel {
        handle: chat.pack(),
        identity: ChannelIdentity {
            username: chat.username().map(str::to_string),
            id: chat.id(),
        },
    }
}

fn resolved_from_raw(chat: tl::enums::Chat) -> Result<ResolvedChannel<PackedChat>> {
    match chat {
        tl::enums::Chat::Channel(c) => {
            let ty = if c.megagroup {
                PackedType::Megagroup
            } else if c.gigagroup {
                PackedType::Gigagroup
            } else {
                PackedType::Broadcast
            };
            Ok(ResolvedChannel {
                handle: PackedChat {
                    ty,
                    id: c.id,
                    access_hash: c.access_hash,
                },
                identity: ChannelIdentity {
                    username: c.username,
                    id: c.id,
                },
            })
        }
        tl::enums::Chat::Chat(c) => Ok(ResolvedChannel {
            handle: PackedChat {
                ty: PackedType::Chat,
                id: c.id,
                access_hash: None,
            },
            identity: ChannelIdentity {
                username: None,
                id: c.id,
            },
        }),
        _ => Err(Error::External("chat is not accessible".to_string())),
    }
}

fn to_source_message(msg: &Message) -> SourceMessage<Media> {
    let media = msg.media().map(|media| match media {
        Media::WebPage(_) => MediaPayload::WebPage,
        other => MediaPayload::Attachment(other),
    });
    SourceMessage {
        id: MessageId(msg.id()),
        text: msg.text().to_string(),
        media,
    }
}

/// Message ids requested per `GetMessages` call (server maximum).
const PAGE_SIZE: i32 = 100;

/// Ids `after+1 ..= min(after+PAGE_SIZE, top)`, or `None` once past `top`.
fn id_window(after: MessageId, top: i32) -> Option<(Vec<i32>, MessageId)> {
    if after.0 >= top {
        return None;
    }
    let last = after.0.saturating_add(PAGE_SIZE).min(top);
    Some(((after.0 + 1..=last).collect(), MessageId(last)))
}

/// Reads a channel in id windows, starting at the oldest message.
///
/// The newest id is looked up on the first request; messages posted after
/// that are left for the next run.
pub struct MtprotoPages {
    client: Client,
    chat: PackedChat,
    top: Option<i32>,
}

impl MtprotoPages {
    async fn top_id(&mut self) -> Result<i32> {
        if let Some(top) = self.top {
            return Ok(top);
        }
        let mut newest = self.client.iter_messages(self.chat).limit(1);
        let top = newest
            .next()
            .await
            .map_err(map_err)?
            .map(|m| m.id())
            .unwrap_or(0);
        debug!("newest message id: {top}");
        self.top = Some(top);
        Ok(top)
    }
}

#[async_trait]
impl PageSource for MtprotoPages {
    type Media = Media;

    async fn page_after(&mut self, after: MessageId) -> Result<Option<Page<Media>>> {
        let top = self.top_id().await?;
        let Some((ids, through)) = id_window(after, top) else {
            return Ok(None);
        };
        let messages = self
            .client
            .get_messages_by_id(self.chat, &ids)
            .await
            .map_err(map_err)?
            .into_iter()
            .flatten()
            .map(|m| to_source_message(&m))
            .collect::<Vec<_>>();
        debug!("fetched {} messages up to id {}", messages.len(), through.0);
        Ok(Some(Page { messages, through }))
    }
}

#[async_trait]
impl ChannelClient for MtprotoClient {
    type Handle = PackedChat;
    type Media = Media;
    type History = OldestFirst<MtprotoPages>;

    async fn join_invite(&self, token: &str) -> Result<()> {
        self.client
            .invoke(&tl::functions::messages::ImportChatInvite {
                hash: token.to_string(),
            })
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn resolve(&self, reference: &ChannelRef) -> Result<ResolvedChannel<PackedChat>> {
        match reference {
            ChannelRef::Invite { token } => self.resolve_invite(token).await,
            ChannelRef::Username(name) => {
                let chat = self
                    .client
                    .resolve_username(name)
                    .await
                    .map_err(map_err)?
                    .ok_or_else(|| Error::External(format!("username not found: {name}")))?;
                Ok(resolved_from_chat(&chat))
            }
            ChannelRef::Id(id) => self.resolve_id(*id).await,
        }
    }

    async fn history(&self, channel: &PackedChat) -> Result<OldestFirst<MtprotoPages>> {
        Ok(OldestFirst::new(MtprotoPages {
            client: self.client.clone(),
            chat: *channel,
            top: None,
        }))
    }

    async fn send_text(&self, destination: &PackedChat, text: &str) -> Result<()> {
        self.client
            .send_message(*destination, InputMessage::text(text))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn send_media(
        &self,
        destination: &PackedChat,
        media: &Media,
        caption: &str,
    ) -> Result<()> {
        self.client
            .send_message(*destination, InputMessage::text(caption).copy_media(media))
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
