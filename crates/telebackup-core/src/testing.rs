//! In-memory test doubles for the platform port.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{ChannelIdentity, ChannelRef, MessageId},
    messaging::{
        paging::{OldestFirst, Page, PageSource},
        port::ChannelClient,
        types::{ResolvedChannel, SourceMessage},
    },
    retry::Sleeper,
    Error, Result,
};

#[derive(Clone, Debug, PartialEq)]
pub struct FakeMedia(pub String);

#[derive(Clone, Debug, PartialEq)]
pub enum Sent {
    Text(String),
    Media(String, String),
}

struct FakeChannel {
    identity: ChannelIdentity,
    messages: Vec<SourceMessage<FakeMedia>>,
}

#[derive(Default)]
struct FakeState {
    channels: HashMap<String, FakeChannel>,
    sent: Vec<Sent>,
    send_failures: VecDeque<Error>,
    send_attempts: usize,
    joins: Vec<String>,
    fail_joins: bool,
    page_failures: HashMap<usize, Error>,
}

/// History page size served by the fake, small so tests cross page boundaries.
pub const FAKE_PAGE_SIZE: usize = 2;

/// Channels are keyed by invite token, username or id string.
#[derive(Default)]
pub struct FakeChannelClient {
    state: Mutex<FakeState>,
}

impl FakeChannelClient {
    pub fn add_channel(
        &self,
        key: &str,
        username: Option<&str>,
        id: i64,
        messages: Vec<SourceMessage<FakeMedia>>,
    ) {
        self.state.lock().unwrap().channels.insert(
            key.to_string(),
            FakeChannel {
                identity: ChannelIdentity {
                    username: username.map(str::to_string),
                    id,
                },
                messages,
            },
        );
    }

    /// Queue an error for the next send attempt.
    pub fn fail_next_send(&self, err: Error) {
        self.state.lock().unwrap().send_failures.push_back(err);
    }

    pub fn fail_joins(&self) {
        self.state.lock().unwrap().fail_joins = true;
    }

    /// Fail the `index`th history page request (0-based, per `history()` call) once.
    pub fn fail_history_page(&self, index: usize, err: Error) {
        self.state.lock().unwrap().page_failures.insert(index, err);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.state.lock().unwrap().send_attempts
    }

    pub fn join_attempts(&self) -> Vec<String> {
        self.state.lock().unwrap().joins.clone()
    }

    fn record_send(&self, sent: Sent) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.send_attempts += 1;
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }
        state.sent.push(sent);
        Ok(())
    }
}

/// Serves a channel's messages the way the server does: fixed-size pages,
/// each one newest-first. Messages are kept in insertion order.
pub struct FakePages {
    messages: Vec<SourceMessage<FakeMedia>>,
    failures: HashMap<usize, Error>,
    requests: usize,
}

#[async_trait]
impl PageSource for FakePages {
    type Media = FakeMedia;

    async fn page_after(&mut self, after: MessageId) -> Result<Option<Page<FakeMedia>>> {
        let request = self.requests;
        self.requests += 1;
        if let Some(err) = self.failures.remove(&request) {
            return Err(err);
        }

        let mut window: Vec<_> = self.messages.iter().filter(|m| m.id > after).collect();
        window.sort_by_key(|m| m.id);
        window.truncate(FAKE_PAGE_SIZE);
        let Some(last) = window.last() else {
            return Ok(None);
        };
        let through = last.id;
        Ok(Some(Page {
            messages: window.into_iter().rev().cloned().collect(),
            through,
        }))
    }
}

#[async_trait]
impl ChannelClient for FakeChannelClient {
    type Handle = String;
    type Media = FakeMedia;
    type History = OldestFirst<FakePages>;

    async fn join_invite(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.joins.push(token.to_string());
        if state.fail_joins {
            return Err(Error::External("USER_ALREADY_PARTICIPANT".to_string()));
        }
        Ok(())
    }

    async fn resolve(&self, reference: &ChannelRef) -> Result<ResolvedChannel<String>> {
        let key = match reference {
            ChannelRef::Invite { token } => token.clone(),
            ChannelRef::Username(name) => name.clone(),
            ChannelRef::Id(id) => id.to_string(),
        };
        let state = self.state.lock().unwrap();
        let channel = state
            .channels
            .get(&key)
            .ok_or_else(|| Error::External(format!("no such channel: {key}")))?;
        Ok(ResolvedChannel {
            handle: key,
            identity: channel.identity.clone(),
        })
    }

    async fn history(&self, channel: &String) -> Result<OldestFirst<FakePages>> {
        let mut state = self.state.lock().unwrap();
        let messages = state
            .channels
            .get(channel)
            .ok_or_else(|| Error::External(format!("no such channel: {channel}")))?
            .messages
            .clone();
        Ok(OldestFirst::new(FakePages {
            messages,
            failures: std::mem::take(&mut state.page_failures),
            requests: 0,
        }))
    }

    async fn send_text(&self, _destination: &String, text: &str) -> Result<()> {
        self.record_send(Sent::Text(text.to_string()))
    }

    async fn send_media(
        &self,
        _destination: &String,
        media: &FakeMedia,
        caption: &str,
    ) -> Result<()> {
        self.record_send(Sent::Media(media.0.clone(), caption.to_string()))
    }
}

/// Records requested sleeps and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
