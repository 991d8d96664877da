//! Oldest-first history built from pages.
//!
//! Platforms serve history newest-first. `OldestFirst` asks its source for one
//! page of messages newer than the last id it has seen, orders that page by
//! id and yields from it before fetching the next one, so only a single page
//! is ever held in memory.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::{
    domain::MessageId,
    messaging::{port::HistoryCursor, types::SourceMessage},
    Result,
};

/// One page of history.
#[derive(Clone, Debug)]
pub struct Page<M> {
    /// Messages in whatever order the server returned them.
    pub messages: Vec<SourceMessage<M>>,
    /// Highest id covered by this page, including ids that turned out deleted.
    pub through: MessageId,
}

#[async_trait]
pub trait PageSource: Send {
    type Media: Send + Sync;

    /// The page of messages right after `after`, or `None` once history is exhausted.
    ///
    /// A failed call must leave the source able to serve the same page again.
    async fn page_after(&mut self, after: MessageId) -> Result<Option<Page<Self::Media>>>;
}

pub struct OldestFirst<P: PageSource> {
    source: P,
    after: MessageId,
    buffer: VecDeque<SourceMessage<P::Media>>,
    done: bool,
}

impl<P: PageSource> OldestFirst<P> {
    pub fn new(source: P) -> Self {
        Self {
            source,
            after: MessageId(0),
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub fn source(&self) -> &P {
        &self.source
    }
}

#[async_trait]
impl<P: PageSource> HistoryCursor for OldestFirst<P> {
    type Media = P::Media;

    async fn next(&mut self) -> Result<Option<SourceMessage<P::Media>>> {
        loop {
            if let Some(msg) = self.buffer.pop_front() {
                return Ok(Some(msg));
            }
            if self.done {
                return Ok(None);
            }

            let Some(page) = self.source.page_after(self.after).await? else {
                self.done = true;
                continue;
            };
            // A page that does not move forward would loop forever.
            if page.through <= self.after {
                self.done = true;
                continue;
            }

            let after = self.after;
            let mut messages: Vec<_> = page
                .messages
                .into_iter()
                .filter(|m| m.id > after && m.id <= page.through)
                .collect();
            messages.sort_by_key(|m| m.id);

            self.after = page.through;
            self.buffer.extend(messages);
        }
    }
}
