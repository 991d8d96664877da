//! The copy loop: walk each source channel oldest-first and re-post every
//! message not yet recorded in the sent-id store to the destination.
//!
//! Per message: fetch, filter (already sent / previously failed / empty),
//! dispatch (text, or media with caption), record. Flood waits suspend the
//! loop for the mandated duration and retry the same message.

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    domain::{ChannelRef, SentId},
    joiner::ensure_joined,
    messaging::{
        port::{ChannelClient, HistoryCursor},
        types::{MediaPayload, ResolvedChannel, SourceMessage},
    },
    retry::{sleep_or_cancel, RetryPolicy, Sleeper, TokioSleeper},
    store::IdStore,
    Error, Result,
};

/// Counters for one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: usize,
    pub already_sent: usize,
    pub previously_failed: usize,
    pub empty: usize,
    pub failed: usize,
    pub flood_waits: usize,
    pub sources_skipped: usize,
    pub cancelled: bool,
}

impl fmt::Display for CopyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "copied={} already_sent={} previously_failed={} empty={} failed={} flood_waits={} sources_skipped={}",
            self.copied,
            self.already_sent,
            self.previously_failed,
            self.empty,
            self.failed,
            self.flood_waits,
            self.sources_skipped
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

pub struct Copier<C, S> {
    client: C,
    sent: S,
    failed: Option<S>,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
    cancel: CancellationToken,
}

impl<C: ChannelClient, S: IdStore> Copier<C, S> {
    pub fn new(client: C, sent: S) -> Self {
        Self {
            client,
            sent,
            failed: None,
            policy: RetryPolicy::unbounded(),
            sleeper: Box::new(TokioSleeper),
            cancel: CancellationToken::new(),
        }
    }

    /// Record caption/generic send failures so later runs skip them.
    pub fn with_failed_store(mut self, failed: S) -> Self {
        self.failed = Some(failed);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn sent(&self) -> &S {
        &self.sent
    }

    pub fn failed(&self) -> Option<&S> {
        self.failed.as_ref()
    }

    /// Copy every source, in order, into `destination`.
    ///
    /// Only destination resolution and store I/O errors are fatal; problems
    /// with a single source or message are logged and counted.
    pub async fn run(&mut self, sources: &[String], destination: &str) -> Result<CopyReport> {
        let mut report = CopyReport::default();

        ensure_joined(&self.client, destination).await;
        let dest_ref = parse_ref(destination)?;
        let dest = self.client.resolve(&dest_ref).await?;

        for source in sources {
            match self.copy_source(source, &dest.handle, &mut report).await {
                Ok(()) => {}
                Err(Error::Cancelled) => {
                    warn!("run cancelled while processing {source}");
                    report.cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    async fn copy_source(
        &mut self,
        source: &str,
        dest: &C::Handle,
        report: &mut CopyReport,
    ) -> Result<()> {
        info!("processing source: {source}");
        ensure_joined(&self.client, source).await;

        let resolved = match self.resolve_source(source).await {
            Ok(r) => r,
            Err(e) => {
                error!("failed to resolve {source}: {e}");
                report.sources_skipped += 1;
                return Ok(());
            }
        };

        let mut history = match self.client.history(&resolved.handle).await {
            Ok(h) => h,
            Err(e) => {
                error!("failed to read history of {source}: {e}");
                report.sources_skipped += 1;
                return Ok(());
            }
        };

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let msg = match self.next_message(&mut history, report).await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    error!("history of {source} ended early: {e}");
                    report.sources_skipped += 1;
                    break;
                }
            };

            let id = SentId::for_message(&resolved.identity, msg.id);
            self.copy_message(&id, &msg, dest, report).await?;
        }

        Ok(())
    }

    async fn resolve_source(&self, source: &str) -> Result<ResolvedChannel<C::Handle>> {
        let reference = parse_ref(source)?;
        self.client.resolve(&reference).await
    }

    async fn copy_message(
        &mut self,
        id: &SentId,
        msg: &SourceMessage<C::Media>,
        dest: &C::Handle,
        report: &mut CopyReport,
    ) -> Result<()> {
        if self.sent.contains(id) {
            debug!("skipping already sent: {id}");
            report.already_sent += 1;
            return Ok(());
        }
        if self.failed.as_ref().is_some_and(|f| f.contains(id)) {
            debug!("skipping previously failed: {id}");
            report.previously_failed += 1;
            return Ok(());
        }
        if msg.is_empty() {
            warn!("skipped empty message: {id}");
            report.empty += 1;
            return Ok(());
        }

        match self.dispatch(dest, msg, report).await {
            Ok(()) => {
                self.sent.append(id)?;
                info!("copied: {id}");
                report.copied += 1;
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(Error::FloodWait(wait)) => {
                warn!(
                    "giving up on {id}: still rate limited after {} waits (next wait {}s)",
                    self.policy.max_flood_waits.unwrap_or_default(),
                    wait.as_secs()
                );
                report.failed += 1;
            }
            Err(Error::CaptionTooLong) => {
                warn!("caption too long for message: {id}, skipping");
                self.record_failure(id)?;
                report.failed += 1;
            }
            Err(e) => {
                warn!("error copying {id}: {e}");
                self.record_failure(id)?;
                report.failed += 1;
            }
        }

        Ok(())
    }

    /// Send one message, sleeping through flood waits as the policy allows.
    async fn dispatch(
        &self,
        dest: &C::Handle,
        msg: &SourceMessage<C::Media>,
        report: &mut CopyReport,
    ) -> Result<()> {
        let mut waits = 0u32;
        loop {
            let res = match &msg.media {
                Some(MediaPayload::Attachment(media)) => {
                    self.client.send_media(dest, media, &msg.text).await
                }
                Some(MediaPayload::WebPage) | None => self.client.send_text(dest, &msg.text).await,
            };

            match res {
                Err(Error::FloodWait(wait)) if self.policy.allows_wait(waits) => {
                    waits += 1;
                    report.flood_waits += 1;
                    warn!("flood wait: sleeping for {} seconds", wait.as_secs());
                    sleep_or_cancel(self.sleeper.as_ref(), wait, &self.cancel).await?;
                }
                other => return other,
            }
        }
    }

    /// Fetch the next message, sleeping through flood waits on history reads.
    async fn next_message(
        &self,
        history: &mut C::History,
        report: &mut CopyReport,
    ) -> Result<Option<SourceMessage<C::Media>>> {
        let mut waits = 0u32;
        loop {
            match history.next().await {
                Err(Error::FloodWait(wait)) if self.policy.allows_wait(waits) => {
                    waits += 1;
                    report.flood_waits += 1;
                    warn!(
                        "flood wait while reading history: sleeping for {} seconds",
                        wait.as_secs()
                    );
                    sleep_or_cancel(self.sleeper.as_ref(), wait, &self.cancel).await?;
                }
                other => return other,
            }
        }
    }

    fn record_failure(&mut self, id: &SentId) -> Result<()> {
        if let Some(failed) = self.failed.as_mut() {
            failed.append(id)?;
        }
        Ok(())
    }
}

fn parse_ref(raw: &str) -> Result<ChannelRef> {
    ChannelRef::parse(raw)
        .ok_or_else(|| Error::External(format!("not a channel reference: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{ChannelIdentity, MessageId};
    use crate::store::MemoryIdStore;
    use crate::testing::{FakeChannelClient, FakeMedia, RecordingSleeper, Sent};

    const DEST: &str = "https://t.me/+DestToken";
    const SRC: &str = "@source";

    fn text(id: i32, body: &str) -> SourceMessage<FakeMedia> {
        SourceMessage {
            id: MessageId(id),
            text: body.to_string(),
            media: None,
        }
    }

    fn source_id(id: i32) -> SentId {
        let channel = ChannelIdentity {
            username: Some("source".to_string()),
            id: 100,
        };
        SentId::for_message(&channel, MessageId(id))
    }

    fn client_with(messages: Vec<SourceMessage<FakeMedia>>) -> FakeChannelClient {
        let client = FakeChannelClient::default();
        client.add_channel("DestToken", None, 1, vec![]);
        client.add_channel("source", Some("source"), 100, messages);
        client
    }

    fn sources() -> Vec<String> {
        vec![SRC.to_string()]
    }

    #[tokio::test]
    async fn copies_in_chronological_order_and_records() {
        let client = client_with(vec![text(1, "a"), text(2, "b"), text(3, "c")]);
        let mut copier = Copier::new(client, MemoryIdStore::default());

        let report = copier.run(&sources(), DEST).await.unwrap();

        assert_eq!(report.copied, 3);
        assert_eq!(
            copier.client().sent(),
            vec![
                Sent::Text("a".to_string()),
                Sent::Text("b".to_string()),
                Sent::Text("c".to_string()),
            ]
        );
        assert_eq!(
            copier.sent().appended(),
            &[source_id(1), source_id(2), source_id(3)]
        );
    }

    #[tokio::test]
    async fn rerun_skips_everything_already_sent() {
        let messages = vec![text(1, "a"), text(2, "b")];
        let mut first = Copier::new(client_with(messages.clone()), MemoryIdStore::default());
        first.run(&sources(), DEST).await.unwrap();
        let store = first.sent().clone();

        let mut second = Copier::new(client_with(messages), store);
        let report = second.run(&sources(), DEST).await.unwrap();

        assert_eq!(report.copied, 0);
        assert_eq!(report.already_sent, 2);
        assert!(second.client().sent().is_empty());
    }

    #[tokio::test]
    async fn history_served_newest_first_is_copied_oldest_first() {
        let client = client_with(vec![
            text(5, "e"),
            text(1, "a"),
            text(4, "d"),
            text(2, "b"),
            text(3, "c"),
        ]);
        let mut copier = Copier::new(client, MemoryIdStore::default());

        let report = copier.run(&sources(), DEST).await.unwrap();

        assert_eq!(report.copied, 5);
        assert_eq!(
            copier.client().sent(),
            ["a", "b", "c", "d", "e"]
                .into_iter()
                .map(|t| Sent::Text(t.to_string()))
                .collect::<Vec<_>>()
        );
        assert_eq!(
            copier.sent().appended(),
            &[source_id(1), source_id(2), source_id(3), source_id(4), source_id(5)]
        );
    }

    #[tokio::test]
    async fn flood_wait_between_history_pages_resumes_without_duplicates() {
        let client = client_with(vec![text(1, "a"), text(2, "b"), text(3, "c"), text(4, "d")]);
        client.fail_history_page(1, Error::FloodWait(Duration::from_secs(4)));
        let sleeper = RecordingSleeper::default();
        let mut copier =
            Copier::new(client, MemoryIdStore::default()).with_sleeper(sleeper.clone());

        let report = copier.run(&sources(), DEST).await.unwrap();

        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(4)]);
        assert_eq!(report.flood_waits, 1);
        assert_eq!(report.copied, 4);
        assert_eq!(
            copier.sent().appended(),
            &[source_id(1), source_id(2), source_id(3), source_id(4)]
        );
    }

    #[tokio::test]
    async fn empty_messages_are_neither_sent_nor_recorded() {
        let client = client_with(vec![text(1, ""), text(2, "real")]);
        let mut copier = Copier::new(client, MemoryIdStore::default());

        let report = copier.run(&sources(), DEST).await.unwrap();

        assert_eq!(report.empty, 1);
        assert_eq!(report.copied, 1);
        assert_eq!(copier.sent().appended(), &[source_id(2)]);
    }

    #[tokio::test]
    async fn whitespace_only_text_is_copied() {
        let client = client_with(vec![text(1, "  "), text(2, "\n")]);
        let mut copier = Copier::new(client, MemoryIdStore::default());

        let report = copier.run(&sources(), DEST).await.unwrap();

        assert_eq!(report.empty, 0);
        assert_eq!(report.copied, 2);
        assert_eq!(
            copier.client().sent(),
            vec![Sent::Text("  ".to_string()), Sent::Text("\n".to_string())]
        );
    }

    #[tokio::test]
    async fn media_routing_by_variant() {
        let preview = SourceMessage {
            id: MessageId(1),
            text: "see https://example.com".to_string(),
            media: Some(MediaPayload::WebPage),
        };
        let photo = SourceMessage {
            id: MessageId(2),
            text: "caption".to_string(),
            media: Some(MediaPayload::Attachment(FakeMedia("photo-2".to_string()))),
        };
        let bare = SourceMessage {
            id: MessageId(3),
            text: String::new(),
            media: Some(MediaPayload::Attachment(FakeMedia("doc-3".to_string()))),
        };
        let client = client_with(vec![preview, photo, bare, text(4, "plain")]);
        let mut copier = Copier::new(client, MemoryIdStore::default());

        copier.run(&sources(), DEST).await.unwrap();

        assert_eq!(
            copier.client().sent(),
            vec![
                Sent::Text("see https://example.com".to_string()),
                Sent::Media("photo-2".to_string(), "caption".to_string()),
                Sent::Media("doc-3".to_string(), String::new()),
                Sent::Text("plain".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn flood_wait_sleeps_once_and_retries_same_message() {
        let client = client_with(vec![text(1, "a"), text(2, "b")]);
        client.fail_next_send(Error::FloodWait(Duration::from_secs(7)));
        let sleeper = RecordingSleeper::default();
        let mut copier =
            Copier::new(client, MemoryIdStore::default()).with_sleeper(sleeper.clone());

        let report = copier.run(&sources(), DEST).await.unwrap();

        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(7)]);
        assert_eq!(report.flood_waits, 1);
        assert_eq!(report.copied, 2);
        assert_eq!(copier.client().send_attempts(), 3);
        assert_eq!(copier.sent().appended(), &[source_id(1), source_id(2)]);
    }

    #[tokio::test]
    async fn bounded_policy_gives_up_without_recording() {
        let client = client_with(vec![text(1, "a"), text(2, "b")]);
        for _ in 0..3 {
            client.fail_next_send(Error::FloodWait(Duration::from_secs(1)));
        }
        let sleeper = RecordingSleeper::default();
        let mut copier = Copier::new(client, MemoryIdStore::default())
            .with_failed_store(MemoryIdStore::default())
            .with_retry_policy(RetryPolicy::bounded(2))
            .with_sleeper(sleeper.clone());

        let report = copier.run(&sources(), DEST).await.unwrap();

        assert_eq!(sleeper.sleeps().len(), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.copied, 1);
        assert_eq!(copier.sent().appended(), &[source_id(2)]);
        assert!(copier.failed().unwrap().appended().is_empty());
    }

    #[tokio::test]
    async fn caption_and_generic_errors_skip_without_marking_sent() {
        let client = client_with(vec![text(1, "a"), text(2, "b"), text(3, "c")]);
        client.fail_next_send(Error::CaptionTooLong);
        client.fail_next_send(Error::External("boom".to_string()));
        let mut copier = Copier::new(client, MemoryIdStore::default());

        let report = copier.run(&sources(), DEST).await.unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.copied, 1);
        assert_eq!(copier.sent().appended(), &[source_id(3)]);
    }

    #[tokio::test]
    async fn failed_store_skips_failures_on_rerun() {
        let client = client_with(vec![text(1, "a"), text(2, "b")]);
        client.fail_next_send(Error::CaptionTooLong);
        let mut first = Copier::new(client, MemoryIdStore::default())
            .with_failed_store(MemoryIdStore::default());
        first.run(&sources(), DEST).await.unwrap();
        assert_eq!(first.failed().unwrap().appended(), &[source_id(1)]);

        let sent = first.sent().clone();
        let failed = first.failed().unwrap().clone();
        let mut second = Copier::new(client_with(vec![text(1, "a"), text(2, "b")]), sent)
            .with_failed_store(failed);
        let report = second.run(&sources(), DEST).await.unwrap();

        assert_eq!(report.previously_failed, 1);
        assert_eq!(report.already_sent, 1);
        assert_eq!(second.client().send_attempts(), 0);
    }

    #[tokio::test]
    async fn unresolvable_source_is_skipped() {
        let client = client_with(vec![text(1, "a")]);
        let mut copier = Copier::new(client, MemoryIdStore::default());
        let sources = vec!["@missing".to_string(), SRC.to_string()];

        let report = copier.run(&sources, DEST).await.unwrap();

        assert_eq!(report.sources_skipped, 1);
        assert_eq!(report.copied, 1);
    }

    #[tokio::test]
    async fn unresolvable_destination_is_fatal() {
        let client = client_with(vec![text(1, "a")]);
        let mut copier = Copier::new(client, MemoryIdStore::default());

        let res = copier.run(&sources(), "@nowhere").await;

        assert!(res.is_err());
        assert!(copier.client().sent().is_empty());
    }

    #[tokio::test]
    async fn joins_invite_links_and_tolerates_join_failures() {
        let client = client_with(vec![text(1, "a")]);
        client.fail_joins();
        let mut copier = Copier::new(client, MemoryIdStore::default());

        let report = copier.run(&sources(), DEST).await.unwrap();

        assert_eq!(copier.client().join_attempts(), vec!["DestToken".to_string()]);
        assert_eq!(report.copied, 1);
    }

    #[tokio::test]
    async fn derived_id_used_when_source_has_no_handle() {
        let client = FakeChannelClient::default();
        client.add_channel("DestToken", None, 1, vec![]);
        client.add_channel("PrivToken", None, -1005550, vec![text(9, "x")]);
        let mut copier = Copier::new(client, MemoryIdStore::default());

        copier
            .run(&["https://t.me/+PrivToken".to_string()], DEST)
            .await
            .unwrap();

        assert_eq!(
            copier.sent().appended()[0].as_str(),
            "https://t.me/c1005550/9"
        );
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_message() {
        let client = client_with(vec![text(1, "a"), text(2, "b")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut copier =
            Copier::new(client, MemoryIdStore::default()).with_cancellation(cancel);

        let report = copier.run(&sources(), DEST).await.unwrap();

        assert!(report.cancelled);
        assert!(copier.client().sent().is_empty());
    }
}
