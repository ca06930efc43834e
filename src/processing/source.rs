use std::{collections::HashMap, sync::Arc, sync::Mutex};

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use chrono::DateTime;
use futures::stream::{self, Stream};
use serenity::all::{Attachment, Channel, ChannelId, Http, Message, MessageId};
use serenity::http::HttpBuilder;
use serenity::builder::GetMessages;
use tokio::time::Duration;

use crate::models::{DATE_FORMAT, MediaItem};

/// One batch of history, newest message first.
#[derive(Debug, Default)]
pub struct Page {
    pub items: Vec<MediaItem>,
    /// Cursor for the next (older) page; `None` once history is exhausted.
    pub next: Option<u64>,
}

/// Where media comes from. The download loop only sees this seam, so the
/// chat client stays out of the bookkeeping code.
#[async_trait]
pub trait MediaSource: Send + Sync {
    fn title(&self) -> &str;

    async fn fetch_page(&self, before: Option<u64>) -> Result<Page>;

    async fn fetch(&self, item: &MediaItem) -> Result<Vec<u8>>;
}

/// Walks the whole history of `source`, one page per stream item.
pub fn pages<S>(source: &S) -> impl Stream<Item = Result<Vec<MediaItem>>> + '_
where
    S: MediaSource + ?Sized,
{
    stream::try_unfold(Some(None), move |cursor: Option<Option<u64>>| async move {
        let Some(before) = cursor else {
            return Ok::<_, anyhow::Error>(None);
        };
        let page = source.fetch_page(before).await?;
        if page.items.is_empty() && page.next.is_none() {
            return Ok(None);
        }
        Ok(Some((page.items, page.next.map(Some))))
    })
}

pub struct DiscordSource {
    http: Arc<Http>,
    channel_id: ChannelId,
    title: String,
    page_size: u8,
    delay: Duration,
    /// Attachments seen on the current page, keyed by attachment id, until
    /// the download loop asks for their bytes.
    pending: Mutex<HashMap<String, Attachment>>,
}

impl DiscordSource {
    pub async fn connect(
        token: &str,
        proxy: Option<&str>,
        channel_id: u64,
        page_size: u8,
        delay: Duration,
    ) -> Result<Self> {
        let mut builder = HttpBuilder::new(token);
        if let Some(proxy) = proxy {
            println!("🌐 Using proxy: {proxy}");
            builder = builder.proxy(proxy);
        }
        let http = Arc::new(builder.build());
        let channel_id = ChannelId::new(channel_id);

        let title = match http.get_channel(channel_id).await.context("failed to access channel")? {
            Channel::Guild(c) => c.name,
            Channel::Private(c) => c.name(),
            _ => channel_id.to_string(),
        };
        println!("✅ Successfully found channel: {title}");

        Ok(Self {
            http,
            channel_id,
            title,
            page_size,
            delay,
            pending: Mutex::new(HashMap::new()),
        })
    }

    async fn fetch_messages(&self, before: Option<u64>) -> Result<Vec<Message>> {
        let request = GetMessages::default().limit(self.page_size);
        let request = match before {
            Some(id) => request.before(MessageId::new(id)),
            None => request,
        };

        self.channel_id.messages(self.http.as_ref(), request).await.map_err(Into::into)
    }
}

#[async_trait]
impl MediaSource for DiscordSource {
    fn title(&self) -> &str {
        &self.title
    }

    async fn fetch_page(&self, before: Option<u64>) -> Result<Page> {
        let messages = self.fetch_messages(before).await?;
        log::debug!("fetched {} messages before {:?}", messages.len(), before);

        let items = {
            let mut pending = self.pending.lock().map_err(|_| anyhow!("attachment cache poisoned"))?;
            pending.clear();

            let mut items = Vec::new();
            for msg in &messages {
                for attachment in &msg.attachments {
                    items.push(media_item(msg, attachment));
                    pending.insert(attachment.id.to_string(), attachment.clone());
                }
            }
            items
        };

        let next = messages.last().map(|m| m.id.get());
        if next.is_some() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Page { items, next })
    }

    async fn fetch(&self, item: &MediaItem) -> Result<Vec<u8>> {
        let attachment = self
            .pending
            .lock()
            .map_err(|_| anyhow!("attachment cache poisoned"))?
            .remove(&item.unique_id)
            .ok_or_else(|| anyhow!("attachment {} is not on the current page", item.unique_id))?;

        attachment.download().await.map_err(Into::into)
    }
}

fn media_item(msg: &Message, attachment: &Attachment) -> MediaItem {
    let date = DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default();

    MediaItem {
        unique_id: attachment.id.to_string(),
        message_id: msg.id.get(),
        file_name: Some(attachment.filename.clone()),
        message_text: msg.content.clone(),
        date,
        size: u64::from(attachment.size),
        mime_type: attachment.content_type.clone(),
        url: attachment.url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Paged {
        pages: Vec<Vec<&'static str>>,
        calls: AtomicUsize,
    }

    fn item(id: &str) -> MediaItem {
        MediaItem {
            unique_id: id.into(),
            message_id: 1,
            file_name: None,
            message_text: String::new(),
            date: String::new(),
            size: 0,
            mime_type: None,
            url: String::new(),
        }
    }

    #[async_trait]
    impl MediaSource for Paged {
        fn title(&self) -> &str {
            "paged"
        }

        async fn fetch_page(&self, before: Option<u64>) -> Result<Page> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let index = before.map_or(0, |b| b as usize);
            let Some(ids) = self.pages.get(index) else {
                return Ok(Page::default());
            };
            Ok(Page {
                items: ids.iter().map(|id| item(id)).collect(),
                next: Some(index as u64 + 1),
            })
        }

        async fn fetch(&self, _item: &MediaItem) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn pages_run_until_history_is_empty() {
        let source = Paged { pages: vec![vec!["a", "b"], vec![], vec!["c"]], calls: AtomicUsize::new(0) };
        let batches: Vec<Vec<MediaItem>> = pages(&source).try_collect().await.unwrap();

        let ids: Vec<Vec<&str>> = batches
            .iter()
            .map(|b| b.iter().map(|i| i.unique_id.as_str()).collect())
            .collect();
        assert_eq!(ids, vec![vec!["a", "b"], vec![], vec!["c"]]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }
}
