//! Edit/delete synchronization between originals and their forwarded copies.
//!
//! Every forwarded copy on a route with `allowEdit` or `allowDelete` gets a
//! [`WatchEntry`] in the persisted watch-list. Edits are detected by comparing
//! a digest of the original's visible content; deletes are matched by the
//! original's identity.

use std::{collections::HashSet, sync::Arc, time::Duration};

#[cfg(feature = "metrics")]
use mirror_metrics::{counter, gauge, relay as relay_metrics, store as store_metrics};
use {
    mirror_channels::{ChannelRegistry, RelayChannel},
    mirror_common::{ChannelId, MessageId, MessageRef, SourceMessage},
    mirror_config::RouteOptions,
    mirror_store::PersistentStore,
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    tracing::{debug, info, warn},
};

use crate::{Delivered, DeliveryEngine, Result};

/// Pairing of an original message and one forwarded copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    /// The forwarded copy.
    #[serde(rename = "message")]
    pub forwarded: MessageRef,
    #[serde(rename = "originalMessage")]
    pub original: MessageRef,
    /// Options the copy was delivered with.
    pub options: RouteOptions,
    /// [`content_hash`] of the original as last forwarded.
    pub hash: String,
}

/// Root of the persisted document.
///
/// Keys other than the watch-list are preserved untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchDocument {
    #[serde(default)]
    pub msg_watch: Vec<WatchEntry>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Digest over everything an edit can change in the forwarded copy.
#[must_use]
pub fn content_hash(message: &SourceMessage) -> String {
    let author = &message.author;
    let embeds = message
        .embeds
        .iter()
        .map(|e| serde_json::to_string(e).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(",");

    let mut hasher = Sha256::new();
    hasher.update(author.name.as_bytes());
    hasher.update(author.discriminator.as_deref().unwrap_or_default().as_bytes());
    hasher.update(author.avatar_url.as_bytes());
    hasher.update(message.content.as_bytes());
    hasher.update(b": ");
    hasher.update(embeds.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct EditSyncTracker {
    store: Arc<PersistentStore<WatchDocument>>,
    engine: Arc<DeliveryEngine>,
    channels: Arc<ChannelRegistry>,
}

impl EditSyncTracker {
    pub fn new(
        store: Arc<PersistentStore<WatchDocument>>,
        engine: Arc<DeliveryEngine>,
        channels: Arc<ChannelRegistry>,
    ) -> Self {
        let tracker = Self {
            store,
            engine,
            channels,
        };
        tracker.report_len();
        tracker
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read(|doc| doc.msg_watch.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the watch-list, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<WatchEntry> {
        self.store.read(|doc| doc.msg_watch.clone())
    }

    /// Start watching a freshly forwarded copy.
    ///
    /// The list is trimmed from the oldest end down to the route's
    /// `editTrackingMaxMsg`.
    pub fn record(&self, original: &SourceMessage, delivered: Delivered) {
        if !delivered.options.tracks_changes() {
            return;
        }

        let limit = delivered.options.edit_tracking_max_msg;
        let entry = WatchEntry {
            forwarded: delivered.sent,
            original: original.reference(),
            hash: content_hash(original),
            options: delivered.options,
        };

        let evicted = self.store.update(|doc| {
            doc.msg_watch.push(entry);
            let excess = doc.msg_watch.len().saturating_sub(limit);
            doc.msg_watch.drain(..excess).count()
        });
        if evicted > 0 {
            debug!(evicted, limit, "oldest watch entries evicted");
        }
        self.report_len();
    }

    /// Propagate a new version of `message` to every copy whose stored hash
    /// differs. Returns the number of copies updated.
    ///
    /// Stored hashes are refreshed before re-delivery: a copy that fails to
    /// update is logged and not retried until the original changes again.
    pub async fn on_source_edited(&self, message: &SourceMessage) -> usize {
        let reference = message.reference();
        let hash = content_hash(message);

        let stale: Vec<WatchEntry> = self.store.update(|doc| {
            doc.msg_watch
                .iter_mut()
                .filter(|e| e.original.id == reference.id && e.hash != hash)
                .map(|e| {
                    e.hash.clone_from(&hash);
                    e.original = reference;
                    e.clone()
                })
                .collect()
        });

        let mut updated = 0;
        for entry in stale.iter().filter(|e| e.options.allow_edit) {
            match self.redeliver(entry, message).await {
                Ok(()) => updated += 1,
                Err(e) => warn!(
                    original = %reference.id,
                    forwarded = %entry.forwarded.id,
                    destination = %entry.forwarded.channel_id,
                    error = %e,
                    "failed to propagate edit"
                ),
            }
        }

        if updated > 0 {
            info!(original = %reference.id, copies = updated, "edit propagated");
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::EDITS_PROPAGATED_TOTAL).increment(updated as u64);
        }
        updated
    }

    async fn redeliver(&self, entry: &WatchEntry, message: &SourceMessage) -> Result<()> {
        let channel = self.channels.get(entry.forwarded.channel_id).await?;
        self.engine
            .deliver(&*channel, message, &entry.options, Some(&entry.forwarded))
            .await?;
        Ok(())
    }

    /// Remove the copies of a deleted original on routes with `allowDelete`.
    /// Returns the number of copies deleted.
    ///
    /// An entry is dropped only once its copy is gone; entries on other
    /// routes stay.
    pub async fn on_source_deleted(&self, original: MessageRef) -> usize {
        let matching: Vec<WatchEntry> = self.store.read(|doc| {
            doc.msg_watch
                .iter()
                .filter(|e| e.original == original && e.options.allow_delete)
                .cloned()
                .collect()
        });

        let mut deleted = 0;
        for entry in matching {
            match self.delete_copy(&entry).await {
                Ok(true) => {
                    self.store.update(|doc| {
                        doc.msg_watch
                            .retain(|e| !(e.forwarded == entry.forwarded && e.original == original));
                    });
                    deleted += 1;
                },
                Ok(false) => debug!(
                    forwarded = %entry.forwarded.id,
                    "forwarded copy is not deletable, keeping it"
                ),
                Err(e) => warn!(
                    original = %original.id,
                    forwarded = %entry.forwarded.id,
                    error = %e,
                    "failed to propagate delete"
                ),
            }
        }

        if deleted > 0 {
            info!(original = %original.id, copies = deleted, "delete propagated");
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::DELETES_PROPAGATED_TOTAL).increment(deleted as u64);
            self.report_len();
        }
        deleted
    }

    async fn delete_copy(&self, entry: &WatchEntry) -> Result<bool> {
        let channel = self.channels.get(entry.forwarded.channel_id).await?;
        if !channel.is_deletable(&entry.forwarded).await {
            return Ok(false);
        }
        channel.delete(&entry.forwarded).await?;
        Ok(true)
    }

    /// Whether any forwarded copy of `original` is being tracked.
    #[must_use]
    pub fn is_watched(&self, original: MessageRef) -> bool {
        self.store
            .read(|doc| doc.msg_watch.iter().any(|e| e.original == original))
    }

    /// Ids of watched originals posted in `source`.
    #[must_use]
    pub fn watched_in(&self, source: ChannelId) -> HashSet<MessageId> {
        self.store.read(|doc| {
            doc.msg_watch
                .iter()
                .filter(|e| e.original.channel_id == source)
                .map(|e| e.original.id)
                .collect()
        })
    }

    /// Re-check recent messages of a channel that does not push edits.
    ///
    /// Fetches newest first, `page_size` at a time. Paging only continues
    /// when the first page is full, and stops at `depth` messages or at a
    /// page that adds nothing. Sleeps `entry_delay` after each watched
    /// message compared. Returns the number of copies updated.
    pub async fn reconcile(
        &self,
        source: &dyn RelayChannel,
        depth: usize,
        page_size: usize,
        entry_delay: Duration,
    ) -> Result<usize> {
        let watched = self.watched_in(source.id());
        if watched.is_empty() || depth == 0 {
            return Ok(0);
        }

        let recent = fetch_depth(source, depth, page_size).await?;
        let mut updated = 0;
        for message in recent.iter().filter(|m| watched.contains(&m.id)) {
            updated += self.on_source_edited(message).await;
            tokio::time::sleep(entry_delay).await;
        }
        Ok(updated)
    }

    fn report_len(&self) {
        #[cfg(feature = "metrics")]
        gauge!(store_metrics::WATCH_ENTRIES).set(self.len() as f64);
    }
}

async fn fetch_depth(
    source: &dyn RelayChannel,
    depth: usize,
    page_size: usize,
) -> Result<Vec<SourceMessage>> {
    let mut messages = source.fetch_recent(None, page_size).await?;
    if messages.len() < page_size {
        return Ok(messages);
    }

    while messages.len() < depth {
        let Some(oldest) = messages.last().map(|m| m.id) else {
            break;
        };
        let page = source.fetch_recent(Some(oldest), page_size).await?;
        if page.is_empty() {
            break;
        }
        messages.extend(page);
    }
    Ok(messages)
}
