use std::{collections::HashMap, sync::Arc};

use {
    mirror_common::ChannelId,
    tokio::sync::RwLock,
    tracing::{debug, error, info},
};

use crate::{ChannelResolver, Error, RelayChannel, Result};

/// Resolve-once cache of channels used by the relay.
pub struct ChannelRegistry {
    resolver: Arc<dyn ChannelResolver>,
    channels: RwLock<HashMap<ChannelId, Arc<dyn RelayChannel>>>,
}

impl ChannelRegistry {
    pub fn new(resolver: Arc<dyn ChannelResolver>) -> Self {
        Self {
            resolver,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Cached channel, resolving it on first use. Failures are not cached.
    pub async fn get(&self, id: ChannelId) -> Result<Arc<dyn RelayChannel>> {
        if let Some(channel) = self.channels.read().await.get(&id) {
            return Ok(Arc::clone(channel));
        }

        let channel = self.resolver.resolve(id).await?;
        debug!(channel = %id, name = channel.name(), "channel resolved");
        let mut channels = self.channels.write().await;
        Ok(Arc::clone(channels.entry(id).or_insert(channel)))
    }

    /// Resolve every id once, returning the ids that failed with their errors.
    pub async fn preload(
        &self,
        ids: impl IntoIterator<Item = ChannelId>,
    ) -> Vec<(ChannelId, Error)> {
        let mut failed = Vec::new();
        let mut loaded = 0usize;
        for id in ids {
            match self.get(id).await {
                Ok(_) => loaded += 1,
                Err(e) => {
                    error!(channel = %id, error = %e, "failed to load channel");
                    failed.push((id, e));
                },
            }
        }
        info!(loaded, failed = failed.len(), "channels preloaded");
        failed
    }

    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }
}
