use std::sync::{Arc, OnceLock};

use {
    async_trait::async_trait,
    mirror_channels::{ChannelResolver, Error, RelayChannel, Result},
    mirror_common::ChannelId,
    serenity::all::{self as discord, Cache, ChannelType, Http},
    tracing::debug,
};

use crate::{
    DiscordChannel,
    channel::ChannelKind,
    convert::{self, DIRECT_MESSAGE_CHANNEL_NAME},
};

/// Handles of the live gateway session shared by every resolved channel.
pub struct Session {
    pub http: Arc<Http>,
    pub cache: Arc<Cache>,
    pub client: reqwest::Client,
    /// The relay's own account.
    pub self_id: discord::UserId,
    /// Name of the webhooks used for impersonation.
    pub webhook_name: String,
}

/// Resolves channel ids through the Discord API.
///
/// The serenity client only exists once the gateway connects, so the
/// resolver is created empty and [`attach`](Self::attach)ed on ready.
pub struct DiscordResolver {
    webhook_name: String,
    client: reqwest::Client,
    session: OnceLock<Arc<Session>>,
}

impl DiscordResolver {
    pub fn new(webhook_name: impl Into<String>) -> Self {
        Self {
            webhook_name: webhook_name.into(),
            client: reqwest::Client::new(),
            session: OnceLock::new(),
        }
    }

    /// Bind the resolver to the gateway session. Returns `false` when a
    /// session was already attached (reconnects reuse the first one).
    pub fn attach(&self, http: Arc<Http>, cache: Arc<Cache>, self_id: discord::UserId) -> bool {
        self.session
            .set(Arc::new(Session {
                http,
                cache,
                client: self.client.clone(),
                self_id,
                webhook_name: self.webhook_name.clone(),
            }))
            .is_ok()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.session.get().is_some()
    }
}

/// Thread parent for threads, `None` for plain text channels, and an error
/// for everything that cannot hold messages.
fn text_channel_parent(
    id: ChannelId,
    kind: ChannelType,
    parent: Option<discord::ChannelId>,
) -> Result<Option<discord::ChannelId>> {
    match kind {
        ChannelType::Text | ChannelType::News => Ok(None),
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread => {
            Ok(parent)
        },
        _ => Err(Error::not_text_channel(id)),
    }
}

#[async_trait]
impl ChannelResolver for DiscordResolver {
    async fn resolve(&self, id: ChannelId) -> Result<Arc<dyn RelayChannel>> {
        let session = self
            .session
            .get()
            .cloned()
            .ok_or_else(|| Error::unavailable("discord session not ready"))?;

        let channel = session
            .http
            .get_channel(convert::channel_id(id)?)
            .await
            .map_err(|e| Error::unavailable(format!("cannot load channel {id}: {e}")))?;

        let resolved = match channel {
            discord::Channel::Guild(channel) => {
                let thread_parent = text_channel_parent(id, channel.kind, channel.parent_id)?;
                let cached = session.cache.guild(channel.guild_id).map(|g| g.name.clone());
                let guild_name = match cached {
                    Some(name) => Some(name),
                    None => channel
                        .guild_id
                        .to_partial_guild(&session.http)
                        .await
                        .ok()
                        .map(|g| g.name),
                };
                debug!(channel = %id, name = %channel.name, guild = ?guild_name, "resolved guild channel");
                DiscordChannel::new(
                    channel.id,
                    channel.name.clone(),
                    guild_name,
                    ChannelKind::Guild {
                        channel: Box::new(channel),
                        thread_parent,
                    },
                    Arc::clone(&session),
                )
            },
            discord::Channel::Private(channel) => {
                debug!(channel = %id, "resolved direct message channel");
                DiscordChannel::new(
                    channel.id,
                    DIRECT_MESSAGE_CHANNEL_NAME.to_string(),
                    None,
                    ChannelKind::Direct,
                    Arc::clone(&session),
                )
            },
            _ => return Err(Error::not_text_channel(id)),
        };
        Ok(Arc::new(resolved))
    }
}
