//! Discord event handler for serenity.
//!
//! Converts gateway events into platform-neutral messages and hands them to
//! the relay coordinator.

use std::sync::{Arc, Mutex};

use {
    mirror_common::{ChannelId, MessageId, MessageRef, UserId},
    mirror_relay::RelayCoordinator,
    serenity::{
        all::{
            self as discord, Context, EventHandler, GatewayIntents, GuildId, Message,
            MessageUpdateEvent, Ready,
        },
        async_trait,
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, trace, warn},
};

use crate::{
    DiscordResolver,
    convert::{DIRECT_MESSAGE_CHANNEL_NAME, source_message},
};

/// Handler for Discord gateway events.
pub struct RelayHandler {
    coordinator: Arc<RelayCoordinator>,
    resolver: Arc<DiscordResolver>,
    cancel: CancellationToken,
    reconciler: Mutex<Option<JoinHandle<()>>>,
}

impl RelayHandler {
    pub fn new(
        coordinator: Arc<RelayCoordinator>,
        resolver: Arc<DiscordResolver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            resolver,
            cancel,
            reconciler: Mutex::new(None),
        }
    }

    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
    }

    /// Stop the reconciliation loop and wait for it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .reconciler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "reconciliation task ended abnormally");
        }
    }

    /// Channel and guild names from the cache. Uncached channels fall back
    /// to their id.
    fn describe(ctx: &Context, msg: &Message) -> (String, Option<String>) {
        let Some(guild_id) = msg.guild_id else {
            return (DIRECT_MESSAGE_CHANNEL_NAME.to_string(), None);
        };
        let Some(guild) = ctx.cache.guild(guild_id) else {
            return (msg.channel_id.to_string(), None);
        };
        let channel_name = guild
            .channels
            .get(&msg.channel_id)
            .or_else(|| guild.threads.iter().find(|t| t.id == msg.channel_id))
            .map(|c| c.name.clone())
            .unwrap_or_else(|| msg.channel_id.to_string());
        (channel_name, Some(guild.name.clone()))
    }
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord session ready"
        );
        if !self
            .resolver
            .attach(Arc::clone(&ctx.http), Arc::clone(&ctx.cache), ready.user.id)
        {
            debug!("discord session resumed");
        }

        self.coordinator.start(UserId(ready.user.id.get())).await;

        let mut reconciler = self.reconciler.lock().unwrap_or_else(|e| e.into_inner());
        if reconciler.is_none() {
            *reconciler = Some(self.coordinator.spawn_reconciler(self.cancel.clone()));
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let (channel_name, guild_name) = Self::describe(&ctx, &msg);
        let source = source_message(&msg, &channel_name, guild_name.as_deref());
        let delivered = self.coordinator.on_message_created(&source).await;
        trace!(message_id = %msg.id, delivered, "message handled");
    }

    async fn message_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let original = MessageRef::new(
            ChannelId(event.channel_id.get()),
            MessageId(event.id.get()),
        );
        if !self.coordinator.tracker().is_watched(original) {
            return;
        }

        // The update event may be partial; fetch the whole message.
        let msg = match event.channel_id.message(&ctx.http, event.id).await {
            Ok(msg) => msg,
            Err(e) => {
                warn!(
                    channel = %event.channel_id,
                    message_id = %event.id,
                    error = %e,
                    "cannot fetch edited message"
                );
                return;
            },
        };
        let (channel_name, guild_name) = Self::describe(&ctx, &msg);
        let source = source_message(&msg, &channel_name, guild_name.as_deref());
        let updated = self.coordinator.on_message_updated(&source).await;
        debug!(message_id = %msg.id, updated, "edit handled");
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: discord::ChannelId,
        deleted_message_id: discord::MessageId,
        _guild_id: Option<GuildId>,
    ) {
        let original = MessageRef::new(
            ChannelId(channel_id.get()),
            MessageId(deleted_message_id.get()),
        );
        let deleted = self.coordinator.on_message_deleted(original).await;
        debug!(message_id = %deleted_message_id, deleted, "delete handled");
    }
}
