use std::sync::Arc;

use {
    async_trait::async_trait,
    mirror_channels::{
        AllowedMentions, ImpersonationEndpoint, OutboundPayload, RelayChannel, Result,
    },
    mirror_common::{Attachment, ChannelId, MessageId, MessageRef, SourceMessage},
    serenity::all::{
        self as discord, CreateAllowedMentions, CreateAttachment, CreateMessage, EditMessage,
        GetMessages, GuildChannel, Http,
    },
    tokio::sync::Mutex,
    tracing::debug,
};

use crate::{
    Error,
    convert::{create_embed, message_id, message_ref, source_message},
    resolver::Session,
    webhook::DiscordWebhook,
};

/// Discord caps a history page at 100 messages.
const MAX_PAGE: usize = 100;

#[derive(Debug, Clone)]
pub enum ChannelKind {
    /// Guild text or announcement channel, or a thread in one.
    Guild {
        channel: Box<GuildChannel>,
        /// Parent channel when this is a thread; webhooks live on the parent.
        thread_parent: Option<discord::ChannelId>,
    },
    /// Direct messages. No webhooks, and edits are not pushed.
    Direct,
}

pub struct DiscordChannel {
    id: discord::ChannelId,
    name: String,
    guild_name: Option<String>,
    kind: ChannelKind,
    session: Arc<Session>,
    webhook: Mutex<Option<Arc<DiscordWebhook>>>,
}

fn api(err: serenity::Error) -> mirror_channels::Error {
    Error::from(err).into()
}

/// Re-upload source attachments under their original file names.
pub(crate) async fn download_files(
    http: &Arc<Http>,
    files: &[Attachment],
) -> crate::Result<Vec<CreateAttachment>> {
    let mut attachments = Vec::with_capacity(files.len());
    for file in files {
        let mut attachment = CreateAttachment::url(http, &file.url).await?;
        attachment.filename = file.filename.clone();
        attachments.push(attachment);
    }
    Ok(attachments)
}

fn page_limit(limit: usize) -> u8 {
    u8::try_from(limit.clamp(1, MAX_PAGE)).unwrap_or(u8::MAX)
}

impl DiscordChannel {
    pub fn new(
        id: discord::ChannelId,
        name: String,
        guild_name: Option<String>,
        kind: ChannelKind,
        session: Arc<Session>,
    ) -> Self {
        Self {
            id,
            name,
            guild_name,
            kind,
            session,
            webhook: Mutex::new(None),
        }
    }

    fn can_manage_messages(&self) -> bool {
        match &self.kind {
            ChannelKind::Guild { channel, .. } => channel
                .permissions_for_user(&self.session.cache, self.session.self_id)
                .is_ok_and(|p| p.manage_messages()),
            ChannelKind::Direct => false,
        }
    }
}

#[async_trait]
impl RelayChannel for DiscordChannel {
    fn id(&self) -> ChannelId {
        ChannelId(self.id.get())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn guild_name(&self) -> Option<&str> {
        self.guild_name.as_deref()
    }

    fn pushes_edits(&self) -> bool {
        matches!(self.kind, ChannelKind::Guild { .. })
    }

    async fn send(&self, payload: &OutboundPayload) -> Result<MessageRef> {
        let http = &self.session.http;
        let mut builder = CreateMessage::new()
            .embeds(payload.embeds.iter().map(create_embed).collect())
            .add_files(download_files(http, &payload.files).await?);
        if !payload.content.is_empty() {
            builder = builder.content(&payload.content);
        }
        if payload.allowed_mentions == AllowedMentions::None {
            builder = builder.allowed_mentions(CreateAllowedMentions::new());
        }

        let sent = self.id.send_message(http, builder).await.map_err(api)?;
        Ok(message_ref(&sent))
    }

    async fn edit(&self, target: &MessageRef, payload: &OutboundPayload) -> Result<()> {
        let mut builder = EditMessage::new()
            .content(&payload.content)
            .embeds(payload.embeds.iter().map(create_embed).collect());
        if payload.allowed_mentions == AllowedMentions::None {
            builder = builder.allowed_mentions(CreateAllowedMentions::new());
        }

        self.id
            .edit_message(&self.session.http, message_id(target.id)?, builder)
            .await
            .map_err(api)?;
        Ok(())
    }

    async fn delete(&self, target: &MessageRef) -> Result<()> {
        self.id
            .delete_message(&self.session.http, message_id(target.id)?)
            .await
            .map_err(api)
    }

    async fn is_deletable(&self, target: &MessageRef) -> bool {
        let Ok(id) = message_id(target.id) else {
            return false;
        };
        match self.id.message(&self.session.http, id).await {
            Ok(message) => message.author.id == self.session.self_id || self.can_manage_messages(),
            Err(e) => {
                debug!(channel = %self.id, message_id = %target.id, error = %e, "message not found");
                false
            },
        }
    }

    async fn fetch_recent(
        &self,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<SourceMessage>> {
        let mut request = GetMessages::new().limit(page_limit(limit));
        if let Some(before) = before {
            request = request.before(message_id(before)?);
        }

        let messages = self
            .id
            .messages(&self.session.http, request)
            .await
            .map_err(api)?;
        Ok(messages
            .iter()
            .map(|m| source_message(m, &self.name, self.guild_name.as_deref()))
            .collect())
    }

    async fn impersonation(&self) -> Result<Option<Arc<dyn ImpersonationEndpoint>>> {
        let thread_parent = match &self.kind {
            ChannelKind::Guild { thread_parent, .. } => *thread_parent,
            ChannelKind::Direct => return Ok(None),
        };

        let mut cached = self.webhook.lock().await;
        if let Some(webhook) = cached.as_ref() {
            return Ok(Some(Arc::clone(webhook) as Arc<dyn ImpersonationEndpoint>));
        }

        let (owner, thread) = match thread_parent {
            Some(parent) => (parent, Some(self.id)),
            None => (self.id, None),
        };
        let webhook = Arc::new(
            DiscordWebhook::acquire(
                Arc::clone(&self.session.http),
                self.session.client.clone(),
                owner,
                thread,
                &self.session.webhook_name,
            )
            .await?,
        );
        *cached = Some(Arc::clone(&webhook));
        Ok(Some(webhook))
    }
}
