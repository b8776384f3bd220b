use std::sync::Arc;

use {
    async_trait::async_trait,
    mirror_common::{Attachment, ChannelId, Embed, MessageId, MessageRef, SourceMessage},
};

use crate::Result;

// ── Outbound payload ────────────────────────────────────────────────────────

/// Mention resolution policy for an outbound message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AllowedMentions {
    /// No `@user`, `@role` or `@everyone` is resolved.
    #[default]
    None,
    /// Leave mention resolution to the platform.
    PlatformDefault,
}

/// Destination-ready message produced by the formatting pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundPayload {
    pub content: String,
    pub embeds: Vec<Embed>,
    /// Files re-uploaded from their source URL.
    pub files: Vec<Attachment>,
    pub allowed_mentions: AllowedMentions,
}

impl OutboundPayload {
    /// Whether sending this payload would produce an empty message.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.embeds.is_empty() && self.files.is_empty()
    }
}

/// Display identity used by impersonation delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub username: String,
    pub avatar_url: Option<String>,
}

// ── Capabilities ────────────────────────────────────────────────────────────

/// A text-capable channel (guild text channel, thread, DM).
#[async_trait]
pub trait RelayChannel: Send + Sync {
    fn id(&self) -> ChannelId;

    /// Channel name without the leading `#`.
    fn name(&self) -> &str;

    /// Name of the server the channel belongs to; `None` for DMs.
    fn guild_name(&self) -> Option<&str>;

    /// Whether the platform emits update notifications for edits in this
    /// channel. Channels that do not are polled by the reconciliation loop.
    fn pushes_edits(&self) -> bool;

    /// Send as the relay's own account.
    async fn send(&self, payload: &OutboundPayload) -> Result<MessageRef>;

    /// Edit a message previously sent with [`send`](Self::send).
    async fn edit(&self, target: &MessageRef, payload: &OutboundPayload) -> Result<()>;

    async fn delete(&self, target: &MessageRef) -> Result<()>;

    /// Whether the relay may delete `target` (it still exists and the relay
    /// owns it or holds the permission to remove it).
    async fn is_deletable(&self, _target: &MessageRef) -> bool {
        true
    }

    /// Newest-first page of messages, optionally strictly older than `before`.
    async fn fetch_recent(
        &self,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<SourceMessage>>;

    /// Impersonation endpoint for this channel, if one can be obtained.
    ///
    /// `Ok(None)` means the channel kind has no such capability (DMs);
    /// errors mean acquisition failed this time.
    async fn impersonation(&self) -> Result<Option<Arc<dyn ImpersonationEndpoint>>>;
}

/// Custom-identity delivery path of a channel (a webhook on Discord).
#[async_trait]
pub trait ImpersonationEndpoint: Send + Sync {
    async fn send(&self, payload: &OutboundPayload, persona: &Persona) -> Result<MessageRef>;

    /// Edit a message previously sent through this endpoint. Attachments
    /// already on the message are kept.
    async fn edit(&self, target: &MessageRef, payload: &OutboundPayload) -> Result<()>;
}

/// Looks channels up by id on the live chat session.
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    /// Fails with [`Error::NotTextChannel`](crate::Error::NotTextChannel) when
    /// the id exists but cannot carry messages.
    async fn resolve(&self, id: ChannelId) -> Result<Arc<dyn RelayChannel>>;
}
