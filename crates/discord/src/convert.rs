//! Conversions between serenity's model and the platform-neutral one.

use std::num::NonZeroU64;

use {
    chrono::{DateTime, Utc},
    mirror_common::{
        Attachment, Author, ChannelId, Embed, MessageId, MessageKind, MessageRef, SourceMessage,
        UserId,
    },
    serenity::all::{
        self as discord, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, MessageType, Timestamp,
    },
    tracing::warn,
};

use crate::{Error, Result};

/// Name given to direct-message channels, which have none on Discord.
pub const DIRECT_MESSAGE_CHANNEL_NAME: &str = "direct-message";

fn non_zero(value: u64, what: &str) -> Result<NonZeroU64> {
    NonZeroU64::new(value).ok_or_else(|| Error::message(format!("{what} id must not be zero")))
}

pub fn channel_id(id: ChannelId) -> Result<discord::ChannelId> {
    Ok(non_zero(id.get(), "channel")?.into())
}

pub fn message_id(id: MessageId) -> Result<discord::MessageId> {
    Ok(non_zero(id.get(), "message")?.into())
}

#[must_use]
pub fn message_ref(message: &discord::Message) -> MessageRef {
    MessageRef::new(
        ChannelId(message.channel_id.get()),
        MessageId(message.id.get()),
    )
}

#[must_use]
pub fn author(user: &discord::User) -> Author {
    Author {
        id: UserId(user.id.get()),
        name: user.name.clone(),
        discriminator: user.discriminator.map(|d| format!("{:04}", d.get())),
        avatar_url: user.face(),
        bot: user.bot,
    }
}

/// Snapshot a gateway message. Channel and guild names are looked up by the
/// caller since they are not part of the message payload.
#[must_use]
pub fn source_message(
    message: &discord::Message,
    channel_name: &str,
    guild_name: Option<&str>,
) -> SourceMessage {
    SourceMessage {
        id: MessageId(message.id.get()),
        channel_id: ChannelId(message.channel_id.get()),
        channel_name: channel_name.to_string(),
        guild_name: guild_name.map(str::to_string),
        author: author(&message.author),
        content: message.content.clone(),
        embeds: message.embeds.iter().filter_map(embed).collect(),
        attachments: message
            .attachments
            .iter()
            .map(|a| Attachment {
                filename: a.filename.clone(),
                url: a.url.clone(),
                size: u64::from(a.size),
            })
            .collect(),
        created_at: created_at(message.timestamp),
        url: message.link(),
        kind: match message.kind {
            MessageType::Regular | MessageType::InlineReply => MessageKind::Default,
            _ => MessageKind::System,
        },
    }
}

fn created_at(timestamp: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

/// Both models use the API's wire shape, so the embed goes through JSON.
fn embed(source: &discord::Embed) -> Option<Embed> {
    match serde_json::to_value(source).and_then(serde_json::from_value) {
        Ok(embed) => Some(embed),
        Err(e) => {
            warn!(error = %e, "dropping embed that could not be converted");
            None
        },
    }
}

#[must_use]
pub fn create_embed(embed: &Embed) -> CreateEmbed {
    let mut builder = CreateEmbed::new();
    if let Some(title) = &embed.title {
        builder = builder.title(title);
    }
    if let Some(description) = &embed.description {
        builder = builder.description(description);
    }
    if let Some(url) = &embed.url {
        builder = builder.url(url);
    }
    if let Some(timestamp) = embed
        .timestamp
        .as_deref()
        .and_then(|t| Timestamp::parse(t).ok())
    {
        builder = builder.timestamp(timestamp);
    }
    if let Some(color) = embed.color {
        builder = builder.colour(color);
    }
    if let Some(footer) = &embed.footer {
        let mut footer_builder = CreateEmbedFooter::new(&footer.text);
        if let Some(icon) = &footer.icon_url {
            footer_builder = footer_builder.icon_url(icon);
        }
        builder = builder.footer(footer_builder);
    }
    if let Some(image) = &embed.image {
        builder = builder.image(&image.url);
    }
    if let Some(thumbnail) = &embed.thumbnail {
        builder = builder.thumbnail(&thumbnail.url);
    }
    if let Some(author) = &embed.author {
        let mut author_builder = CreateEmbedAuthor::new(&author.name);
        if let Some(url) = &author.url {
            author_builder = author_builder.url(url);
        }
        if let Some(icon) = &author.icon_url {
            author_builder = author_builder.icon_url(icon);
        }
        builder = builder.author(author_builder);
    }
    for field in &embed.fields {
        builder = builder.field(&field.name, &field.value, field.inline);
    }
    builder
}
