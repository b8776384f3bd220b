//! Source message + route options → destination payload.
//!
//! Everything here is pure: the same inputs always produce the same payload.

use {
    mirror_channels::{AllowedMentions, OutboundPayload, Persona},
    mirror_common::{Embed, EmbedAuthor, EmbedField, SourceMessage},
    mirror_config::{EmbedOptions, RouteOptions},
    tracing::warn,
};

/// Colour of generated embeds when the route does not set one.
pub const DEFAULT_EMBED_COLOR: u32 = 0x2F_3136;
/// Title of the summary embed when the route does not set one.
pub const DEFAULT_EMBED_TITLE: &str = "Forwarded message:";

/// Webhook messages carry up to 10 embeds; bot messages are limited to one.
const WEBHOOK_EMBED_CAP: usize = 10;
const BOT_EMBED_CAP: usize = 1;

#[must_use]
pub fn embed_cap(options: &RouteOptions) -> usize {
    if options.webhook {
        WEBHOOK_EMBED_CAP
    } else {
        BOT_EMBED_CAP
    }
}

/// Avatar shown for the source author: the route override, else the author's.
#[must_use]
pub fn avatar_url<'a>(message: &'a SourceMessage, options: &'a RouteOptions) -> &'a str {
    options
        .webhook_avatar_url
        .as_deref()
        .unwrap_or(&message.author.avatar_url)
}

/// Display identity for webhook delivery.
#[must_use]
pub fn persona(message: &SourceMessage, options: &RouteOptions) -> Persona {
    let mut username = options
        .webhook_username
        .clone()
        .unwrap_or_else(|| message.author.name.clone());
    if options.webhook_username_channel {
        username.push_str(" - #");
        username.push_str(&message.channel_name);
    }
    Persona {
        username,
        avatar_url: Some(avatar_url(message, options).to_string()),
    }
}

/// Build the payload for one destination.
#[must_use]
pub fn format(message: &SourceMessage, options: &RouteOptions) -> OutboundPayload {
    let files = if options.copy_attachments {
        message.attachments.clone()
    } else {
        Vec::new()
    };

    let mut embeds = if options.copy_embed {
        message.embeds.clone()
    } else {
        Vec::new()
    };

    let mut content = String::new();
    if let Some(settings) = &options.embed {
        embeds.push(summary_embed(message, options, settings));
    } else {
        content.push_str(&message.content);
        if options.include_author_as_embed {
            embeds.push(Embed {
                color: Some(DEFAULT_EMBED_COLOR),
                author: Some(author_line(message, options)),
                ..Default::default()
            });
        }
    }

    let cap = embed_cap(options);
    if embeds.len() > cap {
        warn!(
            message_id = %message.id,
            embeds = embeds.len(),
            cap,
            "too many embeds, dropping the last ones"
        );
        embeds.truncate(cap);
    }

    append_trailer(&mut content, message, options);

    OutboundPayload {
        content,
        embeds,
        files,
        allowed_mentions: if options.allow_mentions {
            AllowedMentions::PlatformDefault
        } else {
            AllowedMentions::None
        },
    }
}

fn author_line(message: &SourceMessage, options: &RouteOptions) -> EmbedAuthor {
    EmbedAuthor {
        name: message.author.tag(),
        url: Some(message.url.clone()),
        icon_url: Some(avatar_url(message, options).to_string()),
    }
}

fn summary_embed(message: &SourceMessage, options: &RouteOptions, settings: &EmbedOptions) -> Embed {
    let inline = |name: &str, value: String| EmbedField {
        name: name.to_string(),
        value,
        inline: true,
    };
    let mut fields = Vec::new();
    if settings.fields.author {
        fields.push(inline("Author", message.author.mention()));
    }
    if settings.fields.server {
        fields.push(inline(
            "Server",
            message.guild_name.clone().unwrap_or_default(),
        ));
    }
    if settings.fields.channel {
        fields.push(inline("Channel", format!("#{}", message.channel_name)));
    }

    Embed {
        title: Some(
            settings
                .title
                .clone()
                .unwrap_or_else(|| DEFAULT_EMBED_TITLE.to_string()),
        ),
        description: Some(message.content.clone()),
        color: Some(settings.color.map_or(DEFAULT_EMBED_COLOR, |c| c.0)),
        timestamp: settings.timestamp.then(|| message.created_at.to_rfc3339()),
        author: settings.author.then(|| author_line(message, options)),
        fields,
        ..Default::default()
    }
}

fn append_trailer(content: &mut String, message: &SourceMessage, options: &RouteOptions) {
    if !(options.include_author || options.include_author_tag || options.include_channel) {
        return;
    }
    content.push_str("\n\n");
    if options.include_author {
        content.push_str(&format!(" *{}*", message.author.tag()));
    }
    if options.include_author_tag {
        content.push_str(&format!(" {}", message.author.mention()));
    }
    if options.include_channel {
        content.push_str(&format!(" in *#{}*", message.channel_name));
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::message,
        mirror_common::Attachment,
        mirror_config::{EmbedColor, EmbedFields},
        rstest::rstest,
    };

    fn with_embeds(count: usize) -> SourceMessage {
        let mut msg = message(1, 100, "hello");
        msg.embeds = (0..count)
            .map(|i| Embed {
                title: Some(format!("link {i}")),
                ..Default::default()
            })
            .collect();
        msg
    }

    #[test]
    fn plain_copy() {
        let mut msg = message(1, 100, "hello world");
        msg.attachments.push(Attachment {
            filename: "cat.png".into(),
            url: "https://cdn.example/cat.png".into(),
            size: 42,
        });

        let payload = format(&msg, &RouteOptions::default());
        assert_eq!(payload.content, "hello world");
        assert!(payload.embeds.is_empty());
        assert_eq!(payload.files.len(), 1);
        assert_eq!(payload.allowed_mentions, AllowedMentions::None);
    }

    #[test]
    fn copy_flags_drop_attachments_and_embeds() {
        let mut msg = with_embeds(1);
        msg.attachments.push(Attachment {
            filename: "a.txt".into(),
            url: "https://cdn.example/a.txt".into(),
            size: 1,
        });
        let options = RouteOptions {
            copy_attachments: false,
            copy_embed: false,
            ..Default::default()
        };

        let payload = format(&msg, &options);
        assert!(payload.files.is_empty());
        assert!(payload.embeds.is_empty());
    }

    #[test]
    fn formatting_is_deterministic() {
        let msg = with_embeds(3);
        let options = RouteOptions {
            webhook: true,
            include_author: true,
            embed: Some(EmbedOptions {
                timestamp: true,
                author: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(format(&msg, &options), format(&msg, &options));
    }

    #[rstest]
    #[case(true, 0, 0)]
    #[case(true, 4, 4)]
    #[case(true, 15, 10)]
    #[case(false, 3, 1)]
    #[case(false, 1, 1)]
    fn embed_count_is_capped(
        #[case] webhook: bool,
        #[case] source_embeds: usize,
        #[case] expected: usize,
    ) {
        let options = RouteOptions {
            webhook,
            ..Default::default()
        };
        let payload = format(&with_embeds(source_embeds), &options);
        assert_eq!(payload.embeds.len(), expected);
    }

    #[test]
    fn cap_drops_embeds_from_the_tail() {
        let options = RouteOptions {
            include_author_as_embed: true,
            ..Default::default()
        };
        let payload = format(&with_embeds(2), &options);
        assert_eq!(payload.embeds.len(), 1);
        assert_eq!(payload.embeds[0].title.as_deref(), Some("link 0"));
    }

    #[test]
    fn summary_embed_replaces_content() {
        let msg = message(1, 100, "the body");
        let options = RouteOptions {
            webhook: true,
            copy_embed: false,
            embed: Some(EmbedOptions {
                color: Some(EmbedColor(0xFF_0000)),
                title: Some("Relayed".into()),
                timestamp: true,
                author: true,
                fields: EmbedFields {
                    author: true,
                    server: true,
                    channel: true,
                },
            }),
            ..Default::default()
        };

        let payload = format(&msg, &options);
        assert!(payload.content.is_empty());
        assert_eq!(payload.embeds.len(), 1);

        let embed = &payload.embeds[0];
        assert_eq!(embed.title.as_deref(), Some("Relayed"));
        assert_eq!(embed.description.as_deref(), Some("the body"));
        assert_eq!(embed.color, Some(0xFF_0000));
        assert_eq!(embed.timestamp.as_deref(), Some("2024-05-01T12:00:00+00:00"));

        let author = embed.author.as_ref().unwrap();
        assert_eq!(author.name, "alice#0420");
        assert_eq!(author.url.as_deref(), Some(msg.url.as_str()));

        let fields: Vec<_> = embed
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.value.as_str(), f.inline))
            .collect();
        assert_eq!(fields, vec![
            ("Author", "<@7>", true),
            ("Server", "Guild", true),
            ("Channel", "#general", true),
        ]);
    }

    #[test]
    fn summary_embed_defaults() {
        let options = RouteOptions {
            embed: Some(EmbedOptions::default()),
            ..Default::default()
        };
        let embed = &format(&message(1, 100, "x"), &options).embeds[0];
        assert_eq!(embed.title.as_deref(), Some(DEFAULT_EMBED_TITLE));
        assert_eq!(embed.color, Some(DEFAULT_EMBED_COLOR));
        assert!(embed.timestamp.is_none());
        assert!(embed.author.is_none());
        assert!(embed.fields.is_empty());
    }

    #[test]
    fn author_embed_uses_avatar_override() {
        let options = RouteOptions {
            include_author_as_embed: true,
            webhook_avatar_url: Some("https://cdn.example/relay.png".into()),
            ..Default::default()
        };
        let payload = format(&message(1, 100, "hi"), &options);
        assert_eq!(payload.content, "hi");
        let author = payload.embeds[0].author.as_ref().unwrap();
        assert_eq!(author.icon_url.as_deref(), Some("https://cdn.example/relay.png"));
        assert_eq!(payload.embeds[0].color, Some(DEFAULT_EMBED_COLOR));
    }

    #[rstest]
    #[case(true, false, false, "hi\n\n *alice#0420*")]
    #[case(false, true, false, "hi\n\n <@7>")]
    #[case(false, false, true, "hi\n\n in *#general*")]
    #[case(true, true, true, "hi\n\n *alice#0420* <@7> in *#general*")]
    #[case(false, false, false, "hi")]
    fn trailer(
        #[case] include_author: bool,
        #[case] include_author_tag: bool,
        #[case] include_channel: bool,
        #[case] expected: &str,
    ) {
        let options = RouteOptions {
            include_author,
            include_author_tag,
            include_channel,
            ..Default::default()
        };
        assert_eq!(format(&message(1, 100, "hi"), &options).content, expected);
    }

    #[test]
    fn mentions_follow_route() {
        let options = RouteOptions {
            allow_mentions: true,
            ..Default::default()
        };
        assert_eq!(
            format(&message(1, 100, "@everyone"), &options).allowed_mentions,
            AllowedMentions::PlatformDefault
        );
    }

    #[test]
    fn persona_name_and_avatar() {
        let msg = message(1, 100, "hi");
        let plain = persona(&msg, &RouteOptions::default());
        assert_eq!(plain.username, "alice");
        assert_eq!(plain.avatar_url.as_deref(), Some(msg.author.avatar_url.as_str()));

        let options = RouteOptions {
            webhook_username: Some("Relay".into()),
            webhook_username_channel: true,
            ..Default::default()
        };
        assert_eq!(persona(&msg, &options).username, "Relay - #general");
    }
}
