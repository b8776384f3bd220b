//! Platform-neutral message model shared by routing, formatting, delivery and
//! edit tracking. Platform adapters convert their native objects into these.

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
};

use crate::Error;

/// Snowflake ids travel as strings in config files and the persisted store
/// (JSON numbers lose precision above 2^53), but numbers are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSnowflake {
    Text(String),
    Number(u64),
}

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| Error::invalid_id(s))
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match RawSnowflake::deserialize(deserializer)? {
                    RawSnowflake::Number(n) => Ok(Self(n)),
                    RawSnowflake::Text(s) => s.parse().map_err(de::Error::custom),
                }
            }
        }
    };
}

snowflake_id!(
    /// Identifier of a text-capable channel (guild channel, thread or DM).
    ChannelId
);
snowflake_id!(
    /// Identifier of a single message.
    MessageId
);
snowflake_id!(
    /// Identifier of a user, bot or webhook author.
    UserId
);

/// Minimal reconstructable reference to a message: enough to fetch, edit or
/// delete it again after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: MessageId,
    pub channel_id: ChannelId,
}

impl MessageRef {
    #[must_use]
    pub fn new(channel_id: ChannelId, id: MessageId) -> Self {
        Self { id, channel_id }
    }
}

/// Author of a source message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub name: String,
    /// Legacy four-digit discriminator; `None` (or `"0"`) for migrated accounts.
    pub discriminator: Option<String>,
    /// Resolved avatar URL (falls back to the platform default avatar).
    pub avatar_url: String,
    pub bot: bool,
}

impl Author {
    /// `name#1234` for legacy accounts, plain `name` otherwise.
    #[must_use]
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(disc) if !disc.is_empty() && disc != "0" => format!("{}#{disc}", self.name),
            _ => self.name.clone(),
        }
    }

    #[must_use]
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// A file attached to a source message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    pub size: u64,
}

/// Rich embed, serialized in the platform's wire shape so it can be sent
/// verbatim in a direct API call and hashed deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// RFC 3339 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedMedia {
    pub url: String,
}

/// Whether a message is ordinary user content or a platform notice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Regular message or inline reply.
    #[default]
    Default,
    /// Pins, member joins, boosts and other system notices.
    System,
}

/// Read-only snapshot of a message in a source channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub guild_name: Option<String>,
    pub author: Author,
    pub content: String,
    pub embeds: Vec<Embed>,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    /// Jump link to the message.
    pub url: String,
    pub kind: MessageKind,
}

impl SourceMessage {
    #[must_use]
    pub fn reference(&self) -> MessageRef {
        MessageRef::new(self.channel_id, self.id)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn author(discriminator: Option<&str>) -> Author {
        Author {
            id: UserId(42),
            name: "alice".into(),
            discriminator: discriminator.map(Into::into),
            avatar_url: "https://cdn.example/a.png".into(),
            bot: false,
        }
    }

    #[rstest]
    #[case(Some("1234"), "alice#1234")]
    #[case(Some("0"), "alice")]
    #[case(None, "alice")]
    fn author_tag(#[case] discriminator: Option<&str>, #[case] expected: &str) {
        assert_eq!(author(discriminator).tag(), expected);
    }

    #[test]
    fn author_mention() {
        assert_eq!(author(None).mention(), "<@42>");
    }

    #[test]
    fn snowflake_accepts_string_and_number() {
        let a: ChannelId = serde_json::from_str("\"876543210987654321\"").unwrap();
        let b: ChannelId = serde_json::from_str("876543210987654321").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            "\"876543210987654321\""
        );
    }

    #[test]
    fn snowflake_rejects_garbage() {
        assert!("general".parse::<ChannelId>().is_err());
        assert!(serde_json::from_str::<MessageId>("\"12ab\"").is_err());
    }

    #[test]
    fn message_ref_serializes_camel_case() {
        let r = MessageRef::new(ChannelId(1), MessageId(2));
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "2", "channelId": "1" }));
    }

    #[test]
    fn embed_skips_empty_fields() {
        let embed = Embed {
            description: Some("hi".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&embed).unwrap(),
            r#"{"description":"hi"}"#
        );
    }
}
