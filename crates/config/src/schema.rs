//! Config schema types: bot token, redirect groups with per-route options,
//! relay tuning, status server and metrics.
//!
//! Keys are camelCase on disk (`webhookAvatarURL`, `editTrackingMaxMsg`, ...).
use std::{fmt, path::PathBuf, str::FromStr};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
};

/// Root configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MirrorConfig {
    /// Bot token for the chat platform.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
    /// Declarative `{sources, destinations, options}` groups.
    pub redirects: Vec<RedirectConfig>,
    pub relay: RelayConfig,
    pub status: StatusConfig,
    pub metrics: MetricsConfig,
}

impl fmt::Debug for MirrorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorConfig")
            .field("token", &"[REDACTED]")
            .field("redirects", &self.redirects.len())
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            redirects: Vec::new(),
            relay: RelayConfig::default(),
            status: StatusConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn serialize_secret<S: Serializer>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// One redirect group: every source is relayed to every destination.
///
/// Missing lists deserialize as empty and are rejected by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectConfig {
    pub sources: Vec<String>,
    pub destinations: Vec<String>,
    pub options: RouteOptions,
}

/// Per-route formatting and delivery rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteOptions {
    /// Deliver through an impersonation webhook instead of the bot account.
    pub webhook: bool,
    #[serde(rename = "webhookAvatarURL", skip_serializing_if = "Option::is_none")]
    pub webhook_avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_username: Option<String>,
    /// Append ` - #channel` to the webhook display name.
    pub webhook_username_channel: bool,
    pub allow_mentions: bool,
    pub copy_attachments: bool,
    pub copy_embed: bool,
    /// When set, the message body is wrapped in a single summary embed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedOptions>,
    pub include_author_as_embed: bool,
    pub include_author: bool,
    pub include_author_tag: bool,
    pub include_channel: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_list: Option<Vec<AuthorRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_list: Option<Vec<AuthorRule>>,
    pub allow_edit: bool,
    pub allow_delete: bool,
    /// Bound of the edit-tracking table, also the polling depth for the source.
    pub edit_tracking_max_msg: usize,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            webhook: false,
            webhook_avatar_url: None,
            webhook_username: None,
            webhook_username_channel: false,
            allow_mentions: false,
            copy_attachments: true,
            copy_embed: true,
            embed: None,
            include_author_as_embed: false,
            include_author: false,
            include_author_tag: false,
            include_channel: false,
            min_length: None,
            allow_list: None,
            deny_list: None,
            allow_edit: true,
            allow_delete: false,
            edit_tracking_max_msg: 250,
        }
    }
}

impl RouteOptions {
    /// Whether forwarded copies on this route need a watch entry.
    #[must_use]
    pub fn tracks_changes(&self) -> bool {
        self.allow_edit || self.allow_delete
    }
}

/// Summary embed settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<EmbedColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub timestamp: bool,
    pub author: bool,
    pub fields: EmbedFields,
}

/// Optional inline fields of the summary embed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedFields {
    pub author: bool,
    pub server: bool,
    pub channel: bool,
}

/// RGB colour accepted as `"#2F3136"`, `"2F3136"` or a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedColor(pub u32);

impl FromStr for EmbedColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 {
            return Err(format!("invalid colour `{s}`: expected #RRGGBB"));
        }
        u32::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|_| format!("invalid colour `{s}`: expected #RRGGBB"))
    }
}

impl fmt::Display for EmbedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06X}", self.0)
    }
}

impl Serialize for EmbedColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EmbedColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u32),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) if n <= 0xFF_FFFF => Ok(Self(n)),
            Raw::Number(n) => Err(de::Error::custom(format!("colour {n} exceeds 0xFFFFFF"))),
            Raw::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

/// Entry of an allow/deny list: an author id, or a whole class of authors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorRule {
    /// `"bot"` / `"bots"`
    Bots,
    /// `"human"` / `"humans"`
    Humans,
    /// Exact author id.
    Id(String),
}

impl AuthorRule {
    #[must_use]
    pub fn matches(&self, author_id: &str, is_bot: bool) -> bool {
        match self {
            Self::Bots => is_bot,
            Self::Humans => !is_bot,
            Self::Id(id) => id == author_id,
        }
    }
}

impl From<&str> for AuthorRule {
    fn from(value: &str) -> Self {
        match value {
            "bot" | "bots" => Self::Bots,
            "human" | "humans" => Self::Humans,
            other => Self::Id(other.to_string()),
        }
    }
}

impl Serialize for AuthorRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bots => serializer.serialize_str("bots"),
            Self::Humans => serializer.serialize_str("humans"),
            Self::Id(id) => serializer.serialize_str(id),
        }
    }
}

impl<'de> Deserialize<'de> for AuthorRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self::from(s.as_str()),
            Raw::Number(n) => Self::Id(n.to_string()),
        })
    }
}

/// Relay engine tuning. Defaults reproduce the long-standing behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelayConfig {
    /// Path of the persisted watch-list document.
    pub db_path: PathBuf,
    /// Interval between store flushes.
    pub flush_interval_secs: u64,
    /// Pause between reconciliation iterations.
    pub poll_interval_ms: u64,
    /// Delay before the first reconciliation iteration after readiness.
    pub poll_start_delay_ms: u64,
    /// Messages per history page; a full first page triggers backward paging.
    pub poll_page_size: usize,
    /// Pause after each compared watch entry during reconciliation.
    pub poll_entry_delay_ms: u64,
    /// Webhook retries after the first failed attempt.
    pub webhook_retries: u32,
    /// Back-off before each webhook retry.
    pub webhook_retry_backoff_secs: u64,
    /// Name of the webhook created (or reused) in destination channels.
    pub webhook_name: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./db.json"),
            flush_interval_secs: 30,
            poll_interval_ms: 1_000,
            poll_start_delay_ms: 2_000,
            poll_page_size: 50,
            poll_entry_delay_ms: 250,
            webhook_retries: 1,
            webhook_retry_backoff_secs: 15,
            webhook_name: "Channel Relay".into(),
        }
    }
}

/// Liveness web server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}
