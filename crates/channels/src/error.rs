use std::error::Error as StdError;

use mirror_common::ChannelId;

/// Crate-wide result type for channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed channel errors shared across channel traits.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The id resolved to something that cannot carry text messages
    /// (voice channel, category, forum root, ...).
    #[error("channel {channel_id} is not a text-capable channel")]
    NotTextChannel { channel_id: ChannelId },

    /// Operation is currently unavailable (missing permission, unknown
    /// channel, session not ready).
    #[error("channel operation unavailable: {message}")]
    Unavailable { message: String },

    /// Wrapped source error from an external dependency.
    #[error("channel operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn not_text_channel(channel_id: ChannelId) -> Self {
        Self::NotTextChannel { channel_id }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error means the channel can never be used as a route end.
    /// `Unavailable` may clear up on a later attempt.
    #[must_use]
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, Self::NotTextChannel { .. })
    }
}
