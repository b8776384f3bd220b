use mirror_common::ChannelId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Send or edit failed for good (after retry, where one applies).
    #[error("failed to {operation} message in channel {destination}: {source}")]
    Delivery {
        destination: ChannelId,
        operation: &'static str,
        #[source]
        source: mirror_channels::Error,
    },

    #[error(transparent)]
    Channel(#[from] mirror_channels::Error),
}

impl Error {
    #[must_use]
    pub fn delivery(
        destination: ChannelId,
        operation: &'static str,
        source: mirror_channels::Error,
    ) -> Self {
        Self::Delivery {
            destination,
            operation,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

