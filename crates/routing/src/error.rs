#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("redirect #{index} has no sources")]
    EmptySources { index: usize },

    #[error("redirect #{index} has no destinations")]
    EmptyDestinations { index: usize },

    #[error("redirect #{index}: `{value}` is not a channel id")]
    InvalidChannelId { index: usize, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;
