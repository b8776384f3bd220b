use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Neither the primary file nor its backup could be parsed.
    #[error("store {} is corrupted and its backup is unusable: {message}", .path.display())]
    Corrupted { path: PathBuf, message: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn corrupted(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Corrupted {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl mirror_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

mirror_common::impl_context!();
