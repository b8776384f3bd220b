//! Message model shared by the mirror crates, plus the `impl_context!` helper.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage},
    types::{
        Attachment, Author, ChannelId, Embed, EmbedAuthor, EmbedField, EmbedFooter, EmbedMedia,
        MessageId, MessageKind, MessageRef, SourceMessage, UserId,
    },
};
