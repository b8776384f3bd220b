//! Per-route skip rules, applied before formatting.

use {
    mirror_channels::is_author_permitted,
    mirror_common::SourceMessage,
    mirror_config::RouteOptions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Text shorter than `minLength`, with nothing attached.
    TooShort,
    /// No text, and the route copies neither embeds nor attachments.
    NothingToCopy,
    /// Author rejected by the allow/deny lists.
    AuthorNotPermitted,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TooShort => "too_short",
            Self::NothingToCopy => "nothing_to_copy",
            Self::AuthorNotPermitted => "author_not_permitted",
        }
    }
}

/// Why `options` rejects `message`, or `None` when it should be relayed.
#[must_use]
pub fn skip_reason(message: &SourceMessage, options: &RouteOptions) -> Option<SkipReason> {
    let length = message.content.chars().count();

    if let Some(min) = options.min_length
        && length < min
        && length != 0
        && message.attachments.is_empty()
    {
        return Some(SkipReason::TooShort);
    }

    if length == 0 && !options.copy_embed && !options.copy_attachments {
        return Some(SkipReason::NothingToCopy);
    }

    if !is_author_permitted(
        &message.author,
        options.allow_list.as_deref(),
        options.deny_list.as_deref(),
    ) {
        return Some(SkipReason::AuthorNotPermitted);
    }

    None
}
