//! Channel capability layer.
//!
//! The relay engine never talks to a chat platform directly. Each platform
//! adapter implements [`RelayChannel`] for its text-capable channel kinds and
//! [`ImpersonationEndpoint`] for its custom-identity delivery path, and hands
//! the engine a [`ChannelResolver`]. [`ChannelRegistry`] caches resolutions.

pub mod error;
pub mod gating;
pub mod plugin;
pub mod registry;

pub use {
    error::{Error, Result},
    gating::is_author_permitted,
    plugin::{
        AllowedMentions, ChannelResolver, ImpersonationEndpoint, OutboundPayload, Persona,
        RelayChannel,
    },
    registry::ChannelRegistry,
};
