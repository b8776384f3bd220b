//! Discord adapter for mirror.
//!
//! Implements the channel capabilities of `mirror-channels` on top of
//! serenity (bot-account messages, webhooks for impersonation) and feeds
//! gateway events into the relay coordinator.

pub mod channel;
pub mod convert;
pub mod error;
pub mod handler;
pub mod resolver;
pub mod webhook;

pub use {
    channel::DiscordChannel,
    error::{Error, Result},
    handler::RelayHandler,
    resolver::DiscordResolver,
    webhook::DiscordWebhook,
};
