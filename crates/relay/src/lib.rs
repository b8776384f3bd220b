//! Message relay engine.
//!
//! Inbound messages flow through [`RelayCoordinator`]: the routing table picks
//! the destinations, [`filter`] drops what a route does not want, [`format`]
//! builds the destination payload, [`DeliveryEngine`] sends it (webhook first,
//! bot account as fallback) and [`EditSyncTracker`] remembers the pairing so
//! later edits and deletes reach the copies.

pub mod coordinator;
pub mod delivery;
pub mod error;
pub mod filter;
pub mod format;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    coordinator::{PollSettings, RelayCoordinator},
    delivery::{Delivered, DeliveryEngine, RetryPolicy},
    error::{Error, Result},
    filter::{SkipReason, skip_reason},
    format::{embed_cap, format, persona},
    sync::{EditSyncTracker, WatchDocument, WatchEntry, content_hash},
};
