//! Route inbound messages to destination channels.
//!
//! Redirect groups expand into one route per (source, destination) pair. The
//! first group that names a pair decides its options; later duplicates are
//! dropped with a warning.

pub mod error;
pub mod table;

pub use {
    error::{Error, Result},
    table::{RouteEntry, RoutingTable},
};
