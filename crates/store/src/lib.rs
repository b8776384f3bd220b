//! Crash-safe JSON document store.
//!
//! The document lives in memory and is flushed periodically, only when its
//! serialized form changed. Each flush writes a sidecar `<file>.bak` first and
//! renames it over the primary, so at least one of the two files always holds
//! a complete serialization.

pub mod document;
pub mod error;

pub use {
    document::{PersistentStore, backup_path},
    error::{Error, Result},
};
