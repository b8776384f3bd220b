//! Metrics for mirror.
//!
//! Crates record through the `metrics` facade re-exported here, using the
//! names in [`relay`], [`store`] and [`channels`]. Nothing is collected until
//! the binary installs a recorder with [`init_metrics`]; with the
//! `prometheus` feature the handle renders the text exposition format for the
//! status server's `/metrics` route.
//!
//! ```rust,ignore
//! use mirror_metrics::{counter, relay};
//!
//! counter!(relay::MESSAGES_RELAYED_TOTAL, labels::MODE => "webhook").increment(1);
//! ```

mod definitions;
mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
