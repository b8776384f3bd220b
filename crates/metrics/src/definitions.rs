//! Metric name and label definitions.
//!
//! Centralizing names keeps the exported series consistent across crates.

/// Forwarding, edit and delete propagation
pub mod relay {
    /// Messages delivered to a destination (labels: `mode`)
    pub const MESSAGES_RELAYED_TOTAL: &str = "mirror_messages_relayed_total";
    /// Deliveries that failed after retry (labels: `operation`)
    pub const RELAY_FAILURES_TOTAL: &str = "mirror_relay_failures_total";
    /// Sends that fell back from the webhook to the bot account
    pub const WEBHOOK_FALLBACKS_TOTAL: &str = "mirror_webhook_fallbacks_total";
    /// Forwarded copies updated after a source edit
    pub const EDITS_PROPAGATED_TOTAL: &str = "mirror_edits_propagated_total";
    /// Forwarded copies removed after a source delete
    pub const DELETES_PROPAGATED_TOTAL: &str = "mirror_deletes_propagated_total";
    /// Messages skipped by route filters (labels: `reason`)
    pub const MESSAGES_FILTERED_TOTAL: &str = "mirror_messages_filtered_total";
    /// Time spent delivering one message to one destination, retries included
    pub const DELIVERY_DURATION_SECONDS: &str = "mirror_delivery_duration_seconds";
}

/// Watch-list persistence
pub mod store {
    /// Current number of watch entries
    pub const WATCH_ENTRIES: &str = "mirror_watch_entries";
}

/// Channel resolution
pub mod channels {
    /// Channels that failed to resolve during preload
    pub const RESOLUTION_FAILURES_TOTAL: &str = "mirror_channel_resolution_failures_total";
}

/// Common label keys
pub mod labels {
    pub const MODE: &str = "mode";
    pub const OPERATION: &str = "operation";
    pub const REASON: &str = "reason";
}

/// Standard histogram buckets
pub mod buckets {
    /// Delivery duration buckets (in seconds).
    /// Covers 10ms to the length of a webhook retry back-off and beyond.
    pub const DELIVERY_DURATION: &[f64] = &[
        0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0,
    ];
}
