//! Logging facilities for Horizon Data.
//!
//! Horizon Data uses the `tracing` crate for instrumentation. To see logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("horizon_data=debug,horizon_data_core=info")
//!         .init();
//! }
//! ```
//!
//! Every subsystem logs under one of the [`targets`] so that filtering by
//! layer is possible, e.g. `horizon_data::event_filter=trace` to watch which
//! mutations reach a consumer.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "horizon_data_core";
    /// Event target dispatch.
    pub const EVENT: &str = "horizon_data_core::event";
    /// Custom element registry.
    pub const REGISTRY: &str = "horizon_data_core::registry";
    /// Defaults resolution.
    pub const DEFAULTS: &str = "horizon_data_core::defaults";
    /// Element instance property writes.
    pub const ELEMENT: &str = "horizon_data_core::element";

    /// Provider crate target.
    pub const DATA: &str = "horizon_data";
    /// Shared data cache.
    pub const CACHE: &str = "horizon_data::cache";
    /// Dedup layer.
    pub const DEDUP: &str = "horizon_data::dedup";
    /// Mutation event filtering layer.
    pub const EVENT_FILTER: &str = "horizon_data::event_filter";
    /// List and tree views.
    pub const VIEW: &str = "horizon_data::view";
    /// Suppress-node tree view.
    pub const TREE: &str = "horizon_data::tree";
    /// Capability negotiation and composition.
    pub const ENHANCE: &str = "horizon_data::enhance";
    /// Array-backed providers.
    pub const ARRAY: &str = "horizon_data::array";
}

/// Span names used throughout Horizon Data for tracing.
pub mod span_names {
    /// Processing of one upstream mutation event.
    pub const MUTATION: &str = "horizon_data::mutation";
}

/// Render a short summary of a key set for log fields.
///
/// Large sets are truncated so that a bulk mutation does not flood the log.
pub fn summarize_keys<K: std::fmt::Debug>(keys: impl IntoIterator<Item = K>) -> String {
    const LIMIT: usize = 8;
    let mut shown = Vec::new();
    let mut total = 0usize;
    for key in keys {
        if shown.len() < LIMIT {
            shown.push(format!("{key:?}"));
        }
        total += 1;
    }
    if total > LIMIT {
        format!("[{}, ... ({} total)]", shown.join(", "), total)
    } else {
        format!("[{}]", shown.join(", "))
    }
}
