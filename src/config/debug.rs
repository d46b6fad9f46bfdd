//! Debugging feature flags.

#[allow(dead_code)]
pub struct LogFlags {
    /// Emit verbose logging for live stream subscriptions and ticks.
    pub log_stream_updates: bool,

    /// Log cache hits, misses and lazy TTL evictions.
    pub log_cache: bool,

    /// Log fetch dispatch, cancellations and failures.
    pub log_fetch: bool,

    /// Log sync bus transitions and suppressed broadcasts.
    pub log_sync_bus: bool,

    /// Log widget lifecycle (add/remove/subscription churn).
    pub log_registry: bool,

    /// Log refresh task start/stop per widget.
    pub log_refresh: bool,
}

pub const DF: LogFlags = LogFlags {
    log_sync_bus: true,
    log_registry: true,

    log_stream_updates: false,
    log_cache: false,
    log_fetch: false,
    log_refresh: false,
};
