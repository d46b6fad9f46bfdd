// Top Level Constants

/// Default per-widget refresh cadence when a spec does not override it.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5_000;

/// Floor for refresh intervals so a misconfigured widget cannot hot-loop.
pub const MIN_REFRESH_INTERVAL_MS: u64 = 250;

/// Symbols watched globally when a canvas opens. The first entry seeds the
/// sync bus's synced symbol.
pub const GLOBAL_WATCHLIST: &[&str] = &["600519", "000858", "601318", "000001"];

pub mod ttl {
    use std::time::Duration;

    // Short TTLs for volatile data, longer ones for slow-moving data.
    pub const CHART: Duration = Duration::from_secs(10);
    pub const QUOTES: Duration = Duration::from_secs(10);
    pub const STRATEGY: Duration = Duration::from_secs(20);
    pub const PORTFOLIO: Duration = Duration::from_secs(30);
    pub const RISK: Duration = Duration::from_secs(30);
    pub const REPORT: Duration = Duration::from_secs(60);
}

pub mod limits {
    /// How many backtest results a strategy widget pulls per refresh.
    pub const BACKTEST_RESULTS: usize = 10;
    /// How many generated reports a report widget pulls per refresh.
    pub const GENERATED_REPORTS: usize = 20;
}

pub mod geometry {
    /// Default widget size and the cascade offset applied per existing widget
    /// when a spec carries no explicit position.
    pub const DEFAULT_W: f64 = 480.0;
    pub const DEFAULT_H: f64 = 320.0;
    pub const ORIGIN_X: f64 = 40.0;
    pub const ORIGIN_Y: f64 = 40.0;
    pub const CASCADE_STEP: f64 = 32.0;
}
