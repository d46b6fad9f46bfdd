mod domain;
mod market;
mod widget;

pub use {
    domain::{
        BacktestResult, GeneratedReport, Portfolio, RiskMetrics, ScheduledReport, StrategyRun,
        StrategyStatus,
    },
    market::{Quote, QuoteUpdate},
    widget::{Position, Size, TimeRange, Widget, WidgetSpec, WidgetType},
};
