mod cache;
mod fetch;
mod refresh;
mod services;
mod stream;

pub use {
    cache::CacheStore,
    fetch::{FetchDispatcher, FetchResult, FetchSpec, FetchStrategy, WidgetData},
    refresh::{RefreshHandle, spawn_refresh_task},
    services::{
        MarketDataService, PortfolioService, ReportService, RiskService, ServiceClients,
        StrategyService, StreamingProvider, UpdateCallback,
    },
    stream::{ConnectionStatus, RealtimeSubscriptionManager},
};
