//! Abstract interfaces for the external services this crate consumes. The
//! crate owns no wire format; concrete clients are injected by the host
//! application.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    BacktestResult, GeneratedReport, Portfolio, Quote, QuoteUpdate, RiskMetrics, ScheduledReport,
    StrategyRun,
};

/// Snapshot market data (pull side).
#[async_trait]
pub trait MarketDataService: Send + Sync {
    async fn get_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>>;
}

#[async_trait]
pub trait PortfolioService: Send + Sync {
    async fn get_all_portfolios(&self) -> Result<Vec<Portfolio>>;
}

#[async_trait]
pub trait StrategyService: Send + Sync {
    async fn get_running_strategies(&self) -> Result<Vec<StrategyRun>>;
    async fn get_backtest_results(&self, limit: usize) -> Result<Vec<BacktestResult>>;
}

#[async_trait]
pub trait ReportService: Send + Sync {
    async fn get_generated_reports(&self, limit: usize) -> Result<Vec<GeneratedReport>>;
    async fn get_scheduled_reports(&self) -> Result<Vec<ScheduledReport>>;
}

#[async_trait]
pub trait RiskService: Send + Sync {
    async fn calculate_risk_metrics(&self, portfolio_id: &str) -> Result<RiskMetrics>;
}

/// Callback invoked for each push update from the provider.
pub type UpdateCallback = Arc<dyn Fn(QuoteUpdate) + Send + Sync>;

/// Streaming market data (push side). The subscription manager keeps exactly
/// one upstream registration covering the union of symbols currently needed.
pub trait StreamingProvider: Send + Sync {
    fn subscribe(&self, symbols: Vec<String>, on_update: UpdateCallback) -> Result<String>;
    fn unsubscribe(&self, id: &str) -> Result<()>;
}

/// Bundle of injected service clients consumed by the fetch strategies.
#[derive(Clone)]
pub struct ServiceClients {
    pub market: Arc<dyn MarketDataService>,
    pub portfolio: Arc<dyn PortfolioService>,
    pub strategy: Arc<dyn StrategyService>,
    pub report: Arc<dyn ReportService>,
    pub risk: Arc<dyn RiskService>,
}
