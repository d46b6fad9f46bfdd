//! Per-widget-type fetch dispatch: cache-first, TTL-stamped, cooperatively
//! cancellable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::config::constants::{limits, ttl};
use crate::models::{
    BacktestResult, GeneratedReport, Portfolio, Quote, RiskMetrics, ScheduledReport, StrategyRun,
    Widget, WidgetType,
};
use crate::utils::CancellationToken;

#[cfg(debug_assertions)]
use crate::config::DF;

use super::cache::CacheStore;
use super::services::ServiceClients;

/// Payload produced by a fetch, tagged by widget category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WidgetData {
    Portfolio(Vec<Portfolio>),
    Strategy {
        running: Vec<StrategyRun>,
        backtests: Vec<BacktestResult>,
    },
    Report {
        generated: Vec<GeneratedReport>,
        scheduled: Vec<ScheduledReport>,
    },
    Chart(Vec<Quote>),
    Risk(RiskMetrics),
    Quotes(Vec<Quote>),
}

/// Everything a fetch needs to know about its widget. A snapshot is taken at
/// dispatch time so a widget mutation cannot race the in-flight call;
/// staleness is handled by the cancellation token instead.
#[derive(Debug, Clone)]
pub struct FetchSpec {
    pub widget_id: String,
    pub widget_type: WidgetType,
    pub symbols: Vec<String>,
    pub portfolio_id: Option<String>,
}

impl FetchSpec {
    pub fn for_widget(widget: &Widget) -> Self {
        Self {
            widget_id: widget.id.clone(),
            widget_type: widget.widget_type,
            symbols: widget.subscribed_symbols.iter().cloned().collect(),
            portfolio_id: widget.portfolio_id.clone(),
        }
    }

    fn primary_symbol(&self) -> &str {
        self.symbols.first().map(|s| s.as_str()).unwrap_or("-")
    }

    /// Risk panels are keyed by their target portfolio, falling back to the
    /// primary symbol for panels that track a single instrument.
    fn risk_target(&self) -> &str {
        self.portfolio_id
            .as_deref()
            .unwrap_or_else(|| self.primary_symbol())
    }
}

/// The result delivered back to the widget for one fetch. A failed fetch
/// carries the error as a string; the widget keeps its last rendered content
/// and shows an inline error indicator.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub widget_id: String,
    pub data: Result<WidgetData, String>,
    pub from_cache: bool,
    pub duration_ms: u128,
}

/// One fetch behavior per widget category. Strategies only describe the key,
/// the TTL and the service call; the cache-first sequence lives in the
/// dispatcher so no strategy can forget it.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Deterministic cache key for this widget.
    fn cache_key(&self, spec: &FetchSpec) -> String;

    /// TTL applied to a successful fetch.
    fn ttl(&self) -> Duration;

    async fn call(&self, services: &ServiceClients, spec: &FetchSpec) -> Result<WidgetData>;
}

struct PortfolioFetch;

#[async_trait]
impl FetchStrategy for PortfolioFetch {
    fn cache_key(&self, spec: &FetchSpec) -> String {
        format!("portfolio:{}", spec.widget_id)
    }

    fn ttl(&self) -> Duration {
        ttl::PORTFOLIO
    }

    async fn call(&self, services: &ServiceClients, _spec: &FetchSpec) -> Result<WidgetData> {
        Ok(WidgetData::Portfolio(
            services.portfolio.get_all_portfolios().await?,
        ))
    }
}

struct StrategyFetch;

#[async_trait]
impl FetchStrategy for StrategyFetch {
    fn cache_key(&self, spec: &FetchSpec) -> String {
        format!("strategy:{}", spec.widget_id)
    }

    fn ttl(&self) -> Duration {
        ttl::STRATEGY
    }

    async fn call(&self, services: &ServiceClients, _spec: &FetchSpec) -> Result<WidgetData> {
        let running = services.strategy.get_running_strategies().await?;
        let backtests = services
            .strategy
            .get_backtest_results(limits::BACKTEST_RESULTS)
            .await?;
        Ok(WidgetData::Strategy { running, backtests })
    }
}

struct ReportFetch;

#[async_trait]
impl FetchStrategy for ReportFetch {
    fn cache_key(&self, spec: &FetchSpec) -> String {
        format!("report:{}", spec.widget_id)
    }

    fn ttl(&self) -> Duration {
        ttl::REPORT
    }

    async fn call(&self, services: &ServiceClients, _spec: &FetchSpec) -> Result<WidgetData> {
        let generated = services
            .report
            .get_generated_reports(limits::GENERATED_REPORTS)
            .await?;
        let scheduled = services.report.get_scheduled_reports().await?;
        Ok(WidgetData::Report { generated, scheduled })
    }
}

struct ChartFetch;

#[async_trait]
impl FetchStrategy for ChartFetch {
    fn cache_key(&self, spec: &FetchSpec) -> String {
        format!("chart:{}:{}", spec.widget_id, spec.primary_symbol())
    }

    fn ttl(&self) -> Duration {
        ttl::CHART
    }

    async fn call(&self, services: &ServiceClients, spec: &FetchSpec) -> Result<WidgetData> {
        let quotes = services.market.get_quotes(&spec.symbols).await?;
        // Deterministic order for display and comparison.
        let quotes = quotes
            .into_values()
            .sorted_by(|a, b| a.symbol.cmp(&b.symbol))
            .collect();
        Ok(WidgetData::Chart(quotes))
    }
}

struct RiskFetch;

#[async_trait]
impl FetchStrategy for RiskFetch {
    fn cache_key(&self, spec: &FetchSpec) -> String {
        format!("risk:{}:{}", spec.widget_id, spec.risk_target())
    }

    fn ttl(&self) -> Duration {
        ttl::RISK
    }

    async fn call(&self, services: &ServiceClients, spec: &FetchSpec) -> Result<WidgetData> {
        let metrics = services
            .risk
            .calculate_risk_metrics(spec.risk_target())
            .await?;
        Ok(WidgetData::Risk(metrics))
    }
}

/// Data and "other" widgets render a plain quote board.
struct QuoteFetch;

#[async_trait]
impl FetchStrategy for QuoteFetch {
    fn cache_key(&self, spec: &FetchSpec) -> String {
        format!("quotes:{}", spec.widget_id)
    }

    fn ttl(&self) -> Duration {
        ttl::QUOTES
    }

    async fn call(&self, services: &ServiceClients, spec: &FetchSpec) -> Result<WidgetData> {
        let quotes = services.market.get_quotes(&spec.symbols).await?;
        let quotes = quotes
            .into_values()
            .sorted_by(|a, b| a.symbol.cmp(&b.symbol))
            .collect();
        Ok(WidgetData::Quotes(quotes))
    }
}

/// Routes each widget type to its fetch strategy and owns the cache-first
/// sequence: key -> cache get -> service call -> cache set.
#[derive(Clone)]
pub struct FetchDispatcher {
    cache: CacheStore<WidgetData>,
    services: ServiceClients,
    strategies: HashMap<WidgetType, Arc<dyn FetchStrategy>>,
}

impl FetchDispatcher {
    pub fn new(cache: CacheStore<WidgetData>, services: ServiceClients) -> Self {
        let mut strategies: HashMap<WidgetType, Arc<dyn FetchStrategy>> = HashMap::new();
        strategies.insert(WidgetType::Portfolio, Arc::new(PortfolioFetch));
        strategies.insert(WidgetType::Strategy, Arc::new(StrategyFetch));
        strategies.insert(WidgetType::Report, Arc::new(ReportFetch));
        strategies.insert(WidgetType::Chart, Arc::new(ChartFetch));
        strategies.insert(WidgetType::Risk, Arc::new(RiskFetch));
        strategies.insert(WidgetType::Data, Arc::new(QuoteFetch));
        strategies.insert(WidgetType::Other, Arc::new(QuoteFetch));

        Self {
            cache,
            services,
            strategies,
        }
    }

    /// Register or replace the strategy for a widget type. New widget
    /// categories plug in here instead of editing a central switch.
    pub fn register_strategy(&mut self, widget_type: WidgetType, strategy: Arc<dyn FetchStrategy>) {
        self.strategies.insert(widget_type, strategy);
    }

    pub fn cache(&self) -> &CacheStore<WidgetData> {
        &self.cache
    }

    /// Cache-first fetch for one widget.
    ///
    /// Returns None when the token was cancelled before the result could be
    /// committed; in that case nothing was written to the cache and nothing
    /// should be delivered to the widget. A service failure is returned as an
    /// error result and is never written to the cache.
    pub async fn fetch(
        &self,
        spec: &FetchSpec,
        token: &CancellationToken,
    ) -> Option<FetchResult> {
        let start = Instant::now();

        let Some(strategy) = self.strategies.get(&spec.widget_type) else {
            return Some(FetchResult {
                widget_id: spec.widget_id.clone(),
                data: Err(format!("no fetch strategy for type '{}'", spec.widget_type)),
                from_cache: false,
                duration_ms: start.elapsed().as_millis(),
            });
        };

        if token.is_cancelled() {
            return None;
        }

        let key = strategy.cache_key(spec);

        if let Some(hit) = self.cache.get(&key) {
            #[cfg(debug_assertions)]
            if DF.log_fetch {
                log::debug!("fetch: cache hit [{}]", key);
            }
            return Some(FetchResult {
                widget_id: spec.widget_id.clone(),
                data: Ok(hit),
                from_cache: true,
                duration_ms: start.elapsed().as_millis(),
            });
        }

        let outcome = strategy.call(&self.services, spec).await;

        // The widget may have been removed or re-pointed while we were away.
        if token.is_cancelled() {
            #[cfg(debug_assertions)]
            if DF.log_fetch {
                log::debug!("fetch: discarded stale result [{}]", key);
            }
            return None;
        }

        let data = match outcome {
            Ok(data) => {
                // In-flight fetch wins: this write is the final word for the key.
                self.cache.set(&key, data.clone(), strategy.ttl());
                Ok(data)
            }
            Err(e) => {
                log::warn!("fetch: [{}] failed: {:#}", key, e);
                Err(format!("{e:#}"))
            }
        };

        Some(FetchResult {
            widget_id: spec.widget_id.clone(),
            data,
            from_cache: false,
            duration_ms: start.elapsed().as_millis(),
        })
    }
}
