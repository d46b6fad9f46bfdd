//! Owns the widgets on one canvas and performs the lifecycle side effects:
//! sync-bus membership, market-data subscriptions and refresh timers. Pure
//! geometry mutations (move/resize/minimize) touch nothing but the widget.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::config::constants::{DEFAULT_REFRESH_INTERVAL_MS, geometry};
use crate::data::{
    FetchDispatcher, FetchResult, FetchSpec, RealtimeSubscriptionManager, RefreshHandle,
    UpdateCallback, spawn_refresh_task,
};
use crate::models::{Position, QuoteUpdate, Size, Widget, WidgetSpec};
use crate::sync::SyncBus;
use crate::utils::CancellationToken;

#[cfg(debug_assertions)]
use crate::config::DF;

use super::layouts::LayoutTemplate;

/// A live update tagged with the widget it belongs to. The host drains one
/// channel for the whole canvas and routes by widget id.
#[derive(Debug, Clone)]
pub struct WidgetQuoteUpdate {
    pub widget_id: String,
    pub update: QuoteUpdate,
}

struct Refresher {
    dispatcher: FetchDispatcher,
    results_tx: Sender<FetchResult>,
}

pub struct WidgetRegistry {
    widgets: HashMap<String, Widget>,
    // Insertion order, for stable iteration and the geometry cascade.
    order: Vec<String>,
    sync_bus: SyncBus,
    streams: RealtimeSubscriptionManager,
    // widget id -> live subscription id
    subscriptions: HashMap<String, String>,
    refresh_handles: HashMap<String, RefreshHandle>,
    refresher: Option<Refresher>,
    quote_tx: Option<Sender<WidgetQuoteUpdate>>,
}

impl WidgetRegistry {
    pub fn new(sync_bus: SyncBus, streams: RealtimeSubscriptionManager) -> Self {
        Self {
            widgets: HashMap::new(),
            order: Vec::new(),
            sync_bus,
            streams,
            subscriptions: HashMap::new(),
            refresh_handles: HashMap::new(),
            refresher: None,
            quote_tx: None,
        }
    }

    /// Attach the fetch pipeline. Widgets with auto refresh get a polling task
    /// whose results arrive on `results_tx`. Requires a tokio runtime.
    pub fn with_refresher(
        mut self,
        dispatcher: FetchDispatcher,
        results_tx: Sender<FetchResult>,
    ) -> Self {
        self.refresher = Some(Refresher {
            dispatcher,
            results_tx,
        });
        self
    }

    /// Attach a channel for live quote updates, tagged per widget.
    pub fn with_quote_sender(mut self, quote_tx: Sender<WidgetQuoteUpdate>) -> Self {
        self.quote_tx = Some(quote_tx);
        self
    }

    pub fn sync_bus(&self) -> &SyncBus {
        &self.sync_bus
    }

    pub fn streams(&self) -> &RealtimeSubscriptionManager {
        &self.streams
    }

    pub fn get(&self, id: &str) -> Option<&Widget> {
        self.widgets.get(id)
    }

    /// Widgets in insertion order.
    pub fn widgets(&self) -> impl Iterator<Item = &Widget> {
        self.order.iter().filter_map(|id| self.widgets.get(id))
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Creates the widget, wires its side effects, and returns a copy.
    ///
    /// Chart-like widgets (chart, risk) are sync-eligible by convention and
    /// join the bus immediately; other types stay out.
    pub fn add_widget(&mut self, spec: WidgetSpec) -> Widget {
        let id = Uuid::new_v4().to_string();
        let cascade = self.widgets.len() as f64;

        let widget = Widget {
            id: id.clone(),
            widget_type: spec.widget_type,
            title: spec
                .title
                .unwrap_or_else(|| spec.widget_type.to_string()),
            position: spec.position.unwrap_or(Position {
                x: geometry::ORIGIN_X + cascade * geometry::CASCADE_STEP,
                y: geometry::ORIGIN_Y + cascade * geometry::CASCADE_STEP,
            }),
            size: spec.size.unwrap_or(Size {
                w: geometry::DEFAULT_W,
                h: geometry::DEFAULT_H,
            }),
            minimized: false,
            subscribed_symbols: spec.symbols.into_iter().collect(),
            auto_refresh: spec.auto_refresh,
            refresh_interval_ms: spec
                .refresh_interval_ms
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_MS),
            sync_enabled: spec.widget_type.sync_eligible(),
            portfolio_id: spec.portfolio_id,
            settings: spec.settings.unwrap_or(serde_json::Value::Null),
        };

        if widget.sync_enabled {
            self.sync_bus.connect_widget(&id);
        }
        self.subscribe_widget(&widget);
        self.spawn_refresh(&widget);

        #[cfg(debug_assertions)]
        if DF.log_registry {
            log::info!("registry: added {} widget {}", widget.widget_type, id);
        }

        self.order.push(id.clone());
        self.widgets.insert(id, widget.clone());
        widget
    }

    /// Instantiates every widget of a layout template. Convenience only; the
    /// produced widgets behave exactly like individually added ones.
    pub fn apply_template(&mut self, template: LayoutTemplate) -> Vec<Widget> {
        template
            .widgets()
            .into_iter()
            .map(|spec| self.add_widget(spec))
            .collect()
    }

    /// Removes the widget and all of its side effects: the refresh task is
    /// cancelled (so an in-flight fetch cannot commit afterwards), the
    /// market-data subscription is dropped, and the widget leaves the sync
    /// bus (clearing the master slot if it held it).
    pub fn remove_widget(&mut self, id: &str) -> bool {
        let Some(widget) = self.widgets.remove(id) else {
            return false;
        };
        self.order.retain(|w| w != id);

        if let Some(handle) = self.refresh_handles.remove(id) {
            handle.cancel();
        }
        if let Some(sub_id) = self.subscriptions.remove(id) {
            self.streams.unsubscribe(&sub_id);
        }
        self.sync_bus.disconnect_widget(id);

        #[cfg(debug_assertions)]
        if DF.log_registry {
            log::info!("registry: removed {} widget {}", widget.widget_type, id);
        }
        let _ = widget;
        true
    }

    /// Pure geometry mutation; never touches the bus or subscriptions.
    pub fn move_widget(&mut self, id: &str, position: Position) -> bool {
        match self.widgets.get_mut(id) {
            Some(widget) => {
                widget.position = position;
                true
            }
            None => false,
        }
    }

    /// Pure geometry mutation; never touches the bus or subscriptions.
    pub fn resize_widget(&mut self, id: &str, size: Size) -> bool {
        match self.widgets.get_mut(id) {
            Some(widget) => {
                widget.size = size;
                true
            }
            None => false,
        }
    }

    /// Pure field mutation; never touches the bus or subscriptions.
    pub fn toggle_minimize(&mut self, id: &str) -> bool {
        match self.widgets.get_mut(id) {
            Some(widget) => {
                widget.minimized = !widget.minimized;
                true
            }
            None => false,
        }
    }

    /// Replaces the widget's symbol set. The old subscription is torn down and
    /// a fresh one created (never left dangling), and the refresh task is
    /// restarted because chart cache keys embed the primary symbol.
    pub fn set_widget_symbols<I, S>(&mut self, id: &str, symbols: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(widget) = self.widgets.get_mut(id) else {
            return false;
        };
        widget.subscribed_symbols = symbols.into_iter().map(Into::into).collect();
        let snapshot = widget.clone();

        self.teardown_subscription(id);
        self.teardown_refresh(id);
        self.subscribe_widget(&snapshot);
        self.spawn_refresh(&snapshot);
        true
    }

    /// Changes the polling cadence: old timer torn down, new one started, so
    /// the widget never runs two concurrent fetch loops.
    pub fn set_refresh_interval(&mut self, id: &str, interval_ms: u64) -> bool {
        let Some(widget) = self.widgets.get_mut(id) else {
            return false;
        };
        widget.refresh_interval_ms = interval_ms;
        let snapshot = widget.clone();

        self.teardown_refresh(id);
        self.spawn_refresh(&snapshot);
        true
    }

    /// Turns the periodic refresh (and the live subscription) on or off.
    pub fn set_auto_refresh(&mut self, id: &str, enabled: bool) -> bool {
        let Some(widget) = self.widgets.get_mut(id) else {
            return false;
        };
        if widget.auto_refresh == enabled {
            return true;
        }
        widget.auto_refresh = enabled;
        let snapshot = widget.clone();

        self.teardown_subscription(id);
        self.teardown_refresh(id);
        if enabled {
            self.subscribe_widget(&snapshot);
            self.spawn_refresh(&snapshot);
        }
        true
    }

    fn subscribe_widget(&mut self, widget: &Widget) {
        if !widget.auto_refresh || widget.subscribed_symbols.is_empty() {
            return;
        }

        let callback: UpdateCallback = match &self.quote_tx {
            Some(tx) => {
                // Sender is not Sync; the mutex makes the callback shareable.
                let tx = Mutex::new(tx.clone());
                let widget_id = widget.id.clone();
                Arc::new(move |update| {
                    let _ = tx.lock().unwrap().send(WidgetQuoteUpdate {
                        widget_id: widget_id.clone(),
                        update,
                    });
                })
            }
            None => Arc::new(|_| {}),
        };

        let sub_id = self
            .streams
            .subscribe(widget.subscribed_symbols.iter().cloned(), callback);
        self.subscriptions.insert(widget.id.clone(), sub_id);
    }

    fn spawn_refresh(&mut self, widget: &Widget) {
        let Some(refresher) = &self.refresher else {
            return;
        };
        if !widget.auto_refresh {
            return;
        }

        let handle = spawn_refresh_task(
            refresher.dispatcher.clone(),
            FetchSpec::for_widget(widget),
            widget.refresh_interval_ms,
            refresher.results_tx.clone(),
            CancellationToken::new(),
        );
        self.refresh_handles.insert(widget.id.clone(), handle);
    }

    fn teardown_subscription(&mut self, id: &str) {
        if let Some(sub_id) = self.subscriptions.remove(id) {
            self.streams.unsubscribe(&sub_id);
        }
    }

    fn teardown_refresh(&mut self, id: &str) {
        if let Some(handle) = self.refresh_handles.remove(id) {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StreamingProvider;
    use crate::models::WidgetType;
    use anyhow::Result;
    use std::sync::mpsc;

    /// Provider that accepts everything and lets tests push updates through
    /// the manager directly.
    struct NullProvider;

    impl StreamingProvider for NullProvider {
        fn subscribe(&self, _symbols: Vec<String>, _on_update: UpdateCallback) -> Result<String> {
            Ok(Uuid::new_v4().to_string())
        }

        fn unsubscribe(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> WidgetRegistry {
        WidgetRegistry::new(
            SyncBus::with_initial_symbol(None),
            RealtimeSubscriptionManager::new(Arc::new(NullProvider)),
        )
    }

    #[test]
    fn chart_widgets_are_sync_enabled_and_connected_by_default() {
        let mut registry = registry();

        let chart = registry.add_widget(
            WidgetSpec::new(WidgetType::Chart).with_symbols(["600519"]),
        );
        let portfolio = registry.add_widget(WidgetSpec::new(WidgetType::Portfolio));

        assert!(chart.sync_enabled);
        assert!(registry.sync_bus().is_connected(&chart.id));
        assert!(!portfolio.sync_enabled);
        assert!(!registry.sync_bus().is_connected(&portfolio.id));
    }

    #[test]
    fn default_geometry_cascades_per_widget() {
        let mut registry = registry();

        let first = registry.add_widget(WidgetSpec::new(WidgetType::Portfolio));
        let second = registry.add_widget(WidgetSpec::new(WidgetType::Report));

        assert_eq!(first.position.x, geometry::ORIGIN_X);
        assert_eq!(
            second.position.x,
            geometry::ORIGIN_X + geometry::CASCADE_STEP
        );
        assert_eq!(first.size.w, geometry::DEFAULT_W);
    }

    #[test]
    fn two_charts_on_one_symbol_each_receive_a_tagged_update() {
        let (quote_tx, quote_rx) = mpsc::channel();
        let mut registry = registry().with_quote_sender(quote_tx);

        let a = registry.add_widget(
            WidgetSpec::new(WidgetType::Chart).with_symbols(["600519"]),
        );
        let b = registry.add_widget(
            WidgetSpec::new(WidgetType::Chart).with_symbols(["600519"]),
        );

        registry
            .streams()
            .handle_update(QuoteUpdate::price_only("600519", 1812.5));

        let mut seen: Vec<String> = quote_rx.try_iter().map(|u| u.widget_id).collect();
        seen.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn removing_a_widget_stops_its_updates_but_not_the_siblings() {
        let (quote_tx, quote_rx) = mpsc::channel();
        let mut registry = registry().with_quote_sender(quote_tx);

        let a = registry.add_widget(
            WidgetSpec::new(WidgetType::Chart).with_symbols(["600519"]),
        );
        let b = registry.add_widget(
            WidgetSpec::new(WidgetType::Chart).with_symbols(["600519"]),
        );

        registry.remove_widget(&a.id);
        registry
            .streams()
            .handle_update(QuoteUpdate::price_only("600519", 1800.0));

        let seen: Vec<String> = quote_rx.try_iter().map(|u| u.widget_id).collect();
        assert_eq!(seen, vec![b.id]);
    }

    #[test]
    fn removing_the_master_widget_clears_the_master_slot() {
        let mut registry = registry();

        let chart = registry.add_widget(
            WidgetSpec::new(WidgetType::Chart).with_symbols(["600519"]),
        );
        registry.sync_bus().set_master_widget(&chart.id);

        registry.remove_widget(&chart.id);

        let state = registry.sync_bus().snapshot();
        assert_eq!(state.master_widget, None);
        assert!(!state.connected_widgets.contains(&chart.id));
        // The subscription went with the widget.
        assert!(registry.streams().needed_symbols().is_empty());
    }

    #[test]
    fn geometry_mutations_leave_bus_and_subscriptions_alone() {
        let mut registry = registry();

        let chart = registry.add_widget(
            WidgetSpec::new(WidgetType::Chart).with_symbols(["600519"]),
        );
        let connected_before = registry.sync_bus().snapshot().connected_widgets;
        let symbols_before = registry.streams().needed_symbols();

        registry.move_widget(&chart.id, Position { x: 10.0, y: 20.0 });
        registry.resize_widget(&chart.id, Size { w: 300.0, h: 200.0 });
        registry.toggle_minimize(&chart.id);

        let widget = registry.get(&chart.id).unwrap();
        assert_eq!(widget.position.x, 10.0);
        assert_eq!(widget.size.w, 300.0);
        assert!(widget.minimized);
        assert_eq!(
            registry.sync_bus().snapshot().connected_widgets,
            connected_before
        );
        assert_eq!(registry.streams().needed_symbols(), symbols_before);
    }

    #[test]
    fn changing_symbols_replaces_the_subscription() {
        let mut registry = registry();

        let chart = registry.add_widget(
            WidgetSpec::new(WidgetType::Chart).with_symbols(["600519"]),
        );
        assert_eq!(
            registry.streams().needed_symbols(),
            vec!["600519".to_string()]
        );

        registry.set_widget_symbols(&chart.id, ["000858"]);

        assert_eq!(
            registry.streams().needed_symbols(),
            vec!["000858".to_string()]
        );
        assert_eq!(
            registry.get(&chart.id).unwrap().primary_symbol(),
            Some("000858")
        );
    }

    #[test]
    fn auto_refresh_toggle_drops_and_restores_the_subscription() {
        let mut registry = registry();

        let chart = registry.add_widget(
            WidgetSpec::new(WidgetType::Chart).with_symbols(["600519"]),
        );
        assert_eq!(
            registry.streams().needed_symbols(),
            vec!["600519".to_string()]
        );

        assert!(registry.set_auto_refresh(&chart.id, false));
        assert!(registry.streams().needed_symbols().is_empty());
        assert!(!registry.get(&chart.id).unwrap().auto_refresh);

        assert!(registry.set_auto_refresh(&chart.id, true));
        assert_eq!(
            registry.streams().needed_symbols(),
            vec!["600519".to_string()]
        );
    }

    #[test]
    fn manual_refresh_widgets_do_not_subscribe() {
        let mut registry = registry();

        registry.add_widget(
            WidgetSpec::new(WidgetType::Chart)
                .with_symbols(["600519"])
                .manual_refresh(),
        );

        assert!(registry.streams().needed_symbols().is_empty());
    }

    #[test]
    fn templates_instantiate_with_unique_ids() {
        let mut registry = registry();

        let widgets = registry.apply_template(LayoutTemplate::Bloomberg);

        assert_eq!(widgets.len(), 5);
        let mut ids: Vec<&str> = widgets.iter().map(|w| w.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn unknown_ids_are_rejected_without_side_effects() {
        let mut registry = registry();

        assert!(!registry.remove_widget("nope"));
        assert!(!registry.move_widget("nope", Position { x: 0.0, y: 0.0 }));
        assert!(!registry.set_refresh_interval("nope", 1_000));
    }

    mod with_refresher {
        use super::*;
        use crate::data::{CacheStore, ServiceClients};
        use crate::data::{
            MarketDataService, PortfolioService, ReportService, RiskService, StrategyService,
        };
        use crate::models::{
            BacktestResult, GeneratedReport, Portfolio, Quote, RiskMetrics, ScheduledReport,
            StrategyRun,
        };
        use async_trait::async_trait;
        use std::collections::HashMap;

        struct StubServices;

        #[async_trait]
        impl MarketDataService for StubServices {
            async fn get_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>> {
                Ok(symbols
                    .iter()
                    .map(|s| {
                        (
                            s.clone(),
                            Quote {
                                symbol: s.clone(),
                                price: 1.0,
                                change: 0.0,
                                change_percent: 0.0,
                                volume: 0.0,
                            },
                        )
                    })
                    .collect())
            }
        }

        #[async_trait]
        impl PortfolioService for StubServices {
            async fn get_all_portfolios(&self) -> Result<Vec<Portfolio>> {
                Ok(Vec::new())
            }
        }

        #[async_trait]
        impl StrategyService for StubServices {
            async fn get_running_strategies(&self) -> Result<Vec<StrategyRun>> {
                Ok(Vec::new())
            }
            async fn get_backtest_results(&self, _limit: usize) -> Result<Vec<BacktestResult>> {
                Ok(Vec::new())
            }
        }

        #[async_trait]
        impl ReportService for StubServices {
            async fn get_generated_reports(&self, _limit: usize) -> Result<Vec<GeneratedReport>> {
                Ok(Vec::new())
            }
            async fn get_scheduled_reports(&self) -> Result<Vec<ScheduledReport>> {
                Ok(Vec::new())
            }
        }

        #[async_trait]
        impl RiskService for StubServices {
            async fn calculate_risk_metrics(&self, portfolio_id: &str) -> Result<RiskMetrics> {
                Ok(RiskMetrics {
                    portfolio_id: portfolio_id.to_string(),
                    var_95: 0.0,
                    beta: 0.0,
                    sharpe: 0.0,
                    volatility: 0.0,
                    max_drawdown_pct: 0.0,
                })
            }
        }

        fn dispatcher() -> FetchDispatcher {
            let stub = Arc::new(StubServices);
            FetchDispatcher::new(
                CacheStore::new(),
                ServiceClients {
                    market: stub.clone(),
                    portfolio: stub.clone(),
                    strategy: stub.clone(),
                    report: stub.clone(),
                    risk: stub,
                },
            )
        }

        #[tokio::test(start_paused = true)]
        async fn auto_refresh_widgets_get_a_polling_task() {
            let (results_tx, results_rx) = mpsc::channel();
            let mut registry = registry().with_refresher(dispatcher(), results_tx);

            let chart = registry.add_widget(
                WidgetSpec::new(WidgetType::Chart).with_symbols(["600519"]),
            );

            tokio::task::yield_now().await;
            tokio::task::yield_now().await;

            let result = results_rx.try_recv().expect("expected a mount fetch");
            assert_eq!(result.widget_id, chart.id);
            assert!(result.data.is_ok());
        }

        #[tokio::test(start_paused = true)]
        async fn removal_cancels_the_polling_task() {
            let (results_tx, results_rx) = mpsc::channel();
            let mut registry = registry().with_refresher(dispatcher(), results_tx);

            let chart = registry.add_widget(
                WidgetSpec::new(WidgetType::Chart)
                    .with_symbols(["600519"])
                    .every_ms(1_000),
            );

            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            assert!(results_rx.try_recv().is_ok());

            registry.remove_widget(&chart.id);

            tokio::time::advance(std::time::Duration::from_secs(10)).await;
            tokio::task::yield_now().await;
            assert!(results_rx.try_recv().is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn interval_change_replaces_the_task_without_duplicates() {
            let (results_tx, results_rx) = mpsc::channel();
            let mut registry = registry().with_refresher(dispatcher(), results_tx);

            let chart = registry.add_widget(
                WidgetSpec::new(WidgetType::Chart)
                    .with_symbols(["600519"])
                    .every_ms(1_000),
            );

            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            assert_eq!(results_rx.try_iter().count(), 1);

            registry.set_refresh_interval(&chart.id, 2_000);
            assert_eq!(registry.get(&chart.id).unwrap().refresh_interval_ms, 2_000);

            // The replacement task fetches once on start.
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            assert_eq!(results_rx.try_iter().count(), 1);

            // Four seconds at the new cadence is exactly two ticks; a leaked
            // 1s task would roughly double that.
            for _ in 0..4 {
                tokio::time::advance(std::time::Duration::from_secs(1)).await;
                tokio::task::yield_now().await;
            }
            assert_eq!(results_rx.try_iter().count(), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn auto_refresh_off_stops_the_task_and_on_restarts_it() {
            let (results_tx, results_rx) = mpsc::channel();
            let mut registry = registry().with_refresher(dispatcher(), results_tx);

            let chart = registry.add_widget(
                WidgetSpec::new(WidgetType::Chart)
                    .with_symbols(["600519"])
                    .every_ms(1_000),
            );

            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            assert_eq!(results_rx.try_iter().count(), 1);

            registry.set_auto_refresh(&chart.id, false);
            assert!(registry.streams().needed_symbols().is_empty());

            tokio::time::advance(std::time::Duration::from_secs(5)).await;
            tokio::task::yield_now().await;
            assert_eq!(results_rx.try_iter().count(), 0);

            registry.set_auto_refresh(&chart.id, true);
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            assert_eq!(results_rx.try_iter().count(), 1);
            assert_eq!(
                registry.streams().needed_symbols(),
                vec!["600519".to_string()]
            );
        }
    }
}
