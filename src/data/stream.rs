//! Multiplexes per-widget symbol subscriptions onto a single upstream
//! provider registration covering the union of symbols currently needed.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use itertools::Itertools;
use strum_macros::Display;
use uuid::Uuid;

use crate::models::QuoteUpdate;

#[cfg(debug_assertions)]
use crate::config::DF;

use super::services::{StreamingProvider, UpdateCallback};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Disconnected,
}

struct SubscriberEntry {
    symbols: BTreeSet<String>,
    callback: UpdateCallback,
}

struct StreamInner {
    // Registration order is delivery order.
    subscribers: Vec<(String, SubscriberEntry)>,
    // symbol -> number of subscribers that still need it
    symbol_refs: HashMap<String, usize>,
    upstream_id: Option<String>,
    status: ConnectionStatus,
    // When true, incoming updates are dropped (simulation / replay mode).
    suspended: bool,
    last_prices: HashMap<String, f64>,
}

/// Manages live market-data delivery for many widgets over one provider
/// registration. Symbols are reference-counted: removing one widget's
/// subscription never disturbs a sibling watching the same symbol.
#[derive(Clone)]
pub struct RealtimeSubscriptionManager {
    provider: Arc<dyn StreamingProvider>,
    inner: Arc<Mutex<StreamInner>>,
}

impl RealtimeSubscriptionManager {
    pub fn new(provider: Arc<dyn StreamingProvider>) -> Self {
        Self {
            provider,
            inner: Arc::new(Mutex::new(StreamInner {
                subscribers: Vec::new(),
                symbol_refs: HashMap::new(),
                upstream_id: None,
                status: ConnectionStatus::Disconnected,
                suspended: false,
                last_prices: HashMap::new(),
            })),
        }
    }

    /// Registers a callback against a symbol set and returns the subscription
    /// id. The upstream provider only learns about the union of symbols, not
    /// about individual widgets.
    pub fn subscribe<I, S>(&self, symbols: I, callback: UpdateCallback) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = Uuid::new_v4().to_string();
        let symbols: BTreeSet<String> = symbols.into_iter().map(Into::into).collect();

        {
            let mut inner = self.inner.lock().unwrap();
            for symbol in &symbols {
                *inner.symbol_refs.entry(symbol.clone()).or_insert(0) += 1;
            }
            inner
                .subscribers
                .push((id.clone(), SubscriberEntry { symbols, callback }));
        }

        #[cfg(debug_assertions)]
        if DF.log_stream_updates {
            log::info!("stream: subscription {} registered", id);
        }

        self.resync_upstream();
        id
    }

    /// Drops the callback. Symbols nobody else needs leave the upstream union.
    pub fn unsubscribe(&self, subscription_id: &str) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            let Some(pos) = inner
                .subscribers
                .iter()
                .position(|(id, _)| id == subscription_id)
            else {
                return;
            };

            let (_, entry) = inner.subscribers.remove(pos);
            for symbol in &entry.symbols {
                if let Some(count) = inner.symbol_refs.get_mut(symbol) {
                    *count -= 1;
                    if *count == 0 {
                        inner.symbol_refs.remove(symbol);
                    }
                }
            }
            true
        };

        if removed {
            #[cfg(debug_assertions)]
            if DF.log_stream_updates {
                log::info!("stream: subscription {} dropped", subscription_id);
            }
            self.resync_upstream();
        }
    }

    /// Union of all symbols any live subscriber still needs, sorted.
    pub fn needed_symbols(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .symbol_refs
            .keys()
            .cloned()
            .sorted()
            .collect()
    }

    /// Entry point for provider pushes. Also usable directly by tests and by
    /// polling fallbacks that synthesize updates.
    pub fn handle_update(&self, update: QuoteUpdate) {
        dispatch_update(&self.inner, update);
    }

    /// Last live price seen for a symbol, if any update arrived.
    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.inner.lock().unwrap().last_prices.get(symbol).copied()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().unwrap().status
    }

    /// Hook for the host to reflect provider connectivity ("live" vs "offline"
    /// indicators). Reconnect handling belongs to the provider.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.inner.lock().unwrap().status = status;
    }

    /// Suspend update delivery (simulation mode).
    pub fn suspend(&self) {
        self.inner.lock().unwrap().suspended = true;
        #[cfg(debug_assertions)]
        if DF.log_stream_updates {
            log::info!("stream: updates suspended");
        }
    }

    /// Resume update delivery.
    pub fn resume(&self) {
        self.inner.lock().unwrap().suspended = false;
        #[cfg(debug_assertions)]
        if DF.log_stream_updates {
            log::info!("stream: updates resumed");
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.lock().unwrap().suspended
    }

    /// Recomputes the union and replaces the single upstream registration.
    fn resync_upstream(&self) {
        let (union, old_id): (Vec<String>, Option<String>) = {
            let mut inner = self.inner.lock().unwrap();
            let union = inner.symbol_refs.keys().cloned().sorted().collect();
            (union, inner.upstream_id.take())
        };

        if let Some(id) = old_id {
            if let Err(e) = self.provider.unsubscribe(&id) {
                log::warn!("stream: failed to drop upstream subscription: {:#}", e);
            }
        }

        if union.is_empty() {
            self.inner.lock().unwrap().status = ConnectionStatus::Disconnected;
            return;
        }

        self.inner.lock().unwrap().status = ConnectionStatus::Connecting;

        // The provider callback only captures the dispatch state, not the
        // manager itself.
        let inner_arc = self.inner.clone();
        let on_update: UpdateCallback =
            Arc::new(move |update| dispatch_update(&inner_arc, update));

        match self.provider.subscribe(union, on_update) {
            Ok(id) => {
                let mut inner = self.inner.lock().unwrap();
                inner.upstream_id = Some(id);
                inner.status = ConnectionStatus::Connected;
            }
            Err(e) => {
                // Widgets degrade to "offline"; nothing crashes.
                log::error!("stream: upstream subscribe failed: {:#}", e);
                self.inner.lock().unwrap().status = ConnectionStatus::Disconnected;
            }
        }
    }
}

fn dispatch_update(inner: &Mutex<StreamInner>, update: QuoteUpdate) {
    let callbacks: Vec<UpdateCallback> = {
        let mut guard = inner.lock().unwrap();
        if guard.suspended {
            return;
        }
        guard
            .last_prices
            .insert(update.symbol.clone(), update.price);
        guard
            .subscribers
            .iter()
            .filter(|(_, entry)| entry.symbols.contains(&update.symbol))
            .map(|(_, entry)| entry.callback.clone())
            .collect()
    };

    #[cfg(debug_assertions)]
    if DF.log_stream_updates {
        log::info!(
            "[tick] {} -> {:.4} ({} subscriber(s))",
            update.symbol,
            update.price,
            callbacks.len()
        );
    }

    // Callbacks run outside the lock so a subscriber may re-enter the manager.
    for callback in callbacks {
        callback(update.clone());
    }
}
