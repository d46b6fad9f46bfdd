//! The shared coordinator that links widgets for synchronized viewing. One
//! master chart broadcasts its view state (symbol, zoom, time range,
//! indicators) to every connected widget.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::config::constants::GLOBAL_WATCHLIST;
use crate::models::TimeRange;

#[cfg(debug_assertions)]
use crate::config::DF;

/// Snapshot of the bus state.
///
/// Invariant: `master_widget`, when set, is a member of `connected_widgets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub connected_widgets: BTreeSet<String>,
    pub synced_symbol: Option<String>,
    pub synced_time_range: Option<TimeRange>,
    pub sync_enabled: bool,
    pub sync_zoom: bool,
    pub sync_indicators: bool,
    pub master_widget: Option<String>,
}

impl SyncState {
    fn initial(symbol: Option<String>) -> Self {
        Self {
            connected_widgets: BTreeSet::new(),
            synced_symbol: symbol,
            synced_time_range: None,
            sync_enabled: false,
            sync_zoom: true,
            sync_indicators: false,
            master_widget: None,
        }
    }
}

/// Broadcast delivered to listeners when an enabled channel changes.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    SymbolChanged(String),
    ZoomChanged(f64),
    TimeRangeChanged(TimeRange),
    IndicatorsChanged(Vec<String>),
    MasterChanged(Option<String>),
}

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

struct BusInner {
    state: SyncState,
    listeners: Vec<Listener>,
}

/// Explicitly instantiated bus, passed by handle to whoever needs it, so
/// independent canvases (and tests) get independent buses instead of a hidden
/// global.
#[derive(Clone)]
pub struct SyncBus {
    inner: Arc<Mutex<BusInner>>,
}

impl SyncBus {
    /// Bus seeded with the first globally watched symbol.
    pub fn new() -> Self {
        Self::with_initial_symbol(GLOBAL_WATCHLIST.first().map(|s| s.to_string()))
    }

    pub fn with_initial_symbol(symbol: Option<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                state: SyncState::initial(symbol),
                listeners: Vec::new(),
            })),
        }
    }

    pub fn add_listener(&self, listener: impl Fn(&SyncEvent) + Send + Sync + 'static) {
        self.inner.lock().unwrap().listeners.push(Arc::new(listener));
    }

    pub fn snapshot(&self) -> SyncState {
        self.inner.lock().unwrap().state.clone()
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .state
            .connected_widgets
            .contains(id)
    }

    pub fn master_widget(&self) -> Option<String> {
        self.inner.lock().unwrap().state.master_widget.clone()
    }

    /// Adds the widget to the connected set. Idempotent.
    pub fn connect_widget(&self, id: &str) {
        let added = self
            .inner
            .lock()
            .unwrap()
            .state
            .connected_widgets
            .insert(id.to_string());

        #[cfg(debug_assertions)]
        if added && DF.log_sync_bus {
            log::info!("sync: widget {} connected", id);
        }
        let _ = added;
    }

    /// Removes the widget; a removed master leaves the bus masterless.
    pub fn disconnect_widget(&self, id: &str) {
        let (removed, master_cleared) = {
            let mut inner = self.inner.lock().unwrap();
            let removed = inner.state.connected_widgets.remove(id);
            if inner.state.master_widget.as_deref() == Some(id) {
                inner.state.master_widget = None;
                (removed, true)
            } else {
                (removed, false)
            }
        };

        #[cfg(debug_assertions)]
        if removed && DF.log_sync_bus {
            log::info!("sync: widget {} disconnected", id);
        }
        let _ = removed;

        if master_cleared {
            self.emit(&SyncEvent::MasterChanged(None));
        }
    }

    /// Promotes a widget to master. Only one master at a time; promoting a new
    /// one silently replaces the previous. An unconnected widget is connected
    /// first rather than rejected.
    pub fn set_master_widget(&self, id: &str) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.state.connected_widgets.insert(id.to_string());
            inner.state.master_widget = Some(id.to_string());
        }
        self.emit(&SyncEvent::MasterChanged(Some(id.to_string())));
    }

    /// Records the symbol unconditionally so a later re-enable picks it up,
    /// but broadcasts only while sync is enabled.
    pub fn sync_to_symbol(&self, symbol: &str) {
        let enabled = {
            let mut inner = self.inner.lock().unwrap();
            inner.state.synced_symbol = Some(symbol.to_string());
            inner.state.sync_enabled
        };

        if enabled {
            self.emit(&SyncEvent::SymbolChanged(symbol.to_string()));
        } else {
            #[cfg(debug_assertions)]
            if DF.log_sync_bus {
                log::debug!(
                    "sync: symbol {} recorded, broadcast suppressed (sync off)",
                    symbol
                );
            }
        }
    }

    /// Broadcast-only while `sync_enabled && sync_zoom`.
    pub fn sync_zoom(&self, level: f64) {
        let broadcast = {
            let inner = self.inner.lock().unwrap();
            inner.state.sync_enabled && inner.state.sync_zoom
        };

        if broadcast {
            self.emit(&SyncEvent::ZoomChanged(level));
        } else {
            #[cfg(debug_assertions)]
            if DF.log_sync_bus {
                log::debug!("sync: zoom broadcast suppressed");
            }
        }
    }

    /// Shares the master's visible time window. Gated by the same toggle as
    /// zoom; the accepted range is kept in state for late joiners.
    pub fn sync_time_range(&self, range: TimeRange) {
        let broadcast = {
            let mut inner = self.inner.lock().unwrap();
            let on = inner.state.sync_enabled && inner.state.sync_zoom;
            if on {
                inner.state.synced_time_range = Some(range);
            }
            on
        };

        if broadcast {
            self.emit(&SyncEvent::TimeRangeChanged(range));
        }
    }

    /// Broadcast-only while `sync_enabled && sync_indicators`.
    pub fn sync_indicators(&self, indicators: Vec<String>) {
        let broadcast = {
            let inner = self.inner.lock().unwrap();
            inner.state.sync_enabled && inner.state.sync_indicators
        };

        if broadcast {
            self.emit(&SyncEvent::IndicatorsChanged(indicators));
        } else {
            #[cfg(debug_assertions)]
            if DF.log_sync_bus {
                log::debug!("sync: indicator broadcast suppressed");
            }
        }
    }

    /// Flips the master sync switch; returns the new value.
    pub fn toggle_sync(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.state.sync_enabled = !inner.state.sync_enabled;
        inner.state.sync_enabled
    }

    pub fn toggle_zoom_sync(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.state.sync_zoom = !inner.state.sync_zoom;
        inner.state.sync_zoom
    }

    pub fn toggle_indicator_sync(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.state.sync_indicators = !inner.state.sync_indicators;
        inner.state.sync_indicators
    }

    fn emit(&self, event: &SyncEvent) {
        // Listeners run outside the lock so they may call back into the bus.
        let listeners: Vec<Listener> = self.inner.lock().unwrap().listeners.clone();
        for listener in listeners {
            listener(event);
        }
    }
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new()
    }
}
