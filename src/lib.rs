#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::type_complexity)]

// Core modules
pub mod canvas;
pub mod config;
pub mod data;
pub mod models;
pub mod sync;
pub mod utils;

// Re-export the types a host application touches on the happy path
pub use canvas::{LayoutTemplate, WidgetQuoteUpdate, WidgetRegistry};
pub use data::{
    CacheStore, FetchDispatcher, FetchResult, FetchSpec, RealtimeSubscriptionManager,
    ServiceClients, WidgetData,
};
pub use models::{Widget, WidgetSpec, WidgetType};
pub use sync::{SyncBus, SyncEvent, SyncState};
