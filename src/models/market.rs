use serde::{Deserialize, Serialize};

/// Snapshot quote returned by the market data service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: f64,
}

/// Push update delivered over the streaming provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteUpdate {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: f64,
}

impl QuoteUpdate {
    /// Convenience for tests and simple providers that only move the price.
    pub fn price_only(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change: 0.0,
            change_percent: 0.0,
            volume: 0.0,
        }
    }
}
