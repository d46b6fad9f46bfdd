use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Widget category. Drives fetch strategy selection and sync eligibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WidgetType {
    Chart,
    Risk,
    Data,
    Portfolio,
    Strategy,
    Report,
    Other,
}

impl WidgetType {
    /// Charts and risk panels join the sync bus by default; the rest do not.
    pub fn sync_eligible(&self) -> bool {
        matches!(self, WidgetType::Chart | WidgetType::Risk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub w: f64,
    pub h: f64,
}

/// Time window shared between synced charts (epoch ms, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

/// A user-placed panel on the canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub widget_type: WidgetType,
    pub title: String,
    pub position: Position,
    pub size: Size,
    pub minimized: bool,
    pub subscribed_symbols: BTreeSet<String>,
    pub auto_refresh: bool,
    pub refresh_interval_ms: u64,
    pub sync_enabled: bool,
    /// Risk panels target a specific portfolio.
    pub portfolio_id: Option<String>,
    /// Opaque per-widget settings blob owned by the rendering layer.
    pub settings: serde_json::Value,
}

impl Widget {
    /// First subscribed symbol. Used as the cache-key discriminator for chart
    /// and risk fetches.
    pub fn primary_symbol(&self) -> Option<&str> {
        self.subscribed_symbols.iter().next().map(|s| s.as_str())
    }
}

/// Construction recipe handed to the registry (and produced by layout
/// templates). Anything left unset falls back to registry defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetSpec {
    pub widget_type: WidgetType,
    pub title: Option<String>,
    pub symbols: Vec<String>,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub auto_refresh: bool,
    pub refresh_interval_ms: Option<u64>,
    pub portfolio_id: Option<String>,
    pub settings: Option<serde_json::Value>,
}

impl WidgetSpec {
    pub fn new(widget_type: WidgetType) -> Self {
        Self {
            widget_type,
            title: None,
            symbols: Vec::new(),
            position: None,
            size: None,
            auto_refresh: true,
            refresh_interval_ms: None,
            portfolio_id: None,
            settings: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn for_portfolio(mut self, portfolio_id: impl Into<String>) -> Self {
        self.portfolio_id = Some(portfolio_id.into());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn sized(mut self, w: f64, h: f64) -> Self {
        self.size = Some(Size { w, h });
        self
    }

    pub fn every_ms(mut self, interval_ms: u64) -> Self {
        self.refresh_interval_ms = Some(interval_ms);
        self
    }

    /// Opt out of the periodic refresh cycle (and the live subscription).
    pub fn manual_refresh(mut self) -> Self {
        self.auto_refresh = false;
        self
    }
}
