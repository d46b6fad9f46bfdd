//! Pre-baked canvas arrangements. Pure constructors: each template produces a
//! list of widget specs at fixed offsets and carries no runtime state. Ids are
//! assigned by the registry; overlapping geometry is a cosmetic concern only.

use strum_macros::{Display, EnumIter, EnumString};

use crate::config::constants::GLOBAL_WATCHLIST;
use crate::models::{WidgetSpec, WidgetType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum LayoutTemplate {
    Quad,
    DualH,
    DualV,
    Bloomberg,
    Professional,
    Trader,
    Manager,
    Executive,
}

fn watch(i: usize) -> &'static str {
    GLOBAL_WATCHLIST[i % GLOBAL_WATCHLIST.len()]
}

fn chart(symbol: &str, x: f64, y: f64, w: f64, h: f64) -> WidgetSpec {
    WidgetSpec::new(WidgetType::Chart)
        .with_title(symbol)
        .with_symbols([symbol])
        .at(x, y)
        .sized(w, h)
}

fn panel(widget_type: WidgetType, x: f64, y: f64, w: f64, h: f64) -> WidgetSpec {
    WidgetSpec::new(widget_type)
        .with_title(widget_type.to_string())
        .at(x, y)
        .sized(w, h)
}

impl LayoutTemplate {
    pub fn widgets(&self) -> Vec<WidgetSpec> {
        match self {
            // Four charts in a 2x2 grid.
            LayoutTemplate::Quad => vec![
                chart(watch(0), 0.0, 0.0, 480.0, 320.0),
                chart(watch(1), 480.0, 0.0, 480.0, 320.0),
                chart(watch(2), 0.0, 320.0, 480.0, 320.0),
                chart(watch(3), 480.0, 320.0, 480.0, 320.0),
            ],
            LayoutTemplate::DualH => vec![
                chart(watch(0), 0.0, 0.0, 480.0, 640.0),
                chart(watch(1), 480.0, 0.0, 480.0, 640.0),
            ],
            LayoutTemplate::DualV => vec![
                chart(watch(0), 0.0, 0.0, 960.0, 320.0),
                chart(watch(1), 0.0, 320.0, 960.0, 320.0),
            ],
            // Dense terminal-style wall: chart, tape, book-keeping.
            LayoutTemplate::Bloomberg => vec![
                chart(watch(0), 0.0, 0.0, 640.0, 400.0),
                panel(WidgetType::Data, 640.0, 0.0, 320.0, 400.0)
                    .with_symbols(GLOBAL_WATCHLIST.iter().copied()),
                panel(WidgetType::Portfolio, 0.0, 400.0, 320.0, 240.0),
                panel(WidgetType::Risk, 320.0, 400.0, 320.0, 240.0),
                panel(WidgetType::Report, 640.0, 400.0, 320.0, 240.0),
            ],
            LayoutTemplate::Professional => vec![
                chart(watch(0), 0.0, 0.0, 640.0, 480.0),
                panel(WidgetType::Risk, 640.0, 0.0, 320.0, 240.0),
                panel(WidgetType::Portfolio, 640.0, 240.0, 320.0, 240.0),
            ],
            LayoutTemplate::Trader => vec![
                chart(watch(0), 0.0, 0.0, 480.0, 360.0),
                chart(watch(1), 480.0, 0.0, 480.0, 360.0),
                panel(WidgetType::Strategy, 0.0, 360.0, 480.0, 280.0),
                panel(WidgetType::Data, 480.0, 360.0, 480.0, 280.0)
                    .with_symbols(GLOBAL_WATCHLIST.iter().copied()),
            ],
            LayoutTemplate::Manager => vec![
                panel(WidgetType::Portfolio, 0.0, 0.0, 480.0, 320.0),
                panel(WidgetType::Risk, 480.0, 0.0, 480.0, 320.0),
                panel(WidgetType::Report, 0.0, 320.0, 960.0, 280.0),
            ],
            // High-level summary only.
            LayoutTemplate::Executive => vec![
                panel(WidgetType::Portfolio, 0.0, 0.0, 640.0, 360.0),
                panel(WidgetType::Report, 640.0, 0.0, 320.0, 360.0),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn every_template_produces_widgets_with_geometry() {
        for template in LayoutTemplate::iter() {
            let specs = template.widgets();
            assert!(!specs.is_empty(), "{template} produced no widgets");
            for spec in &specs {
                assert!(spec.position.is_some());
                assert!(spec.size.is_some());
            }
        }
    }

    #[test]
    fn template_names_use_the_canonical_spelling() {
        assert_eq!(LayoutTemplate::DualH.to_string(), "dual-h");
        assert_eq!(LayoutTemplate::DualV.to_string(), "dual-v");
        assert_eq!(
            LayoutTemplate::from_str("bloomberg").unwrap(),
            LayoutTemplate::Bloomberg
        );
    }

    #[test]
    fn chart_templates_track_the_global_watchlist() {
        let specs = LayoutTemplate::Quad.widgets();
        assert_eq!(specs.len(), 4);
        for spec in &specs {
            assert_eq!(spec.widget_type, WidgetType::Chart);
            assert_eq!(spec.symbols.len(), 1);
            assert!(GLOBAL_WATCHLIST.contains(&spec.symbols[0].as_str()));
        }
    }
}
