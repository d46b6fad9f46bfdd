mod layouts;
mod registry;

pub use {
    layouts::LayoutTemplate,
    registry::{WidgetQuoteUpdate, WidgetRegistry},
};
