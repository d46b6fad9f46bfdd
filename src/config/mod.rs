//! Configuration module for the trade-canvas crate.

mod debug;

// Public
pub mod constants;

// Re-export commonly used items
pub use debug::DF;
