//! Tracing/logging setup for processes that run stock rebuilds.

/// Tracing configuration (filters, formatters).
pub mod tracing;

pub use self::tracing::{DEFAULT_FILTER, init, init_for_tests};
