//! Tracing and logging setup shared by the billing engine and its sweeps.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers, spans).
pub mod tracing;

pub use tracing::sweep_span;
