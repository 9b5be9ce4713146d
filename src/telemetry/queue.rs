//! Span helpers for queue operations.

use tracing::Span;

/// Start a span for one queue operation (`put`, `get`, `reclaim`, ...).
///
/// `queue.key` is declared empty; fill it with [`record_key`] once known
/// (for `get` that is only after the pop).
pub fn start_queue_span(operation: &'static str, prefix: &str) -> Span {
    tracing::debug_span!(
        "queue.op",
        "queue.operation" = operation,
        "queue.prefix" = prefix,
        "queue.key" = tracing::field::Empty,
    )
}

pub fn record_key(span: &Span, key: &str) {
    span.record("queue.key", key);
}
