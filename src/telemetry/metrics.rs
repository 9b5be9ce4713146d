//! Metric instruments, created from the global `MeterProvider`.
//!
//! Every instrument carries a `queue` label holding the namespace prefix.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("uniqueq")
}

/// Counter: `put` calls.
/// Labels: `queue`, `result` ("ok" | "duplicate").
pub fn puts() -> Counter<u64> {
    meter()
        .u64_counter("uniqueq.put")
        .with_description("Number of put calls by outcome")
        .build()
}

/// Counter: `get` calls.
/// Labels: `queue`, `result` ("ok" | "empty" | "corrupt").
pub fn gets() -> Counter<u64> {
    meter()
        .u64_counter("uniqueq.get")
        .with_description("Number of get calls by outcome")
        .build()
}

/// Counter: expired leases reclaimed.
/// Labels: `queue`.
pub fn reclaimed() -> Counter<u64> {
    meter()
        .u64_counter("uniqueq.reclaimed")
        .with_description("Number of expired leases reclaimed")
        .build()
}

/// Counter: keys explicitly released.
/// Labels: `queue`.
pub fn released() -> Counter<u64> {
    meter()
        .u64_counter("uniqueq.released")
        .with_description("Number of keys released by callers")
        .build()
}
