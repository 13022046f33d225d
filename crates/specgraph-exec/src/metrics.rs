//! Tracing hooks for the router.
//!
//! Wire a subscriber up in the binary layer; without the `tracing` feature
//! these are no-ops.

use futures::StreamExt;
use specgraph_operators::BatchStream;

#[cfg(feature = "tracing")]
pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::span!(tracing::Level::TRACE, "specgraph", event);
    let _enter = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}

#[cfg(not(feature = "tracing"))]
pub fn emit_span(_event: &str, _key_values: &[(&str, String)]) { /* no-op */
}

/// Report the row count of every batch `op` emits.
pub fn count_rows(op: &'static str, stream: BatchStream) -> BatchStream {
    stream
        .inspect(move |batch| {
            if let Ok(batch) = batch {
                emit_span("batch", &[("op", op.to_string()), ("rows", batch.num_rows().to_string())]);
            }
        })
        .boxed()
}
