//! Fire-and-forget record persistence.

use std::sync::Arc;
use std::time::Instant;

use taopulse_core::{DurationMs, PersistenceSink, Record};
use tracing::{warn, Instrument};

/// Milliseconds since `started`, saturating.
pub(crate) fn elapsed_ms(started: Instant) -> DurationMs {
    DurationMs::try_from(started.elapsed().as_millis()).unwrap_or(DurationMs::MAX)
}

/// Append `record` on a detached task. Failures are logged and dropped.
pub(crate) fn spawn_append(sink: Arc<dyn PersistenceSink>, record: Record) {
    let span = tracing::Span::current();
    tokio::spawn(
        async move {
            let kind = record.kind;
            if let Err(error) = sink.append(record).await {
                warn!(kind = %kind, error = %error, "record append failed");
            }
        }
        .instrument(span),
    );
}
