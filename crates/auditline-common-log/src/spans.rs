//! Spans and timing for the dispatch path.
//!
//! A dispatch opens one [`dispatch_span`]; each sink write nests a
//! [`sink_span`] under it. Both carry empty fields that are filled in as the
//! write progresses, so a failure logged anywhere below them shows the
//! record, the sink and the attempt number.

use std::time::{Duration, Instant};
use tracing::field::{display, Empty};
use tracing::{debug_span, info_span, trace, Span};

/// Span covering one record's trip through the dispatcher.
pub fn dispatch_span(record_id: &str, entity_name: &str, action: &str) -> Span {
    info_span!(
        "audit.dispatch",
        record_id = %record_id,
        entity = %entity_name,
        action = %action,
        error = Empty,
    )
}

/// Span covering one sink write.
pub fn sink_span(sink: &str, kind: &str) -> Span {
    debug_span!("audit.sink", sink = %sink, kind = %kind, attempt = Empty)
}

/// Attach the failure cause to the current span's `error` field.
pub fn record_error(error: &dyn std::error::Error) {
    Span::current().record("error", display(error));
}

/// Attach the 1-based write attempt to the current span's `attempt` field.
pub fn record_attempt(attempt: u32) {
    Span::current().record("attempt", attempt);
}

/// Wall-clock timer for one labelled operation.
#[derive(Debug)]
pub struct Timer {
    label: &'static str,
    started: Instant,
}

impl Timer {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop and return the elapsed time, reported at `trace`.
    pub fn finish(self) -> Duration {
        let elapsed = self.started.elapsed();
        trace!(label = self.label, elapsed_us = elapsed.as_micros() as u64, "timer finished");
        elapsed
    }
}
