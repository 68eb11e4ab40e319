//! Hands built records to the configured sinks.

use crate::Sink;
use auditline_audit_types::AuditRecord;
use auditline_common_config::DeliveryMode;
use auditline_common_log::spans::{dispatch_span, record_error, sink_span, Timer};
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, trace, warn, Instrument};

/// Counters for operational visibility.
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    /// Records handed to `dispatch`.
    pub dispatched: u64,
    /// Successful sink writes.
    pub delivered: u64,
    /// Failed sink writes.
    pub failed: u64,
    /// Records dropped because no sink is configured.
    pub skipped: u64,
    /// Detached deliveries dropped before every sink write finished,
    /// usually because the runtime shut down.
    pub abandoned: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

struct Inner {
    sinks: Vec<Arc<dyn Sink>>,
    delivery: DeliveryMode,
    stats: DispatchStats,
    in_flight: AtomicU64,
    idle: Notify,
}

/// Held by a detached delivery task. Dropping it before `complete` means the
/// task was cancelled with writes still pending.
struct InFlight {
    inner: Arc<Inner>,
    record_id: String,
    completed: bool,
}

impl InFlight {
    fn begin(inner: &Arc<Inner>, record: &AuditRecord) -> Self {
        inner.in_flight.fetch_add(1, Ordering::AcqRel);
        Self {
            inner: Arc::clone(inner),
            record_id: record.id().to_string(),
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let remaining = self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        if !self.completed {
            self.inner.stats.abandoned.fetch_add(1, Ordering::Relaxed);
            error!(
                record_id = %self.record_id,
                in_flight = remaining,
                "detached audit delivery dropped before completion, record lost"
            );
        }
        if remaining == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Routes every record to the configured sinks.
///
/// Cloning is cheap; clones share sinks and counters. `dispatch` never
/// returns an error: sink failures are logged with the record id, sink and
/// cause, and the caller carries on.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
    // Counts caller-held clones only; delivery tasks hold `inner` directly.
    handles: Arc<()>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sinks", &self.sink_names())
            .field("delivery", &self.inner.delivery)
            .finish()
    }
}

impl Dispatcher {
    /// A dispatcher with no sinks. Every `dispatch` is a no-op counted as
    /// skipped.
    pub fn disabled() -> Self {
        Self::with_sinks(Vec::new(), DeliveryMode::Acknowledged)
    }

    /// Single sink, acknowledged delivery.
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self::with_sinks(vec![sink], DeliveryMode::Acknowledged)
    }

    pub fn with_sinks(sinks: Vec<Arc<dyn Sink>>, delivery: DeliveryMode) -> Self {
        Self {
            inner: Arc::new(Inner {
                sinks,
                delivery,
                stats: DispatchStats::default(),
                in_flight: AtomicU64::new(0),
                idle: Notify::new(),
            }),
            handles: Arc::new(()),
        }
    }

    /// Whether any sink is attached.
    pub fn is_enabled(&self) -> bool {
        !self.inner.sinks.is_empty()
    }

    pub fn delivery(&self) -> DeliveryMode {
        self.inner.delivery
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.inner.sinks.iter().map(|s| s.name()).collect()
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Detached deliveries that have not finished yet.
    pub fn in_flight(&self) -> u64 {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Wait until every detached delivery started so far has finished.
    pub async fn flush(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Flush with an upper bound. Returns the number of deliveries still in
    /// flight when `timeout` ran out, zero on a clean drain.
    pub async fn shutdown(&self, timeout: Duration) -> u64 {
        if tokio::time::timeout(timeout, self.flush()).await.is_ok() {
            info!(stats = ?self.stats(), "audit dispatcher drained");
            return 0;
        }
        let pending = self.in_flight();
        error!(
            pending,
            timeout_ms = timeout.as_millis() as u64,
            "audit dispatcher shutdown timed out with deliveries in flight"
        );
        pending
    }

    /// Hand `record` to every sink.
    ///
    /// With acknowledged delivery this waits for all sink writes. With
    /// detached delivery it spawns the writes onto the current tokio runtime
    /// and returns at once.
    pub async fn dispatch(&self, record: AuditRecord) {
        let stats = &self.inner.stats;
        stats.dispatched.fetch_add(1, Ordering::Relaxed);

        if !self.is_enabled() {
            stats.skipped.fetch_add(1, Ordering::Relaxed);
            trace!(record_id = %record.id(), "audit dispatch disabled, record skipped");
            return;
        }

        let span = dispatch_span(
            &record.id().to_string(),
            record.entity_name(),
            &record.action().to_string(),
        );

        match self.inner.delivery {
            DeliveryMode::Acknowledged => deliver(&self.inner, &record).instrument(span).await,
            DeliveryMode::Detached => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let guard = InFlight::begin(&self.inner, &record);
                    handle.spawn(
                        async move {
                            deliver(&guard.inner, &record).await;
                            guard.complete();
                        }
                        .instrument(span),
                    );
                }
                Err(_) => {
                    warn!(record_id = %record.id(), "no tokio runtime for detached delivery, delivering inline");
                    deliver(&self.inner, &record).instrument(span).await
                }
            },
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if Arc::strong_count(&self.handles) > 1 {
            return;
        }
        let pending = self.in_flight();
        if pending > 0 {
            error!(pending, "audit dispatcher dropped with detached deliveries in flight; call shutdown first");
        }
    }
}

async fn deliver(inner: &Inner, record: &AuditRecord) {
    let writes = inner.sinks.iter().map(|sink| write_one(inner, sink.as_ref(), record));
    join_all(writes).await;
}

async fn write_one(inner: &Inner, sink: &dyn Sink, record: &AuditRecord) {
    let span = sink_span(sink.name(), &sink.kind().to_string());
    let timer = Timer::start("audit.sink.write");

    let outcome = AssertUnwindSafe(sink.write(record))
        .catch_unwind()
        .instrument(span)
        .await;

    let elapsed = timer.finish();
    match outcome {
        Ok(Ok(())) => {
            inner.stats.delivered.fetch_add(1, Ordering::Relaxed);
            debug!(
                record_id = %record.id(),
                sink = %sink.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "audit record delivered"
            );
        }
        Ok(Err(e)) => {
            inner.stats.failed.fetch_add(1, Ordering::Relaxed);
            record_error(&e);
            error!(
                record_id = %record.id(),
                sink = %sink.name(),
                kind = %sink.kind(),
                error = %e,
                "audit record dispatch failed"
            );
        }
        Err(_) => {
            inner.stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                record_id = %record.id(),
                sink = %sink.name(),
                kind = %sink.kind(),
                error = "sink panicked",
                "audit record dispatch failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SinkError;
    use async_trait::async_trait;
    use auditline_audit_types::AuditAction;
    use auditline_common_config::SinkKind;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        records: Mutex<Vec<AuditRecord>>,
    }

    #[async_trait]
    impl Sink for CollectingSink {
        fn kind(&self) -> SinkKind {
            SinkKind::Direct
        }

        fn name(&self) -> &str {
            "collecting"
        }

        async fn write(&self, record: &AuditRecord) -> Result<(), SinkError> {
            self.records.lock().push(record.clone());
            Ok(())
        }
    }

    struct BrokenSink {
        panics: bool,
    }

    #[async_trait]
    impl Sink for BrokenSink {
        fn kind(&self) -> SinkKind {
            SinkKind::Queued
        }

        fn name(&self) -> &str {
            "broken"
        }

        async fn write(&self, _record: &AuditRecord) -> Result<(), SinkError> {
            if self.panics {
                panic!("sink bug");
            }
            Err(SinkError::Unavailable("broker down".into()))
        }
    }

    /// Blocks every write until opened.
    #[derive(Default)]
    struct GatedSink {
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl Sink for GatedSink {
        fn kind(&self) -> SinkKind {
            SinkKind::Direct
        }

        fn name(&self) -> &str {
            "gated"
        }

        async fn write(&self, _record: &AuditRecord) -> Result<(), SinkError> {
            self.gate.notified().await;
            Ok(())
        }
    }

    fn record() -> AuditRecord {
        AuditRecord::builder("Account", AuditAction::Update)
            .entity_id(Some("42".into()))
            .build()
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_is_a_counted_noop() {
        let dispatcher = Dispatcher::disabled();
        assert!(!dispatcher.is_enabled());
        dispatcher.dispatch(record()).await;
        assert_eq!(
            dispatcher.stats(),
            DispatchStatsSnapshot {
                dispatched: 1,
                skipped: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_acknowledged_delivery_completes_before_return() {
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = Dispatcher::new(sink.clone());
        let record = record();

        dispatcher.dispatch(record.clone()).await;

        assert_eq!(sink.records.lock().as_slice(), &[record]);
        assert_eq!(dispatcher.stats().delivered, 1);
    }

    #[test]
    fn test_acknowledged_dispatch_waits_for_sink() {
        let sink = Arc::new(GatedSink::default());
        let dispatcher = Dispatcher::new(sink.clone());

        let mut task = tokio_test::task::spawn(dispatcher.dispatch(record()));
        tokio_test::assert_pending!(task.poll());
        assert_eq!(dispatcher.stats().delivered, 0);

        sink.gate.notify_one();
        assert!(task.is_woken());
        tokio_test::assert_ready!(task.poll());
        assert_eq!(dispatcher.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_every_sink_receives_the_record() {
        let first = Arc::new(CollectingSink::default());
        let second = Arc::new(CollectingSink::default());
        let dispatcher = Dispatcher::with_sinks(
            vec![first.clone(), second.clone()],
            DeliveryMode::Acknowledged,
        );

        dispatcher.dispatch(record()).await;

        assert_eq!(first.records.lock().len(), 1);
        assert_eq!(second.records.lock().len(), 1);
        assert_eq!(dispatcher.sink_names(), vec!["collecting", "collecting"]);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let good = Arc::new(CollectingSink::default());
        let dispatcher = Dispatcher::with_sinks(
            vec![Arc::new(BrokenSink { panics: false }), good.clone()],
            DeliveryMode::Acknowledged,
        );

        dispatcher.dispatch(record()).await;

        assert_eq!(good.records.lock().len(), 1);
        let stats = dispatcher.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_panicking_sink_is_contained() {
        let dispatcher = Dispatcher::new(Arc::new(BrokenSink { panics: true }));
        dispatcher.dispatch(record()).await;
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_detached_delivery_runs_in_background() {
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = Dispatcher::with_sinks(vec![sink.clone()], DeliveryMode::Detached);

        dispatcher.dispatch(record()).await;
        // Current-thread runtime: the spawned write has not run yet.
        assert!(sink.records.lock().is_empty());

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(sink.records.lock().len(), 1);
        assert_eq!(dispatcher.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_flush_waits_for_detached_writes() {
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = Dispatcher::with_sinks(vec![sink.clone()], DeliveryMode::Detached);

        for _ in 0..3 {
            dispatcher.dispatch(record()).await;
        }
        assert_eq!(dispatcher.in_flight(), 3);

        dispatcher.flush().await;
        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(sink.records.lock().len(), 3);
        assert_eq!(dispatcher.stats().delivered, 3);
    }

    #[tokio::test]
    async fn test_flush_without_pending_writes_returns() {
        let dispatcher = Dispatcher::new(Arc::new(CollectingSink::default()));
        dispatcher.flush().await;
        assert_eq!(dispatcher.shutdown(Duration::from_millis(10)).await, 0);
    }

    #[test]
    fn test_runtime_shutdown_counts_lost_deliveries() {
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = Dispatcher::with_sinks(vec![sink.clone()], DeliveryMode::Detached);

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            for _ in 0..3 {
                dispatcher.dispatch(record()).await;
            }
        });
        drop(rt);

        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.abandoned, 3);
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(sink.records.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_stuck_deliveries() {
        let sink = Arc::new(GatedSink::default());
        let dispatcher = Dispatcher::with_sinks(vec![sink.clone()], DeliveryMode::Detached);

        dispatcher.dispatch(record()).await;
        assert_eq!(dispatcher.shutdown(Duration::from_millis(50)).await, 1);

        sink.gate.notify_one();
        assert_eq!(dispatcher.shutdown(Duration::from_millis(50)).await, 0);
        assert_eq!(dispatcher.stats().delivered, 1);
    }

    #[test]
    fn test_debug_lists_sinks() {
        let dispatcher = Dispatcher::new(Arc::new(CollectingSink::default()));
        let debug = format!("{dispatcher:?}");
        assert!(debug.contains("collecting"));
        assert!(debug.contains("Acknowledged"));
    }
}
