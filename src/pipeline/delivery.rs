//! Bounded-queue delivery of log entries to a backend and its observers.
//!
//! In asynchronous mode `submit` places entries on a bounded `mpsc` channel
//! and a single background task writes them in FIFO order. A full queue is
//! waited on for at most `submit_timeout`; after that the entry is rejected
//! with `QueueSaturated`. `close` cancels the consumer, which then stops
//! accepting new entries and drains everything already queued before the
//! backend is closed.
//!
//! In synchronous mode the same `submit` writes and notifies inline.

use super::registry::ObserverRegistry;
use super::stats::{PipelineStats, StatsCollector};
use crate::config::{DEFAULT_QUEUE_CAPACITY, DEFAULT_SUBMIT_TIMEOUT};
use crate::domain::LogEntry;
use crate::error::LogError;
use crate::port::{DeadLetterSink, StorageBackend, TracingDeadLetter};
use futures::FutureExt;
use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Settings for the asynchronous queue.
#[derive(Clone)]
pub struct PipelineOptions {
    pub capacity: usize,
    pub submit_timeout: Duration,
    pub dead_letter: Arc<dyn DeadLetterSink>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            dead_letter: Arc::new(TracingDeadLetter),
        }
    }
}

impl PipelineOptions {
    #[must_use]
    pub fn with_dead_letter(mut self, dead_letter: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = dead_letter;
        self
    }
}

impl std::fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("capacity", &self.capacity)
            .field("submit_timeout", &self.submit_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum DeliveryMode {
    Synchronous,
    Asynchronous(PipelineOptions),
}

/// Backend plus observers: the work done for one entry.
#[derive(Clone)]
struct DeliveryTarget {
    backend: Arc<dyn StorageBackend>,
    observers: ObserverRegistry,
}

impl DeliveryTarget {
    /// Write, then notify a snapshot of the observers. Observers only see
    /// entries the backend accepted.
    ///
    /// A panicking backend write is reported as `WriteFailed`; a panicking
    /// observer is skipped like one that returned an error.
    async fn deliver(&self, entry: &LogEntry) -> Result<(), LogError> {
        AssertUnwindSafe(async { self.backend.write(entry).await })
            .catch_unwind()
            .await
            .map_err(|payload| {
                LogError::WriteFailed(io::Error::other(format!(
                    "backend write panicked: {}",
                    panic_message(payload.as_ref())
                )))
            })??;

        for observer in self.observers.snapshot() {
            match AssertUnwindSafe(async { observer.handle(entry).await })
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Log observer failed, ignoring"),
                Err(payload) => warn!(
                    panic = panic_message(payload.as_ref()),
                    "Log observer panicked, ignoring"
                ),
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

struct AsyncQueue {
    sender: mpsc::Sender<LogEntry>,
    submit_timeout: Duration,
    shutdown: CancellationToken,
}

/// Progress of `close`, kept across a dropped `close` future so a later call
/// resumes where it stopped.
#[derive(Default)]
struct CloseState {
    consumer: Option<JoinHandle<()>>,
    finished: bool,
}

enum Mode {
    Synchronous,
    Asynchronous(AsyncQueue),
}

pub struct DeliveryPipeline {
    target: DeliveryTarget,
    stats: Arc<StatsCollector>,
    closed: AtomicBool,
    close_state: Mutex<CloseState>,
    mode: Mode,
}

impl DeliveryPipeline {
    /// Build a pipeline in the given mode. Asynchronous mode spawns the
    /// consumer task and must be called from within a Tokio runtime.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        observers: ObserverRegistry,
        mode: DeliveryMode,
    ) -> Result<Self, LogError> {
        match mode {
            DeliveryMode::Synchronous => Ok(Self::synchronous(backend, observers)),
            DeliveryMode::Asynchronous(options) => Self::spawn(backend, observers, options),
        }
    }

    pub fn synchronous(backend: Arc<dyn StorageBackend>, observers: ObserverRegistry) -> Self {
        Self {
            target: DeliveryTarget { backend, observers },
            stats: Arc::new(StatsCollector::default()),
            closed: AtomicBool::new(false),
            close_state: Mutex::new(CloseState::default()),
            mode: Mode::Synchronous,
        }
    }

    /// Spawn the background consumer and return the pipeline handle.
    pub fn spawn(
        backend: Arc<dyn StorageBackend>,
        observers: ObserverRegistry,
        options: PipelineOptions,
    ) -> Result<Self, LogError> {
        if options.capacity == 0 {
            return Err(LogError::InvalidSettings(
                "queue capacity must be greater than 0".into(),
            ));
        }

        let (sender, receiver) = mpsc::channel::<LogEntry>(options.capacity);
        let target = DeliveryTarget { backend, observers };
        let stats = Arc::new(StatsCollector::default());
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(
            consume(
                receiver,
                target.clone(),
                stats.clone(),
                options.dead_letter,
                shutdown.clone(),
            )
            .instrument(info_span!("log_consumer")),
        );

        info!(
            capacity = options.capacity,
            submit_timeout_ms = options.submit_timeout.as_millis() as u64,
            "Log delivery pipeline started"
        );

        Ok(Self {
            target,
            stats,
            closed: AtomicBool::new(false),
            close_state: Mutex::new(CloseState {
                consumer: Some(handle),
                finished: false,
            }),
            mode: Mode::Asynchronous(AsyncQueue {
                sender,
                submit_timeout: options.submit_timeout,
                shutdown,
            }),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_async(&self) -> bool {
        matches!(self.mode, Mode::Asynchronous(_))
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// Hand one entry to the pipeline.
    ///
    /// Asynchronous: `Ok` means the entry is queued and will be written before
    /// `close` returns. Synchronous: `Ok` means it was written and observers
    /// were notified.
    pub async fn submit(&self, entry: LogEntry) -> Result<(), LogError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LogError::PipelineClosed);
        }

        match &self.mode {
            Mode::Synchronous => match self.target.deliver(&entry).await {
                Ok(()) => {
                    self.stats.record_accepted();
                    self.stats.record_delivered();
                    Ok(())
                }
                Err(e) => {
                    self.stats.record_write_failure();
                    Err(e)
                }
            },
            Mode::Asynchronous(queue) => {
                self.stats.enter_queue();
                match queue.sender.send_timeout(entry, queue.submit_timeout).await {
                    Ok(()) => {
                        self.stats.record_accepted();
                        Ok(())
                    }
                    Err(SendTimeoutError::Timeout(_)) => {
                        self.stats.leave_queue();
                        self.stats.record_saturated();
                        warn!(
                            timeout_ms = queue.submit_timeout.as_millis() as u64,
                            "Log queue saturated, entry dropped"
                        );
                        Err(LogError::QueueSaturated {
                            timeout: queue.submit_timeout,
                        })
                    }
                    Err(SendTimeoutError::Closed(_)) => {
                        self.stats.leave_queue();
                        Err(LogError::PipelineClosed)
                    }
                }
            }
        }
    }

    /// Stop accepting entries, wait until every queued entry is delivered,
    /// then close the backend. Once a call has completed, later calls return
    /// `Ok(())`. If the returned future is dropped early, the next call picks
    /// up the remaining steps.
    pub async fn close(&self) -> Result<(), LogError> {
        self.closed.store(true, Ordering::Release);

        let mut state = self.close_state.lock().await;
        if state.finished {
            return Ok(());
        }

        if let Mode::Asynchronous(queue) = &self.mode {
            queue.shutdown.cancel();
        }

        let drained = match state.consumer.as_mut() {
            Some(handle) => {
                let joined = handle.await;
                state.consumer = None;
                joined.map_err(|e| LogError::Shutdown(format!("log consumer task failed: {e}")))
            }
            None => Ok(()),
        };

        let closed = self.target.backend.close().await;
        state.finished = true;
        drained?;
        closed
    }
}

async fn consume(
    mut receiver: mpsc::Receiver<LogEntry>,
    target: DeliveryTarget,
    stats: Arc<StatsCollector>,
    dead_letter: Arc<dyn DeadLetterSink>,
    shutdown: CancellationToken,
) {
    // Running: wait for the next entry or the shutdown signal
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            next = receiver.recv() => match next {
                Some(entry) => {
                    process(&target, &stats, dead_letter.as_ref(), entry).await;
                }
                // Every sender is gone: the pipeline was dropped without close
                None => break,
            },
        }
    }

    // Draining: refuse new sends, then flush everything already accepted.
    // `recv` keeps yielding until the buffer is empty and no send is in flight.
    receiver.close();
    let mut drained: u64 = 0;
    while let Some(entry) = receiver.recv().await {
        process(&target, &stats, dead_letter.as_ref(), entry).await;
        drained += 1;
    }

    info!(drained, "Log delivery consumer stopped");
}

async fn process(
    target: &DeliveryTarget,
    stats: &StatsCollector,
    dead_letter: &dyn DeadLetterSink,
    entry: LogEntry,
) {
    stats.leave_queue();
    match target.deliver(&entry).await {
        Ok(()) => stats.record_delivered(),
        Err(e) => {
            stats.record_write_failure();
            dead_letter.record(&entry, &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LogFilter, LogLevel};
    use crate::port::BackendFuture;
    use crate::test_support::{
        FailingBackend, FailingObserver, MemoryBackend, PanickingObserver, RecordingDeadLetter,
        RecordingObserver, StalledBackend,
    };
    use chrono::{DateTime, Utc};

    async fn explode() -> Result<(), LogError> {
        panic!("backend bug")
    }

    /// Backend whose writes panic; everything else succeeds.
    struct PanickingBackend;

    impl StorageBackend for PanickingBackend {
        fn write<'a>(&'a self, _entry: &'a LogEntry) -> BackendFuture<'a, ()> {
            Box::pin(explode())
        }

        fn read<'a>(
            &'a self,
            _level: Option<LogLevel>,
            _filter: &'a LogFilter,
        ) -> BackendFuture<'a, Vec<LogEntry>> {
            Box::pin(async move { Ok(Vec::new()) })
        }

        fn clear_logs(&self, _before: DateTime<Utc>) -> BackendFuture<'_, ()> {
            Box::pin(async move { Ok(()) })
        }

        fn close(&self) -> BackendFuture<'_, ()> {
            Box::pin(async move { Ok(()) })
        }
    }

    fn options(capacity: usize, timeout_ms: u64) -> PipelineOptions {
        PipelineOptions {
            capacity,
            submit_timeout: Duration::from_millis(timeout_ms),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sync_submit_writes_before_returning() {
        let backend = Arc::new(MemoryBackend::new());
        let pipeline = DeliveryPipeline::synchronous(backend.clone(), ObserverRegistry::new());

        pipeline.submit(LogEntry::now(LogLevel::Info, "inline")).await.unwrap();

        assert_eq!(backend.messages(), vec!["inline"]);
        assert!(!pipeline.is_async());
        let stats = pipeline.stats();
        assert_eq!((stats.accepted, stats.delivered), (1, 1));
    }

    #[tokio::test]
    async fn test_sync_submit_propagates_write_failure() {
        let pipeline = DeliveryPipeline::synchronous(
            Arc::new(FailingBackend::new()),
            ObserverRegistry::new(),
        );

        let result = pipeline.submit(LogEntry::now(LogLevel::Error, "lost")).await;
        assert!(matches!(result, Err(LogError::WriteFailed(_))));
        assert_eq!(pipeline.stats().write_failures, 1);
    }

    #[tokio::test]
    async fn test_async_close_drains_every_accepted_entry() {
        let backend = Arc::new(MemoryBackend::new());
        let pipeline =
            DeliveryPipeline::spawn(backend.clone(), ObserverRegistry::new(), options(64, 100))
                .unwrap();

        for i in 0..500 {
            pipeline
                .submit(LogEntry::now(LogLevel::Info, format!("entry {i}")))
                .await
                .unwrap();
        }
        pipeline.close().await.unwrap();

        let messages = backend.messages();
        assert_eq!(messages.len(), 500);
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(message, &format!("entry {i}"));
        }
        assert!(backend.is_closed());

        let stats = pipeline.stats();
        assert_eq!(stats.accepted, 500);
        assert_eq!(stats.delivered, 500);
        assert_eq!(stats.queue_depth, 0);
    }

    #[tokio::test]
    async fn test_submit_after_close_is_rejected() {
        let pipeline = DeliveryPipeline::spawn(
            Arc::new(MemoryBackend::new()),
            ObserverRegistry::new(),
            options(8, 10),
        )
        .unwrap();

        pipeline.close().await.unwrap();
        pipeline.close().await.unwrap();

        let result = pipeline.submit(LogEntry::now(LogLevel::Info, "late")).await;
        assert!(matches!(result, Err(LogError::PipelineClosed)));
    }

    #[tokio::test]
    async fn test_full_queue_fails_with_saturation() {
        let backend = Arc::new(StalledBackend::new());
        let capacity = 4;
        let pipeline =
            DeliveryPipeline::spawn(backend.clone(), ObserverRegistry::new(), options(capacity, 20))
                .unwrap();

        let mut accepted = 0;
        let mut saturated = 0;
        for i in 0..capacity + 3 {
            match pipeline
                .submit(LogEntry::now(LogLevel::Info, format!("burst {i}")))
                .await
            {
                Ok(()) => accepted += 1,
                Err(LogError::QueueSaturated { timeout }) => {
                    assert_eq!(timeout, Duration::from_millis(20));
                    saturated += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        // The consumer may hold one entry inside the stalled write
        assert!(accepted == capacity || accepted == capacity + 1, "accepted {accepted}");
        assert_eq!(accepted + saturated, capacity + 3);
        assert_eq!(pipeline.stats().saturated, saturated as u64);

        backend.release();
        pipeline.close().await.unwrap();
        assert_eq!(backend.inner().messages().len(), accepted);
    }

    #[tokio::test]
    async fn test_async_write_failures_go_to_dead_letter() {
        let dead_letter = Arc::new(RecordingDeadLetter::new());
        let observer = Arc::new(RecordingObserver::new());
        let observers = ObserverRegistry::new();
        observers.register(observer.clone());

        let pipeline = DeliveryPipeline::spawn(
            Arc::new(FailingBackend::new()),
            observers,
            options(16, 100).with_dead_letter(dead_letter.clone()),
        )
        .unwrap();

        pipeline.submit(LogEntry::now(LogLevel::Warn, "first")).await.unwrap();
        pipeline.submit(LogEntry::now(LogLevel::Error, "second")).await.unwrap();
        pipeline.close().await.unwrap();

        let recorded = dead_letter.entries();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].0.message, "first");
        assert!(recorded[1].1.contains("Failed to write log"));
        assert!(observer.entries().is_empty());
        assert_eq!(pipeline.stats().write_failures, 2);
    }

    #[tokio::test]
    async fn test_failing_observer_does_not_stop_fanout() {
        let backend = Arc::new(MemoryBackend::new());
        let recorder = Arc::new(RecordingObserver::new());
        let observers = ObserverRegistry::new();
        observers.register(Arc::new(FailingObserver));
        observers.register(recorder.clone());

        let pipeline = DeliveryPipeline::spawn(backend.clone(), observers, options(16, 100)).unwrap();
        for level in LogLevel::ALL {
            pipeline.submit(LogEntry::now(level, level.as_str())).await.unwrap();
        }
        pipeline.close().await.unwrap();

        assert_eq!(backend.messages().len(), 4);
        assert_eq!(recorder.entries().len(), 4);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_rejected() {
        let result = DeliveryPipeline::spawn(
            Arc::new(MemoryBackend::new()),
            ObserverRegistry::new(),
            options(0, 100),
        );
        assert!(matches!(result, Err(LogError::InvalidSettings(_))));
    }

    #[tokio::test]
    async fn test_dropping_pipeline_still_flushes_queue() {
        let backend = Arc::new(MemoryBackend::new());
        let pipeline =
            DeliveryPipeline::spawn(backend.clone(), ObserverRegistry::new(), options(16, 100))
                .unwrap();
        pipeline.submit(LogEntry::now(LogLevel::Info, "orphan")).await.unwrap();
        drop(pipeline);

        for _ in 0..100 {
            if !backend.messages().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(backend.messages(), vec!["orphan"]);
    }

    #[tokio::test]
    async fn test_panicking_observer_is_skipped() {
        let backend = Arc::new(MemoryBackend::new());
        let recorder = Arc::new(RecordingObserver::new());
        let observers = ObserverRegistry::new();
        observers.register(Arc::new(PanickingObserver));
        observers.register(recorder.clone());

        let pipeline = DeliveryPipeline::spawn(backend.clone(), observers, options(16, 100)).unwrap();
        for i in 0..5 {
            pipeline
                .submit(LogEntry::now(LogLevel::Error, format!("e{i}")))
                .await
                .unwrap();
        }
        pipeline.close().await.unwrap();

        assert_eq!(backend.messages().len(), 5);
        assert_eq!(recorder.entries().len(), 5);
        assert!(backend.is_closed());
    }

    #[tokio::test]
    async fn test_panicking_backend_write_goes_to_dead_letter() {
        let dead_letter = Arc::new(RecordingDeadLetter::new());
        let pipeline = DeliveryPipeline::spawn(
            Arc::new(PanickingBackend),
            ObserverRegistry::new(),
            options(16, 100).with_dead_letter(dead_letter.clone()),
        )
        .unwrap();

        pipeline.submit(LogEntry::now(LogLevel::Info, "first")).await.unwrap();
        pipeline.submit(LogEntry::now(LogLevel::Info, "second")).await.unwrap();
        pipeline.close().await.unwrap();

        let recorded = dead_letter.entries();
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].1.contains("backend write panicked: backend bug"));
        assert_eq!(pipeline.stats().write_failures, 2);
    }

    #[tokio::test]
    async fn test_sync_backend_panic_is_returned_as_write_failure() {
        let pipeline =
            DeliveryPipeline::synchronous(Arc::new(PanickingBackend), ObserverRegistry::new());
        let result = pipeline.submit(LogEntry::now(LogLevel::Info, "x")).await;
        assert!(matches!(result, Err(LogError::WriteFailed(_))));
    }

    #[tokio::test]
    async fn test_abandoned_close_is_resumed_by_next_call() {
        let backend = Arc::new(StalledBackend::new());
        let pipeline =
            DeliveryPipeline::spawn(backend.clone(), ObserverRegistry::new(), options(8, 100))
                .unwrap();
        for i in 0..3 {
            pipeline
                .submit(LogEntry::now(LogLevel::Info, format!("held {i}")))
                .await
                .unwrap();
        }

        // The consumer is stuck in a write, so this close cannot finish
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), pipeline.close()).await;
        assert!(abandoned.is_err());
        assert!(!backend.inner().is_closed());
        assert!(matches!(
            pipeline.submit(LogEntry::now(LogLevel::Info, "late")).await,
            Err(LogError::PipelineClosed)
        ));

        backend.release();
        pipeline.close().await.unwrap();

        assert!(backend.inner().is_closed());
        assert_eq!(backend.inner().messages(), vec!["held 0", "held 1", "held 2"]);
    }
}
