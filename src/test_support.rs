//! Shared test support utilities
//!
//! In-memory and fault-injecting implementations of the backend, observer and
//! dead-letter ports for unit tests, integration tests and benches.

use crate::domain::{LogEntry, LogFilter, LogLevel};
use crate::error::LogError;
use crate::port::{BackendFuture, DeadLetterSink, LogObserver, StorageBackend};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

type ObserverFuture<'a> = Pin<Box<dyn Future<Output = Result<(), LogError>> + Send + 'a>>;

/// Backend that keeps entries in a vector.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<Vec<LogEntry>>,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), LogError> {
        if self.is_closed() {
            return Err(LogError::BackendUninitialized);
        }
        Ok(())
    }
}

impl StorageBackend for MemoryBackend {
    fn write<'a>(&'a self, entry: &'a LogEntry) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_open()?;
            self.entries.lock().push(entry.clone());
            Ok(())
        })
    }

    fn read<'a>(
        &'a self,
        level: Option<LogLevel>,
        filter: &'a LogFilter,
    ) -> BackendFuture<'a, Vec<LogEntry>> {
        Box::pin(async move {
            self.ensure_open()?;
            Ok(self
                .entries
                .lock()
                .iter()
                .filter(|entry| filter.selects(level, entry))
                .cloned()
                .collect())
        })
    }

    fn clear_logs(&self, before: DateTime<Utc>) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.ensure_open()?;
            self.entries.lock().retain(|entry| entry.timestamp > before);
            Ok(())
        })
    }

    fn close(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Backend whose writes block until `release` is called.
///
/// Used to hold the consumer inside a write so the queue fills up.
#[derive(Default)]
pub struct StalledBackend {
    inner: MemoryBackend,
    gate: CancellationToken,
}

impl StalledBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let every pending and future write through.
    pub fn release(&self) {
        self.gate.cancel();
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }
}

impl StorageBackend for StalledBackend {
    fn write<'a>(&'a self, entry: &'a LogEntry) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.gate.cancelled().await;
            self.inner.write(entry).await
        })
    }

    fn read<'a>(
        &'a self,
        level: Option<LogLevel>,
        filter: &'a LogFilter,
    ) -> BackendFuture<'a, Vec<LogEntry>> {
        self.inner.read(level, filter)
    }

    fn clear_logs(&self, before: DateTime<Utc>) -> BackendFuture<'_, ()> {
        self.inner.clear_logs(before)
    }

    fn close(&self) -> BackendFuture<'_, ()> {
        self.inner.close()
    }
}

/// Backend whose writes always fail with an I/O error.
#[derive(Default)]
pub struct FailingBackend;

impl FailingBackend {
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for FailingBackend {
    fn write<'a>(&'a self, _entry: &'a LogEntry) -> BackendFuture<'a, ()> {
        Box::pin(async move { Err(LogError::WriteFailed(std::io::Error::other("disk full"))) })
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

/// Observer that captures every entry it is handed.
#[derive(Default)]
pub struct RecordingObserver {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }
}

impl LogObserver for RecordingObserver {
    fn handle<'a>(&'a self, entry: &'a LogEntry) -> ObserverFuture<'a> {
        Box::pin(async move {
            self.entries.lock().push(entry.clone());
            Ok(())
        })
    }
}

/// Observer that appends `"<name>:<message>"` to a journal shared with other
/// observers, to check notification order.
pub struct JournalObserver {
    name: String,
    journal: Arc<Mutex<Vec<String>>>,
}

impl JournalObserver {
    pub fn new(name: impl Into<String>, journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            journal,
        }
    }
}

impl LogObserver for JournalObserver {
    fn handle<'a>(&'a self, entry: &'a LogEntry) -> ObserverFuture<'a> {
        Box::pin(async move {
            self.journal
                .lock()
                .push(format!("{}:{}", self.name, entry.message));
            Ok(())
        })
    }
}

/// Observer that always returns an error.
pub struct FailingObserver;

impl LogObserver for FailingObserver {
    fn handle<'a>(&'a self, _entry: &'a LogEntry) -> ObserverFuture<'a> {
        Box::pin(async move { Err(LogError::Observer("mock observer failure".to_string())) })
    }
}

/// Observer that panics on every entry.
pub struct PanickingObserver;

impl LogObserver for PanickingObserver {
    fn handle<'a>(&'a self, entry: &'a LogEntry) -> ObserverFuture<'a> {
        Box::pin(explode(entry))
    }
}

async fn explode(entry: &LogEntry) -> Result<(), LogError> {
    panic!("observer bug on {:?}", entry.message)
}

/// Dead-letter sink that keeps each dropped entry with its error text.
#[derive(Default)]
pub struct RecordingDeadLetter {
    entries: Mutex<Vec<(LogEntry, String)>>,
}

impl RecordingDeadLetter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(LogEntry, String)> {
        self.entries.lock().clone()
    }
}

impl DeadLetterSink for RecordingDeadLetter {
    fn record(&self, entry: &LogEntry, error: &LogError) {
        self.entries.lock().push((entry.clone(), error.to_string()));
    }
}
