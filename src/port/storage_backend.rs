//! StorageBackend trait: the durable sink behind a `LogManager`.

use crate::domain::{LogEntry, LogFilter, LogLevel};
use crate::error::LogError;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LogError>> + Send + 'a>>;

/// Capability interface every backend implements.
///
/// This trait is dyn-compatible by using boxed futures instead of `impl Future`.
/// Preparing the sink (opening files, connecting) happens in each backend's
/// constructor, so a value of this type is always initialized.
///
/// Implementations must tolerate concurrent calls: the delivery pipeline
/// serializes writes in asynchronous mode, but synchronous mode lets several
/// callers write at once.
pub trait StorageBackend: Send + Sync {
    /// Durably append one entry.
    fn write<'a>(&'a self, entry: &'a LogEntry) -> BackendFuture<'a, ()>;

    /// Re-read the sink and return entries matching `level` (all levels when
    /// `None`) and every predicate of `filter`, in storage order.
    fn read<'a>(
        &'a self,
        level: Option<LogLevel>,
        filter: &'a LogFilter,
    ) -> BackendFuture<'a, Vec<LogEntry>>;

    /// Remove every entry with `timestamp <= before`, keeping the rest.
    fn clear_logs(&self, before: DateTime<Utc>) -> BackendFuture<'_, ()>;

    /// Release underlying resources. Closing twice is not an error.
    fn close(&self) -> BackendFuture<'_, ()>;
}
