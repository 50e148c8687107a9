use crate::domain::LogEntry;
use crate::error::LogError;
use std::future::Future;
use std::pin::Pin;

/// Side-effecting listener notified once for every persisted entry
/// (alerting, metrics, forwarding).
///
/// Returned errors are swallowed by the pipeline; an observer can never fail
/// or stall delivery of other entries.
pub trait LogObserver: Send + Sync {
    fn handle<'a>(
        &'a self,
        entry: &'a LogEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), LogError>> + Send + 'a>>;
}
