//! Destination for entries the background consumer failed to persist.
//!
//! Asynchronous writes have already returned to their submitter by the time
//! the backend fails, so the error cannot be propagated. It is handed to a
//! `DeadLetterSink` instead.

use crate::domain::LogEntry;
use crate::error::LogError;
use tracing::error;

pub trait DeadLetterSink: Send + Sync {
    fn record(&self, entry: &LogEntry, error: &LogError);
}

/// Default sink: emits an `error!` event and drops the entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDeadLetter;

impl DeadLetterSink for TracingDeadLetter {
    fn record(&self, entry: &LogEntry, error: &LogError) {
        error!(
            log.level = %entry.level,
            log.timestamp = %entry.timestamp.to_rfc3339(),
            log.message = %entry.message,
            error = %error,
            "async log write failed, entry dropped"
        );
    }
}
