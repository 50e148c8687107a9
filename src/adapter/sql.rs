//! Placeholder SQL backend.
//!
//! Settings are validated and kept, but no connection is made: writes are
//! discarded, reads return nothing and clearing is a no-op. It exists so that
//! `BackendKind::Sql` configurations construct successfully.

use crate::config::SqlSettings;
use crate::domain::{LogEntry, LogFilter, LogLevel};
use crate::error::LogError;
use crate::port::{BackendFuture, StorageBackend};
use chrono::{DateTime, Utc};
use tracing::warn;

#[derive(Debug)]
pub struct SqlBackend {
    settings: SqlSettings,
}

impl SqlBackend {
    pub fn connect(settings: SqlSettings) -> Result<Self, LogError> {
        settings.validate()?;
        warn!(
            driver = %settings.driver,
            table = %settings.table,
            "SQL log backend is not implemented, entries will be discarded"
        );
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &SqlSettings {
        &self.settings
    }
}

impl StorageBackend for SqlBackend {
    fn write<'a>(&'a self, _entry: &'a LogEntry) -> BackendFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn read<'a>(
        &'a self,
        _level: Option<LogLevel>,
        _filter: &'a LogFilter,
    ) -> BackendFuture<'a, Vec<LogEntry>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn clear_logs(&self, _before: DateTime<Utc>) -> BackendFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BackendFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}
