// Append log entries to a single text file, one encoded line per entry.
// Reads re-parse the whole file; clearing rewrites it with the entries that
// survive. There is no rotation: `max_size_mb` is kept for callers but never
// enforced here.

use super::line_format::{encode_line, parse_line};
use crate::config::FileSettings;
use crate::domain::{LogEntry, LogFilter, LogLevel};
use crate::error::LogError;
use crate::port::{BackendFuture, StorageBackend};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

pub struct FileBackend {
    settings: FileSettings,
    /// `None` once closed. Held across every operation so that appends never
    /// interleave with a read or a rewrite.
    file: Mutex<Option<File>>,
}

impl FileBackend {
    /// Create the parent directory if needed and open the file for appending.
    pub async fn open(settings: FileSettings) -> Result<Self, LogError> {
        settings.validate()?;

        if let Some(dir) = settings.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| LogError::InitFailed {
                    target: dir.display().to_string(),
                    source,
                })?;
        }

        let file = open_append(&settings.path)
            .await
            .map_err(|source| LogError::InitFailed {
                target: settings.path.display().to_string(),
                source,
            })?;

        debug!(path = %settings.path.display(), "Opened file log backend");

        Ok(Self {
            settings,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn settings(&self) -> &FileSettings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings.path
    }

    async fn read_all(&self) -> Result<Vec<LogEntry>, LogError> {
        let bytes = fs::read(&self.settings.path)
            .await
            .map_err(LogError::ReadFailed)?;
        // Lossy decoding keeps one corrupted line from failing the whole read
        let text = String::from_utf8_lossy(&bytes);
        // Split on '\n' only: a trailing '\r' belongs to the message
        Ok(text.split('\n').filter_map(parse_line).collect())
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

impl StorageBackend for FileBackend {
    fn write<'a>(&'a self, entry: &'a LogEntry) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut guard = self.file.lock().await;
            let file = guard.as_mut().ok_or(LogError::BackendUninitialized)?;

            file.write_all(encode_line(entry).as_bytes())
                .await
                .map_err(LogError::WriteFailed)?;
            file.flush().await.map_err(LogError::WriteFailed)?;
            Ok(())
        })
    }

    fn read<'a>(
        &'a self,
        level: Option<LogLevel>,
        filter: &'a LogFilter,
    ) -> BackendFuture<'a, Vec<LogEntry>> {
        Box::pin(async move {
            let guard = self.file.lock().await;
            if guard.is_none() {
                return Err(LogError::BackendUninitialized);
            }

            let mut entries = self.read_all().await?;
            entries.retain(|entry| filter.selects(level, entry));
            Ok(entries)
        })
    }

    fn clear_logs(&self, before: DateTime<Utc>) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let guard = self.file.lock().await;
            if guard.is_none() {
                return Err(LogError::BackendUninitialized);
            }

            let entries = self.read_all().await?;
            let total = entries.len();
            let survivors: Vec<&LogEntry> = entries
                .iter()
                .filter(|entry| entry.timestamp > before)
                .collect();
            let kept: String = survivors.iter().map(|entry| encode_line(entry)).collect();

            // The append handle stays valid across the truncating rewrite
            fs::write(&self.settings.path, kept.as_bytes())
                .await
                .map_err(LogError::ClearFailed)?;

            debug!(
                path = %self.settings.path.display(),
                before = %before.to_rfc3339(),
                total,
                kept = survivors.len(),
                "Rewrote log file without cleared entries"
            );
            Ok(())
        })
    }

    fn close(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let mut guard = self.file.lock().await;
            if let Some(mut file) = guard.take() {
                file.flush().await.map_err(LogError::WriteFailed)?;
                file.sync_all().await.map_err(LogError::WriteFailed)?;
            }
            Ok(())
        })
    }
}
