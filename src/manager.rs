//! `LogManager`: the entry point applications hold.
//!
//! Wires a backend, an observer registry and a delivery pipeline together and
//! exposes write, read, clear and shutdown.

use crate::adapter::open_backend;
use crate::config::ManagerConfig;
use crate::domain::{LogEntry, LogFilter, LogLevel};
use crate::error::LogError;
use crate::pipeline::{DeliveryMode, DeliveryPipeline, ObserverRegistry, PipelineStats};
use crate::port::{LogObserver, StorageBackend};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct LogManager {
    backend: Arc<dyn StorageBackend>,
    observers: ObserverRegistry,
    pipeline: DeliveryPipeline,
    default_level: Option<LogLevel>,
}

impl LogManager {
    /// Open the configured backend and start delivery.
    ///
    /// Asynchronous configurations spawn the consumer task, so this must run
    /// inside a Tokio runtime.
    pub async fn create(config: ManagerConfig) -> Result<Self, LogError> {
        config.validate()?;

        let backend = open_backend(&config.backend).await?;
        let manager = Self::with_backend(backend, config.delivery_mode())?
            .with_default_level(config.default_level);

        info!(
            backend = %config.backend.kind(),
            async_delivery = config.async_delivery,
            "Log manager created"
        );
        Ok(manager)
    }

    /// Build a manager around an already initialized backend.
    pub fn with_backend(
        backend: Arc<dyn StorageBackend>,
        mode: DeliveryMode,
    ) -> Result<Self, LogError> {
        let observers = ObserverRegistry::new();
        let pipeline = DeliveryPipeline::new(backend.clone(), observers.clone(), mode)?;

        Ok(Self {
            backend,
            observers,
            pipeline,
            default_level: None,
        })
    }

    #[must_use]
    pub fn with_default_level(mut self, level: Option<LogLevel>) -> Self {
        self.default_level = level;
        self
    }

    /// Stamp the current time and submit.
    pub async fn write_log(&self, level: LogLevel, message: impl Into<String>) -> Result<(), LogError> {
        self.pipeline.submit(LogEntry::now(level, message)).await
    }

    pub async fn write_log_with_metadata(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<(), LogError> {
        let entry = LogEntry::now(level, message).with_metadata(metadata);
        self.pipeline.submit(entry).await
    }

    /// Entries of `level` (every level when `None`) that satisfy all of
    /// `filter`'s predicates.
    pub async fn read_logs(
        &self,
        level: Option<LogLevel>,
        filter: &LogFilter,
    ) -> Result<Vec<LogEntry>, LogError> {
        self.ensure_open()?;
        self.backend.read(level, filter).await
    }

    /// Remove every entry stamped at or before `before`.
    pub async fn clear_logs(&self, before: DateTime<Utc>) -> Result<(), LogError> {
        self.ensure_open()?;
        self.backend.clear_logs(before).await
    }

    /// Observers are called in registration order, starting with the next
    /// delivered entry.
    pub fn register_observer(&self, observer: Arc<dyn LogObserver>) {
        self.observers.register(observer);
    }

    /// Drain queued entries, then close the backend.
    pub async fn close(&self) -> Result<(), LogError> {
        self.pipeline.close().await?;
        let stats = self.pipeline.stats();
        info!(
            accepted = stats.accepted,
            delivered = stats.delivered,
            saturated = stats.saturated,
            write_failures = stats.write_failures,
            "Log manager closed"
        );
        Ok(())
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn default_level(&self) -> Option<LogLevel> {
        self.default_level
    }

    pub fn is_async(&self) -> bool {
        self.pipeline.is_async()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn ensure_open(&self) -> Result<(), LogError> {
        if self.pipeline.is_closed() {
            return Err(LogError::BackendUninitialized);
        }
        Ok(())
    }
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogManager")
            .field("async", &self.is_async())
            .field("default_level", &self.default_level)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, FileSettings};
    use crate::pipeline::PipelineOptions;
    use crate::test_support::{MemoryBackend, RecordingObserver};
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_with_file_backend() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = ManagerConfig::new(BackendConfig::File(FileSettings::at(
            temp_dir.path().join("logs").join("app.log"),
        )));
        config.default_level = Some(LogLevel::Warn);

        let manager = LogManager::create(config).await.unwrap();
        assert!(!manager.is_async());
        assert_eq!(manager.default_level(), Some(LogLevel::Warn));

        manager.write_log(LogLevel::Info, "hello").await.unwrap();
        let entries = manager.read_logs(None, &LogFilter::new()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "hello");

        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_metadata_reaches_backend_and_observers() {
        let backend = Arc::new(MemoryBackend::new());
        let observer = Arc::new(RecordingObserver::new());
        let manager = LogManager::with_backend(backend.clone(), DeliveryMode::Synchronous).unwrap();
        manager.register_observer(observer.clone());

        let metadata = HashMap::from([("request_id".to_string(), json!("abc-123"))]);
        manager
            .write_log_with_metadata(LogLevel::Error, "payment failed", metadata.clone())
            .await
            .unwrap();

        assert_eq!(backend.entries()[0].metadata, metadata);
        assert_eq!(observer.entries()[0].metadata, metadata);
        assert_eq!(manager.observer_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_logs_delegates_to_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let manager = LogManager::with_backend(backend.clone(), DeliveryMode::Synchronous).unwrap();

        manager.write_log(LogLevel::Info, "recent").await.unwrap();
        let long_ago = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        manager.clear_logs(long_ago).await.unwrap();
        assert_eq!(backend.messages(), vec!["recent"]);

        manager.clear_logs(Utc::now()).await.unwrap();
        assert!(backend.messages().is_empty());
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let manager = LogManager::with_backend(
            Arc::new(MemoryBackend::new()),
            DeliveryMode::Asynchronous(PipelineOptions::default()),
        )
        .unwrap();
        assert!(manager.is_async());

        manager.close().await.unwrap();
        manager.close().await.unwrap();

        assert!(matches!(
            manager.write_log(LogLevel::Info, "late").await,
            Err(LogError::PipelineClosed)
        ));
        assert!(matches!(
            manager.read_logs(None, &LogFilter::new()).await,
            Err(LogError::BackendUninitialized)
        ));
        assert!(matches!(
            manager.clear_logs(Utc::now()).await,
            Err(LogError::BackendUninitialized)
        ));
    }
}
