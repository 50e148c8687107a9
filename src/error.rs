use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    #[error("Invalid backend settings: {0}")]
    InvalidSettings(String),

    #[error("Failed to initialize backend at {target}: {source}")]
    InitFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backend not initialized")]
    BackendUninitialized,

    #[error("Log queue is full after waiting {timeout:?}, entry dropped")]
    QueueSaturated { timeout: Duration },

    #[error("Delivery pipeline is closed")]
    PipelineClosed,

    #[error("Failed to write log: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Failed to read logs: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to clear logs: {0}")]
    ClearFailed(#[source] std::io::Error),

    #[error("Observer error: {0}")]
    Observer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl LogError {
    /// Whether the caller may reasonably resubmit the same entry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LogError::QueueSaturated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_saturation_is_retryable() {
        let saturated = LogError::QueueSaturated {
            timeout: Duration::from_millis(100),
        };
        assert!(saturated.is_retryable());
        assert!(!LogError::PipelineClosed.is_retryable());
        assert!(!LogError::BackendUninitialized.is_retryable());
        assert!(!LogError::UnsupportedBackend("mongo".into()).is_retryable());
    }

    #[test]
    fn test_init_failed_keeps_source() {
        let err = LogError::InitFailed {
            target: "/nope/app.log".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/nope/app.log"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
