#![warn(rust_2018_idioms)]
#![allow(
    clippy::cast_possible_truncation, // Millisecond durations fit in u64
    clippy::missing_errors_doc,       // Every fallible API returns LogError
    clippy::module_name_repetitions,  // e.g. LogLevel in log_level
    clippy::must_use_candidate        // Annotated selectively on builders
)]

pub mod adapter;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod manager;
pub mod pipeline;
pub mod port;
pub mod test_support;

pub use config::{BackendConfig, BackendKind, FileSettings, ManagerConfig, SqlSettings};
pub use domain::{LogEntry, LogFilter, LogLevel};
pub use error::LogError;
pub use manager::LogManager;
pub use pipeline::{DeliveryMode, PipelineOptions, PipelineStats};
pub use port::{DeadLetterSink, LogObserver, StorageBackend};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
