//! Domain layer for rask-log-manager.
//!
//! Contains the value types shared across all modules:
//! - `LogEntry`: One immutable structured record
//! - `LogLevel`: Severity (Debug/Info/Warn/Error)
//! - `LogFilter`: Read-side query predicates

pub mod log_entry;
pub mod log_filter;
pub mod log_level;

pub use log_entry::LogEntry;
pub use log_filter::LogFilter;
pub use log_level::LogLevel;
