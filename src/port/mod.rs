pub mod dead_letter;
pub mod observer;
pub mod storage_backend;

pub use dead_letter::{DeadLetterSink, TracingDeadLetter};
pub use observer::LogObserver;
pub use storage_backend::{BackendFuture, StorageBackend};
