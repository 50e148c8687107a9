pub mod file;
pub mod sql;

pub use file::FileBackend;
pub use sql::SqlBackend;

use crate::config::BackendConfig;
use crate::error::LogError;
use crate::port::StorageBackend;
use std::sync::Arc;

/// Construct and initialize the backend a configuration selects.
pub async fn open_backend(config: &BackendConfig) -> Result<Arc<dyn StorageBackend>, LogError> {
    let backend: Arc<dyn StorageBackend> = match config {
        BackendConfig::File(settings) => Arc::new(FileBackend::open(settings.clone()).await?),
        BackendConfig::Sql(settings) => Arc::new(SqlBackend::connect(settings.clone())?),
    };
    Ok(backend)
}
