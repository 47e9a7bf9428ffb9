use async_trait::async_trait;
use nc_core::{ArticleStorage, Error, Result};
use std::sync::Arc;

pub mod backends;
pub mod upsert;

pub use backends::*;
pub use upsert::{FlushReport, UpsertStore, DEFAULT_BATCH_SIZE};

#[async_trait]
pub trait StorageBackend: ArticleStorage + Sized {
    fn get_error_message() -> &'static str;

    /// Open the backend. `url` is backend specific (a database path for
    /// SQLite, ignored by the in-memory store).
    async fn open(url: Option<&str>) -> Result<Self>;
}

/// Build a shared storage handle by backend name.
pub async fn create_storage(kind: &str, url: Option<&str>) -> Result<Arc<dyn ArticleStorage>> {
    match kind {
        "memory" => Ok(Arc::new(InMemoryStorage::open(url).await?)),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let storage = SqliteStorage::open(url).await.map_err(|e| {
                Error::Storage(format!("{} ({})", e, SqliteStorage::get_error_message()))
            })?;
            Ok(Arc::new(storage))
        }
        other => Err(Error::Config(format!("Unknown storage backend: {}", other))),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageBackend, UpsertStore};
}
