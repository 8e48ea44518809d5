pub mod memory;
pub mod pg;

pub use memory::MemoryDocumentStore;
pub use pg::PgDocumentStore;

use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::warn;

use crate::error::StoreError;
use crate::models::DocumentRecord;

/// Persistent storage behind the document workers.
pub trait DocumentStore: Send + Sync {
    /// Load a document, including its replicated state when `with_state` is set.
    ///
    /// `Ok(None)` means the document does not exist (or is deleted).
    fn get_document<'a>(
        &'a self,
        doc_id: &'a str,
        with_state: bool,
    ) -> BoxFuture<'a, Result<Option<DocumentRecord>, StoreError>>;

    /// Replace the stored state. `Ok(false)` when no document was updated.
    fn update_state_of_document<'a>(
        &'a self,
        doc_id: &'a str,
        state: Vec<u8>,
        commit_id: i64,
    ) -> BoxFuture<'a, Result<bool, StoreError>>;
}

/// The Postgres store when a database URL is configured, the in-memory one otherwise.
pub async fn connect_store(db_url: Option<&str>) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match db_url {
        Some(url) => Ok(Arc::new(PgDocumentStore::new(url).await?)),
        None => {
            warn!("No database URL configured - documents live in memory only");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }
    }
}
