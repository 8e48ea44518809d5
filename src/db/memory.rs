use futures_util::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::db::DocumentStore;
use crate::error::StoreError;
use crate::models::DocumentRecord;

/// Process-local store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, DocumentRecord>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: DocumentRecord) {
        self.lock()
            .insert(record.metadata.id.clone(), record);
    }

    pub fn record(&self, doc_id: &str) -> Option<DocumentRecord> {
        self.lock().get(doc_id).cloned()
    }

    /// Successful state writes so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write report failure.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DocumentRecord>> {
        self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get_document<'a>(
        &'a self,
        doc_id: &'a str,
        with_state: bool,
    ) -> BoxFuture<'a, Result<Option<DocumentRecord>, StoreError>> {
        let found = self.lock().get(doc_id).cloned().map(|mut record| {
            if !with_state {
                record.state = None;
            }
            record
        });
        future::ready(Ok(found)).boxed()
    }

    fn update_state_of_document<'a>(
        &'a self,
        doc_id: &'a str,
        state: Vec<u8>,
        commit_id: i64,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return future::ready(Err(StoreError::Unavailable(format!(
                "write of {} rejected",
                doc_id
            ))))
            .boxed();
        }

        let updated = match self.lock().get_mut(doc_id) {
            Some(record) => {
                record.state = Some(state);
                record.commit_id = Some(commit_id);
                record.metadata.updated_at = chrono::Utc::now();
                true
            }
            None => false,
        };
        if updated {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        future::ready(Ok(updated)).boxed()
    }
}
