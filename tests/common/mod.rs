//! Shared fixtures: seeded stores, in-process workers and tokens.
#![allow(dead_code)]

use chrono::Utc;
use colabri_rooms::auth::RoomAuth;
use colabri_rooms::db::{DocumentStore, MemoryDocumentStore};
use colabri_rooms::error::StoreError;
use colabri_rooms::ipc::{duplex_pair, MessageChannel};
use colabri_rooms::models::{ControlMessage, DocumentMetadata, DocumentRecord, WorkerRecord};
use futures_util::future::{BoxFuture, FutureExt};
use colabri_rooms::orchestrator::Orchestrator;
use colabri_rooms::replica::Replica;
use colabri_rooms::worker::{create_worker_routes, serve_control, DocumentWorker, WorkerSettings};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::sync::Arc;
use std::time::Duration;

pub const SECRET: &str = "integration-secret";

pub fn metadata(doc_id: &str) -> DocumentMetadata {
    DocumentMetadata {
        id: doc_id.to_string(),
        title: format!("Document {}", doc_id),
        owner: "u/owner".to_string(),
        doc_type: "colab-statement".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn record(doc_id: &str, state: Option<Vec<u8>>) -> DocumentRecord {
    DocumentRecord {
        metadata: metadata(doc_id),
        state,
        commit_id: Some(0),
    }
}

pub fn seeded_store(doc_ids: &[&str]) -> Arc<MemoryDocumentStore> {
    let store = MemoryDocumentStore::new();
    for doc_id in doc_ids {
        store.insert(record(doc_id, None));
    }
    Arc::new(store)
}

/// A replica holding one text edit made by `peer`.
pub fn edited(peer: u64, text: &str) -> Replica {
    let replica = Replica::with_peer_id(peer).unwrap();
    replica.doc().get_text("text").insert(0, text).unwrap();
    replica.doc().commit();
    replica
}

pub fn text_of(replica: &Replica) -> String {
    replica.doc().get_text("text").to_string()
}

pub fn user_token(user_id: &str) -> String {
    let claims = serde_json::json!({
        "sub": user_id,
        "type": "user",
        "exp": Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// A worker running in this process, wired to an in-memory control channel.
pub struct InProcessWorker {
    pub worker: Arc<DocumentWorker>,
    /// The orchestrator's end of the control channel
    pub control: MessageChannel<ControlMessage>,
}

impl InProcessWorker {
    pub fn record(&self, port: u16) -> WorkerRecord {
        WorkerRecord::new(self.worker.id(), "127.0.0.1", port)
    }

    /// Serve the worker's socket routes on a free local port.
    pub async fn serve(&self) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = create_worker_routes(self.worker.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }
}

/// Wraps a store so that loading `slow_doc` takes `delay`.
pub struct DelayedStore {
    pub inner: Arc<MemoryDocumentStore>,
    pub slow_doc: String,
    pub delay: Duration,
}

impl DocumentStore for DelayedStore {
    fn get_document<'a>(
        &'a self,
        doc_id: &'a str,
        with_state: bool,
    ) -> BoxFuture<'a, Result<Option<DocumentRecord>, StoreError>> {
        async move {
            if doc_id == self.slow_doc {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.get_document(doc_id, with_state).await
        }
        .boxed()
    }

    fn update_state_of_document<'a>(
        &'a self,
        doc_id: &'a str,
        state: Vec<u8>,
        commit_id: i64,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        self.inner.update_state_of_document(doc_id, state, commit_id)
    }
}

pub fn start_worker(worker_id: u32, store: Arc<MemoryDocumentStore>, save_debounce: Duration) -> InProcessWorker {
    start_worker_with(worker_id, store, save_debounce)
}

pub fn start_worker_with(worker_id: u32, store: Arc<dyn DocumentStore>, save_debounce: Duration) -> InProcessWorker {
    let (control, worker_end) = duplex_pair::<ControlMessage>();
    let requests = worker_end.subscribe();
    let worker = DocumentWorker::new(
        WorkerSettings {
            worker_id,
            save_debounce,
        },
        store,
        RoomAuth::new(SECRET),
        worker_end,
    );
    tokio::spawn(serve_control(worker.clone(), requests));
    InProcessWorker { worker, control }
}

/// Attach `worker` to `orchestrator` as started.
pub fn attach(orchestrator: &Arc<Orchestrator>, worker: &InProcessWorker) {
    let id = worker.worker.id();
    orchestrator.attach_worker(worker.record(4000 + id as u16), worker.control.clone());
    orchestrator.mark_started(id);
}
