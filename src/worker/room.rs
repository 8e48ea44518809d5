use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::RoomError;
use crate::models::{
    CursorMessage, DocInfoMessage, DocumentMetadata, PeerCursorMessage, RoomPlacement, ServerMessage,
    SyncVectorMessage, UpdateDocMessage, UserListMessage, WorkerId, SYNC_ORIGIN,
};
use crate::replica::Replica;
use crate::utils::Debouncer;
use crate::worker::connector::Connector;

/// Counts updates per one-second window and reports the last complete one.
#[derive(Debug)]
struct UpdateRate {
    window_start: Instant,
    current: u32,
    last_full: u32,
}

impl UpdateRate {
    const WINDOW: Duration = Duration::from_secs(1);

    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            current: 0,
            last_full: 0,
        }
    }

    fn roll(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < Self::WINDOW {
            return;
        }
        // A gap of more than one window means the last full second was quiet.
        self.last_full = if elapsed < Self::WINDOW * 2 { self.current } else { 0 };
        self.current = 0;
        self.window_start = now;
    }

    fn record(&mut self, now: Instant) {
        self.roll(now);
        self.current += 1;
    }

    fn per_second(&mut self, now: Instant) -> u32 {
        self.roll(now);
        self.last_full
    }
}

struct RoomState {
    replica: Replica,
    connectors: HashMap<Uuid, Connector>,
    last_commit_id: i64,
    closed: bool,
    saving: bool,
    rate: UpdateRate,
}

/// One open document and the sockets editing it.
pub struct Room {
    doc_id: String,
    secret: String,
    metadata: DocumentMetadata,
    state: Mutex<RoomState>,
    saver: Debouncer,
}

impl Room {
    pub fn new(metadata: DocumentMetadata, replica: Replica, last_commit_id: i64, saver: Debouncer) -> Self {
        Self {
            doc_id: metadata.id.clone(),
            secret: Uuid::new_v4().to_string(),
            metadata,
            state: Mutex::new(RoomState {
                replica,
                connectors: HashMap::new(),
                last_commit_id,
                closed: false,
                saving: false,
                rate: UpdateRate::new(),
            }),
            saver,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn saver(&self) -> &Debouncer {
        &self.saver
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply a client edit and relay it to every other connector.
    pub fn apply_update(&self, blob: Vec<u8>, commit_id: i64, origin: Uuid) -> Result<(), RoomError> {
        let mut state = self.lock();
        if state.closed {
            return Err(RoomError::Closed(self.doc_id.clone()));
        }
        state.replica.apply_update(&blob)?;
        state.last_commit_id = commit_id;
        state.rate.record(Instant::now());

        let message = ServerMessage::UpdateDoc(UpdateDocMessage {
            blob,
            commit_id,
            origin: None,
        });
        for connector in state.connectors.values().filter(|c| c.session_id != origin) {
            connector.send(message.clone());
        }
        Ok(())
    }

    /// Answer a client's state vector with ours, then push what it is missing.
    pub fn sync_vector(&self, session_id: Uuid, vector: &[u8]) -> Result<(), RoomError> {
        let state = self.lock();
        let Some(connector) = state.connectors.get(&session_id) else {
            return Ok(());
        };

        let diff = state.replica.encode_update(Some(vector))?;
        connector.send(ServerMessage::SyncVector(SyncVectorMessage {
            vector: state.replica.encode_state_vector(),
        }));
        connector.send(ServerMessage::UpdateDoc(UpdateDocMessage {
            blob: diff,
            commit_id: state.last_commit_id,
            origin: Some(SYNC_ORIGIN.to_string()),
        }));
        Ok(())
    }

    pub fn relay_cursor(&self, session_id: Uuid, cursor: CursorMessage) {
        let state = self.lock();
        let Some(source) = state.connectors.get(&session_id) else {
            return;
        };
        let message = ServerMessage::UpdateCursor(PeerCursorMessage {
            session_id: session_id.to_string(),
            user_id: source.user_id.clone(),
            index: cursor.index,
            length: cursor.length,
        });
        for connector in state.connectors.values().filter(|c| c.session_id != session_id) {
            connector.send(message.clone());
        }
    }

    /// Register a connector. Document info is always its first message.
    pub fn add_connector(&self, connector: Connector) -> Result<(), RoomError> {
        let mut state = self.lock();
        if state.closed {
            return Err(RoomError::Closed(self.doc_id.clone()));
        }
        connector.send(ServerMessage::DocInfo(DocInfoMessage {
            metadata: self.metadata.clone(),
        }));
        state.connectors.insert(connector.session_id, connector);
        Ok(())
    }

    pub fn remove_connector(&self, session_id: Uuid) -> bool {
        self.lock().connectors.remove(&session_id).is_some()
    }

    pub fn send_to(&self, session_id: Uuid, message: ServerMessage) {
        if let Some(connector) = self.lock().connectors.get(&session_id) {
            connector.send(message);
        }
    }

    pub fn broadcast_user_list(&self) {
        let state = self.lock();
        let message = ServerMessage::UserList(UserListMessage {
            users: state.connectors.values().map(Connector::user).collect(),
        });
        for connector in state.connectors.values() {
            connector.send(message.clone());
        }
    }

    pub fn user_count(&self) -> usize {
        self.lock().connectors.len()
    }

    pub fn placement(&self, worker_id: WorkerId) -> RoomPlacement {
        let mut state = self.lock();
        RoomPlacement {
            doc_id: self.doc_id.clone(),
            current_user_count: state.connectors.len() as u32,
            updates_per_second: f64::from(state.rate.per_second(Instant::now())),
            worker_id,
            room_secret: self.secret.clone(),
        }
    }

    /// Full document state plus the commit id it corresponds to.
    pub fn snapshot(&self) -> Result<(Vec<u8>, i64), RoomError> {
        let state = self.lock();
        Ok((state.replica.encode_update(None)?, state.last_commit_id))
    }

    pub fn version(&self) -> loro::VersionVector {
        self.lock().replica.version()
    }

    pub fn last_commit_id(&self) -> i64 {
        self.lock().last_commit_id
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns false when the room was already closed.
    pub fn mark_closed(&self) -> bool {
        !std::mem::replace(&mut self.lock().closed, true)
    }

    /// Claim the save slot; false when a save is already running.
    pub fn begin_save(&self) -> bool {
        !std::mem::replace(&mut self.lock().saving, true)
    }

    pub fn end_save(&self) {
        self.lock().saving = false;
    }

    pub fn disconnect_all(&self) {
        let connectors: Vec<Connector> = self.lock().connectors.drain().map(|(_, c)| c).collect();
        debug!("Disconnecting {} connectors from room {}", connectors.len(), self.doc_id);
        for connector in connectors {
            connector.close();
        }
    }
}
