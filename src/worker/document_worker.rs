use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{RoomAuth, RoomClaims};
use crate::db::DocumentStore;
use crate::error::RoomError;
use crate::ipc::MessageChannel;
use crate::models::{
    ClientMessage, ControlMessage, PongMessage, RoomPlacement, RoomStatusUpdate, ServerMessage, WorkerId,
};
use crate::replica::Replica;
use crate::utils::Debouncer;
use crate::worker::connector::{Connector, Outbound};
use crate::worker::room::Room;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_id: WorkerId,
    pub save_debounce: Duration,
}

/// Hosts open rooms for one worker process.
pub struct DocumentWorker {
    settings: WorkerSettings,
    store: Arc<dyn DocumentStore>,
    auth: RoomAuth,
    control: MessageChannel<ControlMessage>,
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    // Per-document locks: opens and closes of one document never overlap.
    doc_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    me: Weak<DocumentWorker>,
}

impl DocumentWorker {
    pub fn new(
        settings: WorkerSettings,
        store: Arc<dyn DocumentStore>,
        auth: RoomAuth,
        control: MessageChannel<ControlMessage>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            settings,
            store,
            auth,
            control,
            rooms: Mutex::new(HashMap::new()),
            doc_locks: Mutex::new(HashMap::new()),
            me: me.clone(),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.settings.worker_id
    }

    pub fn auth(&self) -> &RoomAuth {
        &self.auth
    }

    pub fn control(&self) -> &MessageChannel<ControlMessage> {
        &self.control
    }

    fn lock_rooms(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Room>>> {
        self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn doc_lock(&self, doc_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.doc_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(doc_id.to_string()).or_default().clone()
    }

    /// Forget the lock of `doc_id` once nobody else holds a handle to it.
    fn release_doc_lock(&self, doc_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.doc_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(doc_id);
        }
    }

    pub fn room(&self, doc_id: &str) -> Option<Arc<Room>> {
        self.lock_rooms().get(doc_id).cloned()
    }

    pub fn room_count(&self) -> usize {
        self.lock_rooms().len()
    }

    /// Host `doc_id`, loading its persisted state on first open.
    pub async fn open_room(&self, doc_id: &str) -> Result<RoomPlacement, RoomError> {
        let lock = self.doc_lock(doc_id);
        let opened = {
            let _opening = lock.lock().await;
            self.load_room(doc_id).await
        };
        self.release_doc_lock(doc_id, lock);
        opened
    }

    async fn load_room(&self, doc_id: &str) -> Result<RoomPlacement, RoomError> {
        if let Some(room) = self.room(doc_id) {
            return Ok(room.placement(self.id()));
        }

        let record = self
            .store
            .get_document(doc_id, true)
            .await?
            .ok_or_else(|| RoomError::UnknownDocument(doc_id.to_string()))?;

        let replica = match record.state.as_deref() {
            Some(blob) if !blob.is_empty() => Replica::from_blob(blob)?,
            _ => Replica::new(),
        };
        let room = Arc::new(Room::new(
            record.metadata,
            replica,
            record.commit_id.unwrap_or_default(),
            self.saver_for(doc_id),
        ));

        self.lock_rooms().insert(doc_id.to_string(), room.clone());
        info!("Worker {} opened room for document {}", self.id(), doc_id);
        Ok(room.placement(self.id()))
    }

    fn saver_for(&self, doc_id: &str) -> Debouncer {
        let worker = self.me.clone();
        let doc_id = doc_id.to_string();
        Debouncer::new(self.settings.save_debounce, move || {
            let worker = worker.clone();
            let doc_id = doc_id.clone();
            async move {
                if let Some(worker) = worker.upgrade() {
                    worker.save_room(&doc_id).await;
                }
            }
        })
    }

    /// Apply an edit from `origin` and schedule a save.
    pub fn update(&self, doc_id: &str, blob: Vec<u8>, commit_id: i64, origin: Uuid) -> Result<(), RoomError> {
        let room = self.room(doc_id).ok_or_else(|| RoomError::NotOpen(doc_id.to_string()))?;
        room.apply_update(blob, commit_id, origin)?;
        room.saver().trigger();
        Ok(())
    }

    /// Debounced save. A failed save takes the room down.
    pub async fn save_room(&self, doc_id: &str) {
        let Some(room) = self.room(doc_id) else {
            debug!("Room {} closed before its save window ended", doc_id);
            return;
        };
        if room.is_closed() {
            return;
        }
        if !room.begin_save() {
            warn!("Save already running for room {}, skipping", doc_id);
            return;
        }

        let saved = self.persist(&room).await;
        room.end_save();

        match saved {
            Ok(()) => debug!("Saved room {}", doc_id),
            Err(e) => {
                error!("Saving room {} failed: {}. Closing the room", doc_id, e);
                self.force_close_room(doc_id);
            }
        }
    }

    async fn persist(&self, room: &Room) -> Result<(), RoomError> {
        let (state, commit_id) = room.snapshot()?;
        if !self
            .store
            .update_state_of_document(room.doc_id(), state, commit_id)
            .await?
        {
            return Err(RoomError::SaveRejected(room.doc_id().to_string()));
        }
        Ok(())
    }

    /// Save and evict a room. Closing a room that is not hosted succeeds.
    pub async fn close_room(&self, doc_id: &str) -> bool {
        let lock = self.doc_lock(doc_id);
        {
            let _closing = lock.lock().await;
            self.evict_room(doc_id).await;
        }
        self.release_doc_lock(doc_id, lock);
        true
    }

    async fn evict_room(&self, doc_id: &str) {
        let removed = self.lock_rooms().remove(doc_id);
        let Some(room) = removed else {
            return;
        };
        room.mark_closed();

        if let Err(e) = self.persist(&room).await {
            error!("Final save of room {} failed: {}", doc_id, e);
        }
        room.disconnect_all();
        info!("Worker {} closed room {}", self.id(), doc_id);
    }

    /// Evict without saving and tell the orchestrator the room is empty.
    pub fn force_close_room(&self, doc_id: &str) {
        let Some(room) = self.lock_rooms().remove(doc_id) else {
            return;
        };
        room.mark_closed();
        room.disconnect_all();
        self.report_status(&room);
        warn!("Worker {} force-closed room {}", self.id(), doc_id);
    }

    pub async fn close_all_rooms(&self) {
        let doc_ids: Vec<String> = self.lock_rooms().keys().cloned().collect();
        for doc_id in doc_ids {
            self.close_room(&doc_id).await;
        }
    }

    /// Admit an authenticated socket into its room.
    pub fn join_room(
        &self,
        claims: &RoomClaims,
        secret: &str,
        tx: mpsc::UnboundedSender<Outbound>,
    ) -> Result<Uuid, RoomError> {
        let room = self
            .room(&claims.doc_id)
            .ok_or_else(|| RoomError::NotOpen(claims.doc_id.clone()))?;
        if room.secret() != secret {
            return Err(RoomError::SecretMismatch(claims.doc_id.clone()));
        }

        let connector = Connector::new(claims.user_id.clone(), tx);
        let session_id = connector.session_id;
        room.add_connector(connector)?;
        self.report_status(&room);
        room.broadcast_user_list();

        info!(
            "User {} joined room {} with session {}",
            claims.user_id, claims.doc_id, session_id
        );
        Ok(session_id)
    }

    pub fn leave_room(&self, doc_id: &str, session_id: Uuid) {
        let Some(room) = self.room(doc_id) else {
            return;
        };
        if room.remove_connector(session_id) {
            self.report_status(&room);
            room.broadcast_user_list();
            info!("Session {} left room {}", session_id, doc_id);
        }
    }

    pub fn handle_client_message(
        &self,
        doc_id: &str,
        session_id: Uuid,
        message: ClientMessage,
    ) -> Result<(), RoomError> {
        match message {
            ClientMessage::UpdateDoc(update) => self.update(doc_id, update.blob, update.commit_id, session_id),
            ClientMessage::SyncVector(sync) => {
                let room = self.room(doc_id).ok_or_else(|| RoomError::NotOpen(doc_id.to_string()))?;
                room.sync_vector(session_id, &sync.vector)
            }
            ClientMessage::UpdateCursor(cursor) => {
                if let Some(room) = self.room(doc_id) {
                    room.relay_cursor(session_id, cursor);
                }
                Ok(())
            }
            ClientMessage::Ping(_) => {
                if let Some(room) = self.room(doc_id) {
                    room.send_to(
                        session_id,
                        ServerMessage::Pong(PongMessage {
                            date: Utc::now().to_rfc3339(),
                        }),
                    );
                }
                Ok(())
            }
        }
    }

    fn report_status(&self, room: &Room) {
        let mut placement = room.placement(self.id());
        if room.is_closed() {
            placement.current_user_count = 0;
        }
        let update = ControlMessage::RoomStatusUpdate(RoomStatusUpdate { placement });
        if let Err(e) = self.control.notify(update) {
            warn!("Failed to report status of room {}: {}", room.doc_id(), e);
        }
    }
}
