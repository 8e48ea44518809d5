use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ChannelError;
use crate::ipc::MessageChannel;
use crate::models::{
    CloseRoomReply, CloseRoomRequest, ControlMessage, OpenRoomReply, OpenRoomRequest, RoomPlacement, RoomTicket,
    WorkerId, WorkerRecord, WorkerStatus,
};
use crate::utils::{Debouncer, ExclusiveFlag, RoomTaskQueue, Task};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub open_room_timeout: Duration,
    pub close_room_timeout: Duration,
    pub reclaim_debounce: Duration,
    /// How long a sweep waits for a previous one to finish
    pub sweep_lock_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            open_room_timeout: config.open_room_timeout(),
            close_room_timeout: config.close_room_timeout(),
            reclaim_debounce: config.reclaim_debounce(),
            sweep_lock_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

struct WorkerEntry {
    record: WorkerRecord,
    channel: MessageChannel<ControlMessage>,
}

type TicketWaiters = Vec<oneshot::Sender<Option<RoomTicket>>>;

#[derive(Default)]
struct PlacementState {
    workers: BTreeMap<WorkerId, WorkerEntry>,
    placements: HashMap<String, RoomPlacement>,
    zero_users: HashSet<String>,
    /// Callers waiting on an open that is already queued
    opening: HashMap<String, TicketWaiters>,
}

impl PlacementState {
    fn ticket(&self, placement: &RoomPlacement) -> Option<RoomTicket> {
        let entry = self.workers.get(&placement.worker_id)?;
        Some(RoomTicket {
            host: entry.record.host.clone(),
            port: entry.record.port,
            doc_id: placement.doc_id.clone(),
            room_secret: placement.room_secret.clone(),
        })
    }

    /// Started worker with the fewest users, counting opens in flight.
    fn least_loaded_worker(&self) -> Option<WorkerId> {
        let mut best: Option<(WorkerId, u64)> = None;
        for (id, entry) in &self.workers {
            if entry.record.status != WorkerStatus::Started {
                continue;
            }
            let hosted: u64 = self
                .placements
                .values()
                .filter(|p| p.worker_id == *id)
                .map(|p| u64::from(p.current_user_count))
                .sum();
            let load = hosted + u64::from(entry.record.pending_users);
            if best.map_or(true, |(_, min)| load < min) {
                best = Some((*id, load));
            }
        }
        best.map(|(id, _)| id)
    }
}

/// Control plane: tracks which worker hosts which document and keeps the
/// worker fleet balanced.
pub struct Orchestrator {
    settings: OrchestratorSettings,
    state: Mutex<PlacementState>,
    queue: RoomTaskQueue,
    sweep_flag: ExclusiveFlag,
    reclaimer: Debouncer,
}

impl Orchestrator {
    pub fn new(settings: OrchestratorSettings) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Orchestrator>| {
            let me = me.clone();
            let reclaimer = Debouncer::new(settings.reclaim_debounce, move || {
                let me = me.clone();
                async move {
                    if let Some(orchestrator) = me.upgrade() {
                        orchestrator.request_sweep();
                    }
                }
            });
            Self {
                settings,
                state: Mutex::new(PlacementState::default()),
                queue: RoomTaskQueue::new(),
                sweep_flag: ExclusiveFlag::new(),
                reclaimer,
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlacementState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track a spawned worker and listen to its events.
    pub fn attach_worker(self: &Arc<Self>, record: WorkerRecord, channel: MessageChannel<ControlMessage>) {
        let worker_id = record.id;
        let mut events = channel.subscribe();
        self.lock().workers.insert(worker_id, WorkerEntry { record, channel });

        let this = self.clone();
        tokio::spawn(async move {
            while let Some(envelope) = events.recv().await {
                match envelope.message {
                    ControlMessage::WorkerStarted(_) => this.mark_started(worker_id),
                    ControlMessage::RoomStatusUpdate(update) => this.update_room_status(update.placement),
                    other => debug!("Unsolicited message from worker {}: {:?}", worker_id, other),
                }
            }
            debug!("Event stream of worker {} ended", worker_id);
        });
    }

    pub fn mark_started(&self, worker_id: WorkerId) {
        if let Some(entry) = self.lock().workers.get_mut(&worker_id) {
            entry.record.status = WorkerStatus::Started;
            info!("Worker {} started on port {}", worker_id, entry.record.port);
        }
    }

    /// Forget a worker that went away, along with every room it hosted.
    pub fn remove_worker(&self, worker_id: WorkerId) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(entry) = state.workers.remove(&worker_id) else {
            return;
        };
        entry.channel.destroy();

        let lost: Vec<String> = state
            .placements
            .values()
            .filter(|p| p.worker_id == worker_id)
            .map(|p| p.doc_id.clone())
            .collect();
        for doc_id in &lost {
            state.placements.remove(doc_id);
            state.zero_users.remove(doc_id);
        }
        info!("Removed worker {} and the {} rooms it hosted", worker_id, lost.len());
    }

    pub fn mark_all_closed(&self) {
        for entry in self.lock().workers.values_mut() {
            entry.record.status = WorkerStatus::Closed;
        }
    }

    /// Find or create a room for `doc_id`. `None` when the document cannot be
    /// opened right now.
    pub async fn request_open_doc(self: &Arc<Self>, doc_id: &str) -> Option<RoomTicket> {
        let (tx, rx) = oneshot::channel();
        let first = {
            let mut state = self.lock();
            let waiters = state.opening.entry(doc_id.to_string()).or_default();
            waiters.push(tx);
            waiters.len() == 1
        };

        if first {
            let this = self.clone();
            let doc_id = doc_id.to_string();
            self.queue.add_task(Task::open_room(async move {
                let ticket = this.place_doc(&doc_id).await;
                let waiters = this.lock().opening.remove(&doc_id).unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(ticket.clone());
                }
            }));
        }

        rx.await.ok().flatten()
    }

    async fn place_doc(&self, doc_id: &str) -> Option<RoomTicket> {
        let (worker_id, channel, reusing) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let hosted = state.placements.get(doc_id).map(|p| p.worker_id);
            let (worker_id, reusing) = match hosted {
                Some(id) if state.workers.contains_key(&id) => (id, true),
                _ => {
                    if hosted.is_some() {
                        state.placements.remove(doc_id);
                        state.zero_users.remove(doc_id);
                    }
                    let Some(id) = state.least_loaded_worker() else {
                        warn!("No started worker available to open {}", doc_id);
                        return None;
                    };
                    (id, false)
                }
            };
            let entry = state.workers.get_mut(&worker_id)?;
            entry.record.pending_users += 1;
            (worker_id, entry.channel.clone(), reusing)
        };

        // Opening is idempotent on the worker, so a reused placement is
        // confirmed (or rebuilt) by the same request.
        let request = ControlMessage::OpenRoomRequest(OpenRoomRequest {
            doc_id: doc_id.to_string(),
        });
        let reply = channel.request(request, self.settings.open_room_timeout).await;

        if let Err(ChannelError::Timeout { .. }) = &reply {
            if !reusing {
                self.abandon_open(doc_id, worker_id, &channel).await;
            }
        }

        let mut state = self.lock();
        if let Some(entry) = state.workers.get_mut(&worker_id) {
            entry.record.pending_users = entry.record.pending_users.saturating_sub(1);
        }

        let mut placement = match reply {
            Ok(Some(ControlMessage::OpenRoomReply(OpenRoomReply {
                success: true,
                placement: Some(placement),
            }))) => placement,
            Ok(other) => {
                warn!("Worker {} refused to open {}: {:?}", worker_id, doc_id, other);
                if reusing {
                    state.placements.remove(doc_id);
                    state.zero_users.remove(doc_id);
                }
                return None;
            }
            Err(e) => {
                warn!("Opening {} on worker {} failed: {}", doc_id, worker_id, e);
                return None;
            }
        };

        // The requesting user has not connected yet.
        placement.current_user_count += 1;
        let ticket = state.ticket(&placement)?;
        state.zero_users.remove(doc_id);
        if reusing {
            debug!("Reusing room {} on worker {}", doc_id, worker_id);
        } else {
            info!("Placed {} on worker {}", doc_id, worker_id);
        }
        state.placements.insert(doc_id.to_string(), placement);
        Some(ticket)
    }

    /// The worker may still finish an open we gave up on; make it close the room again.
    async fn abandon_open(&self, doc_id: &str, worker_id: WorkerId, channel: &MessageChannel<ControlMessage>) {
        let request = ControlMessage::CloseRoomRequest(CloseRoomRequest {
            doc_id: doc_id.to_string(),
        });
        match channel.request(request, self.settings.close_room_timeout).await {
            Ok(Some(ControlMessage::CloseRoomReply(CloseRoomReply { success: true }))) => {
                debug!("Closed {} on worker {} after its open timed out", doc_id, worker_id)
            }
            other => warn!(
                "Worker {} may still host {} after a timed out open: {:?}",
                worker_id, doc_id, other
            ),
        }
    }

    /// Apply an occupancy report from the hosting worker.
    pub fn update_room_status(&self, placement: RoomPlacement) {
        let idle = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match state.placements.get_mut(&placement.doc_id) {
                Some(current)
                    if current.worker_id == placement.worker_id && current.room_secret == placement.room_secret =>
                {
                    *current = placement.clone()
                }
                _ => {
                    debug!(
                        "Ignoring status of {} from worker {}: not the placed room",
                        placement.doc_id, placement.worker_id
                    );
                    return;
                }
            }
            if placement.current_user_count == 0 {
                state.zero_users.insert(placement.doc_id.clone());
                true
            } else {
                state.zero_users.remove(&placement.doc_id);
                false
            }
        };
        if idle {
            self.reclaimer.trigger();
        }
    }

    /// Queue an idle sweep behind whatever room work is already queued.
    pub fn request_sweep(self: &Arc<Self>) {
        let this = self.clone();
        self.queue.add_task(Task::clear_idle_rooms(async move {
            this.clear_idle_rooms().await;
        }));
    }

    /// Close every idle room. Returns how many placements were dropped.
    pub async fn clear_idle_rooms(&self) -> usize {
        let _sweeping = match self.sweep_flag.acquire(self.settings.sweep_lock_timeout).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Skipping idle sweep: {}", e);
                return 0;
            }
        };

        let idle: Vec<(String, Option<(WorkerId, MessageChannel<ControlMessage>)>)> = {
            let state = self.lock();
            state
                .zero_users
                .iter()
                .map(|doc_id| {
                    let target = state
                        .placements
                        .get(doc_id)
                        .and_then(|p| state.workers.get(&p.worker_id).map(|w| (p.worker_id, w.channel.clone())));
                    (doc_id.clone(), target)
                })
                .collect()
        };

        let mut cleared = 0;
        let mut retry = false;
        for (doc_id, target) in idle {
            let closed = match target {
                None => true,
                Some((worker_id, channel)) => {
                    let request = ControlMessage::CloseRoomRequest(CloseRoomRequest { doc_id: doc_id.clone() });
                    match channel.request(request, self.settings.close_room_timeout).await {
                        Ok(Some(ControlMessage::CloseRoomReply(CloseRoomReply { success }))) => success,
                        Ok(other) => {
                            warn!("Unexpected reply closing {} on worker {}: {:?}", doc_id, worker_id, other);
                            false
                        }
                        Err(e) => {
                            warn!("Closing {} on worker {} failed: {}", doc_id, worker_id, e);
                            false
                        }
                    }
                }
            };

            if closed {
                let mut state = self.lock();
                state.zero_users.remove(&doc_id);
                state.placements.remove(&doc_id);
                cleared += 1;
            } else {
                retry = true;
            }
        }

        if retry {
            self.reclaimer.trigger();
        }
        if cleared > 0 {
            info!("Idle sweep cleared {} rooms", cleared);
        }
        cleared
    }

    pub fn placement(&self, doc_id: &str) -> Option<RoomPlacement> {
        self.lock().placements.get(doc_id).cloned()
    }

    pub fn placements(&self) -> Vec<RoomPlacement> {
        self.lock().placements.values().cloned().collect()
    }

    pub fn workers(&self) -> Vec<WorkerRecord> {
        self.lock().workers.values().map(|w| w.record.clone()).collect()
    }

    pub fn idle_rooms(&self) -> Vec<String> {
        self.lock().zero_users.iter().cloned().collect()
    }
}
