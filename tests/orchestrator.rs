mod common;

use colabri_rooms::ipc::{duplex_pair, MessageChannel};
use colabri_rooms::models::{
    CloseRoomReply, ControlMessage, OpenRoomReply, RoomPlacement, WorkerRecord, WorkerStatus, WorkerStarted,
};
use colabri_rooms::orchestrator::{Orchestrator, OrchestratorSettings};
use common::{attach, seeded_store, start_worker, start_worker_with, DelayedStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const SAVE_WINDOW: Duration = Duration::from_secs(30);

fn with_users(orchestrator: &Orchestrator, doc_id: &str, users: u32) {
    let mut placement = orchestrator.placement(doc_id).unwrap();
    placement.current_user_count = users;
    orchestrator.update_room_status(placement);
}

#[tokio::test]
async fn new_document_goes_to_the_least_loaded_worker() {
    let store = seeded_store(&["a", "b", "c"]);
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let workers: Vec<_> = (0..3).map(|id| start_worker(id, store.clone(), SAVE_WINDOW)).collect();
    for worker in &workers {
        attach(&orchestrator, worker);
    }

    orchestrator.request_open_doc("a").await.unwrap();
    with_users(&orchestrator, "a", 5);
    orchestrator.request_open_doc("b").await.unwrap();
    with_users(&orchestrator, "b", 2);
    assert_eq!(orchestrator.placement("a").unwrap().worker_id, 0);
    assert_eq!(orchestrator.placement("b").unwrap().worker_id, 1);

    // Loads are now {5, 2, 0}.
    let ticket = orchestrator.request_open_doc("c").await.unwrap();
    let placement = orchestrator.placement("c").unwrap();
    assert_eq!(placement.worker_id, 2);
    assert_eq!(ticket.port, 4002);
    assert_eq!(ticket.room_secret, workers[2].worker.room("c").unwrap().secret());
    // The requesting user is counted before it connects.
    assert_eq!(placement.current_user_count, 1);
}

#[tokio::test]
async fn worker_becomes_eligible_once_it_reports_started() {
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let host = start_worker(0, seeded_store(&["a"]), SAVE_WINDOW);
    orchestrator.attach_worker(host.record(4000), host.control.clone());

    assert!(orchestrator.request_open_doc("a").await.is_none());

    host.worker
        .control()
        .notify(ControlMessage::WorkerStarted(WorkerStarted {}))
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while orchestrator.workers()[0].status != WorkerStatus::Started {
        assert!(Instant::now() < deadline, "worker never reported started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(orchestrator.request_open_doc("a").await.is_some());
}

#[tokio::test(start_paused = true)]
async fn unanswered_open_resolves_to_none() {
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let (channel, _silent_worker) = duplex_pair::<ControlMessage>();
    orchestrator.attach_worker(WorkerRecord::new(0, "127.0.0.1", 4000), channel);
    orchestrator.mark_started(0);

    let started = Instant::now();
    assert!(orchestrator.request_open_doc("a").await.is_none());
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(orchestrator.placement("a").is_none());
    assert_eq!(orchestrator.workers()[0].pending_users, 0);
}

#[tokio::test]
async fn concurrent_opens_share_one_placement() {
    let store = seeded_store(&["a"]);
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let workers: Vec<_> = (0..2).map(|id| start_worker(id, store.clone(), SAVE_WINDOW)).collect();
    for worker in &workers {
        attach(&orchestrator, worker);
    }

    let (first, second, third) = tokio::join!(
        orchestrator.request_open_doc("a"),
        orchestrator.request_open_doc("a"),
        orchestrator.request_open_doc("a"),
    );
    let first = first.unwrap();
    assert_eq!(Some(&first), second.as_ref());
    assert_eq!(Some(&first), third.as_ref());

    assert_eq!(orchestrator.placements().len(), 1);
    let hosted: usize = workers.iter().map(|w| w.worker.room_count()).sum();
    assert_eq!(hosted, 1);

    // A later open reuses the placement.
    assert_eq!(orchestrator.request_open_doc("a").await, Some(first));
    assert_eq!(orchestrator.placements().len(), 1);
}

#[tokio::test]
async fn sweeping_twice_matches_sweeping_once() {
    let store = seeded_store(&["a", "b"]);
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let host = start_worker(0, store.clone(), SAVE_WINDOW);
    attach(&orchestrator, &host);

    orchestrator.request_open_doc("a").await.unwrap();
    orchestrator.request_open_doc("b").await.unwrap();
    with_users(&orchestrator, "a", 0);
    assert_eq!(orchestrator.idle_rooms(), vec!["a".to_string()]);

    assert_eq!(orchestrator.clear_idle_rooms().await, 1);
    let mut after_once: Vec<RoomPlacement> = orchestrator.placements();
    after_once.sort_by(|x, y| x.doc_id.cmp(&y.doc_id));

    assert_eq!(orchestrator.clear_idle_rooms().await, 0);
    let mut after_twice = orchestrator.placements();
    after_twice.sort_by(|x, y| x.doc_id.cmp(&y.doc_id));

    assert_eq!(after_once, after_twice);
    assert_eq!(after_once.len(), 1);
    assert_eq!(after_once[0].doc_id, "b");
    assert!(host.worker.room("a").is_none());
    assert!(host.worker.room("b").is_some());
    // The final save on close reached the store.
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn reopening_an_idle_room_protects_it_from_the_sweep() {
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let host = start_worker(0, seeded_store(&["a"]), SAVE_WINDOW);
    attach(&orchestrator, &host);

    let ticket = orchestrator.request_open_doc("a").await.unwrap();
    with_users(&orchestrator, "a", 0);

    assert_eq!(orchestrator.request_open_doc("a").await, Some(ticket));
    assert_eq!(orchestrator.placement("a").unwrap().current_user_count, 1);
    assert!(orchestrator.idle_rooms().is_empty());
    assert_eq!(orchestrator.clear_idle_rooms().await, 0);
    assert!(host.worker.room("a").is_some());
}

#[tokio::test]
async fn force_closed_room_is_rebuilt_on_reopen() {
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let host = start_worker(0, seeded_store(&["a"]), SAVE_WINDOW);
    attach(&orchestrator, &host);

    let stale = orchestrator.request_open_doc("a").await.unwrap();
    host.worker.force_close_room("a");
    let deadline = Instant::now() + Duration::from_secs(2);
    while orchestrator.idle_rooms().is_empty() {
        assert!(Instant::now() < deadline, "force close was never reported");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let closed = orchestrator.placement("a").unwrap();

    // Reopening inside the reclaim window must not hand out the dead room.
    let fresh = orchestrator.request_open_doc("a").await.unwrap();
    assert_ne!(fresh.room_secret, stale.room_secret);
    assert_eq!(fresh.room_secret, host.worker.room("a").unwrap().secret());
    assert!(orchestrator.idle_rooms().is_empty());

    // A late report about the closed room leaves the new one alone.
    orchestrator.update_room_status(closed);
    assert_eq!(orchestrator.placement("a").unwrap().room_secret, fresh.room_secret);
    assert!(orchestrator.idle_rooms().is_empty());
    assert_eq!(orchestrator.clear_idle_rooms().await, 0);
    assert!(host.worker.room("a").is_some());
}

#[tokio::test(start_paused = true)]
async fn timed_out_open_does_not_leave_a_room_behind() {
    let store = DelayedStore {
        inner: seeded_store(&["a"]),
        slow_doc: "a".to_string(),
        delay: Duration::from_secs(11),
    };
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let host = start_worker_with(0, Arc::new(store), SAVE_WINDOW);
    attach(&orchestrator, &host);

    assert!(orchestrator.request_open_doc("a").await.is_none());
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert!(orchestrator.placement("a").is_none());
    assert!(host.worker.room("a").is_none());
    assert_eq!(orchestrator.workers()[0].pending_users, 0);
}

#[tokio::test]
async fn exited_worker_takes_its_placements_with_it() {
    let store = seeded_store(&["a"]);
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let first = start_worker(0, store.clone(), SAVE_WINDOW);
    let second = start_worker(1, store.clone(), SAVE_WINDOW);
    attach(&orchestrator, &first);
    attach(&orchestrator, &second);

    orchestrator.request_open_doc("a").await.unwrap();
    assert_eq!(orchestrator.placement("a").unwrap().worker_id, 0);

    orchestrator.remove_worker(0);
    assert!(orchestrator.placement("a").is_none());
    assert_eq!(orchestrator.workers().len(), 1);

    orchestrator.request_open_doc("a").await.unwrap();
    assert_eq!(orchestrator.placement("a").unwrap().worker_id, 1);
}

type Log = Arc<Mutex<Vec<(String, Instant)>>>;

/// A scripted worker: answers every request after `delay`, logging what it saw.
fn scripted_worker(channel: MessageChannel<ControlMessage>, delay: Duration, log: Log) {
    let mut requests = channel.subscribe();
    tokio::spawn(async move {
        while let Some(envelope) = requests.recv().await {
            let channel = channel.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let Some(id) = envelope.id else { return };
                let (entry, reply) = match envelope.message {
                    ControlMessage::OpenRoomRequest(request) => (
                        format!("open {}", request.doc_id),
                        ControlMessage::OpenRoomReply(OpenRoomReply {
                            success: true,
                            placement: Some(RoomPlacement {
                                doc_id: request.doc_id.clone(),
                                current_user_count: 0,
                                updates_per_second: 0.0,
                                worker_id: 0,
                                room_secret: format!("secret-{}", request.doc_id),
                            }),
                        }),
                    ),
                    ControlMessage::CloseRoomRequest(request) => (
                        format!("close {}", request.doc_id),
                        ControlMessage::CloseRoomReply(CloseRoomReply { success: true }),
                    ),
                    _ => return,
                };
                log.lock().unwrap().push((format!("{} received", entry), Instant::now()));
                tokio::time::sleep(delay).await;
                log.lock().unwrap().push((format!("{} replied", entry), Instant::now()));
                channel.respond(reply, id).unwrap();
            });
        }
    });
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().iter().map(|(entry, _)| entry.clone()).collect()
}

#[tokio::test(start_paused = true)]
async fn sweep_queued_behind_an_open_waits_for_it() {
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let (channel, worker_end) = duplex_pair::<ControlMessage>();
    let log: Log = Arc::default();
    scripted_worker(worker_end, Duration::from_secs(5), log.clone());
    orchestrator.attach_worker(WorkerRecord::new(0, "127.0.0.1", 4000), channel);
    orchestrator.mark_started(0);

    orchestrator.request_open_doc("idle").await.unwrap();
    with_users(&orchestrator, "idle", 0);
    log.lock().unwrap().clear();

    let opening = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.request_open_doc("busy").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    orchestrator.request_sweep();

    assert!(opening.await.unwrap().is_some());
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(
        entries(&log),
        vec!["open busy received", "open busy replied", "close idle received", "close idle replied"]
    );
    assert!(orchestrator.placement("idle").is_none());
    assert!(orchestrator.placement("busy").is_some());
}

#[tokio::test(start_paused = true)]
async fn open_queued_behind_a_sweep_waits_for_it() {
    let orchestrator = Orchestrator::new(OrchestratorSettings::default());
    let (channel, worker_end) = duplex_pair::<ControlMessage>();
    let log: Log = Arc::default();
    scripted_worker(worker_end, Duration::from_secs(5), log.clone());
    orchestrator.attach_worker(WorkerRecord::new(0, "127.0.0.1", 4000), channel);
    orchestrator.mark_started(0);

    orchestrator.request_open_doc("a").await.unwrap();
    with_users(&orchestrator, "a", 0);
    log.lock().unwrap().clear();

    orchestrator.request_sweep();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let ticket = orchestrator.request_open_doc("a").await.unwrap();

    // The open did not reuse the placement the sweep was tearing down.
    assert_eq!(
        entries(&log),
        vec!["close a received", "close a replied", "open a received", "open a replied"]
    );
    assert_eq!(ticket.room_secret, "secret-a");
    assert_eq!(orchestrator.placement("a").unwrap().current_user_count, 1);
}
