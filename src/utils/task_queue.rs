use futures_util::future::{join_all, BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::error;

pub type TaskFuture = BoxFuture<'static, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    OpenRoom,
    ClearIdleRooms,
}

/// Work serialized by the [`RoomTaskQueue`].
pub enum Task {
    /// Pending opens; run concurrently with each other.
    OpenRoom(Vec<TaskFuture>),
    ClearIdleRooms(TaskFuture),
}

impl Task {
    pub fn open_room(fut: impl Future<Output = ()> + Send + 'static) -> Self {
        Task::OpenRoom(vec![fut.boxed()])
    }

    pub fn clear_idle_rooms(fut: impl Future<Output = ()> + Send + 'static) -> Self {
        Task::ClearIdleRooms(fut.boxed())
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Task::OpenRoom(_) => TaskKind::OpenRoom,
            Task::ClearIdleRooms(_) => TaskKind::ClearIdleRooms,
        }
    }

    /// Fold `other` into `self` when both are the same kind; hand it back otherwise.
    fn merge(&mut self, other: Task) -> Option<Task> {
        match (self, other) {
            (Task::OpenRoom(pending), Task::OpenRoom(more)) => {
                pending.extend(more);
                None
            }
            // A queued sweep already covers whatever the new one would clear.
            (Task::ClearIdleRooms(_), Task::ClearIdleRooms(_)) => None,
            (_, other) => Some(other),
        }
    }

    async fn run(self) {
        match self {
            Task::OpenRoom(pending) => {
                join_all(pending).await;
            }
            Task::ClearIdleRooms(fut) => fut.await,
        }
    }
}

/// FIFO of room tasks drained by a single runner, one task at a time.
///
/// Adjacent tasks of the same kind coalesce, so a sweep never interleaves
/// with an open and vice versa.
pub struct RoomTaskQueue {
    shared: Arc<Shared>,
}

struct Shared {
    tasks: Mutex<VecDeque<Task>>,
    notify: Notify,
    started: AtomicBool,
    closed: AtomicBool,
}

impl Default for RoomTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomTaskQueue {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                tasks: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a task. The runner is spawned on first use, so this needs a tokio runtime.
    pub fn add_task(&self, task: Task) {
        {
            let mut tasks = self.shared.lock_tasks();
            let leftover = match tasks.back_mut() {
                Some(last) if last.kind() == task.kind() => last.merge(task),
                _ => Some(task),
            };
            if let Some(task) = leftover {
                tasks.push_back(task);
            }
        }

        if !self.shared.started.swap(true, Ordering::AcqRel) {
            tokio::spawn(run(self.shared.clone()));
        }
        self.shared.notify.notify_one();
    }

    /// Number of tasks waiting behind the one currently running.
    pub fn queued(&self) -> usize {
        self.shared.lock_tasks().len()
    }
}

impl Drop for RoomTaskQueue {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }
}

impl Shared {
    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run(shared: Arc<Shared>) {
    loop {
        let next = shared.lock_tasks().pop_front();
        match next {
            Some(task) => {
                let kind = task.kind();
                if AssertUnwindSafe(task.run()).catch_unwind().await.is_err() {
                    error!("Room task {:?} panicked; continuing with the next task", kind);
                }
            }
            None => {
                if shared.closed.load(Ordering::Acquire) {
                    return;
                }
                shared.notify.notified().await;
            }
        }
    }
}
