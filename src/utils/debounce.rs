use futures_util::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

type Action = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Nothing scheduled
    Idle,
    /// Window running; further triggers are absorbed
    Armed,
    /// Action running; `rearm` records a trigger that arrived meanwhile
    Firing { rearm: bool },
}

/// Coalesces bursts of triggers into one action run per window.
#[derive(Clone)]
pub struct Debouncer {
    inner: Arc<Inner>,
}

struct Inner {
    delay: Duration,
    state: Mutex<TimerState>,
    action: Action,
}

impl Debouncer {
    pub fn new<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                delay,
                state: Mutex::new(TimerState::Idle),
                action: Arc::new(move || action().boxed()),
            }),
        }
    }

    pub fn state(&self) -> TimerState {
        *self.inner.lock_state()
    }

    /// Request a run. Must be called from within a tokio runtime.
    pub fn trigger(&self) {
        let mut state = self.inner.lock_state();
        match *state {
            TimerState::Idle => {
                *state = TimerState::Armed;
                tokio::spawn(run(self.inner.clone()));
            }
            TimerState::Armed => {}
            TimerState::Firing { .. } => *state = TimerState::Firing { rearm: true },
        }
    }
}

impl Inner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run(inner: Arc<Inner>) {
    loop {
        tokio::time::sleep(inner.delay).await;
        *inner.lock_state() = TimerState::Firing { rearm: false };

        (inner.action)().await;

        let mut state = inner.lock_state();
        match *state {
            TimerState::Firing { rearm: true } => {
                debug!("Trigger arrived while firing, re-arming");
                *state = TimerState::Armed;
            }
            _ => {
                *state = TimerState::Idle;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(delay: Duration) -> (Debouncer, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let debouncer = Debouncer::new(delay, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (debouncer, runs)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_runs_once() {
        let (debouncer, runs) = counting(Duration::from_secs(30));
        for _ in 0..5 {
            debouncer.trigger();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(debouncer.state(), TimerState::Armed);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.state(), TimerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_while_firing_rearms() {
        let runs = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Debouncer>>> = Arc::new(Mutex::new(None));

        let counter = runs.clone();
        let handle = slot.clone();
        let debouncer = Debouncer::new(Duration::from_secs(10), move || {
            let counter = counter.clone();
            let handle = handle.clone();
            async move {
                // The first run requests another one while it is still firing.
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    if let Some(d) = handle.lock().unwrap().as_ref() {
                        d.trigger();
                    }
                }
            }
        });
        *slot.lock().unwrap() = Some(debouncer.clone());

        debouncer.trigger();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.state(), TimerState::Armed);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(debouncer.state(), TimerState::Idle);
    }
}
