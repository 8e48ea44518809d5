use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::FlagError;

/// A boolean gate that callers can wait on until it is released.
///
/// Releasing the flag wakes every waiter in registration order.
#[derive(Default)]
pub struct ExclusiveFlag {
    state: Mutex<FlagState>,
    mutating: AtomicBool,
}

#[derive(Default)]
struct FlagState {
    locked: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

impl ExclusiveFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state().locked
    }

    /// Set the flag. Unlocking releases every waiter, oldest first.
    pub fn set_locked(&self, locked: bool) -> Result<(), FlagError> {
        if self.mutating.swap(true, Ordering::AcqRel) {
            return Err(FlagError::ConcurrentMutation);
        }
        let _reset = MutationGuard(&self.mutating);

        let waiters = {
            let mut state = self.lock_state();
            state.locked = locked;
            if locked {
                Vec::new()
            } else {
                std::mem::take(&mut state.waiters)
            }
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
        Ok(())
    }

    /// Resolve once the flag is unlocked, or fail after `timeout`.
    pub async fn wait_for_unlock(&self, timeout: Duration) -> Result<(), FlagError> {
        let rx = {
            let mut state = self.lock_state();
            if !state.locked {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            rx
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(_) => Ok(()),
            Err(_) => Err(FlagError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Wait for the flag, take it, and hold it until the guard drops.
    pub async fn acquire(&self, timeout: Duration) -> Result<FlagGuard<'_>, FlagError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            self.wait_for_unlock(remaining).await?;
            if self.try_take()? {
                return Ok(FlagGuard { flag: self });
            }
        }
    }

    fn try_take(&self) -> Result<bool, FlagError> {
        if self.mutating.swap(true, Ordering::AcqRel) {
            return Err(FlagError::ConcurrentMutation);
        }
        let _reset = MutationGuard(&self.mutating);

        let mut state = self.lock_state();
        if state.locked {
            return Ok(false);
        }
        state.locked = true;
        Ok(true)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, FlagState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct MutationGuard<'a>(&'a AtomicBool);

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Holds an [`ExclusiveFlag`] locked; unlocks on drop.
pub struct FlagGuard<'a> {
    flag: &'a ExclusiveFlag,
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.flag.set_locked(false) {
            tracing::error!("Failed to release exclusive flag: {}", e);
        }
    }
}
