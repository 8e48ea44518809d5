use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::ChannelError;

/// Wire envelope. `id` is set on requests that expect a reply and on the reply itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub message: M,
}

impl<M> Envelope<M> {
    pub fn new(message: M) -> Self {
        Self { id: None, message }
    }

    pub fn with_id(id: u64, message: M) -> Self {
        Self { id: Some(id), message }
    }
}

type SendFn<M> = Arc<dyn Fn(Envelope<M>) -> Result<(), ChannelError> + Send + Sync>;

/// Request/reply correlation on top of a raw send function.
///
/// Replies are matched to pending requests by id; anything else is handed to
/// every subscriber as an unsolicited event.
pub struct MessageChannel<M> {
    inner: Arc<Inner<M>>,
}

impl<M> Clone for MessageChannel<M> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

struct Inner<M> {
    send: SendFn<M>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<M>>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<Envelope<M>>>>,
}

impl<M> MessageChannel<M>
where
    M: Clone + Send + 'static,
{
    pub fn new<F>(send: F) -> Self
    where
        F: Fn(Envelope<M>) -> Result<(), ChannelError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                send: Arc::new(send),
                next_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Send `message`; with a non-zero `timeout`, wait for the correlated reply.
    ///
    /// A zero timeout is fire-and-forget and yields `Ok(None)`.
    pub async fn request(&self, message: M, timeout: Duration) -> Result<Option<M>, ChannelError> {
        self.request_envelope(Envelope::new(message), timeout).await
    }

    /// Like [`request`](Self::request), but keeps an id already set on the envelope.
    pub async fn request_envelope(
        &self,
        mut envelope: Envelope<M>,
        timeout: Duration,
    ) -> Result<Option<M>, ChannelError> {
        if timeout.is_zero() {
            (self.inner.send)(envelope)?;
            return Ok(None);
        }

        let id = *envelope.id.get_or_insert_with(|| self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.inner.lock_pending().insert(id, tx);

        if let Err(e) = (self.inner.send)(envelope) {
            self.inner.lock_pending().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(Some(reply)),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                self.inner.lock_pending().remove(&id);
                Err(ChannelError::Timeout {
                    id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Fire-and-forget send.
    pub fn notify(&self, message: M) -> Result<(), ChannelError> {
        (self.inner.send)(Envelope::new(message))
    }

    /// Reply to the request that carried `origin_id`.
    pub fn respond(&self, message: M, origin_id: u64) -> Result<(), ChannelError> {
        (self.inner.send)(Envelope::with_id(origin_id, message))
    }

    /// Feed an incoming envelope from the transport.
    pub fn receive(&self, envelope: Envelope<M>) {
        if let Some(id) = envelope.id {
            let pending = self.inner.lock_pending().remove(&id);
            if let Some(tx) = pending {
                if tx.send(envelope.message).is_err() {
                    debug!("Reply {} arrived after its requester gave up", id);
                }
                return;
            }
        }

        let mut listeners = self.inner.lock_listeners();
        listeners.retain(|listener| listener.send(envelope.clone()).is_ok());
    }

    /// Register a listener for unsolicited envelopes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Envelope<M>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock_listeners().push(tx);
        rx
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.lock_pending().len()
    }

    /// Abandon every pending request and drop all listeners.
    pub fn destroy(&self) {
        self.inner.lock_pending().clear();
        self.inner.lock_listeners().clear();
    }
}

impl<M> Inner<M> {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<M>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<Envelope<M>>>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
