//! A single client's streaming session.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mhos_core::StreamEvent;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Frame;

/// Lifecycle of a session. There is no transition out of `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

#[derive(Default)]
struct Owned {
    sink: Option<mpsc::Sender<Frame>>,
    timers: HashMap<u64, AbortHandle>,
    tasks: Vec<AbortHandle>,
    resources: Vec<Box<dyn Any + Send>>,
}

struct Inner {
    id: Uuid,
    state: AtomicU8,
    next_timer: AtomicU64,
    cancel: CancellationToken,
    owned: Mutex<Owned>,
}

/// Cheaply cloneable handle to a streaming session.
#[derive(Clone)]
pub struct StreamSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Session writing into `sink`. No keepalive is started; see
    /// [`StreamSession::start_keepalive`].
    pub fn new(sink: mpsc::Sender<Frame>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                state: AtomicU8::new(OPEN),
                next_timer: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                owned: Mutex::new(Owned {
                    sink: Some(sink),
                    ..Owned::default()
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        match self.inner.state.load(Ordering::Acquire) {
            OPEN => SessionState::Open,
            CLOSING => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == OPEN
    }

    /// Resolves once the session starts closing.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// A token cancelled when the session closes.
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Timers scheduled and not yet fired or cancelled.
    pub fn pending_timers(&self) -> usize {
        self.owned().timers.len()
    }

    /// Deliver an event, waiting for buffer space.
    ///
    /// Event data is never dropped for backpressure. Returns `false` when the
    /// session is closed (a silent no-op) or closes while waiting. A gone
    /// transport closes the session.
    pub async fn send(&self, event: &StreamEvent) -> bool {
        if !self.is_open() {
            return false;
        }
        let frame = match Frame::from_event(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session = %self.inner.id, error = %e, "Failed to encode stream event");
                return false;
            }
        };
        let Some(sink) = self.owned().sink.clone() else {
            return false;
        };

        let permit = tokio::select! {
            permit = sink.reserve() => permit,
            () = self.inner.cancel.cancelled() => return false,
        };
        let Ok(permit) = permit else {
            debug!(session = %self.inner.id, "Transport gone");
            self.close();
            return false;
        };

        // Checked under the lock that `close` takes, so a frame cannot slip
        // past a concurrent close.
        let owned = self.owned();
        if !self.is_open() {
            return false;
        }
        permit.send(frame);
        drop(owned);
        true
    }

    /// Offer a keepalive without waiting. Dropped if the buffer is full;
    /// closes the session if the transport is gone.
    pub fn try_send_keepalive(&self) -> bool {
        let owned = self.owned();
        if !self.is_open() {
            return false;
        }
        let Some(sink) = owned.sink.as_ref() else {
            return false;
        };
        match sink.try_send(Frame::Keepalive) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(session = %self.inner.id, "Buffer full, skipping keepalive");
                false
            }
            Err(TrySendError::Closed(_)) => {
                drop(owned);
                debug!(session = %self.inner.id, "Keepalive found transport gone");
                self.close();
                false
            }
        }
    }

    /// Run `work` after `delay` unless the timer is cancelled or the session
    /// closes first. Returns the timer id, or `None` if already closed.
    pub fn schedule<F>(&self, delay: Duration, work: F) -> Option<u64>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut owned = self.owned();
        if !self.is_open() {
            return None;
        }
        let id = self.inner.next_timer.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
            if let Some(inner) = weak.upgrade() {
                inner
                    .owned
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .timers
                    .remove(&id);
            }
        });
        owned.timers.insert(id, handle.abort_handle());
        Some(id)
    }

    pub fn cancel_timer(&self, id: u64) -> bool {
        let removed = self.owned().timers.remove(&id);
        match removed {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Spawn a producer task owned by the session and aborted on close.
    pub fn spawn_task<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut owned = self.owned();
        if !self.is_open() {
            return false;
        }
        owned.tasks.push(tokio::spawn(task).abort_handle());
        true
    }

    /// Keep `resource` alive until the session closes (e.g. a filesystem
    /// watcher). Dropped immediately if the session is already closed.
    pub fn attach<R: Send + 'static>(&self, resource: R) {
        let mut owned = self.owned();
        if self.is_open() {
            owned.resources.push(Box::new(resource));
        } else {
            drop(owned);
            drop(resource);
        }
    }

    /// Send keepalive comments every `interval` and close the session as soon
    /// as the receiving side is dropped.
    pub fn start_keepalive(&self, interval: Duration) {
        let Some(sink) = self.owned().sink.clone() else {
            return;
        };

        let weak = Arc::downgrade(&self.inner);
        self.spawn_task(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let session = Self { inner };
                if !session.is_open() {
                    break;
                }
                session.try_send_keepalive();
            }
        });

        let weak = Arc::downgrade(&self.inner);
        self.spawn_task(async move {
            sink.closed().await;
            if let Some(inner) = weak.upgrade() {
                debug!(session = %inner.id, "Client disconnected");
                Self { inner }.close();
            }
        });
    }

    /// Close the session. Idempotent; returns `true` only for the call that
    /// performed the close.
    pub fn close(&self) -> bool {
        if self
            .inner
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let owned = std::mem::take(&mut *self.owned());
        self.inner.cancel.cancel();
        for handle in owned.timers.values() {
            handle.abort();
        }
        for handle in &owned.tasks {
            handle.abort();
        }
        debug!(
            session = %self.inner.id,
            timers = owned.timers.len(),
            tasks = owned.tasks.len(),
            resources = owned.resources.len(),
            "Stream session closed"
        );
        drop(owned);
        self.inner.state.store(CLOSED, Ordering::Release);
        true
    }

    fn owned(&self) -> MutexGuard<'_, Owned> {
        self.inner
            .owned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
