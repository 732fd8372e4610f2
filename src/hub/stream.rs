use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExecutionError, GeoError, GeoResult};
use crate::notification::Notification;

use super::dispatcher::HubInner;

/// Unique observer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(Uuid);

impl ObserverId {
    /// Create a new random observer id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn disconnected() -> GeoError {
    GeoError::Execution(ExecutionError::Disconnected {
        path: "observer_stream".to_string(),
    })
}

/// A live observer's notification stream.
///
/// Dropping this handle attempts best-effort unsubscription.
#[derive(Debug)]
pub struct ObserverHandle {
    id: ObserverId,
    rx: Receiver<Arc<Notification>>,
    hub: Weak<HubInner>,
    unsubscribed: AtomicBool,
}

impl ObserverHandle {
    pub(crate) fn new(id: ObserverId, rx: Receiver<Arc<Notification>>, hub: Weak<HubInner>) -> Self {
        Self {
            id,
            rx,
            hub,
            unsubscribed: AtomicBool::new(false),
        }
    }

    /// The observer id backing this handle.
    #[must_use]
    pub const fn id(&self) -> ObserverId {
        self.id
    }

    /// Returns true while the hub still delivers to this observer.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.unsubscribed.load(Ordering::Acquire)
            && self.hub.upgrade().map_or(false, |hub| hub.contains(self.id))
    }

    /// Explicit unsubscription. Idempotent.
    ///
    /// Notifications already buffered can still be received afterwards.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }

    /// Receive the next notification (blocking).
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` once the observer has been removed and its
    /// buffer is drained.
    pub fn recv(&self) -> GeoResult<Arc<Notification>> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next notification with a timeout.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if nothing arrives in time, or `Disconnected`.
    pub fn recv_timeout(&self, timeout: Duration) -> GeoResult<Arc<Notification>> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => GeoError::Execution(ExecutionError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Receive a buffered notification without blocking.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` once the observer has been removed and its
    /// buffer is drained.
    pub fn try_recv(&self) -> GeoResult<Option<Arc<Notification>>> {
        match self.rx.try_recv() {
            Ok(n) => Ok(Some(n)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Blocking iterator that ends when the observer is disconnected.
    pub fn iter(&self) -> impl Iterator<Item = Arc<Notification>> + '_ {
        self.rx.iter()
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if !self.unsubscribed.swap(true, Ordering::AcqRel) {
            if let Some(hub) = self.hub.upgrade() {
                hub.remove(self.id);
            }
        }
    }
}
