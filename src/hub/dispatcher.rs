//! Notification hub.
//!
//! This module owns observer registrations and fans `Notification`s out to
//! per-observer bounded queues. Publishing never blocks: a queue that is full
//! or closed gets its observer dropped instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::notification::Notification;

use super::stream::{ObserverHandle, ObserverId};

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-observer queue capacity. Values below 1 are treated as 1.
    pub observer_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { observer_buffer: 256 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropReason {
    Full,
    Disconnected,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "buffer_full",
            Self::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug)]
pub(crate) struct HubInner {
    observer_buffer: usize,
    observers: RwLock<HashMap<ObserverId, Sender<Arc<Notification>>>>,
    published: AtomicU64,
    dropped_observers: AtomicU64,
}

impl HubInner {
    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        observers.remove(&id).is_some()
    }

    pub(crate) fn contains(&self, id: ObserverId) -> bool {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        observers.contains_key(&id)
    }
}

/// In-process publish/subscribe broadcaster for notifications.
///
/// Cloning the hub yields another handle to the same observer set.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl NotificationHub {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(cfg: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                observer_buffer: cfg.observer_buffer.max(1),
                observers: RwLock::new(HashMap::new()),
                published: AtomicU64::new(0),
                dropped_observers: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a new observer and returns its receiving handle.
    #[must_use]
    pub fn subscribe(&self) -> ObserverHandle {
        let id = ObserverId::new();
        let (tx, rx) = bounded::<Arc<Notification>>(self.inner.observer_buffer);
        {
            let mut observers = self
                .inner
                .observers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            observers.insert(id, tx);
        }
        tracing::debug!(observer_id = %id, "observer subscribed");
        ObserverHandle::new(id, rx, Arc::downgrade(&self.inner))
    }

    /// Deregisters an observer. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            tracing::debug!(observer_id = %id, "observer unsubscribed");
        }
        removed
    }

    /// Delivers `notification` to every current observer and returns how many
    /// observers accepted it.
    ///
    /// The observer set is snapshotted and the lock released before delivery.
    /// An observer whose queue is full or closed is dropped.
    pub fn publish(&self, notification: Notification) -> usize {
        let notification = Arc::new(notification);
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<(ObserverId, Sender<Arc<Notification>>)> = {
            let observers = self
                .inner
                .observers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            observers.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(Arc::clone(&notification)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => failed.push((id, DropReason::Full)),
                Err(TrySendError::Disconnected(_)) => failed.push((id, DropReason::Disconnected)),
            }
        }

        for (id, reason) in failed {
            // Someone else may have removed it in the meantime; only count our own removals.
            if self.inner.remove(id) {
                self.inner.dropped_observers.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    observer_id = %id,
                    reason = reason.as_str(),
                    event_id = %notification.event_id,
                    "dropping observer"
                );
            }
        }

        delivered
    }

    /// Number of currently registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Observers removed by the hub because delivery failed.
    #[must_use]
    pub fn dropped_observers(&self) -> u64 {
        self.inner.dropped_observers.load(Ordering::Relaxed)
    }

    /// Total number of `publish` calls.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// The effective per-observer queue capacity.
    #[must_use]
    pub fn observer_buffer(&self) -> usize {
        self.inner.observer_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use chrono::Utc;

    use crate::error::{ExecutionError, GeoError};
    use crate::geofence::{GeofenceCategory, GeofenceId, GeofenceRef};
    use crate::geometry::Coordinate;
    use crate::notification::VehicleSummary;
    use crate::tracker::{TransitionEvent, TransitionKind};
    use crate::vehicle::VehicleId;

    fn notification() -> Notification {
        let event = TransitionEvent {
            vehicle_id: VehicleId::from("veh_1"),
            geofence: GeofenceRef {
                id: GeofenceId::from("geo_1"),
                name: "Depot".to_string(),
                category: GeofenceCategory::DeliveryZone,
            },
            kind: TransitionKind::Entry,
            location: Coordinate::new(1.0, 1.0),
            timestamp: Utc::now(),
        };
        Notification::new(&event, VehicleSummary::unregistered(event.vehicle_id.clone()))
    }

    #[test]
    fn publish_reaches_every_observer_in_order() {
        let hub = NotificationHub::default();
        let a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.observer_count(), 2);

        let first = notification();
        let second = notification();
        assert_eq!(hub.publish(first.clone()), 2);
        assert_eq!(hub.publish(second.clone()), 2);

        for handle in [&a, &b] {
            assert_eq!(handle.try_recv().unwrap().unwrap().event_id, first.event_id);
            assert_eq!(handle.try_recv().unwrap().unwrap().event_id, second.event_id);
            assert!(handle.try_recv().unwrap().is_none());
        }
        assert_eq!(hub.published(), 2);
    }

    #[test]
    fn publish_without_observers_succeeds() {
        let hub = NotificationHub::default();
        assert_eq!(hub.publish(notification()), 0);
    }

    #[test]
    fn full_observer_is_dropped_and_others_keep_receiving() {
        let hub = NotificationHub::new(HubConfig { observer_buffer: 2 });
        let slow = hub.subscribe();
        let fast = hub.subscribe();

        for _ in 0..2 {
            assert_eq!(hub.publish(notification()), 2);
            fast.try_recv().unwrap().unwrap();
        }
        // Slow observer's queue is full now.
        assert_eq!(hub.publish(notification()), 1);
        assert_eq!(hub.dropped_observers(), 1);
        assert_eq!(hub.observer_count(), 1);
        assert!(!slow.is_active());
        assert!(fast.is_active());

        // Buffered items stay readable, then the stream reports disconnection.
        assert!(slow.try_recv().unwrap().is_some());
        assert!(slow.try_recv().unwrap().is_some());
        let err = slow.recv_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(
            err,
            GeoError::Execution(ExecutionError::Disconnected { .. })
        ));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hub = NotificationHub::default();
        let handle = hub.subscribe();
        assert!(hub.unsubscribe(handle.id()));
        assert!(!hub.unsubscribe(handle.id()));
        handle.unsubscribe();
        handle.unsubscribe();
        assert_eq!(hub.observer_count(), 0);
        assert_eq!(hub.dropped_observers(), 0);
    }

    #[test]
    fn dropping_handle_deregisters() {
        let hub = NotificationHub::default();
        let handle = hub.subscribe();
        assert_eq!(hub.observer_count(), 1);
        drop(handle);
        assert_eq!(hub.observer_count(), 0);
        assert_eq!(hub.publish(notification()), 0);
    }

    #[test]
    fn zero_buffer_is_clamped() {
        let hub = NotificationHub::new(HubConfig { observer_buffer: 0 });
        assert_eq!(hub.observer_buffer(), 1);
        let handle = hub.subscribe();
        assert_eq!(hub.publish(notification()), 1);
        assert!(handle.try_recv().unwrap().is_some());
    }

    #[test]
    fn hub_config_deserializes_with_defaults() {
        let cfg: HubConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.observer_buffer, 256);
    }
}
