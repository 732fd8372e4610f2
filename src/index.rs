//! Geofence index.
//!
//! The index is read-mostly. Readers clone an `Arc` to the current immutable
//! snapshot and query it without holding any lock; writers build a new
//! snapshot and swap it in, so a new geofence becomes visible atomically and a
//! query never observes a partially applied insert.
//!
//! Each entry carries its polygon's bounding box, which is checked before the
//! exact containment test. The box check shares the polygon's boundary
//! tolerance, so a point outside the box is never inside the polygon.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{GeoResult, ValidationError};
use crate::geofence::{Geofence, GeofenceId, GeofenceRef};
use crate::geometry::{self, BoundingBox, Coordinate};
use crate::storage::StorageError;

#[derive(Debug)]
struct IndexEntry {
    geofence: Arc<Geofence>,
    bbox: BoundingBox,
}

/// An immutable view of the index at one point in time.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    entries: Vec<IndexEntry>,
    by_id: HashMap<GeofenceId, usize>,
}

impl IndexSnapshot {
    /// Geofences containing `point`, in registration order.
    #[must_use]
    pub fn containing(&self, point: Coordinate) -> Vec<GeofenceRef> {
        self.entries
            .iter()
            .filter(|e| e.bbox.contains(point) && e.geofence.contains(point))
            .map(|e| e.geofence.to_ref())
            .collect()
    }

    /// Looks up a geofence by id.
    #[must_use]
    pub fn get(&self, id: &GeofenceId) -> Option<Arc<Geofence>> {
        self.by_id
            .get(id)
            .map(|&idx| Arc::clone(&self.entries[idx].geofence))
    }

    /// Number of indexed geofences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no geofence is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn with_added(&self, geofence: Geofence, bbox: BoundingBox) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend(self.entries.iter().map(|e| IndexEntry {
            geofence: Arc::clone(&e.geofence),
            bbox: e.bbox,
        }));

        let mut by_id = self.by_id.clone();
        by_id.insert(geofence.id.clone(), entries.len());
        entries.push(IndexEntry {
            geofence: Arc::new(geofence),
            bbox,
        });

        Self { entries, by_id }
    }
}

/// Thread-safe, copy-on-write geofence index.
#[derive(Debug, Default)]
pub struct GeofenceIndex {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl GeofenceIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from already-persisted geofences.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid polygon or duplicate id.
    pub fn from_geofences(geofences: impl IntoIterator<Item = Geofence>) -> GeoResult<Self> {
        let index = Self::new();
        for g in geofences {
            index.insert(g)?;
        }
        Ok(index)
    }

    /// The current snapshot. Holding it pins a consistent view.
    #[must_use]
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        // The lock only guards an `Arc` swap, so a poisoned guard is still consistent.
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Geofences containing `point`.
    #[must_use]
    pub fn containing(&self, point: Coordinate) -> Vec<GeofenceRef> {
        self.snapshot().containing(point)
    }

    /// Looks up a geofence by id.
    #[must_use]
    pub fn get(&self, id: &GeofenceId) -> Option<Arc<Geofence>> {
        self.snapshot().get(id)
    }

    /// Number of indexed geofences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns true if no geofence is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Validates and publishes a geofence.
    ///
    /// # Errors
    ///
    /// - `Validation` if the polygon is malformed (nothing becomes visible)
    /// - `Storage(DuplicateKey)` if the id is already indexed
    pub fn insert(&self, geofence: Geofence) -> GeoResult<()> {
        geometry::validate(&geofence.polygon)?;
        let bbox = geofence
            .bounding_box()
            .ok_or(ValidationError::TooFewVertices {
                actual: 0,
                min: geometry::MIN_VERTICES,
            })?;

        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if guard.by_id.contains_key(&geofence.id) {
            return Err(StorageError::DuplicateKey(geofence.id.to_string()).into());
        }
        let next = guard.with_added(geofence, bbox);
        *guard = Arc::new(next);
        Ok(())
    }
}
