//! Planar geometry over WGS84 coordinates.
//!
//! Containment uses even-odd ray casting with longitude as the x axis and
//! latitude as the y axis. Points lying on an edge or a vertex are classified
//! as inside; that check runs before the ray cast so the classification does
//! not depend on the ray's tie-break behaviour.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Minimum number of vertices in a closed ring (a triangle plus the closing vertex).
pub const MIN_VERTICES: usize = 4;

/// Tolerance applied to the edge cross product when testing the boundary.
const BOUNDARY_EPSILON: f64 = 1e-12;

/// A latitude/longitude pair in decimal degrees.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate without validating it.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns true if latitude is in [-90, 90] and longitude in [-180, 180].
    ///
    /// NaN components are never in range.
    #[must_use]
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Validates the coordinate bounds.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::OutOfRange` if either component is outside its bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.in_range() {
            Ok(())
        } else {
            Err(ValidationError::OutOfRange {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.latitude, c.longitude]
    }
}

/// A closed ring of vertices.
///
/// Serialized as an array of `[latitude, longitude]` pairs. Construction does
/// not validate; call [`validate`] (or [`Polygon::validate`]) before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Polygon {
    vertices: Vec<Coordinate>,
}

impl Polygon {
    /// Creates a polygon from an ordered vertex list.
    #[must_use]
    pub fn new(vertices: Vec<Coordinate>) -> Self {
        Self { vertices }
    }

    /// Creates a polygon from `(latitude, longitude)` tuples.
    #[must_use]
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self::new(pairs.iter().map(|&(lat, lon)| Coordinate::new(lat, lon)).collect())
    }

    /// The vertices in ring order, including the closing vertex.
    #[must_use]
    pub fn vertices(&self) -> &[Coordinate] {
        &self.vertices
    }

    /// Shorthand for [`validate`].
    ///
    /// # Errors
    ///
    /// See [`validate`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate(self)
    }

    /// Shorthand for [`contains`].
    #[must_use]
    pub fn contains(&self, point: Coordinate) -> bool {
        contains(self, point)
    }

    /// Axis-aligned bounds of the ring, or `None` for an empty polygon.
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = self.vertices.first()?;
        let mut bbox = BoundingBox {
            min_latitude: first.latitude,
            max_latitude: first.latitude,
            min_longitude: first.longitude,
            max_longitude: first.longitude,
        };
        for v in &self.vertices[1..] {
            bbox.min_latitude = bbox.min_latitude.min(v.latitude);
            bbox.max_latitude = bbox.max_latitude.max(v.latitude);
            bbox.min_longitude = bbox.min_longitude.min(v.longitude);
            bbox.max_longitude = bbox.max_longitude.max(v.longitude);
        }
        Some(bbox)
    }
}

impl From<Vec<[f64; 2]>> for Polygon {
    fn from(pairs: Vec<[f64; 2]>) -> Self {
        Self::new(pairs.into_iter().map(Coordinate::from).collect())
    }
}

impl From<Polygon> for Vec<[f64; 2]> {
    fn from(p: Polygon) -> Self {
        p.vertices.into_iter().map(Into::into).collect()
    }
}

/// Inclusive axis-aligned bounding box.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Returns true if the point lies inside or on the box.
    ///
    /// Uses the same boundary tolerance as [`contains`], so every point a
    /// polygon contains is also inside that polygon's box.
    #[must_use]
    pub fn contains(&self, point: Coordinate) -> bool {
        point.latitude >= self.min_latitude - BOUNDARY_EPSILON
            && point.latitude <= self.max_latitude + BOUNDARY_EPSILON
            && point.longitude >= self.min_longitude - BOUNDARY_EPSILON
            && point.longitude <= self.max_longitude + BOUNDARY_EPSILON
    }
}

/// Validates a polygon.
///
/// Checks run in a fixed order so the reported error is deterministic:
/// vertex count, then closure, then coordinate bounds.
///
/// # Errors
///
/// - `TooFewVertices` if the ring has fewer than [`MIN_VERTICES`] vertices
/// - `NotClosed` if the first vertex differs from the last
/// - `OutOfRange` for the first vertex outside the coordinate bounds
pub fn validate(polygon: &Polygon) -> Result<(), ValidationError> {
    let vertices = polygon.vertices();
    if vertices.len() < MIN_VERTICES {
        return Err(ValidationError::TooFewVertices {
            actual: vertices.len(),
            min: MIN_VERTICES,
        });
    }

    if vertices.first() != vertices.last() {
        return Err(ValidationError::NotClosed);
    }

    for v in vertices {
        v.validate()?;
    }

    Ok(())
}

/// Point-in-polygon test. Boundary points are inside.
#[must_use]
pub fn contains(polygon: &Polygon, point: Coordinate) -> bool {
    let vertices = polygon.vertices();
    if vertices.len() < 2 {
        return false;
    }

    if vertices.windows(2).any(|edge| on_segment(edge[0], edge[1], point)) {
        return true;
    }

    let (px, py) = (point.longitude, point.latitude);
    let mut inside = false;
    for edge in vertices.windows(2) {
        let (xi, yi) = (edge[1].longitude, edge[1].latitude);
        let (xj, yj) = (edge[0].longitude, edge[0].latitude);
        if (yi > py) != (yj > py) {
            let x_cross = (xj - xi) * (py - yi) / (yj - yi) + xi;
            if px < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

fn on_segment(a: Coordinate, b: Coordinate, p: Coordinate) -> bool {
    let cross = (b.longitude - a.longitude) * (p.latitude - a.latitude)
        - (b.latitude - a.latitude) * (p.longitude - a.longitude);
    if cross.abs() > BOUNDARY_EPSILON {
        return false;
    }

    p.longitude >= a.longitude.min(b.longitude) - BOUNDARY_EPSILON
        && p.longitude <= a.longitude.max(b.longitude) + BOUNDARY_EPSILON
        && p.latitude >= a.latitude.min(b.latitude) - BOUNDARY_EPSILON
        && p.latitude <= a.latitude.max(b.latitude) + BOUNDARY_EPSILON
}
