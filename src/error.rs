//! Error types for GeoWatch.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific condition. Every error is scoped to the single ping, geofence
//! or rule being processed; none of them is fatal to the process.

use thiserror::Error;

use crate::geofence::GeofenceId;
use crate::storage::StorageError;
use crate::vehicle::VehicleId;

/// Validation errors. Always caller-correctable and never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Polygon has {actual} vertices, at least {min} are required")]
    TooFewVertices {
        actual: usize,
        min: usize,
    },

    #[error("Polygon is not closed: first and last vertices must be identical")]
    NotClosed,

    #[error("Coordinate ({latitude}, {longitude}) is out of range: latitude must be in [-90, 90], longitude in [-180, 180]")]
    OutOfRange {
        latitude: f64,
        longitude: f64,
    },

    #[error("Invalid category '{value}': must be one of delivery_zone, restricted_zone, toll_zone, customer_area")]
    InvalidCategory {
        value: String,
    },

    #[error("Invalid event_type '{value}': must be one of entry, exit, both")]
    InvalidEventType {
        value: String,
    },

    #[error("Invalid vehicle status '{value}'")]
    InvalidVehicleStatus {
        value: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors raised while executing a core operation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Vehicle not found: {id}")]
    VehicleNotFound {
        id: VehicleId,
    },

    #[error("Geofence not found: {id}")]
    GeofenceNotFound {
        id: GeofenceId,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for GeoWatch.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl From<StorageError> for GeoError {
    fn from(err: StorageError) -> Self {
        Self::Execution(ExecutionError::Storage(err))
    }
}

impl GeoError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if a referenced vehicle or geofence does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::VehicleNotFound { .. })
                | Self::Execution(ExecutionError::GeofenceNotFound { .. })
                | Self::Execution(ExecutionError::Storage(StorageError::NotFound(_)))
        )
    }

    /// Returns true if this error came from the persistence layer.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Storage(_)))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. }
                    | ExecutionError::Storage(StorageError::BackendError(_))
                    | ExecutionError::Storage(StorageError::ConnectionError(_))
            ),
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for GeoWatch operations.
pub type GeoResult<T> = Result<T, GeoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_too_few_vertices() {
        let err = ValidationError::TooFewVertices { actual: 3, min: 4 };
        let msg = format!("{err}");
        assert!(msg.contains('3'));
        assert!(msg.contains("at least 4"));
    }

    #[test]
    fn test_validation_error_out_of_range() {
        let err = ValidationError::OutOfRange {
            latitude: 91.0,
            longitude: 0.0,
        };
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_execution_error_not_found() {
        let err = ExecutionError::VehicleNotFound {
            id: VehicleId::from("veh_1"),
        };
        assert!(err.to_string().contains("veh_1"));

        let err: GeoError = ExecutionError::GeofenceNotFound {
            id: GeofenceId::from("geo_1"),
        }
        .into();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_geo_error_from_validation() {
        let err: GeoError = ValidationError::NotClosed.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_geo_error_from_storage() {
        let err: GeoError = StorageError::BackendError("connection reset".to_string()).into();
        assert!(err.is_storage());
        assert!(err.is_retryable());

        let err: GeoError = StorageError::DuplicateKey("geo_1".to_string()).into();
        assert!(err.is_storage());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_geo_error_internal() {
        let err = GeoError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("unexpected state"));
    }
}
