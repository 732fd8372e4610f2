//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{GeoResult, ValidationError};
use crate::hub::HubConfig;
use crate::tracker::TrackerConfig;

/// Top-level configuration for [`crate::GeoEngine`].
///
/// Every field has a default, so an empty JSON object is a valid document.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub hub: HubConfig,
    pub tracker: TrackerConfig,
}

impl EngineConfig {
    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the document is malformed.
    pub fn from_json_str(json: &str) -> GeoResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            ValidationError::InvalidConfig {
                reason: e.to_string(),
            }
            .into()
        })
    }
}
