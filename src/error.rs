//! Error handling for the synchronization engine
//!
//! Every failure here is local to one entity or to configuration loading.
//! Nothing in this taxonomy is allowed to stop the per-tick pipeline.

use crate::entity::EntityId;

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while syncing entities with the simulation
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Shape unavailable for entity {entity}: {reason}")]
    ShapeUnavailable { entity: EntityId, reason: String },

    #[error("Bridge for entity {entity} has no simulation body")]
    InconsistentBridge { entity: EntityId },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Failed to read config {path}: {error}")]
    ConfigIo { path: String, error: String },

    #[error("Failed to parse config: {error}")]
    ConfigParse { error: String },
}

impl SyncError {
    /// Whether the failure leaves the entity retryable on its next edit
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::ShapeUnavailable { .. })
    }
}

/// Helper trait for config loading contexts
pub trait ConfigErrorContext<T> {
    fn config_context(self, path: &str) -> SyncResult<T>;
}

impl<T> ConfigErrorContext<T> for Result<T, std::io::Error> {
    fn config_context(self, path: &str) -> SyncResult<T> {
        self.map_err(|e| SyncError::ConfigIo {
            path: path.to_string(),
            error: e.to_string(),
        })
    }
}

impl<T> ConfigErrorContext<T> for Result<T, toml::de::Error> {
    fn config_context(self, path: &str) -> SyncResult<T> {
        self.map_err(|e| SyncError::ConfigParse {
            error: format!("{}: {}", path, e),
        })
    }
}

/// Create a shape unavailable error
pub fn shape_unavailable(entity: EntityId, reason: impl Into<String>) -> SyncError {
    SyncError::ShapeUnavailable {
        entity,
        reason: reason.into(),
    }
}

/// Create an inconsistent bridge error
pub fn inconsistent_bridge(entity: EntityId) -> SyncError {
    SyncError::InconsistentBridge { entity }
}

/// Create an invalid config error
pub fn invalid_config(field: &str, reason: impl Into<String>) -> SyncError {
    SyncError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}
