//! Error types for the version control engine.

use crate::services::ServiceError;
use entivc_store::StoreError;
use entivc_types::{EntityRef, EntityType, ExternalId, LoadError};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during version create and load operations.
///
/// Only `Validation` and `UnsupportedEntityType` ever reach a submitting
/// caller directly; everything else surfaces through the terminal job
/// result of the polling interface.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The request shape is invalid. Surfaced synchronously; no job is
    /// created.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The entity type does not participate in version control.
    #[error("entity type not supported for version control: {0}")]
    UnsupportedEntityType(EntityType),

    /// A requested entity does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityRef),

    /// The entity has never been exported, so it has no external id.
    #[error("entity has no external id mapping: {0}")]
    NotExported(EntityRef),

    /// A document references an external id absent from the version and
    /// from the local mapping.
    #[error("unresolved external id {target} referenced by {source}")]
    ExternalIdUnresolved {
        /// External id of the document being imported.
        source: ExternalId,
        /// External id that could not be resolved.
        target: ExternalId,
    },

    /// Remote store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Entity service failure.
    #[error("entity service error: {0}")]
    Service(#[from] ServiceError),

    /// Another destructive import is running for the same tenant and
    /// entity type.
    #[error("a destructive import for {entity_type} is already running")]
    ConcurrentImport {
        /// Entity type both imports target.
        entity_type: EntityType,
    },
}

impl EngineError {
    /// Returns true if resubmitting the request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_retryable(),
            EngineError::ConcurrentImport { .. } => true,
            _ => false,
        }
    }

    /// Converts this error into the form recorded in a load job status.
    #[must_use]
    pub fn to_load_error(&self) -> LoadError {
        match self {
            EngineError::ExternalIdUnresolved { source, target } => {
                LoadError::unresolved(*source, Some(*target), self.to_string())
            }
            other => LoadError::message(other.to_string()),
        }
    }
}
