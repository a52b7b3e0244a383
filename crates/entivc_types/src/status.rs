//! Job status types exposed through the polling surface.

use crate::entity::EntityType;
use crate::ids::ExternalId;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an asynchronous job as seen by a polling caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobStatus<T> {
    /// The job is still running.
    InProgress,
    /// The job reached a terminal state. Terminal results are immutable.
    Done(T),
}

impl<T> JobStatus<T> {
    /// Returns true if the job is finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, JobStatus::Done(_))
    }

    /// Returns the terminal result, if any.
    #[must_use]
    pub fn result(&self) -> Option<&T> {
        match self {
            JobStatus::InProgress => None,
            JobStatus::Done(result) => Some(result),
        }
    }
}

/// Terminal result of a version create job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionCreationResult {
    /// The created version, on success.
    pub version: Option<Version>,
    /// Entities newly present in the branch history.
    pub added: u32,
    /// Entities whose document differs from the previous version.
    pub modified: u32,
    /// Entities dropped from overwrite-strategy types.
    pub removed: u32,
    /// Error message, on failure.
    pub error: Option<String>,
}

impl VersionCreationResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(version: Version, added: u32, modified: u32, removed: u32) -> Self {
        Self {
            version: Some(version),
            added,
            modified,
            removed,
            error: None,
        }
    }

    /// Creates a failed result.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            version: None,
            added: 0,
            modified: 0,
            removed: 0,
            error: Some(message.into()),
        }
    }

    /// Returns true if the job succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-type counters of a load job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeLoadResult {
    /// Entity type the counters refer to.
    pub entity_type: EntityType,
    /// Entities created locally.
    pub created: u32,
    /// Entities updated in place.
    pub updated: u32,
    /// Entities deleted by `remove_other_entities`.
    pub deleted: u32,
}

impl EntityTypeLoadResult {
    /// Creates an all-zero result for a type.
    #[must_use]
    pub const fn empty(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            created: 0,
            updated: 0,
            deleted: 0,
        }
    }
}

/// Error recorded in a failed load job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadError {
    /// External id of the entity being imported when the error occurred.
    pub source: Option<ExternalId>,
    /// External id the engine failed to resolve, if applicable.
    pub target: Option<ExternalId>,
    /// Human-readable message.
    pub message: String,
}

impl LoadError {
    /// Creates an error with no id context.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            source: None,
            target: None,
            message: message.into(),
        }
    }

    /// Creates an unresolved-reference error.
    pub fn unresolved(
        source: ExternalId,
        target: Option<ExternalId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: Some(source),
            target,
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(source) = &self.source {
            write!(f, " (source {source}")?;
            if let Some(target) = &self.target {
                write!(f, ", target {target}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Terminal result of a version load job.
///
/// On failure the per-type results already produced are kept: a load is
/// not transactional across types, so earlier types stay imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionLoadResult {
    /// Per-type counters, in processing order.
    pub results: Vec<EntityTypeLoadResult>,
    /// Error that stopped the job, if any.
    pub error: Option<LoadError>,
}

impl VersionLoadResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(results: Vec<EntityTypeLoadResult>) -> Self {
        Self {
            results,
            error: None,
        }
    }

    /// Creates a failed result carrying whatever was imported so far.
    #[must_use]
    pub fn failure(results: Vec<EntityTypeLoadResult>, error: LoadError) -> Self {
        Self {
            results,
            error: Some(error),
        }
    }

    /// Returns true if the job succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns the counters for one type, if that type was processed.
    #[must_use]
    pub fn for_type(&self, entity_type: EntityType) -> Option<&EntityTypeLoadResult> {
        self.results.iter().find(|r| r.entity_type == entity_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::VersionId;

    #[test]
    fn job_status_accessors() {
        let status: JobStatus<u32> = JobStatus::InProgress;
        assert!(!status.is_done());
        assert!(status.result().is_none());

        let status = JobStatus::Done(7u32);
        assert!(status.is_done());
        assert_eq!(status.result(), Some(&7));
    }

    #[test]
    fn creation_result_states() {
        let version = Version {
            id: VersionId::new("v1"),
            name: "Version 1.0".into(),
            timestamp_millis: 0,
            author: "tests".into(),
        };
        assert!(VersionCreationResult::success(version, 1, 0, 0).is_success());
        assert!(!VersionCreationResult::failure("boom").is_success());
    }

    #[test]
    fn load_error_display() {
        let source = ExternalId::random();
        let err = LoadError::unresolved(source, None, "relation target missing");
        let text = err.to_string();
        assert!(text.contains("relation target missing"));
        assert!(text.contains(&source.to_string()));
    }
}
