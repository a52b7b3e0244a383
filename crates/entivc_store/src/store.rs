//! The versioned store contract.

use crate::error::StoreResult;
use entivc_types::{
    Branch, EntityType, ExportableEntityDocument, ExternalId, Page, PageParams, TenantId,
    Version, VersionId, VersionedEntityRef,
};

/// One commit against a branch.
///
/// The engine, not the store, decides what disappears from the branch
/// tree: `removals` lists documents deleted relative to the branch's
/// previous version, `documents` are upserted. A store applies a commit
/// atomically — a partially applied commit must never become visible.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Target branch; created if it does not exist yet.
    pub branch: String,
    /// Version name, recorded as the commit message.
    pub version_name: String,
    /// Commit author.
    pub author: String,
    /// Documents to add or replace.
    pub documents: Vec<ExportableEntityDocument>,
    /// Documents to delete relative to the previous version.
    pub removals: Vec<VersionedEntityRef>,
}

impl CommitRequest {
    /// Creates a commit request with no documents.
    pub fn new(
        branch: impl Into<String>,
        version_name: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            branch: branch.into(),
            version_name: version_name.into(),
            author: author.into(),
            documents: Vec::new(),
            removals: Vec::new(),
        }
    }
}

/// A remote repository of branches, versions, and entity documents.
///
/// This trait abstracts the external version-controlled store. The
/// in-memory [`MemoryVersionStore`](crate::MemoryVersionStore) implements
/// it for tests; a production implementation would sit on a git-like
/// backend.
pub trait VersionStore: Send + Sync {
    /// Lists the tenant's branches.
    fn list_branches(&self, tenant: TenantId) -> StoreResult<Vec<Branch>>;

    /// Returns the tenant's default branch, if any branch exists.
    fn default_branch(&self, tenant: TenantId) -> StoreResult<Option<Branch>>;

    /// Applies one commit and returns the created version.
    fn commit(&self, tenant: TenantId, request: CommitRequest) -> StoreResult<Version>;

    /// Lists versions of a branch, newest first.
    fn list_versions(
        &self,
        tenant: TenantId,
        branch: &str,
        page: PageParams,
    ) -> StoreResult<Page<Version>>;

    /// Returns the newest version of a branch, if the branch has one.
    fn latest_version(&self, tenant: TenantId, branch: &str) -> StoreResult<Option<Version>>;

    /// Lists entity documents present in a version, optionally filtered
    /// by type.
    fn list_entities(
        &self,
        tenant: TenantId,
        version_id: &VersionId,
        entity_type: Option<EntityType>,
    ) -> StoreResult<Vec<VersionedEntityRef>>;

    /// Reads one entity document from a version.
    fn read_document(
        &self,
        tenant: TenantId,
        version_id: &VersionId,
        entity_type: EntityType,
        external_id: ExternalId,
    ) -> StoreResult<ExportableEntityDocument>;
}
