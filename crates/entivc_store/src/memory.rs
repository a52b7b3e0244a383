//! In-memory versioned store.

use crate::error::{StoreError, StoreResult};
use crate::store::{CommitRequest, VersionStore};
use entivc_types::{
    Branch, EntityType, ExportableEntityDocument, ExternalId, Page, PageParams, TenantId,
    Version, VersionId, VersionedEntityRef,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// One committed version: metadata plus its full file tree.
#[derive(Debug, Clone)]
struct VersionRecord {
    version: Version,
    /// JSON document bytes keyed by `entity_type/external_id.json` path.
    files: BTreeMap<String, Vec<u8>>,
}

/// Per-tenant repository state.
#[derive(Debug, Default)]
struct TenantRepo {
    /// Branch name to ordered version ids, oldest first.
    branches: BTreeMap<String, Vec<VersionId>>,
    /// Tenant-configured default branch.
    default_branch: Option<String>,
    versions: HashMap<VersionId, VersionRecord>,
}

/// An in-memory implementation of [`VersionStore`].
///
/// Each version stores a complete file tree; a commit clones the branch
/// head's tree, applies removals, and upserts the new documents, so
/// reads never chase deltas. The first branch committed for a tenant
/// becomes its default until [`set_default_branch`] says otherwise.
///
/// [`set_default_branch`]: MemoryVersionStore::set_default_branch
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    tenants: RwLock<HashMap<TenantId, TenantRepo>>,
    commit_seq: AtomicU64,
    inject_commit_failures: AtomicU64,
}

impl MemoryVersionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with a retryable backend
    /// error. Test hook.
    pub fn fail_next_commits(&self, count: u64) {
        self.inject_commit_failures.store(count, Ordering::SeqCst);
    }

    /// Configures the tenant's default branch.
    pub fn set_default_branch(&self, tenant: TenantId, branch: impl Into<String>) {
        let mut tenants = self.tenants.write();
        tenants.entry(tenant).or_default().default_branch = Some(branch.into());
    }

    /// Total number of versions stored for a tenant.
    #[must_use]
    pub fn version_count(&self, tenant: TenantId) -> usize {
        self.tenants
            .read()
            .get(&tenant)
            .map(|repo| repo.versions.len())
            .unwrap_or(0)
    }

    fn take_injected_failure(&self) -> bool {
        self.inject_commit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Parses a `entity_type/external_id.json` path back into a reference.
fn parse_path(path: &str) -> Option<VersionedEntityRef> {
    let (type_key, file) = path.split_once('/')?;
    let entity_type = EntityType::from_storage_key(type_key)?;
    let stem = file.strip_suffix(".json")?;
    let uuid = Uuid::parse_str(stem).ok()?;
    Some(VersionedEntityRef::new(entity_type, ExternalId::new(uuid)))
}

impl VersionStore for MemoryVersionStore {
    fn list_branches(&self, tenant: TenantId) -> StoreResult<Vec<Branch>> {
        let tenants = self.tenants.read();
        let Some(repo) = tenants.get(&tenant) else {
            return Ok(Vec::new());
        };
        Ok(repo
            .branches
            .keys()
            .map(|name| Branch::new(name.clone(), repo.default_branch.as_deref() == Some(name)))
            .collect())
    }

    fn default_branch(&self, tenant: TenantId) -> StoreResult<Option<Branch>> {
        let tenants = self.tenants.read();
        Ok(tenants
            .get(&tenant)
            .and_then(|repo| repo.default_branch.clone())
            .map(|name| Branch::new(name, true)))
    }

    fn commit(&self, tenant: TenantId, request: CommitRequest) -> StoreResult<Version> {
        if self.take_injected_failure() {
            return Err(StoreError::backend_retryable("injected commit failure"));
        }

        let mut tenants = self.tenants.write();
        let repo = tenants.entry(tenant).or_default();

        // Build the new tree completely before touching repo state, so a
        // codec failure cannot leave a partial commit behind.
        let mut files = repo
            .branches
            .get(&request.branch)
            .and_then(|ids| ids.last())
            .and_then(|id| repo.versions.get(id))
            .map(|record| record.files.clone())
            .unwrap_or_default();

        for removal in &request.removals {
            files.remove(&removal.path());
        }
        for document in &request.documents {
            files.insert(document.path(), serde_json::to_vec(document)?);
        }

        let seq = self.commit_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let id = VersionId::new(format!("{seq:08x}"));
        let version = Version {
            id: id.clone(),
            name: request.version_name,
            timestamp_millis: now_millis(),
            author: request.author,
        };

        repo.versions.insert(
            id.clone(),
            VersionRecord {
                version: version.clone(),
                files,
            },
        );
        let branch = repo.branches.entry(request.branch.clone()).or_default();
        branch.push(id);
        if repo.default_branch.is_none() {
            repo.default_branch = Some(request.branch);
        }

        Ok(version)
    }

    fn list_versions(
        &self,
        tenant: TenantId,
        branch: &str,
        page: PageParams,
    ) -> StoreResult<Page<Version>> {
        let tenants = self.tenants.read();
        let repo = tenants
            .get(&tenant)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;
        let ids = repo
            .branches
            .get(branch)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;

        let total = ids.len();
        let items: Vec<Version> = ids
            .iter()
            .rev()
            .skip(page.page * page.page_size)
            .take(page.page_size)
            .filter_map(|id| repo.versions.get(id))
            .map(|record| record.version.clone())
            .collect();
        let has_more = (page.page + 1) * page.page_size < total;

        Ok(Page::new(items, total, has_more))
    }

    fn latest_version(&self, tenant: TenantId, branch: &str) -> StoreResult<Option<Version>> {
        let tenants = self.tenants.read();
        Ok(tenants
            .get(&tenant)
            .and_then(|repo| {
                let id = repo.branches.get(branch)?.last()?;
                repo.versions.get(id)
            })
            .map(|record| record.version.clone()))
    }

    fn list_entities(
        &self,
        tenant: TenantId,
        version_id: &VersionId,
        entity_type: Option<EntityType>,
    ) -> StoreResult<Vec<VersionedEntityRef>> {
        let tenants = self.tenants.read();
        let record = tenants
            .get(&tenant)
            .and_then(|repo| repo.versions.get(version_id))
            .ok_or_else(|| StoreError::VersionNotFound(version_id.clone()))?;

        Ok(record
            .files
            .keys()
            .filter_map(|path| parse_path(path))
            .filter(|entry| entity_type.is_none_or(|ty| entry.entity_type == ty))
            .collect())
    }

    fn read_document(
        &self,
        tenant: TenantId,
        version_id: &VersionId,
        entity_type: EntityType,
        external_id: ExternalId,
    ) -> StoreResult<ExportableEntityDocument> {
        let path = VersionedEntityRef::new(entity_type, external_id).path();
        let tenants = self.tenants.read();
        let record = tenants
            .get(&tenant)
            .and_then(|repo| repo.versions.get(version_id))
            .ok_or_else(|| StoreError::VersionNotFound(version_id.clone()))?;
        let bytes = record
            .files
            .get(&path)
            .ok_or_else(|| StoreError::DocumentNotFound {
                version_id: version_id.clone(),
                path,
            })?;
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_document(entity_type: EntityType, name: &str) -> ExportableEntityDocument {
        ExportableEntityDocument::new(entity_type, ExternalId::random(), name)
    }

    fn commit_one(
        store: &MemoryVersionStore,
        tenant: TenantId,
        branch: &str,
        documents: Vec<ExportableEntityDocument>,
        removals: Vec<VersionedEntityRef>,
    ) -> Version {
        let mut request = CommitRequest::new(branch, "snapshot", "tests");
        request.documents = documents;
        request.removals = removals;
        store.commit(tenant, request).unwrap()
    }

    #[test]
    fn first_commit_creates_default_branch() {
        let store = MemoryVersionStore::new();
        let tenant = TenantId::random();

        commit_one(&store, tenant, "main", vec![make_document(EntityType::Device, "d1")], vec![]);

        let branches = store.list_branches(tenant).unwrap();
        assert_eq!(branches.len(), 1);
        assert!(branches[0].is_default);
        assert_eq!(store.default_branch(tenant).unwrap().unwrap().name, "main");
    }

    #[test]
    fn commit_carries_previous_tree_forward() {
        let store = MemoryVersionStore::new();
        let tenant = TenantId::random();

        let first = make_document(EntityType::Device, "d1");
        commit_one(&store, tenant, "main", vec![first.clone()], vec![]);

        let second = make_document(EntityType::Asset, "a1");
        let v2 = commit_one(&store, tenant, "main", vec![second.clone()], vec![]);

        // Both documents visible at the second version.
        let entities = store.list_entities(tenant, &v2.id, None).unwrap();
        assert_eq!(entities.len(), 2);

        let read = store
            .read_document(tenant, &v2.id, EntityType::Device, first.external_id)
            .unwrap();
        assert_eq!(read, first);
    }

    #[test]
    fn removals_delete_from_tree() {
        let store = MemoryVersionStore::new();
        let tenant = TenantId::random();

        let doc = make_document(EntityType::Device, "d1");
        let v1 = commit_one(&store, tenant, "main", vec![doc.clone()], vec![]);
        let v2 = commit_one(&store, tenant, "main", vec![], vec![doc.versioned_ref()]);

        // Gone from the new version, still present in the old one.
        assert!(store.list_entities(tenant, &v2.id, None).unwrap().is_empty());
        assert_eq!(store.list_entities(tenant, &v1.id, None).unwrap().len(), 1);

        let err = store
            .read_document(tenant, &v2.id, EntityType::Device, doc.external_id)
            .unwrap_err();
        assert!(matches!(err, StoreError::DocumentNotFound { .. }));
    }

    #[test]
    fn list_entities_filters_by_type() {
        let store = MemoryVersionStore::new();
        let tenant = TenantId::random();

        let version = commit_one(
            &store,
            tenant,
            "main",
            vec![
                make_document(EntityType::Device, "d1"),
                make_document(EntityType::Device, "d2"),
                make_document(EntityType::Asset, "a1"),
            ],
            vec![],
        );

        let devices = store
            .list_entities(tenant, &version.id, Some(EntityType::Device))
            .unwrap();
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|e| e.entity_type == EntityType::Device));
    }

    #[test]
    fn version_listing_pages_newest_first() {
        let store = MemoryVersionStore::new();
        let tenant = TenantId::random();

        let mut versions = Vec::new();
        for i in 0..5 {
            versions.push(commit_one(
                &store,
                tenant,
                "main",
                vec![make_document(EntityType::Device, &format!("d{i}"))],
                vec![],
            ));
        }

        let page = store
            .list_versions(tenant, "main", PageParams::new(0, 2))
            .unwrap();
        assert_eq!(page.total, 5);
        assert!(page.has_more);
        assert_eq!(page.items[0].id, versions[4].id);

        let last = store
            .list_versions(tenant, "main", PageParams::new(2, 2))
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more);
        assert_eq!(last.items[0].id, versions[0].id);
    }

    #[test]
    fn default_branch_can_be_reconfigured() {
        let store = MemoryVersionStore::new();
        let tenant = TenantId::random();

        commit_one(&store, tenant, "main", vec![], vec![]);
        commit_one(&store, tenant, "dev", vec![], vec![]);
        assert_eq!(store.default_branch(tenant).unwrap().unwrap().name, "main");

        store.set_default_branch(tenant, "dev");
        assert_eq!(store.default_branch(tenant).unwrap().unwrap().name, "dev");

        let branches = store.list_branches(tenant).unwrap();
        let dev = branches.iter().find(|b| b.name == "dev").unwrap();
        assert!(dev.is_default);
    }

    #[test]
    fn unknown_branch_is_an_error() {
        let store = MemoryVersionStore::new();
        let tenant = TenantId::random();
        commit_one(&store, tenant, "main", vec![], vec![]);

        let err = store
            .list_versions(tenant, "missing", PageParams::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::BranchNotFound(_)));
    }

    #[test]
    fn injected_commit_failures_are_retryable() {
        let store = MemoryVersionStore::new();
        let tenant = TenantId::random();
        store.fail_next_commits(1);

        let err = store
            .commit(tenant, CommitRequest::new("main", "v", "tests"))
            .unwrap_err();
        assert!(err.is_retryable());

        // The next commit goes through.
        store
            .commit(tenant, CommitRequest::new("main", "v", "tests"))
            .unwrap();
    }
}
