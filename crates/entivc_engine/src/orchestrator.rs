//! Version create and load orchestration.
//!
//! Requests are validated synchronously, then executed as asynchronous
//! jobs: entity types in the fixed dependency order, entities exported
//! and imported through the per-type handlers, counts aggregated into
//! the terminal job result. A create commits all documents atomically;
//! a load stops at the first unresolved reference without rolling back
//! earlier types.

use crate::config::EngineConfig;
use crate::diff::{diff, EntityDataDiff};
use crate::error::{EngineError, EngineResult};
use crate::external_id::ExternalIdMap;
use crate::handler::{EntityTypeHandler, HandlerRegistry, ImportOutcome};
use crate::jobs::{DestructiveImportLocks, JobTracker};
use crate::strategy::resolve_strategy;
use entivc_store::{CommitRequest, VersionStore};
use entivc_types::{
    Branch, Entity, EntityExportSettings, EntityId, EntityRef, EntityType, EntityTypeLoadResult,
    ExportScope, ExportableEntityDocument, ExternalId, JobStatus, Page, PageParams, RequestId,
    SyncStrategy, TenantId, TypeImportConfig, Version, VersionCreateRequest,
    VersionCreationResult, VersionId, VersionLoadRequest, VersionLoadResult, VersionedEntityRef,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One entity type's slice of a create request, in processing order.
struct ExportPlan {
    entity_type: EntityType,
    scope: ExportScope,
    settings: EntityExportSettings,
    strategy: SyncStrategy,
}

/// One entity type's slice of a load request, in processing order.
struct ImportPlan {
    entity_type: EntityType,
    config: TypeImportConfig,
    /// Restrict the import to one entity (single-entity loads).
    only: Option<ExternalId>,
}

/// The version control engine.
///
/// Owns the external-id mapping, the per-type handler registry, and the
/// job trackers; talks to the remote store through [`VersionStore`].
/// Cloning is cheap and yields a handle to the same engine.
#[derive(Clone)]
pub struct VersionControlEngine {
    shared: Arc<EngineShared>,
}

struct EngineShared {
    config: EngineConfig,
    store: Arc<dyn VersionStore>,
    registry: HandlerRegistry,
    ids: Arc<ExternalIdMap>,
    create_jobs: JobTracker<VersionCreationResult>,
    load_jobs: JobTracker<VersionLoadResult>,
    destructive: Arc<DestructiveImportLocks>,
}

impl VersionControlEngine {
    /// Creates an engine over a store and a handler registry.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn VersionStore>,
        registry: HandlerRegistry,
    ) -> Self {
        let retention = config.job_retention;
        Self {
            shared: Arc::new(EngineShared {
                config,
                store,
                registry,
                ids: Arc::new(ExternalIdMap::new()),
                create_jobs: JobTracker::new(retention),
                load_jobs: JobTracker::new(retention),
                destructive: Arc::new(DestructiveImportLocks::new()),
            }),
        }
    }

    /// The engine's external-id mapping table.
    #[must_use]
    pub fn external_ids(&self) -> &ExternalIdMap {
        &self.shared.ids
    }

    /// Validates a create request and starts its job.
    ///
    /// Validation failures are returned here and no job is created;
    /// every later failure surfaces through [`create_status`].
    ///
    /// [`create_status`]: Self::create_status
    pub fn submit_create(
        &self,
        tenant: TenantId,
        request: VersionCreateRequest,
    ) -> EngineResult<RequestId> {
        validate_create(&request)?;
        let shared = Arc::clone(&self.shared);
        let id = self
            .shared
            .create_jobs
            .start(move || shared.run_create(tenant, request));
        info!(%tenant, request = %id, "version create submitted");
        Ok(id)
    }

    /// Validates a load request and starts its job.
    pub fn submit_load(
        &self,
        tenant: TenantId,
        request: VersionLoadRequest,
    ) -> EngineResult<RequestId> {
        validate_load(&request)?;
        let shared = Arc::clone(&self.shared);
        let id = self
            .shared
            .load_jobs
            .start(move || shared.run_load(tenant, request));
        info!(%tenant, request = %id, "version load submitted");
        Ok(id)
    }

    /// Polls a create job. `None` means the id is unknown or evicted.
    #[must_use]
    pub fn create_status(&self, id: RequestId) -> Option<JobStatus<VersionCreationResult>> {
        self.shared.create_jobs.get(id)
    }

    /// Polls a load job. `None` means the id is unknown or evicted.
    #[must_use]
    pub fn load_status(&self, id: RequestId) -> Option<JobStatus<VersionLoadResult>> {
        self.shared.load_jobs.get(id)
    }

    /// Lists the tenant's branches.
    pub fn list_branches(&self, tenant: TenantId) -> EngineResult<Vec<Branch>> {
        Ok(self.shared.store.list_branches(tenant)?)
    }

    /// Lists versions of a branch, newest first. With no branch given,
    /// the tenant's default branch is used.
    pub fn list_versions(
        &self,
        tenant: TenantId,
        branch: Option<&str>,
        page: PageParams,
    ) -> EngineResult<Page<Version>> {
        let branch = match branch {
            Some(name) => name.to_string(),
            None => {
                self.shared
                    .store
                    .default_branch(tenant)?
                    .ok_or_else(|| {
                        EngineError::Validation(
                            "no branch given and the tenant has no default branch".into(),
                        )
                    })?
                    .name
            }
        };
        Ok(self.shared.store.list_versions(tenant, &branch, page)?)
    }

    /// Compares a live entity against its document in one version.
    ///
    /// The live side is serialized with exactly the sections the
    /// versioned document carries, so the result reflects drift rather
    /// than export configuration.
    pub fn diff_against_version(
        &self,
        tenant: TenantId,
        entity_type: EntityType,
        entity_id: EntityId,
        version_id: &VersionId,
    ) -> EngineResult<EntityDataDiff> {
        let shared = &self.shared;
        let handler = shared.registry.get(entity_type)?;
        let entity = handler
            .service()
            .find(tenant, entity_id)?
            .ok_or(EngineError::EntityNotFound(EntityRef::new(
                entity_type,
                entity_id,
            )))?;
        let external = shared
            .ids
            .external_of(tenant, entity_id)
            .ok_or(EngineError::NotExported(EntityRef::new(
                entity_type,
                entity_id,
            )))?;

        let versioned = shared
            .store
            .read_document(tenant, version_id, entity_type, external)?;
        let settings = EntityExportSettings {
            save_relations: versioned.relations.is_some(),
            save_attributes: versioned.attributes.is_some(),
            save_credentials: versioned.credentials.is_some(),
        };
        let current = handler.export(&entity, &settings, &shared.ids)?;
        Ok(diff(&current, &versioned))
    }
}

impl EngineShared {
    fn run_create(&self, tenant: TenantId, request: VersionCreateRequest) -> VersionCreationResult {
        info!(
            %tenant,
            branch = request.branch(),
            version = request.version_name(),
            "starting version create job"
        );
        match self.do_create(tenant, &request) {
            Ok(result) => result,
            Err(error) => {
                warn!(%tenant, %error, "version create failed");
                VersionCreationResult::failure(error.to_string())
            }
        }
    }

    fn do_create(
        &self,
        tenant: TenantId,
        request: &VersionCreateRequest,
    ) -> EngineResult<VersionCreationResult> {
        let branch = request.branch();
        let previous = self.store.latest_version(tenant, branch)?;

        let mut documents: Vec<ExportableEntityDocument> = Vec::new();
        let mut removals: Vec<VersionedEntityRef> = Vec::new();
        let (mut added, mut modified, mut removed) = (0u32, 0u32, 0u32);

        for plan in export_plans(request) {
            let handler = self.registry.get(plan.entity_type)?;
            let entities = self.resolve_export_set(tenant, handler.as_ref(), &plan.scope)?;
            debug!(
                %tenant,
                entity_type = %plan.entity_type,
                count = entities.len(),
                "exporting entity type"
            );

            let mut exported = Vec::with_capacity(entities.len());
            for entity in &entities {
                exported.push(handler.export(entity, &plan.settings, &self.ids)?);
            }

            // Counts are relative to the branch's previous version.
            let prior: HashSet<ExternalId> = match &previous {
                Some(version) => self
                    .store
                    .list_entities(tenant, &version.id, Some(plan.entity_type))?
                    .into_iter()
                    .map(|entry| entry.external_id)
                    .collect(),
                None => HashSet::new(),
            };

            match &previous {
                None => added += exported.len() as u32,
                Some(version) => {
                    for document in &exported {
                        if !prior.contains(&document.external_id) {
                            added += 1;
                            continue;
                        }
                        let before = self.store.read_document(
                            tenant,
                            &version.id,
                            plan.entity_type,
                            document.external_id,
                        )?;
                        if diff(document, &before).has_changes() {
                            modified += 1;
                        }
                    }
                }
            }

            // Only an overwrite strategy drops what the export no
            // longer contains; merge keeps the branch's extra entities.
            if plan.strategy == SyncStrategy::Overwrite {
                let current: HashSet<ExternalId> =
                    exported.iter().map(|d| d.external_id).collect();
                for external in prior.difference(&current) {
                    removals.push(VersionedEntityRef::new(plan.entity_type, *external));
                    removed += 1;
                }
            }

            documents.extend(exported);
        }

        let mut commit =
            CommitRequest::new(branch, request.version_name(), self.config.author.clone());
        commit.documents = documents;
        commit.removals = removals;
        let version = self.commit_with_retry(tenant, commit)?;

        info!(%tenant, version = %version.id, added, modified, removed, "version created");
        Ok(VersionCreationResult::success(
            version, added, modified, removed,
        ))
    }

    fn resolve_export_set(
        &self,
        tenant: TenantId,
        handler: &dyn EntityTypeHandler,
        scope: &ExportScope,
    ) -> EngineResult<Vec<Entity>> {
        match scope {
            ExportScope::AllEntities => Ok(handler.service().list_all(tenant)?),
            ExportScope::Selected(ids) => {
                let mut entities = Vec::with_capacity(ids.len());
                for id in ids {
                    let entity = handler.service().find(tenant, *id)?.ok_or(
                        EngineError::EntityNotFound(EntityRef::new(handler.entity_type(), *id)),
                    )?;
                    entities.push(entity);
                }
                Ok(entities)
            }
        }
    }

    fn commit_with_retry(
        &self,
        tenant: TenantId,
        request: CommitRequest,
    ) -> EngineResult<Version> {
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            match self.store.commit(tenant, request.clone()) {
                Ok(version) => return Ok(version),
                Err(error) if error.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    warn!(%tenant, %error, attempt, "retrying commit");
                    std::thread::sleep(retry.delay_for_attempt(attempt));
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn run_load(&self, tenant: TenantId, request: VersionLoadRequest) -> VersionLoadResult {
        info!(%tenant, version = %request.version_id(), "starting version load job");
        let version_id = request.version_id().clone();
        let plans = import_plans(&request);

        // Destructive imports are serialized per tenant and type; a
        // racing job is rejected rather than interleaved.
        let destructive: Vec<EntityType> = plans
            .iter()
            .filter(|plan| plan.config.remove_other_entities)
            .map(|plan| plan.entity_type)
            .collect();
        let _guard = if destructive.is_empty() {
            None
        } else {
            match self.destructive.try_acquire(tenant, &destructive) {
                Ok(guard) => Some(guard),
                Err(entity_type) => {
                    let error = EngineError::ConcurrentImport { entity_type };
                    warn!(%tenant, %error, "version load rejected");
                    return VersionLoadResult::failure(Vec::new(), error.to_load_error());
                }
            }
        };

        let mut results = Vec::new();
        for plan in &plans {
            match self.import_type(tenant, &version_id, plan) {
                Ok(result) => results.push(result),
                Err(error) => {
                    // Stop here; earlier types stay imported.
                    warn!(
                        %tenant,
                        entity_type = %plan.entity_type,
                        %error,
                        "version load failed"
                    );
                    return VersionLoadResult::failure(results, error.to_load_error());
                }
            }
        }

        info!(%tenant, version = %version_id, "version loaded");
        VersionLoadResult::success(results)
    }

    fn import_type(
        &self,
        tenant: TenantId,
        version_id: &VersionId,
        plan: &ImportPlan,
    ) -> EngineResult<EntityTypeLoadResult> {
        let handler = self.registry.get(plan.entity_type)?;
        let entries: Vec<VersionedEntityRef> = match plan.only {
            Some(external) => vec![VersionedEntityRef::new(plan.entity_type, external)],
            None => self
                .store
                .list_entities(tenant, version_id, Some(plan.entity_type))?,
        };

        let mut result = EntityTypeLoadResult::empty(plan.entity_type);
        let mut present: HashSet<ExternalId> = HashSet::new();

        for entry in &entries {
            let document =
                self.store
                    .read_document(tenant, version_id, entry.entity_type, entry.external_id)?;

            // Serialize resolve-or-create per external id so another
            // job cannot create a second local entity for it.
            let key_lock = self.ids.lock_for(tenant, document.external_id);
            let _key_guard = key_lock.lock();

            let target = self.resolve_import_target(
                tenant,
                handler.as_ref(),
                &document,
                plan.config.find_existing_by_name,
            )?;
            match handler.import(tenant, &document, &plan.config.settings, target, &self.ids)? {
                ImportOutcome::Created(_) => result.created += 1,
                ImportOutcome::Updated(_) => result.updated += 1,
                ImportOutcome::Unchanged(_) => {}
            }
            present.insert(document.external_id);
        }

        if plan.config.remove_other_entities && plan.only.is_none() {
            for entity in handler.service().list_all(tenant)? {
                let keep = self
                    .ids
                    .external_of(tenant, entity.id)
                    .is_some_and(|external| present.contains(&external));
                if !keep {
                    handler.service().delete(tenant, entity.id)?;
                    self.ids.unbind(tenant, entity.id);
                    result.deleted += 1;
                }
            }
        }

        debug!(
            %tenant,
            entity_type = %plan.entity_type,
            created = result.created,
            updated = result.updated,
            deleted = result.deleted,
            "entity type imported"
        );
        Ok(result)
    }

    /// Resolves the local target of a document. The external-id mapping
    /// wins; by-name adoption runs only for unmapped documents.
    fn resolve_import_target(
        &self,
        tenant: TenantId,
        handler: &dyn EntityTypeHandler,
        document: &ExportableEntityDocument,
        find_by_name: bool,
    ) -> EngineResult<Option<Entity>> {
        if let Some(mapped) = self.ids.resolve_local(tenant, document.external_id) {
            if let Some(entity) = handler.service().find(tenant, mapped.id)? {
                return Ok(Some(entity));
            }
            // The mapped entity was deleted outside version control;
            // drop the stale pair and fall through.
            self.ids.unbind(tenant, mapped.id);
        }
        if find_by_name {
            if let Some(entity) = handler.service().find_by_name(tenant, &document.name)? {
                self.ids.bind(tenant, entity.entity_ref(), document.external_id);
                return Ok(Some(entity));
            }
        }
        Ok(None)
    }
}

fn export_plans(request: &VersionCreateRequest) -> Vec<ExportPlan> {
    match request {
        VersionCreateRequest::SingleEntity {
            entity_type,
            entity_id,
            settings,
            ..
        } => vec![ExportPlan {
            entity_type: *entity_type,
            scope: ExportScope::Selected(vec![*entity_id]),
            settings: *settings,
            strategy: resolve_strategy(None, None),
        }],
        VersionCreateRequest::Complex {
            default_strategy,
            configs,
            ..
        } => EntityType::VERSIONABLE
            .iter()
            .filter_map(|ty| {
                configs.get(ty).map(|config| ExportPlan {
                    entity_type: *ty,
                    scope: config.scope.clone(),
                    settings: config.settings,
                    strategy: resolve_strategy(*default_strategy, config.sync_strategy),
                })
            })
            .collect(),
    }
}

fn import_plans(request: &VersionLoadRequest) -> Vec<ImportPlan> {
    match request {
        VersionLoadRequest::SingleEntity {
            entity_type,
            external_id,
            settings,
            find_existing_by_name,
            ..
        } => vec![ImportPlan {
            entity_type: *entity_type,
            config: TypeImportConfig {
                settings: *settings,
                // Single-entity loads are never destructive.
                remove_other_entities: false,
                find_existing_by_name: *find_existing_by_name,
            },
            only: Some(*external_id),
        }],
        VersionLoadRequest::EntityType { configs, .. } => EntityType::VERSIONABLE
            .iter()
            .filter_map(|ty| {
                configs.get(ty).map(|config| ImportPlan {
                    entity_type: *ty,
                    config: *config,
                    only: None,
                })
            })
            .collect(),
    }
}

fn validate_create(request: &VersionCreateRequest) -> EngineResult<()> {
    if request.branch().is_empty() {
        return Err(EngineError::Validation("branch must not be empty".into()));
    }
    if request.version_name().is_empty() {
        return Err(EngineError::Validation(
            "version name must not be empty".into(),
        ));
    }
    match request {
        VersionCreateRequest::SingleEntity { entity_type, .. } => {
            if !entity_type.is_versionable() {
                return Err(EngineError::UnsupportedEntityType(*entity_type));
            }
        }
        VersionCreateRequest::Complex { configs, .. } => {
            if configs.is_empty() {
                return Err(EngineError::Validation(
                    "at least one entity type must be configured".into(),
                ));
            }
            for entity_type in configs.keys() {
                if !entity_type.is_versionable() {
                    return Err(EngineError::UnsupportedEntityType(*entity_type));
                }
            }
        }
    }
    Ok(())
}

fn validate_load(request: &VersionLoadRequest) -> EngineResult<()> {
    if request.branch().is_empty() {
        return Err(EngineError::Validation("branch must not be empty".into()));
    }
    if request.version_id().is_empty() {
        return Err(EngineError::Validation(
            "version id must not be empty".into(),
        ));
    }
    match request {
        VersionLoadRequest::SingleEntity { entity_type, .. } => {
            if !entity_type.is_versionable() {
                return Err(EngineError::UnsupportedEntityType(*entity_type));
            }
        }
        VersionLoadRequest::EntityType { configs, .. } => {
            if configs.is_empty() {
                return Err(EngineError::Validation(
                    "at least one entity type must be configured".into(),
                ));
            }
            for entity_type in configs.keys() {
                if !entity_type.is_versionable() {
                    return Err(EngineError::UnsupportedEntityType(*entity_type));
                }
            }
        }
    }
    Ok(())
}
