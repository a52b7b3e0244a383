//! Per-entity-type dispatch.
//!
//! Serialization and import vary by entity type behind one capability
//! interface. The dependency-order list in `entivc_types` and the
//! registry here are the only two places to touch when a new type is
//! supported.

use crate::error::{EngineError, EngineResult};
use crate::external_id::ExternalIdMap;
use crate::serializer::EntitySerializer;
use crate::services::{
    AttributeStore, CredentialsStore, EntityService, MemoryAttributeStore,
    MemoryCredentialsStore, MemoryEntityService, MemoryRelationStore, RelationStore,
};
use entivc_types::{
    Entity, EntityExportSettings, EntityId, EntityImportSettings, EntityType,
    ExportableEntityDocument, TenantId,
};
use std::collections::HashMap;
use std::sync::Arc;

/// What an import did to one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// A new local entity was created.
    Created(Entity),
    /// An existing entity was brought in line with the document.
    Updated(Entity),
    /// The entity already matched the document; nothing was written.
    Unchanged(Entity),
}

impl ImportOutcome {
    /// The affected entity.
    #[must_use]
    pub fn entity(&self) -> &Entity {
        match self {
            ImportOutcome::Created(e) | ImportOutcome::Updated(e) | ImportOutcome::Unchanged(e) => {
                e
            }
        }
    }
}

/// Export/import capability for one entity type.
pub trait EntityTypeHandler: Send + Sync {
    /// The type this handler serves.
    fn entity_type(&self) -> EntityType;

    /// The CRUD service backing this type.
    fn service(&self) -> &dyn EntityService;

    /// Serializes a live entity into its exportable document, assigning
    /// or reusing its external id.
    fn export(
        &self,
        entity: &Entity,
        settings: &EntityExportSettings,
        ids: &ExternalIdMap,
    ) -> EngineResult<ExportableEntityDocument>;

    /// Applies a document onto the live graph.
    ///
    /// `target` is the already-resolved local entity, or `None` to
    /// create one. Implementations bind newly created entities to the
    /// document's external id and skip all writes when nothing changed,
    /// which is what makes repeated loads idempotent.
    fn import(
        &self,
        tenant: TenantId,
        document: &ExportableEntityDocument,
        settings: &EntityImportSettings,
        target: Option<Entity>,
        ids: &ExternalIdMap,
    ) -> EngineResult<ImportOutcome>;
}

/// Handler implementation shared by all versionable types.
///
/// Credentials are a device-only capability; every other difference
/// between types lives in the opaque field payloads.
pub struct GenericEntityHandler {
    entity_type: EntityType,
    service: Arc<dyn EntityService>,
    serializer: EntitySerializer,
}

impl GenericEntityHandler {
    /// Creates a handler for one type.
    pub fn new(
        entity_type: EntityType,
        service: Arc<dyn EntityService>,
        serializer: EntitySerializer,
    ) -> Self {
        Self {
            entity_type,
            service,
            serializer,
        }
    }

    fn handles_credentials(&self) -> bool {
        self.entity_type == EntityType::Device
    }
}

impl EntityTypeHandler for GenericEntityHandler {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn service(&self) -> &dyn EntityService {
        self.service.as_ref()
    }

    fn export(
        &self,
        entity: &Entity,
        settings: &EntityExportSettings,
        ids: &ExternalIdMap,
    ) -> EngineResult<ExportableEntityDocument> {
        let external = ids.assign_or_reuse(entity.tenant_id, entity.entity_ref());
        self.serializer
            .serialize(entity, external, settings, self.handles_credentials(), ids)
    }

    fn import(
        &self,
        tenant: TenantId,
        document: &ExportableEntityDocument,
        settings: &EntityImportSettings,
        target: Option<Entity>,
        ids: &ExternalIdMap,
    ) -> EngineResult<ImportOutcome> {
        let with_credentials = self.handles_credentials();

        let Some(mut entity) = target else {
            let mut created = Entity::new(tenant, document.entity_type, document.name.clone());
            created.fields = document.fields.clone();
            let created = self.service.save(created)?;
            ids.bind(tenant, created.entity_ref(), document.external_id);
            self.serializer
                .apply_sections(&created, document, settings, with_credentials, ids)?;
            return Ok(ImportOutcome::Created(created));
        };

        let fields_changed = entity.name != document.name || entity.fields != document.fields;
        let sections_changed = self
            .serializer
            .sections_differ(&entity, document, settings, with_credentials, ids)?;

        if !fields_changed && !sections_changed {
            return Ok(ImportOutcome::Unchanged(entity));
        }

        if fields_changed {
            entity.name = document.name.clone();
            entity.fields = document.fields.clone();
            entity = self.service.save(entity)?;
        }
        if sections_changed {
            self.serializer
                .apply_sections(&entity, document, settings, with_credentials, ids)?;
        }
        Ok(ImportOutcome::Updated(entity))
    }
}

/// Registry of type handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EntityType, Arc<dyn EntityTypeHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its own type.
    pub fn register(&mut self, handler: Arc<dyn EntityTypeHandler>) {
        self.handlers.insert(handler.entity_type(), handler);
    }

    /// Looks up the handler for a type.
    pub fn get(&self, entity_type: EntityType) -> EngineResult<&Arc<dyn EntityTypeHandler>> {
        self.handlers
            .get(&entity_type)
            .ok_or(EngineError::UnsupportedEntityType(entity_type))
    }

    /// Entity types with a registered handler.
    #[must_use]
    pub fn supported_types(&self) -> Vec<EntityType> {
        self.handlers.keys().copied().collect()
    }
}

/// A complete in-memory platform: one entity service per versionable
/// type plus the three side collaborators, wired into a registry.
///
/// Reference wiring for tests and embedders.
pub struct MemoryPlatform {
    services: HashMap<EntityType, Arc<MemoryEntityService>>,
    /// Relation storage.
    pub relations: Arc<MemoryRelationStore>,
    /// Attribute storage.
    pub attributes: Arc<MemoryAttributeStore>,
    /// Device credentials storage.
    pub credentials: Arc<MemoryCredentialsStore>,
}

impl MemoryPlatform {
    /// Creates a platform with an empty service per versionable type.
    #[must_use]
    pub fn new() -> Self {
        let services = EntityType::VERSIONABLE
            .into_iter()
            .map(|ty| (ty, Arc::new(MemoryEntityService::new(ty))))
            .collect();
        Self {
            services,
            relations: Arc::new(MemoryRelationStore::new()),
            attributes: Arc::new(MemoryAttributeStore::new()),
            credentials: Arc::new(MemoryCredentialsStore::new()),
        }
    }

    /// The service for one type.
    ///
    /// # Panics
    ///
    /// Panics if the type is not versionable.
    #[must_use]
    pub fn service(&self, entity_type: EntityType) -> Arc<MemoryEntityService> {
        Arc::clone(&self.services[&entity_type])
    }

    /// Seeds an entity into its service.
    pub fn seed(&self, entity: Entity) -> crate::services::ServiceResult<Entity> {
        self.services[&entity.entity_type].save(entity)
    }

    /// Finds an entity of a type by name.
    #[must_use]
    pub fn find_by_name(&self, tenant: TenantId, entity_type: EntityType, name: &str) -> Option<Entity> {
        self.services[&entity_type]
            .find_by_name(tenant, name)
            .ok()
            .flatten()
    }

    /// Returns true if a local entity still exists.
    #[must_use]
    pub fn exists(&self, tenant: TenantId, entity_type: EntityType, id: EntityId) -> bool {
        self.services[&entity_type]
            .find(tenant, id)
            .ok()
            .flatten()
            .is_some()
    }

    /// Builds a registry with a [`GenericEntityHandler`] per type.
    #[must_use]
    pub fn registry(&self) -> HandlerRegistry {
        let serializer = EntitySerializer::new(
            Arc::clone(&self.relations) as Arc<dyn RelationStore>,
            Arc::clone(&self.attributes) as Arc<dyn AttributeStore>,
            Arc::clone(&self.credentials) as Arc<dyn CredentialsStore>,
        );
        let mut registry = HandlerRegistry::new();
        for (ty, service) in &self.services {
            registry.register(Arc::new(GenericEntityHandler::new(
                *ty,
                Arc::clone(service) as Arc<dyn EntityService>,
                serializer.clone(),
            )));
        }
        registry
    }
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_rejects_unregistered_types() {
        let platform = MemoryPlatform::new();
        let registry = platform.registry();

        assert!(registry.get(EntityType::Device).is_ok());
        let err = registry.get(EntityType::Tenant).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedEntityType(_)));
    }

    #[test]
    fn import_creates_and_binds() {
        let platform = MemoryPlatform::new();
        let registry = platform.registry();
        let ids = ExternalIdMap::new();
        let tenant = TenantId::random();

        let mut document = ExportableEntityDocument::new(
            EntityType::Device,
            entivc_types::ExternalId::random(),
            "Sensor-1",
        );
        document.fields.insert("label".into(), json!("north"));

        let handler = registry.get(EntityType::Device).unwrap();
        let outcome = handler
            .import(
                tenant,
                &document,
                &EntityImportSettings::default(),
                None,
                &ids,
            )
            .unwrap();

        let ImportOutcome::Created(entity) = outcome else {
            panic!("expected creation");
        };
        assert_eq!(entity.name, "Sensor-1");
        assert_eq!(
            ids.resolve_local(tenant, document.external_id),
            Some(entity.entity_ref())
        );
    }

    #[test]
    fn import_is_idempotent() {
        let platform = MemoryPlatform::new();
        let registry = platform.registry();
        let ids = ExternalIdMap::new();
        let tenant = TenantId::random();

        let document = ExportableEntityDocument::new(
            EntityType::Asset,
            entivc_types::ExternalId::random(),
            "Building A",
        );
        let handler = registry.get(EntityType::Asset).unwrap();
        let settings = EntityImportSettings::default();

        let first = handler
            .import(tenant, &document, &settings, None, &ids)
            .unwrap();
        let target = first.entity().clone();

        let second = handler
            .import(tenant, &document, &settings, Some(target), &ids)
            .unwrap();
        assert!(matches!(second, ImportOutcome::Unchanged(_)));
    }

    #[test]
    fn import_updates_changed_fields() {
        let platform = MemoryPlatform::new();
        let registry = platform.registry();
        let ids = ExternalIdMap::new();
        let tenant = TenantId::random();

        let handler = registry.get(EntityType::Device).unwrap();
        let settings = EntityImportSettings::default();

        let mut document = ExportableEntityDocument::new(
            EntityType::Device,
            entivc_types::ExternalId::random(),
            "Sensor-1",
        );
        let created = handler
            .import(tenant, &document, &settings, None, &ids)
            .unwrap();

        document.fields.insert("label".into(), json!("south"));
        let outcome = handler
            .import(
                tenant,
                &document,
                &settings,
                Some(created.entity().clone()),
                &ids,
            )
            .unwrap();

        let ImportOutcome::Updated(updated) = outcome else {
            panic!("expected update");
        };
        assert_eq!(updated.fields["label"], json!("south"));
        assert_eq!(
            platform
                .service(EntityType::Device)
                .find(tenant, updated.id)
                .unwrap()
                .unwrap()
                .fields["label"],
            json!("south")
        );
    }
}
