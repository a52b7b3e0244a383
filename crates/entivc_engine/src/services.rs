//! Entity collaborator contracts and in-memory implementations.
//!
//! The engine never talks to entity storage directly; it goes through
//! these narrow traits. One [`EntityService`] exists per supported type,
//! plus three side collaborators for relations, attributes, and device
//! credentials. The in-memory implementations back the test suites.

use entivc_types::{
    AttributeMap, Entity, EntityId, EntityRef, EntityType, RelationDirection, TenantId,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Result type for collaborator calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised by entity collaborators.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The entity does not exist.
    #[error("entity not found: {0}")]
    NotFound(EntityRef),

    /// Backend failure.
    #[error("service backend error: {0}")]
    Backend(String),
}

/// CRUD and lookup operations for one entity type.
pub trait EntityService: Send + Sync {
    /// Finds an entity by local id.
    fn find(&self, tenant: TenantId, id: EntityId) -> ServiceResult<Option<Entity>>;

    /// Finds an entity by display name.
    fn find_by_name(&self, tenant: TenantId, name: &str) -> ServiceResult<Option<Entity>>;

    /// Lists all entities of the type owned by the tenant.
    fn list_all(&self, tenant: TenantId) -> ServiceResult<Vec<Entity>>;

    /// Creates or updates an entity. The entity's own id decides which.
    fn save(&self, entity: Entity) -> ServiceResult<Entity>;

    /// Deletes an entity.
    fn delete(&self, tenant: TenantId, id: EntityId) -> ServiceResult<()>;
}

/// A relation edge between two live entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRelation {
    /// Direction relative to the owning entity.
    pub direction: RelationDirection,
    /// The far end of the edge.
    pub related: EntityRef,
    /// Relation type, e.g. `Contains`.
    pub relation_type: String,
}

impl LocalRelation {
    /// Creates a relation edge.
    pub fn new(
        direction: RelationDirection,
        related: EntityRef,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            direction,
            related,
            relation_type: relation_type.into(),
        }
    }
}

/// Relation storage collaborator.
pub trait RelationStore: Send + Sync {
    /// Lists the relations owned by an entity.
    fn list(&self, tenant: TenantId, entity: EntityRef) -> ServiceResult<Vec<LocalRelation>>;

    /// Replaces the relations owned by an entity.
    fn replace(
        &self,
        tenant: TenantId,
        entity: EntityRef,
        relations: Vec<LocalRelation>,
    ) -> ServiceResult<()>;

    /// Removes all relations owned by an entity.
    fn delete_all(&self, tenant: TenantId, entity: EntityRef) -> ServiceResult<()>;
}

/// Attribute storage collaborator. Plain fetch-and-save.
pub trait AttributeStore: Send + Sync {
    /// Fetches all attributes of an entity, grouped by scope.
    fn fetch(&self, tenant: TenantId, entity: EntityRef) -> ServiceResult<AttributeMap>;

    /// Saves attributes, replacing the scopes present in `attributes`.
    fn save(
        &self,
        tenant: TenantId,
        entity: EntityRef,
        attributes: AttributeMap,
    ) -> ServiceResult<()>;
}

/// Device credentials collaborator. Plain fetch-and-save.
pub trait CredentialsStore: Send + Sync {
    /// Fetches a device's credentials.
    fn fetch(&self, tenant: TenantId, device: EntityId) -> ServiceResult<Option<Value>>;

    /// Saves a device's credentials.
    fn save(&self, tenant: TenantId, device: EntityId, credentials: Value) -> ServiceResult<()>;
}

/// In-memory entity service for one type.
#[derive(Debug)]
pub struct MemoryEntityService {
    entity_type: EntityType,
    entities: RwLock<HashMap<(TenantId, EntityId), Entity>>,
}

impl MemoryEntityService {
    /// Creates an empty service for a type.
    #[must_use]
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// The entity type this service stores.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Number of entities a tenant owns.
    #[must_use]
    pub fn count(&self, tenant: TenantId) -> usize {
        self.entities
            .read()
            .keys()
            .filter(|(t, _)| *t == tenant)
            .count()
    }
}

impl EntityService for MemoryEntityService {
    fn find(&self, tenant: TenantId, id: EntityId) -> ServiceResult<Option<Entity>> {
        Ok(self.entities.read().get(&(tenant, id)).cloned())
    }

    fn find_by_name(&self, tenant: TenantId, name: &str) -> ServiceResult<Option<Entity>> {
        Ok(self
            .entities
            .read()
            .values()
            .find(|e| e.tenant_id == tenant && e.name == name)
            .cloned())
    }

    fn list_all(&self, tenant: TenantId) -> ServiceResult<Vec<Entity>> {
        let mut entities: Vec<Entity> = self
            .entities
            .read()
            .values()
            .filter(|e| e.tenant_id == tenant)
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entities)
    }

    fn save(&self, entity: Entity) -> ServiceResult<Entity> {
        self.entities
            .write()
            .insert((entity.tenant_id, entity.id), entity.clone());
        Ok(entity)
    }

    fn delete(&self, tenant: TenantId, id: EntityId) -> ServiceResult<()> {
        self.entities
            .write()
            .remove(&(tenant, id))
            .map(|_| ())
            .ok_or(ServiceError::NotFound(EntityRef::new(self.entity_type, id)))
    }
}

/// In-memory relation store.
#[derive(Debug, Default)]
pub struct MemoryRelationStore {
    relations: RwLock<HashMap<(TenantId, EntityRef), Vec<LocalRelation>>>,
}

impl MemoryRelationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RelationStore for MemoryRelationStore {
    fn list(&self, tenant: TenantId, entity: EntityRef) -> ServiceResult<Vec<LocalRelation>> {
        Ok(self
            .relations
            .read()
            .get(&(tenant, entity))
            .cloned()
            .unwrap_or_default())
    }

    fn replace(
        &self,
        tenant: TenantId,
        entity: EntityRef,
        relations: Vec<LocalRelation>,
    ) -> ServiceResult<()> {
        self.relations.write().insert((tenant, entity), relations);
        Ok(())
    }

    fn delete_all(&self, tenant: TenantId, entity: EntityRef) -> ServiceResult<()> {
        self.relations.write().remove(&(tenant, entity));
        Ok(())
    }
}

/// In-memory attribute store.
#[derive(Debug, Default)]
pub struct MemoryAttributeStore {
    attributes: RwLock<HashMap<(TenantId, EntityRef), AttributeMap>>,
}

impl MemoryAttributeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn fetch(&self, tenant: TenantId, entity: EntityRef) -> ServiceResult<AttributeMap> {
        Ok(self
            .attributes
            .read()
            .get(&(tenant, entity))
            .cloned()
            .unwrap_or_default())
    }

    fn save(
        &self,
        tenant: TenantId,
        entity: EntityRef,
        attributes: AttributeMap,
    ) -> ServiceResult<()> {
        let mut stored = self.attributes.write();
        let current = stored.entry((tenant, entity)).or_default();
        for (scope, values) in attributes {
            current.insert(scope, values);
        }
        Ok(())
    }
}

/// In-memory credentials store.
#[derive(Debug, Default)]
pub struct MemoryCredentialsStore {
    credentials: RwLock<HashMap<(TenantId, EntityId), Value>>,
}

impl MemoryCredentialsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialsStore for MemoryCredentialsStore {
    fn fetch(&self, tenant: TenantId, device: EntityId) -> ServiceResult<Option<Value>> {
        Ok(self.credentials.read().get(&(tenant, device)).cloned())
    }

    fn save(&self, tenant: TenantId, device: EntityId, credentials: Value) -> ServiceResult<()> {
        self.credentials.write().insert((tenant, device), credentials);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::random()
    }

    #[test]
    fn memory_service_crud() {
        let service = MemoryEntityService::new(EntityType::Device);
        let tenant = tenant();

        let saved = service
            .save(Entity::new(tenant, EntityType::Device, "Sensor-1"))
            .unwrap();
        assert_eq!(service.count(tenant), 1);
        assert_eq!(
            service.find(tenant, saved.id).unwrap().unwrap().name,
            "Sensor-1"
        );
        assert!(service
            .find_by_name(tenant, "Sensor-1")
            .unwrap()
            .is_some());

        service.delete(tenant, saved.id).unwrap();
        assert_eq!(service.count(tenant), 0);
    }

    #[test]
    fn delete_missing_entity_is_an_error() {
        let service = MemoryEntityService::new(EntityType::Device);
        let err = service.delete(tenant(), EntityId::random()).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn tenants_are_isolated() {
        let service = MemoryEntityService::new(EntityType::Asset);
        let first = tenant();
        let second = tenant();

        service
            .save(Entity::new(first, EntityType::Asset, "Building A"))
            .unwrap();

        assert_eq!(service.count(first), 1);
        assert_eq!(service.count(second), 0);
        assert!(service
            .find_by_name(second, "Building A")
            .unwrap()
            .is_none());
    }

    #[test]
    fn attribute_save_merges_by_scope() {
        use entivc_types::AttributeScope;

        let store = MemoryAttributeStore::new();
        let tenant = tenant();
        let entity = EntityRef::new(EntityType::Device, EntityId::random());

        let mut first = AttributeMap::new();
        first
            .entry(AttributeScope::Server)
            .or_default()
            .insert("latitude".into(), Value::from(52.5));
        store.save(tenant, entity, first).unwrap();

        let mut second = AttributeMap::new();
        second
            .entry(AttributeScope::Shared)
            .or_default()
            .insert("firmware".into(), Value::from("1.2.0"));
        store.save(tenant, entity, second).unwrap();

        let fetched = store.fetch(tenant, entity).unwrap();
        assert_eq!(fetched.len(), 2);
    }
}
