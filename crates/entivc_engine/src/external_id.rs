//! External-id mapping between live entities and versioned documents.

use entivc_types::{EntityId, EntityRef, ExternalId, TenantId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Maps {
    /// Local entity to its stable external id.
    forward: HashMap<(TenantId, EntityId), ExternalId>,
    /// External id back to the typed local entity.
    reverse: HashMap<(TenantId, ExternalId), EntityRef>,
}

/// The explicit mapping table between local and external ids.
///
/// An external id is assigned once, at first export, and reused for
/// every later export of the same local entity. On import the table is
/// consulted first; a by-name match may bind a new pair, but an existing
/// pair is never overwritten. Restore correctness depends on this table
/// being an explicit record, not a value recomputed from entity state.
#[derive(Debug, Default)]
pub struct ExternalIdMap {
    maps: RwLock<Maps>,
    key_locks: Mutex<HashMap<(TenantId, ExternalId), Arc<Mutex<()>>>>,
}

impl ExternalIdMap {
    /// Creates an empty mapping table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entity's external id, assigning a fresh one on first
    /// export. Idempotent: the same local entity always yields the same
    /// external id.
    pub fn assign_or_reuse(&self, tenant: TenantId, entity: EntityRef) -> ExternalId {
        if let Some(external) = self.maps.read().forward.get(&(tenant, entity.id)) {
            return *external;
        }

        let mut maps = self.maps.write();
        // Re-check: another thread may have assigned between the locks.
        if let Some(external) = maps.forward.get(&(tenant, entity.id)) {
            return *external;
        }
        let external = ExternalId::random();
        maps.forward.insert((tenant, entity.id), external);
        maps.reverse.insert((tenant, external), entity);
        external
    }

    /// Returns the external id already assigned to a local entity.
    #[must_use]
    pub fn external_of(&self, tenant: TenantId, id: EntityId) -> Option<ExternalId> {
        self.maps.read().forward.get(&(tenant, id)).copied()
    }

    /// Resolves an external id to the mapped local entity.
    #[must_use]
    pub fn resolve_local(&self, tenant: TenantId, external: ExternalId) -> Option<EntityRef> {
        self.maps.read().reverse.get(&(tenant, external)).copied()
    }

    /// Binds a local entity to an external id (by-name adoption on
    /// import). An existing binding for the entity wins and is returned
    /// unchanged.
    pub fn bind(&self, tenant: TenantId, entity: EntityRef, external: ExternalId) -> ExternalId {
        let mut maps = self.maps.write();
        if let Some(existing) = maps.forward.get(&(tenant, entity.id)) {
            return *existing;
        }
        maps.forward.insert((tenant, entity.id), external);
        maps.reverse.insert((tenant, external), entity);
        external
    }

    /// Drops the mapping of a deleted local entity. The external id can
    /// be bound to a newly created entity by a later import.
    pub fn unbind(&self, tenant: TenantId, id: EntityId) {
        let mut maps = self.maps.write();
        if let Some(external) = maps.forward.remove(&(tenant, id)) {
            maps.reverse.remove(&(tenant, external));
        }
    }

    /// Returns the lock serializing work on one `(tenant, external id)`
    /// key. Import holds it across resolve-or-create so two concurrent
    /// jobs cannot create two local entities for the same external id.
    pub fn lock_for(&self, tenant: TenantId, external: ExternalId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.key_locks
                .lock()
                .entry((tenant, external))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
