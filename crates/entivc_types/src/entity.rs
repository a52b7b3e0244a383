//! Entity types, the fixed processing order, and the live entity record.

use crate::ids::{EntityId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The kind of a platform entity.
///
/// Only a subset of types participates in version control; see
/// [`EntityType::VERSIONABLE`] and [`EntityType::is_versionable`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Customer owning other entities.
    Customer,
    /// Bundle of dashboard widgets.
    WidgetsBundle,
    /// Rule chain processing entity telemetry.
    RuleChain,
    /// Profile shared by devices.
    DeviceProfile,
    /// Profile shared by assets.
    AssetProfile,
    /// Physical or virtual device.
    Device,
    /// Asset grouping devices.
    Asset,
    /// Dashboard.
    Dashboard,
    /// Restricted view over a device or asset.
    EntityView,
    /// Tenant record itself (not versionable).
    Tenant,
    /// Platform user (not versionable).
    User,
    /// Alarm instance (not versionable).
    Alarm,
}

impl EntityType {
    /// Versionable entity types in dependency order.
    ///
    /// A referencing type never appears before the type it depends on:
    /// profiles precede their instance types, rule chains precede the
    /// profiles and dashboards that reference them, entity views come
    /// last because they point at devices and assets. Export and import
    /// both walk this list; it is maintained here, not discovered at
    /// runtime.
    pub const VERSIONABLE: [EntityType; 9] = [
        EntityType::Customer,
        EntityType::WidgetsBundle,
        EntityType::RuleChain,
        EntityType::DeviceProfile,
        EntityType::AssetProfile,
        EntityType::Asset,
        EntityType::Device,
        EntityType::Dashboard,
        EntityType::EntityView,
    ];

    /// Returns true if this type participates in version control.
    #[must_use]
    pub fn is_versionable(&self) -> bool {
        Self::VERSIONABLE.contains(self)
    }

    /// Parses a [`storage_key`](Self::storage_key) back into a type.
    #[must_use]
    pub fn from_storage_key(key: &str) -> Option<Self> {
        match key {
            "customer" => Some(EntityType::Customer),
            "widgets_bundle" => Some(EntityType::WidgetsBundle),
            "rule_chain" => Some(EntityType::RuleChain),
            "device_profile" => Some(EntityType::DeviceProfile),
            "asset_profile" => Some(EntityType::AssetProfile),
            "device" => Some(EntityType::Device),
            "asset" => Some(EntityType::Asset),
            "dashboard" => Some(EntityType::Dashboard),
            "entity_view" => Some(EntityType::EntityView),
            "tenant" => Some(EntityType::Tenant),
            "user" => Some(EntityType::User),
            "alarm" => Some(EntityType::Alarm),
            _ => None,
        }
    }

    /// Stable lower-case key used in document paths and logs.
    #[must_use]
    pub fn storage_key(&self) -> &'static str {
        match self {
            EntityType::Customer => "customer",
            EntityType::WidgetsBundle => "widgets_bundle",
            EntityType::RuleChain => "rule_chain",
            EntityType::DeviceProfile => "device_profile",
            EntityType::AssetProfile => "asset_profile",
            EntityType::Device => "device",
            EntityType::Asset => "asset",
            EntityType::Dashboard => "dashboard",
            EntityType::EntityView => "entity_view",
            EntityType::Tenant => "tenant",
            EntityType::User => "user",
            EntityType::Alarm => "alarm",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// Reference to a live entity: its type plus local id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity type.
    pub entity_type: EntityType,
    /// Local entity id.
    pub id: EntityId,
}

impl EntityRef {
    /// Creates an entity reference.
    #[must_use]
    pub const fn new(entity_type: EntityType, id: EntityId) -> Self {
        Self { entity_type, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// A live platform entity as seen by the version control engine.
///
/// Type-specific payloads stay opaque: they are carried in `fields` as a
/// JSON object and round-trip through export/import untouched. The
/// per-type entity services are the only components that interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Local entity id.
    pub id: EntityId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Entity type.
    pub entity_type: EntityType,
    /// Display name, unique per tenant and type.
    pub name: String,
    /// Opaque type-specific fields.
    pub fields: BTreeMap<String, Value>,
}

impl Entity {
    /// Creates a new entity with a random local id and no fields.
    pub fn new(tenant_id: TenantId, entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::random(),
            tenant_id,
            entity_type,
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets a type-specific field (builder style).
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Returns this entity's reference.
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versionable_covers_allow_list() {
        assert!(EntityType::Device.is_versionable());
        assert!(EntityType::RuleChain.is_versionable());
        assert!(!EntityType::Tenant.is_versionable());
        assert!(!EntityType::User.is_versionable());
        assert!(!EntityType::Alarm.is_versionable());
    }

    fn position(ty: EntityType) -> usize {
        EntityType::VERSIONABLE
            .iter()
            .position(|t| *t == ty)
            .unwrap()
    }

    #[test]
    fn dependency_order_holds() {
        // Profiles before their instance types.
        assert!(position(EntityType::DeviceProfile) < position(EntityType::Device));
        assert!(position(EntityType::AssetProfile) < position(EntityType::Asset));
        // Rule chains before the profiles that reference them.
        assert!(position(EntityType::RuleChain) < position(EntityType::DeviceProfile));
        // Assets before the devices they contain.
        assert!(position(EntityType::Asset) < position(EntityType::Device));
        // Widgets before dashboards, views last.
        assert!(position(EntityType::WidgetsBundle) < position(EntityType::Dashboard));
        assert_eq!(
            position(EntityType::EntityView),
            EntityType::VERSIONABLE.len() - 1
        );
    }

    #[test]
    fn storage_key_roundtrip() {
        for ty in EntityType::VERSIONABLE {
            assert_eq!(EntityType::from_storage_key(ty.storage_key()), Some(ty));
        }
        assert_eq!(EntityType::from_storage_key("unknown"), None);
    }

    #[test]
    fn entity_builder() {
        let tenant = TenantId::random();
        let entity = Entity::new(tenant, EntityType::Device, "Sensor-1")
            .with_field("label", Value::String("north wing".into()));

        assert_eq!(entity.name, "Sensor-1");
        assert_eq!(entity.fields.len(), 1);
        assert_eq!(entity.entity_ref().entity_type, EntityType::Device);
    }
}
