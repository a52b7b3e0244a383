//! The exportable entity document: the unit stored in a version.

use crate::entity::EntityType;
use crate::ids::ExternalId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Direction of a relation as seen from the owning entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RelationDirection {
    /// The owning entity is the source of the relation.
    From,
    /// The owning entity is the target of the relation.
    To,
}

/// Attribute scope, mirroring the platform's attribute storage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AttributeScope {
    /// Server-side attributes.
    Server,
    /// Attributes shared with the device.
    Shared,
    /// Attributes reported by the device.
    Client,
}

/// One relation edge inside a document.
///
/// The far end is addressed by external id so the document stays valid
/// across tenants and restores; the engine remaps it to a local id at
/// import time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRelation {
    /// Direction relative to the owning entity.
    pub direction: RelationDirection,
    /// External id of the related entity.
    pub related: ExternalId,
    /// Relation type, e.g. `Contains` or `Manages`.
    pub relation_type: String,
}

impl EntityRelation {
    /// Creates a relation edge.
    pub fn new(
        direction: RelationDirection,
        related: ExternalId,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            direction,
            related,
            relation_type: relation_type.into(),
        }
    }
}

/// Attribute maps keyed by scope.
pub type AttributeMap = BTreeMap<AttributeScope, BTreeMap<String, Value>>;

/// Reference to an entity document inside a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedEntityRef {
    /// Entity type.
    pub entity_type: EntityType,
    /// External id of the entity.
    pub external_id: ExternalId,
}

impl VersionedEntityRef {
    /// Creates a versioned entity reference.
    #[must_use]
    pub const fn new(entity_type: EntityType, external_id: ExternalId) -> Self {
        Self {
            entity_type,
            external_id,
        }
    }

    /// Path of the referenced document inside a version tree:
    /// `<entity_type>/<external_id>.json`.
    #[must_use]
    pub fn path(&self) -> String {
        format!(
            "{}/{}.json",
            self.entity_type.storage_key(),
            self.external_id.as_uuid()
        )
    }
}

/// Canonical exportable form of one entity.
///
/// Documents are self-contained: restoring one requires no live-system
/// lookups beyond external-to-local id remapping. Optional sections are
/// present only when the export was configured to include them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportableEntityDocument {
    /// Entity type.
    pub entity_type: EntityType,
    /// Stable external id.
    pub external_id: ExternalId,
    /// Display name.
    pub name: String,
    /// Opaque type-specific fields.
    pub fields: BTreeMap<String, Value>,
    /// Relation edges, if exported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relations: Option<Vec<EntityRelation>>,
    /// Attributes by scope, if exported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeMap>,
    /// Device credentials, if exported. Devices only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Value>,
}

impl ExportableEntityDocument {
    /// Creates a document with no optional sections.
    pub fn new(
        entity_type: EntityType,
        external_id: ExternalId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            external_id,
            name: name.into(),
            fields: BTreeMap::new(),
            relations: None,
            attributes: None,
            credentials: None,
        }
    }

    /// Returns this document's versioned reference.
    #[must_use]
    pub fn versioned_ref(&self) -> VersionedEntityRef {
        VersionedEntityRef::new(self.entity_type, self.external_id)
    }

    /// Path of this document inside a version tree.
    #[must_use]
    pub fn path(&self) -> String {
        self.versioned_ref().path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_path_shape() {
        let ext = ExternalId::random();
        let doc = ExportableEntityDocument::new(EntityType::Device, ext, "Sensor-1");
        let path = doc.path();
        assert!(path.starts_with("device/"));
        assert!(path.ends_with(".json"));
    }

    #[test]
    fn optional_sections_skipped_in_json() {
        let doc = ExportableEntityDocument::new(
            EntityType::Asset,
            ExternalId::random(),
            "Building A",
        );
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("relations"));
        assert!(!json.contains("credentials"));
    }

    #[test]
    fn document_json_roundtrip() {
        let mut doc =
            ExportableEntityDocument::new(EntityType::Device, ExternalId::random(), "Sensor-1");
        doc.relations = Some(vec![EntityRelation::new(
            RelationDirection::From,
            ExternalId::random(),
            "Contains",
        )]);

        let json = serde_json::to_vec(&doc).unwrap();
        let back: ExportableEntityDocument = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, doc);
    }
}
