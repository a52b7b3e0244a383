//! Serialization of live entities to exportable documents and back.

use crate::error::{EngineError, EngineResult};
use crate::external_id::ExternalIdMap;
use crate::services::{AttributeStore, CredentialsStore, LocalRelation, RelationStore};
use entivc_types::{
    Entity, EntityExportSettings, EntityImportSettings, EntityRelation,
    ExportableEntityDocument, ExternalId, TenantId,
};
use std::sync::Arc;

/// Converts one live entity (plus optionally its relations, attributes,
/// and credentials) into its canonical exportable document, and applies
/// documents back onto the live graph.
///
/// Both directions remap ids through the [`ExternalIdMap`]: export turns
/// local relation targets into external ids, import turns them back.
#[derive(Clone)]
pub struct EntitySerializer {
    relations: Arc<dyn RelationStore>,
    attributes: Arc<dyn AttributeStore>,
    credentials: Arc<dyn CredentialsStore>,
}

impl EntitySerializer {
    /// Creates a serializer over the side collaborators.
    pub fn new(
        relations: Arc<dyn RelationStore>,
        attributes: Arc<dyn AttributeStore>,
        credentials: Arc<dyn CredentialsStore>,
    ) -> Self {
        Self {
            relations,
            attributes,
            credentials,
        }
    }

    /// Builds the exportable document for a live entity.
    ///
    /// Optional sections are included only when enabled in `settings`;
    /// credentials additionally require `include_credentials` (the
    /// handler grants it for devices only). Relation targets that were
    /// never exported get an external id assigned here, so the document
    /// is self-contained.
    pub fn serialize(
        &self,
        entity: &Entity,
        external_id: ExternalId,
        settings: &EntityExportSettings,
        include_credentials: bool,
        ids: &ExternalIdMap,
    ) -> EngineResult<ExportableEntityDocument> {
        let mut document =
            ExportableEntityDocument::new(entity.entity_type, external_id, entity.name.clone());
        document.fields = entity.fields.clone();

        if settings.save_relations {
            let local = self.relations.list(entity.tenant_id, entity.entity_ref())?;
            document.relations = Some(
                local
                    .into_iter()
                    .map(|relation| {
                        EntityRelation::new(
                            relation.direction,
                            ids.assign_or_reuse(entity.tenant_id, relation.related),
                            relation.relation_type,
                        )
                    })
                    .collect(),
            );
        }
        if settings.save_attributes {
            document.attributes =
                Some(self.attributes.fetch(entity.tenant_id, entity.entity_ref())?);
        }
        if settings.save_credentials && include_credentials {
            document.credentials = self.credentials.fetch(entity.tenant_id, entity.id)?;
        }

        Ok(document)
    }

    /// Maps a document's relation section to local edges.
    ///
    /// An unresolved target is an error, not a silent drop: restoring a
    /// graph with missing edges would corrupt it quietly.
    pub fn resolve_relations(
        &self,
        tenant: TenantId,
        document: &ExportableEntityDocument,
        ids: &ExternalIdMap,
    ) -> EngineResult<Vec<LocalRelation>> {
        let Some(relations) = &document.relations else {
            return Ok(Vec::new());
        };

        relations
            .iter()
            .map(|relation| {
                let related = ids.resolve_local(tenant, relation.related).ok_or(
                    EngineError::ExternalIdUnresolved {
                        source: document.external_id,
                        target: relation.related,
                    },
                )?;
                Ok(LocalRelation::new(
                    relation.direction,
                    related,
                    relation.relation_type.clone(),
                ))
            })
            .collect()
    }

    /// Applies the document's optional sections to a live entity.
    pub fn apply_sections(
        &self,
        entity: &Entity,
        document: &ExportableEntityDocument,
        settings: &EntityImportSettings,
        include_credentials: bool,
        ids: &ExternalIdMap,
    ) -> EngineResult<()> {
        let tenant = entity.tenant_id;

        if settings.load_relations && document.relations.is_some() {
            let resolved = self.resolve_relations(tenant, document, ids)?;
            self.relations
                .replace(tenant, entity.entity_ref(), resolved)?;
        }
        if settings.load_attributes {
            if let Some(attributes) = &document.attributes {
                self.attributes
                    .save(tenant, entity.entity_ref(), attributes.clone())?;
            }
        }
        if settings.load_credentials && include_credentials {
            if let Some(credentials) = &document.credentials {
                self.credentials
                    .save(tenant, entity.id, credentials.clone())?;
            }
        }

        Ok(())
    }

    /// Returns true if the document's enabled sections differ from the
    /// entity's current state.
    pub fn sections_differ(
        &self,
        entity: &Entity,
        document: &ExportableEntityDocument,
        settings: &EntityImportSettings,
        include_credentials: bool,
        ids: &ExternalIdMap,
    ) -> EngineResult<bool> {
        let tenant = entity.tenant_id;

        if settings.load_relations && document.relations.is_some() {
            let desired = sorted(self.resolve_relations(tenant, document, ids)?);
            let current = sorted(self.relations.list(tenant, entity.entity_ref())?);
            if desired != current {
                return Ok(true);
            }
        }
        if settings.load_attributes {
            if let Some(attributes) = &document.attributes {
                let current = self.attributes.fetch(tenant, entity.entity_ref())?;
                for (scope, values) in attributes {
                    if current.get(scope) != Some(values) {
                        return Ok(true);
                    }
                }
            }
        }
        if settings.load_credentials && include_credentials {
            if let Some(credentials) = &document.credentials {
                let current = self.credentials.fetch(tenant, entity.id)?;
                if current.as_ref() != Some(credentials) {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

fn sorted(mut relations: Vec<LocalRelation>) -> Vec<LocalRelation> {
    relations.sort_by(|a, b| {
        (a.direction, a.related.entity_type, a.related.id, &a.relation_type).cmp(&(
            b.direction,
            b.related.entity_type,
            b.related.id,
            &b.relation_type,
        ))
    });
    relations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        MemoryAttributeStore, MemoryCredentialsStore, MemoryRelationStore, RelationStore,
    };
    use entivc_types::{AttributeScope, EntityType, RelationDirection};
    use serde_json::json;

    fn serializer() -> (EntitySerializer, Arc<MemoryRelationStore>) {
        let relations = Arc::new(MemoryRelationStore::new());
        let serializer = EntitySerializer::new(
            Arc::clone(&relations) as Arc<dyn RelationStore>,
            Arc::new(MemoryAttributeStore::new()),
            Arc::new(MemoryCredentialsStore::new()),
        );
        (serializer, relations)
    }

    #[test]
    fn sections_follow_settings() {
        let (serializer, _) = serializer();
        let ids = ExternalIdMap::new();
        let entity = Entity::new(TenantId::random(), EntityType::Device, "Sensor-1")
            .with_field("label", json!("north"));
        let external = ids.assign_or_reuse(entity.tenant_id, entity.entity_ref());

        let bare = serializer
            .serialize(&entity, external, &EntityExportSettings::default(), true, &ids)
            .unwrap();
        assert!(bare.relations.is_none());
        assert!(bare.attributes.is_none());
        assert_eq!(bare.fields["label"], json!("north"));

        let full = serializer
            .serialize(
                &entity,
                external,
                &EntityExportSettings::default()
                    .with_relations()
                    .with_attributes(),
                true,
                &ids,
            )
            .unwrap();
        assert!(full.relations.is_some());
        assert!(full.attributes.is_some());
    }

    #[test]
    fn relation_targets_get_external_ids_on_export() {
        let (serializer, relations) = serializer();
        let ids = ExternalIdMap::new();
        let tenant = TenantId::random();

        let asset = Entity::new(tenant, EntityType::Asset, "Building A");
        let device = Entity::new(tenant, EntityType::Device, "Sensor-1");
        relations
            .replace(
                tenant,
                device.entity_ref(),
                vec![LocalRelation::new(
                    RelationDirection::To,
                    asset.entity_ref(),
                    "Contains",
                )],
            )
            .unwrap();

        let external = ids.assign_or_reuse(tenant, device.entity_ref());
        let document = serializer
            .serialize(
                &device,
                external,
                &EntityExportSettings::default().with_relations(),
                true,
                &ids,
            )
            .unwrap();

        let exported = &document.relations.unwrap()[0];
        // The asset was never exported itself, yet its external id now
        // exists and resolves back.
        assert_eq!(ids.resolve_local(tenant, exported.related), Some(asset.entity_ref()));
    }

    #[test]
    fn unresolved_relation_target_is_an_error() {
        let (serializer, _) = serializer();
        let ids = ExternalIdMap::new();
        let tenant = TenantId::random();

        let mut document = ExportableEntityDocument::new(
            EntityType::Device,
            ExternalId::random(),
            "Sensor-1",
        );
        let missing = ExternalId::random();
        document.relations = Some(vec![EntityRelation::new(
            RelationDirection::From,
            missing,
            "Contains",
        )]);

        let err = serializer
            .resolve_relations(tenant, &document, &ids)
            .unwrap_err();
        match err {
            EngineError::ExternalIdUnresolved { source, target } => {
                assert_eq!(source, document.external_id);
                assert_eq!(target, missing);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sections_differ_detects_attribute_drift() {
        let (serializer, _) = serializer();
        let ids = ExternalIdMap::new();
        let entity = Entity::new(TenantId::random(), EntityType::Device, "Sensor-1");

        let mut document = ExportableEntityDocument::new(
            EntityType::Device,
            ExternalId::random(),
            "Sensor-1",
        );
        let mut attributes = entivc_types::AttributeMap::new();
        attributes
            .entry(AttributeScope::Server)
            .or_default()
            .insert("latitude".into(), json!(52.5));
        document.attributes = Some(attributes);

        let settings = EntityImportSettings::default().with_attributes();
        assert!(serializer
            .sections_differ(&entity, &document, &settings, true, &ids)
            .unwrap());

        serializer
            .apply_sections(&entity, &document, &settings, true, &ids)
            .unwrap();
        assert!(!serializer
            .sections_differ(&entity, &document, &settings, true, &ids)
            .unwrap());
    }
}
