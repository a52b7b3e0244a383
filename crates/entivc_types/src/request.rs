//! Version create and load requests.

use crate::entity::EntityType;
use crate::ids::{EntityId, ExternalId, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Policy governing how a restore treats local entities absent from the
/// versioned set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// The remote set replaces the local set; local-only entities go away.
    Overwrite,
    /// Remote entities are added or updated; local-only entities are kept.
    Merge,
}

/// Which optional sections to include when exporting an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityExportSettings {
    /// Export relation edges.
    pub save_relations: bool,
    /// Export attributes.
    pub save_attributes: bool,
    /// Export device credentials (devices only).
    pub save_credentials: bool,
}

impl EntityExportSettings {
    /// Enables relation export.
    #[must_use]
    pub fn with_relations(mut self) -> Self {
        self.save_relations = true;
        self
    }

    /// Enables attribute export.
    #[must_use]
    pub fn with_attributes(mut self) -> Self {
        self.save_attributes = true;
        self
    }

    /// Enables credentials export.
    #[must_use]
    pub fn with_credentials(mut self) -> Self {
        self.save_credentials = true;
        self
    }
}

/// Which entities of a type to export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportScope {
    /// All entities of the type owned by the tenant.
    AllEntities,
    /// An explicit list of local ids.
    Selected(Vec<EntityId>),
}

/// Per-type export configuration inside a complex create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeExportConfig {
    /// Which entities to export.
    pub scope: ExportScope,
    /// Optional sections to include.
    pub settings: EntityExportSettings,
    /// Per-type strategy override; falls back to the request default,
    /// then to merge.
    pub sync_strategy: Option<SyncStrategy>,
}

impl TypeExportConfig {
    /// Exports all entities of the type.
    #[must_use]
    pub fn all() -> Self {
        Self {
            scope: ExportScope::AllEntities,
            settings: EntityExportSettings::default(),
            sync_strategy: None,
        }
    }

    /// Exports only the listed entities.
    #[must_use]
    pub fn selected(ids: Vec<EntityId>) -> Self {
        Self {
            scope: ExportScope::Selected(ids),
            settings: EntityExportSettings::default(),
            sync_strategy: None,
        }
    }

    /// Sets the export settings.
    #[must_use]
    pub fn with_settings(mut self, settings: EntityExportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the per-type sync strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.sync_strategy = Some(strategy);
        self
    }
}

/// Request to create a new version under a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionCreateRequest {
    /// Snapshot one entity.
    SingleEntity {
        /// Target branch.
        branch: String,
        /// Name of the version to create.
        version_name: String,
        /// Type of the entity.
        entity_type: EntityType,
        /// Local id of the entity.
        entity_id: EntityId,
        /// Optional sections to include.
        settings: EntityExportSettings,
    },
    /// Snapshot a configured set of entity types.
    Complex {
        /// Target branch.
        branch: String,
        /// Name of the version to create.
        version_name: String,
        /// Request-level default strategy for types without an override.
        default_strategy: Option<SyncStrategy>,
        /// Per-type configuration; must not be empty.
        configs: BTreeMap<EntityType, TypeExportConfig>,
    },
}

impl VersionCreateRequest {
    /// Target branch name.
    #[must_use]
    pub fn branch(&self) -> &str {
        match self {
            Self::SingleEntity { branch, .. } | Self::Complex { branch, .. } => branch,
        }
    }

    /// Name of the version to create.
    #[must_use]
    pub fn version_name(&self) -> &str {
        match self {
            Self::SingleEntity { version_name, .. } | Self::Complex { version_name, .. } => {
                version_name
            }
        }
    }
}

/// Which optional sections to apply when importing an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityImportSettings {
    /// Apply relation edges from the document.
    pub load_relations: bool,
    /// Apply attributes from the document.
    pub load_attributes: bool,
    /// Apply device credentials from the document (devices only).
    pub load_credentials: bool,
}

impl EntityImportSettings {
    /// Enables relation import.
    #[must_use]
    pub fn with_relations(mut self) -> Self {
        self.load_relations = true;
        self
    }

    /// Enables attribute import.
    #[must_use]
    pub fn with_attributes(mut self) -> Self {
        self.load_attributes = true;
        self
    }

    /// Enables credentials import.
    #[must_use]
    pub fn with_credentials(mut self) -> Self {
        self.load_credentials = true;
        self
    }
}

/// Per-type import configuration inside an entity-type load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeImportConfig {
    /// Optional sections to apply.
    pub settings: EntityImportSettings,
    /// Delete local entities of the type absent from the version.
    /// The only destructive step of a load.
    pub remove_other_entities: bool,
    /// When no external-id mapping exists, adopt a local entity with the
    /// same name instead of creating a new one.
    pub find_existing_by_name: bool,
}

impl TypeImportConfig {
    /// Sets the import settings.
    #[must_use]
    pub fn with_settings(mut self, settings: EntityImportSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Enables removal of local entities absent from the version.
    #[must_use]
    pub fn removing_others(mut self) -> Self {
        self.remove_other_entities = true;
        self
    }

    /// Enables by-name adoption of unmapped entities.
    #[must_use]
    pub fn finding_by_name(mut self) -> Self {
        self.find_existing_by_name = true;
        self
    }
}

/// Request to restore entities from an existing version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionLoadRequest {
    /// Restore one entity addressed by external id.
    SingleEntity {
        /// Branch the version belongs to.
        branch: String,
        /// Version to restore from.
        version_id: VersionId,
        /// Type of the entity.
        entity_type: EntityType,
        /// External id of the entity inside the version.
        external_id: ExternalId,
        /// Optional sections to apply.
        settings: EntityImportSettings,
        /// Adopt a same-name local entity when unmapped.
        find_existing_by_name: bool,
    },
    /// Restore a configured set of entity types.
    EntityType {
        /// Branch the version belongs to.
        branch: String,
        /// Version to restore from.
        version_id: VersionId,
        /// Per-type configuration; must not be empty.
        configs: BTreeMap<EntityType, TypeImportConfig>,
    },
}

impl VersionLoadRequest {
    /// Branch the version belongs to.
    #[must_use]
    pub fn branch(&self) -> &str {
        match self {
            Self::SingleEntity { branch, .. } | Self::EntityType { branch, .. } => branch,
        }
    }

    /// Version to restore from.
    #[must_use]
    pub fn version_id(&self) -> &VersionId {
        match self {
            Self::SingleEntity { version_id, .. } | Self::EntityType { version_id, .. } => {
                version_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_settings_builder() {
        let settings = EntityExportSettings::default()
            .with_relations()
            .with_attributes();
        assert!(settings.save_relations);
        assert!(settings.save_attributes);
        assert!(!settings.save_credentials);
    }

    #[test]
    fn type_export_config_builder() {
        let config = TypeExportConfig::all().with_strategy(SyncStrategy::Overwrite);
        assert_eq!(config.scope, ExportScope::AllEntities);
        assert_eq!(config.sync_strategy, Some(SyncStrategy::Overwrite));
    }

    #[test]
    fn request_accessors() {
        let request = VersionCreateRequest::Complex {
            branch: "main".into(),
            version_name: "Version 1.0".into(),
            default_strategy: None,
            configs: BTreeMap::new(),
        };
        assert_eq!(request.branch(), "main");
        assert_eq!(request.version_name(), "Version 1.0");
    }
}
