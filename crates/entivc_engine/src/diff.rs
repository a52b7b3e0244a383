//! Field-level comparison of entity documents.
//!
//! Answers "has this entity drifted from this version" without being a
//! general JSON diff: type-specific fields are compared key by key, the
//! optional sections only as a whole.

use entivc_types::ExportableEntityDocument;
use serde_json::Value;
use std::collections::BTreeMap;

/// A changed field: its value on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Value in the live document.
    pub current: Value,
    /// Value in the versioned document.
    pub versioned: Value,
}

/// Result of comparing a live document against a versioned one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDataDiff {
    /// Fields present only in the live document.
    pub added: BTreeMap<String, Value>,
    /// Fields present only in the versioned document.
    pub removed: BTreeMap<String, Value>,
    /// Fields present in both with different values. A renamed entity
    /// shows up here under the `name` key.
    pub changed: BTreeMap<String, FieldChange>,
    /// Whether the relation sections differ.
    pub relations_differ: bool,
    /// Whether the attribute sections differ.
    pub attributes_differ: bool,
    /// Whether the credentials sections differ.
    pub credentials_differ: bool,
}

impl EntityDataDiff {
    /// Returns true if anything differs.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.fields_changed()
            || self.relations_differ
            || self.attributes_differ
            || self.credentials_differ
    }

    /// Returns true if the name or any type-specific field differs.
    #[must_use]
    pub fn fields_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }
}

/// Name participates in the field diff under this key.
const NAME_KEY: &str = "name";

/// Compares a live document against a versioned one.
#[must_use]
pub fn diff(
    current: &ExportableEntityDocument,
    versioned: &ExportableEntityDocument,
) -> EntityDataDiff {
    let mut result = EntityDataDiff::default();

    for (key, value) in &current.fields {
        match versioned.fields.get(key) {
            None => {
                result.added.insert(key.clone(), value.clone());
            }
            Some(other) if other != value => {
                result.changed.insert(
                    key.clone(),
                    FieldChange {
                        current: value.clone(),
                        versioned: other.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }
    for (key, value) in &versioned.fields {
        if !current.fields.contains_key(key) {
            result.removed.insert(key.clone(), value.clone());
        }
    }
    if current.name != versioned.name {
        result.changed.insert(
            NAME_KEY.to_string(),
            FieldChange {
                current: Value::String(current.name.clone()),
                versioned: Value::String(versioned.name.clone()),
            },
        );
    }

    result.relations_differ = current.relations != versioned.relations;
    result.attributes_differ = current.attributes != versioned.attributes;
    result.credentials_differ = current.credentials != versioned.credentials;

    result
}
