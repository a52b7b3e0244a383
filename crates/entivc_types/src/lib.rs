//! # EntiVC Types
//!
//! Shared vocabulary for EntiVC entity version control.
//!
//! This crate provides:
//! - Identifier newtypes (tenant, entity, external, request, version)
//! - Entity types with their fixed dependency order
//! - The exportable entity document
//! - Branches, versions, and pagination
//! - Create/load requests with per-type configuration
//! - Job status types for the polling surface
//!
//! ## Key Invariants
//!
//! - An external id is assigned once, at first export, and never changes
//!   afterwards for that local entity
//! - Documents are self-contained: restoring needs only id remapping
//! - Versions are immutable once created
//! - Terminal job results never change after completion

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod entity;
mod ids;
mod request;
mod status;
mod version;

pub use document::{
    AttributeMap, AttributeScope, EntityRelation, ExportableEntityDocument, RelationDirection,
    VersionedEntityRef,
};
pub use entity::{Entity, EntityRef, EntityType};
pub use ids::{EntityId, ExternalId, RequestId, TenantId, VersionId};
pub use request::{
    EntityExportSettings, EntityImportSettings, ExportScope, SyncStrategy, TypeExportConfig,
    TypeImportConfig, VersionCreateRequest, VersionLoadRequest,
};
pub use status::{
    EntityTypeLoadResult, JobStatus, LoadError, VersionCreationResult, VersionLoadResult,
};
pub use version::{Branch, Page, PageParams, Version};
