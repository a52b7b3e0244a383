//! # EntiVC Engine
//!
//! Version create/load orchestration for EntiVC.
//!
//! This crate provides:
//! - The orchestration engine (request validation, dependency-ordered
//!   processing, count aggregation, atomic commits)
//! - Entity serialization with optional relations/attributes/credentials
//! - External-id resolution (stable ids across restores)
//! - Overwrite/merge sync strategies
//! - A field-level diff engine
//! - Asynchronous job tracking with polling
//!
//! ## Architecture
//!
//! A caller submits a create or load request; the engine validates it
//! synchronously, hands back a request id, and executes the job on its
//! own thread. Entity types are processed strictly in the fixed
//! dependency order. Per-type behavior lives in a registry of
//! [`EntityTypeHandler`] implementations over pluggable entity
//! services; the remote store is reached only through the
//! `entivc_store::VersionStore` contract.
//!
//! ## Key Invariants
//!
//! - External ids are assigned once and reused forever
//! - A create commits atomically; no partial version becomes visible
//! - A load stops at the first unresolved reference and does not roll
//!   back earlier types
//! - Only overwrite-strategy types ever remove entities
//! - Errors after submission surface only through the polling surface

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod diff;
mod error;
mod external_id;
mod handler;
mod jobs;
mod orchestrator;
mod serializer;
mod services;
mod strategy;

pub use config::{EngineConfig, RetryConfig};
pub use diff::{diff, EntityDataDiff, FieldChange};
pub use error::{EngineError, EngineResult};
pub use external_id::ExternalIdMap;
pub use handler::{
    EntityTypeHandler, GenericEntityHandler, HandlerRegistry, ImportOutcome, MemoryPlatform,
};
pub use jobs::{DestructiveImportGuard, DestructiveImportLocks, JobTracker};
pub use orchestrator::VersionControlEngine;
pub use serializer::EntitySerializer;
pub use services::{
    AttributeStore, CredentialsStore, EntityService, LocalRelation, MemoryAttributeStore,
    MemoryCredentialsStore, MemoryEntityService, MemoryRelationStore, RelationStore,
    ServiceError, ServiceResult,
};
pub use strategy::resolve_strategy;
