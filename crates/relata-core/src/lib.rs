//! # relata-core
//!
//! Typed collections and named connections over generic backing stores.
//!
//! This crate maps a legacy relationship model onto three independent
//! systems, none of which knows what a "collection" is:
//! - an append-only graph-edge store (`graph`, `storage`)
//! - a search index (`index`)
//! - an entity snapshot store (`entity`)
//!
//! The [`RelationManager`] is the public contract: bound to one head
//! entity, it adds and removes collection members, creates connections,
//! answers membership questions, and searches collections.
//!
//! ## Architectural Constraints
//!
//! - Synchronous: every collaborator call blocks until acknowledged
//! - No cross-store transactions; writes are ordered and idempotent
//! - No ambient state: collaborators are injected through
//!   [`RelationServices`]
//! - The library logs through `tracing` and never installs a subscriber

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod edges;
pub mod entity;
pub mod formats;
pub mod graph;
pub mod index;
pub mod inflection;
pub mod primitives;
pub mod query;
pub mod relation;
pub mod schema;
pub mod scope;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ConnectedEntityRef, ConnectionRef, Entity, EntityRef, EntitySnapshot, Properties,
    RelationError, Results, ResultsLevel, Version,
};

// =============================================================================
// RE-EXPORTS: Collaborators
// =============================================================================

pub use entity::{EntityManager, EntityStore, MemoryEntityManager, MemoryEntityStore};
pub use graph::{Edge, EdgeStore, MemoryEdgeStore, SearchByEdgeType, TypeFilter};
pub use index::{IndexResults, MemorySearchIndex, SearchIndex};
pub use schema::{CollectionInfo, DefaultSchema, SchemaRegistry};
pub use storage::RedbEdgeStore;

// =============================================================================
// RE-EXPORTS: Relation Layer
// =============================================================================

pub use config::RelationConfig;
pub use edges::{EdgeCoordinator, LiveEdges};
pub use index::IndexCoordinator;
pub use query::{
    Identifier, LegacyQuery, NativeQuery, Operand, SortDirection, SortPredicate, translate_query,
};
pub use relation::{Lifecycle, Owners, RelationManager, RelationManagerFactory, RelationServices};
pub use scope::{ApplicationContext, CollectionScope, IndexScope, OrganizationScope, ScopeResolver};
