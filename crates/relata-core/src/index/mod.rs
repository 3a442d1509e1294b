//! # Index Coordinator
//!
//! Searchable connection records over a [`SearchIndex`].
//!
//! An index entry associates a source entity with a target snapshot under
//! an edge type, inside one organization + application [`IndexScope`].
//! Entries are upserts keyed by (source, edge type, target), so replaying
//! an index write after a partial failure converges.

mod memory;

pub use memory::MemorySearchIndex;

use crate::config::RelationConfig;
use crate::query::{LegacyQuery, NativeQuery, translate_query};
use crate::scope::{CollectionScope, IndexScope};
use crate::{EntityRef, EntitySnapshot, RelationError};
use std::sync::Arc;

/// One page of raw index matches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexResults {
    pub snapshots: Vec<EntitySnapshot>,
    /// Position of the next page, if any.
    pub cursor: Option<String>,
}

impl IndexResults {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

// =============================================================================
// SEARCHINDEX TRAIT
// =============================================================================

/// The search index, partitioned per organization + application.
pub trait SearchIndex: Send + Sync {
    /// Upsert the entry for `source -[edge_type]-> target`.
    fn index_connection(
        &self,
        scope: &IndexScope,
        source: &EntitySnapshot,
        edge_type: &str,
        target: &EntitySnapshot,
        target_scope: &CollectionScope,
    ) -> Result<(), RelationError>;

    /// Remove the entry for `source -[edge_type]-> target`, if present.
    fn deindex_connection(
        &self,
        scope: &IndexScope,
        source: &EntityRef,
        edge_type: &str,
        target: &EntitySnapshot,
    ) -> Result<(), RelationError>;

    /// Targets of `source` under `edge_type` matching the query.
    ///
    /// Zero matches is an empty page, not an error.
    fn search(
        &self,
        scope: &IndexScope,
        source: &EntitySnapshot,
        edge_type: &str,
        query: &NativeQuery,
    ) -> Result<IndexResults, RelationError>;
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Index operations of one application.
#[derive(Clone)]
pub struct IndexCoordinator {
    index: Arc<dyn SearchIndex>,
    scope: IndexScope,
    config: Arc<RelationConfig>,
}

impl std::fmt::Debug for IndexCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCoordinator")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl IndexCoordinator {
    #[must_use]
    pub fn new(index: Arc<dyn SearchIndex>, scope: IndexScope, config: Arc<RelationConfig>) -> Self {
        Self {
            index,
            scope,
            config,
        }
    }

    #[must_use]
    pub fn scope(&self) -> &IndexScope {
        &self.scope
    }

    pub fn index_connection(
        &self,
        source: &EntitySnapshot,
        edge_type: &str,
        target: &EntitySnapshot,
        target_scope: &CollectionScope,
    ) -> Result<(), RelationError> {
        self.index
            .index_connection(&self.scope, source, edge_type, target, target_scope)?;
        tracing::debug!(source = %source.id, edge_type, target = %target.id, "connection indexed");
        Ok(())
    }

    pub fn deindex_connection(
        &self,
        source: &EntityRef,
        edge_type: &str,
        target: &EntitySnapshot,
    ) -> Result<(), RelationError> {
        self.index
            .deindex_connection(&self.scope, source, edge_type, target)?;
        tracing::debug!(source = %source, edge_type, target = %target.id, "connection deindexed");
        Ok(())
    }

    pub fn search_connections(
        &self,
        source: &EntitySnapshot,
        edge_type: &str,
        query: &NativeQuery,
    ) -> Result<IndexResults, RelationError> {
        let results = self.index.search(&self.scope, source, edge_type, query)?;
        tracing::debug!(
            source = %source.id,
            edge_type,
            matches = results.snapshots.len(),
            "connections searched"
        );
        Ok(results)
    }

    /// Translate a legacy query, clamping its page size to the configured
    /// bounds.
    #[must_use]
    pub fn translate_query(&self, legacy: &LegacyQuery) -> NativeQuery {
        let mut native = translate_query(legacy, &self.config.user_type);
        native.limit = self.config.effective_limit(native.limit);
        native
    }
}

// =============================================================================
// TESTS
// =============================================================================
