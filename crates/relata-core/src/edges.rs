//! # Edge Coordinator
//!
//! Typed relationship edges over the organization-wide [`EdgeStore`].
//!
//! One generic edge store carries two relationship kinds, told apart by
//! the edge type string:
//!
//! | Kind       | Edge type            | Written by                  |
//! |------------|----------------------|-----------------------------|
//! | Collection | `name` + suffix      | [`EdgeCoordinator::write_collection_edge`] |
//! | Connection | `name`               | [`EdgeCoordinator::write_connection_edge`] |
//!
//! A connection name may not end in the suffix, so the two namespaces
//! never collide for the same logical name.
//!
//! Reads resolve the raw log to live edges: of the records sharing one
//! (source, type, target) triple the greatest version wins, and a winning
//! tombstone hides the triple.

use crate::graph::{Edge, EdgeStore, EdgeStream, SearchByEdgeType, TypeFilter};
use crate::scope::OrganizationScope;
use crate::{EntityRef, RelationError, Version};
use std::iter::Peekable;
use std::sync::Arc;

// =============================================================================
// LIVE EDGE RESOLUTION
// =============================================================================

/// Resolves a raw record stream to its live edges, lazily.
///
/// Relies on the store's ordering: records of one triple are adjacent.
pub struct LiveEdges<'a> {
    records: Peekable<EdgeStream<'a>>,
}

impl<'a> LiveEdges<'a> {
    #[must_use]
    pub fn new(records: EdgeStream<'a>) -> Self {
        Self {
            records: records.peekable(),
        }
    }
}

impl Iterator for LiveEdges<'_> {
    type Item = Result<Edge, RelationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut latest = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };
            while let Some(Ok(record)) = self
                .records
                .next_if(|next| matches!(next, Ok(r) if r.same_triple(&latest)))
            {
                if record.version > latest.version {
                    latest = record;
                }
            }
            if !latest.deleted {
                return Some(Ok(latest));
            }
        }
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Edge operations of one organization.
#[derive(Clone)]
pub struct EdgeCoordinator {
    store: Arc<dyn EdgeStore>,
    scope: OrganizationScope,
    suffix: String,
}

impl std::fmt::Debug for EdgeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeCoordinator")
            .field("scope", &self.scope)
            .field("suffix", &self.suffix)
            .finish_non_exhaustive()
    }
}

impl EdgeCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<dyn EdgeStore>,
        scope: OrganizationScope,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            scope,
            suffix: suffix.into(),
        }
    }

    #[must_use]
    pub fn scope(&self) -> &OrganizationScope {
        &self.scope
    }

    /// Edge type of a named collection.
    #[must_use]
    pub fn collection_type(&self, name: &str) -> String {
        format!("{}{}", name, self.suffix)
    }

    /// Collection name encoded in an edge type, if it is a collection edge.
    #[must_use]
    pub fn collection_name<'t>(&self, edge_type: &'t str) -> Option<&'t str> {
        edge_type.strip_suffix(self.suffix.as_str())
    }

    /// Filter selecting every collection edge.
    #[must_use]
    pub fn collection_filter(&self) -> TypeFilter {
        TypeFilter::Suffix(self.suffix.clone())
    }

    /// Add `target` to the `name` collection of `source`.
    pub fn write_collection_edge(
        &self,
        source: &EntityRef,
        name: &str,
        target: &EntityRef,
    ) -> Result<Edge, RelationError> {
        let edge = Edge::new(
            source.clone(),
            self.collection_type(name),
            target.clone(),
            Version::next(),
        );
        self.store.write_edge(&self.scope, &edge)?;
        tracing::debug!(source = %source, edge_type = %edge.edge_type, target = %target, "collection edge written");
        Ok(edge)
    }

    /// Tombstone the collection edge from `source` to `target`.
    pub fn remove_collection_edge(
        &self,
        source: &EntityRef,
        name: &str,
        target: &EntityRef,
    ) -> Result<(), RelationError> {
        let edge = Edge::new(
            source.clone(),
            self.collection_type(name),
            target.clone(),
            Version::next(),
        );
        self.store.delete_edge(&self.scope, &edge)?;
        tracing::debug!(source = %source, edge_type = %edge.edge_type, target = %target, "collection edge removed");
        Ok(())
    }

    /// Connect `source` to `target` under a plain connection name.
    pub fn write_connection_edge(
        &self,
        source: &EntityRef,
        name: &str,
        target: &EntityRef,
    ) -> Result<Edge, RelationError> {
        if name.is_empty() || self.collection_name(name).is_some() {
            return Err(RelationError::InvalidRelationName(name.to_string()));
        }
        let edge = Edge::new(source.clone(), name, target.clone(), Version::next());
        self.store.write_edge(&self.scope, &edge)?;
        tracing::debug!(source = %source, edge_type = name, target = %target, "connection edge written");
        Ok(edge)
    }

    /// Live edges leaving `source`, as of `as_of`.
    pub fn edges_from_source(
        &self,
        source: &EntityRef,
        type_filter: TypeFilter,
        as_of: Version,
    ) -> Result<LiveEdges<'_>, RelationError> {
        let search = SearchByEdgeType::new(source.clone(), type_filter, as_of);
        Ok(LiveEdges::new(
            self.store.edges_from_source(&self.scope, &search)?,
        ))
    }

    /// Live edges arriving at `target`, as of `as_of`.
    pub fn edges_to_target(
        &self,
        target: &EntityRef,
        type_filter: TypeFilter,
        as_of: Version,
    ) -> Result<LiveEdges<'_>, RelationError> {
        let search = SearchByEdgeType::new(target.clone(), type_filter, as_of);
        Ok(LiveEdges::new(
            self.store.edges_to_target(&self.scope, &search)?,
        ))
    }

    /// Distinct edge types with at least one live edge leaving `source`.
    ///
    /// Yielded in sorted order, each once.
    pub fn edge_types_from_source(
        &self,
        source: &EntityRef,
    ) -> Result<impl Iterator<Item = Result<String, RelationError>> + '_, RelationError> {
        let mut previous: Option<String> = None;
        let live = self.edges_from_source(source, TypeFilter::Any, Version::next())?;
        Ok(live.filter_map(move |record| match record {
            Err(e) => Some(Err(e)),
            Ok(edge) if previous.as_deref() == Some(edge.edge_type.as_str()) => None,
            Ok(edge) => {
                previous = Some(edge.edge_type.clone());
                Some(Ok(edge.edge_type))
            }
        }))
    }

    /// Whether a live `edge_type` edge runs from `source` to `target`.
    ///
    /// Checked from the target side: of the edges arriving at `target`,
    /// one must leave `source`.
    pub fn has_live_edge(
        &self,
        source: &EntityRef,
        edge_type: &str,
        target: &EntityRef,
    ) -> Result<bool, RelationError> {
        let incoming = self.edges_to_target(
            target,
            TypeFilter::Exact(edge_type.to_string()),
            Version::next(),
        )?;
        for edge in incoming {
            if edge?.source.uuid == source.uuid {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryEdgeStore;
    use crate::primitives::COLLECTION_SUFFIX;
    use uuid::Uuid;

    fn coordinator() -> EdgeCoordinator {
        EdgeCoordinator::new(
            Arc::new(MemoryEdgeStore::new()),
            OrganizationScope::new(Uuid::now_v7()),
            COLLECTION_SUFFIX,
        )
    }

    fn node(entity_type: &str) -> EntityRef {
        EntityRef::new(entity_type, Uuid::now_v7())
    }

    fn live_types(edges: &EdgeCoordinator, source: &EntityRef) -> Vec<String> {
        edges
            .edge_types_from_source(source)
            .expect("types")
            .collect::<Result<Vec<_>, _>>()
            .expect("stream")
    }

    #[test]
    fn collection_type_round_trip() {
        let edges = coordinator();
        let edge_type = edges.collection_type("devices");
        assert_eq!(edge_type, "deviceszzzcollectionzzz");
        assert_eq!(edges.collection_name(&edge_type), Some("devices"));
        assert_eq!(edges.collection_name("devices"), None);
    }

    #[test]
    fn collection_membership_follows_latest_record() {
        let edges = coordinator();
        let (app, device) = (node("application"), node("device"));
        let edge_type = edges.collection_type("devices");

        edges
            .write_collection_edge(&app, "devices", &device)
            .expect("write");
        assert!(edges.has_live_edge(&app, &edge_type, &device).expect("check"));

        edges
            .remove_collection_edge(&app, "devices", &device)
            .expect("remove");
        assert!(!edges.has_live_edge(&app, &edge_type, &device).expect("check"));

        edges
            .write_collection_edge(&app, "devices", &device)
            .expect("rewrite");
        assert!(edges.has_live_edge(&app, &edge_type, &device).expect("check"));
    }

    #[test]
    fn repeated_writes_resolve_to_one_live_edge() {
        let edges = coordinator();
        let (app, device) = (node("application"), node("device"));
        for _ in 0..3 {
            edges
                .write_collection_edge(&app, "devices", &device)
                .expect("write");
        }

        let live: Vec<Edge> = edges
            .edges_to_target(&device, TypeFilter::Any, Version::next())
            .expect("read")
            .collect::<Result<_, _>>()
            .expect("stream");
        assert_eq!(live.len(), 1);
    }

    #[test]
    fn as_of_hides_later_records() {
        let edges = coordinator();
        let (app, device) = (node("application"), node("device"));
        let before = Version::next();
        edges
            .write_collection_edge(&app, "devices", &device)
            .expect("write");

        let visible = edges
            .edges_to_target(&device, TypeFilter::Any, before)
            .expect("read")
            .count();
        assert_eq!(visible, 0);
    }

    #[test]
    fn connection_and_collection_do_not_collide() {
        let edges = coordinator();
        let (user, device) = (node("user"), node("device"));

        edges
            .write_connection_edge(&user, "owns", &device)
            .expect("connect");

        assert!(edges.has_live_edge(&user, "owns", &device).expect("check"));
        assert!(
            !edges
                .has_live_edge(&user, &edges.collection_type("owns"), &device)
                .expect("check")
        );
    }

    #[test]
    fn connection_name_with_suffix_rejected() {
        let edges = coordinator();
        let result = edges.write_connection_edge(
            &node("user"),
            &edges.collection_type("owns"),
            &node("device"),
        );
        assert!(matches!(result, Err(RelationError::InvalidRelationName(_))));
    }

    #[test]
    fn edge_types_are_distinct_and_live() {
        let edges = coordinator();
        let app = node("application");
        let (d1, d2, u1) = (node("device"), node("device"), node("user"));

        edges.write_collection_edge(&app, "devices", &d1).expect("write");
        edges.write_collection_edge(&app, "devices", &d2).expect("write");
        edges.write_collection_edge(&app, "users", &u1).expect("write");
        edges.write_connection_edge(&app, "likes", &d1).expect("write");
        edges.remove_collection_edge(&app, "users", &u1).expect("remove");

        assert_eq!(
            live_types(&edges, &app),
            vec!["deviceszzzcollectionzzz".to_string(), "likes".to_string()]
        );
    }

    #[test]
    fn live_edges_skip_trailing_tombstones() {
        let (a, b) = (node("user"), node("device"));
        let first = Edge::new(a.clone(), "owns", b.clone(), Version::next());
        let deleted = Edge::new(a, "owns", b, Version::next()).tombstone();
        let stream: EdgeStream<'_> = Box::new(vec![Ok(first), Ok(deleted)].into_iter());

        assert_eq!(LiveEdges::new(stream).count(), 0);
    }
}
