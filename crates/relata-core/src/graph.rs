//! # Edge Store
//!
//! The graph-edge store interface and its in-memory implementation.
//!
//! The store is an append-only log of versioned edge records. Writing an
//! edge appends a live record; deleting one appends a tombstone with a
//! newer version. Nothing is overwritten, so readers pick a consistent view
//! by reading "as of" a version ceiling.
//!
//! ## Read contract
//!
//! Searches yield raw records (live and tombstoned) whose version is at or
//! below the ceiling, ordered by (edge type, peer node, version). Records of
//! the same (source, type, target) triple are therefore adjacent with the
//! newest last; [`EdgeCoordinator`](crate::edges::EdgeCoordinator) resolves
//! them to live edges.

use crate::scope::OrganizationScope;
use crate::{EntityRef, RelationError, Version, primitives};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;
use uuid::Uuid;

// =============================================================================
// EDGE
// =============================================================================

/// A versioned, directed, typed relationship record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: EntityRef,
    pub edge_type: String,
    pub target: EntityRef,
    pub version: Version,
    /// Tombstone marker.
    pub deleted: bool,
}

impl Edge {
    /// A live edge record.
    #[must_use]
    pub fn new(
        source: EntityRef,
        edge_type: impl Into<String>,
        target: EntityRef,
        version: Version,
    ) -> Self {
        Self {
            source,
            edge_type: edge_type.into(),
            target,
            version,
            deleted: false,
        }
    }

    /// The tombstone for this edge record.
    #[must_use]
    pub fn tombstone(&self) -> Self {
        Self {
            deleted: true,
            ..self.clone()
        }
    }

    /// Whether two records describe the same (source, type, target) triple.
    #[must_use]
    pub fn same_triple(&self, other: &Self) -> bool {
        self.source.uuid == other.source.uuid
            && self.edge_type == other.edge_type
            && self.target.uuid == other.target.uuid
    }
}

// =============================================================================
// SEARCH
// =============================================================================

/// Restricts a search to matching edge types.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeFilter {
    #[default]
    Any,
    Exact(String),
    Prefix(String),
    Suffix(String),
}

impl TypeFilter {
    #[must_use]
    pub fn matches(&self, edge_type: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(t) => edge_type == t,
            Self::Prefix(p) => edge_type.starts_with(p.as_str()),
            Self::Suffix(s) => edge_type.ends_with(s.as_str()),
        }
    }
}

/// Search for the edges touching one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchByEdgeType {
    /// The source (outgoing search) or target (incoming search).
    pub node: EntityRef,
    pub type_filter: TypeFilter,
    /// Records newer than this are invisible.
    pub max_version: Version,
}

impl SearchByEdgeType {
    #[must_use]
    pub fn new(node: EntityRef, type_filter: TypeFilter, max_version: Version) -> Self {
        Self {
            node,
            type_filter,
            max_version,
        }
    }
}

/// A lazily consumed sequence of edge records.
pub type EdgeStream<'a> = Box<dyn Iterator<Item = Result<Edge, RelationError>> + 'a>;

/// One batch of a streamed search.
pub(crate) struct ScanBatch<K> {
    /// Records of the batch that pass the search filters.
    pub(crate) records: Vec<Edge>,
    /// Last raw key read, or `None` once the node's range is exhausted.
    pub(crate) resume: Option<K>,
}

impl<K> ScanBatch<K> {
    pub(crate) fn exhausted() -> Self {
        Self {
            records: Vec::new(),
            resume: None,
        }
    }
}

/// Streams a search by fetching [`primitives::SCAN_BATCH`] raw records at a
/// time, each fetch resuming after the last key of the previous one.
///
/// Consumers that stop early never read the rest of the range.
pub(crate) struct BatchedScan<K, F> {
    fetch: F,
    resume: Option<K>,
    buffer: std::vec::IntoIter<Edge>,
    exhausted: bool,
}

impl<K, F> BatchedScan<K, F>
where
    F: FnMut(Option<&K>) -> Result<ScanBatch<K>, RelationError>,
{
    pub(crate) fn new(fetch: F) -> Self {
        Self {
            fetch,
            resume: None,
            buffer: Vec::new().into_iter(),
            exhausted: false,
        }
    }
}

impl<K, F> Iterator for BatchedScan<K, F>
where
    F: FnMut(Option<&K>) -> Result<ScanBatch<K>, RelationError>,
{
    type Item = Result<Edge, RelationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.next() {
                return Some(Ok(record));
            }
            if self.exhausted {
                return None;
            }
            match (self.fetch)(self.resume.as_ref()) {
                Ok(batch) => {
                    self.exhausted = batch.resume.is_none();
                    self.resume = batch.resume;
                    self.buffer = batch.records.into_iter();
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

// =============================================================================
// EDGESTORE TRAIT
// =============================================================================

/// The graph-edge store, partitioned per organization.
///
/// Implementations must be safe under concurrent writers. Every call
/// blocks until the store acknowledges it.
pub trait EdgeStore: Send + Sync {
    /// Append a live edge record.
    fn write_edge(&self, scope: &OrganizationScope, edge: &Edge) -> Result<(), RelationError>;

    /// Append a tombstone for the edge's triple at the edge's version.
    fn delete_edge(&self, scope: &OrganizationScope, edge: &Edge) -> Result<(), RelationError>;

    /// Records leaving `search.node`.
    fn edges_from_source<'a>(
        &'a self,
        scope: &OrganizationScope,
        search: &SearchByEdgeType,
    ) -> Result<EdgeStream<'a>, RelationError>;

    /// Records arriving at `search.node`.
    fn edges_to_target<'a>(
        &'a self,
        scope: &OrganizationScope,
        search: &SearchByEdgeType,
    ) -> Result<EdgeStream<'a>, RelationError>;
}

// =============================================================================
// IN-MEMORY EDGE STORE
// =============================================================================

/// Log key: (node, edge type, peer, version).
type LogKey = (Uuid, String, Uuid, Version);

/// Which of the two log indexes a search reads.
#[derive(Debug, Clone, Copy)]
enum Direction {
    Outgoing,
    Incoming,
}

/// One organization's edge log, indexed both ways.
#[derive(Debug, Default)]
struct EdgeLog {
    by_source: BTreeMap<LogKey, Edge>,
    by_target: BTreeMap<LogKey, Edge>,
}

impl EdgeLog {
    fn append(&mut self, record: Edge) {
        self.by_source.insert(
            (
                record.source.uuid,
                record.edge_type.clone(),
                record.target.uuid,
                record.version,
            ),
            record.clone(),
        );
        self.by_target.insert(
            (
                record.target.uuid,
                record.edge_type.clone(),
                record.source.uuid,
                record.version,
            ),
            record,
        );
    }

    /// Up to one batch of `search.node`'s records, after `after` if given.
    fn scan(
        index: &BTreeMap<LogKey, Edge>,
        search: &SearchByEdgeType,
        after: Option<&LogKey>,
    ) -> ScanBatch<LogKey> {
        let lower = match after {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Included((
                search.node.uuid,
                String::new(),
                Uuid::nil(),
                Version::from_uuid(Uuid::nil()),
            )),
        };
        let mut batch = ScanBatch::exhausted();
        let mut scanned = 0;
        for (key, record) in index
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.0 == search.node.uuid)
        {
            if record.version <= search.max_version && search.type_filter.matches(&key.1) {
                batch.records.push(record.clone());
            }
            scanned += 1;
            if scanned == primitives::SCAN_BATCH {
                batch.resume = Some(key.clone());
                break;
            }
        }
        batch
    }
}

/// In-process append-only edge store.
///
/// Uses `BTreeMap` for deterministic ordering; a `RwLock` lets concurrent
/// relation managers write to the same organization.
#[derive(Debug, Default)]
pub struct MemoryEdgeStore {
    logs: RwLock<BTreeMap<OrganizationScope, EdgeLog>>,
}

impl MemoryEdgeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records (live and tombstoned) in an organization's log.
    pub fn record_count(&self, scope: &OrganizationScope) -> Result<usize, RelationError> {
        let logs = self
            .logs
            .read()
            .map_err(|_| RelationError::Backend("edge store lock poisoned".to_string()))?;
        Ok(logs.get(scope).map_or(0, |log| log.by_source.len()))
    }

    fn append(&self, scope: &OrganizationScope, record: Edge) -> Result<(), RelationError> {
        let mut logs = self
            .logs
            .write()
            .map_err(|_| RelationError::Backend("edge store lock poisoned".to_string()))?;
        logs.entry(scope.clone()).or_default().append(record);
        Ok(())
    }

    fn batch(
        &self,
        scope: &OrganizationScope,
        search: &SearchByEdgeType,
        direction: Direction,
        after: Option<&LogKey>,
    ) -> Result<ScanBatch<LogKey>, RelationError> {
        let logs = self
            .logs
            .read()
            .map_err(|_| RelationError::Backend("edge store lock poisoned".to_string()))?;
        let Some(log) = logs.get(scope) else {
            return Ok(ScanBatch::exhausted());
        };
        let index = match direction {
            Direction::Outgoing => &log.by_source,
            Direction::Incoming => &log.by_target,
        };
        Ok(EdgeLog::scan(index, search, after))
    }
}

impl EdgeStore for MemoryEdgeStore {
    fn write_edge(&self, scope: &OrganizationScope, edge: &Edge) -> Result<(), RelationError> {
        self.append(
            scope,
            Edge {
                deleted: false,
                ..edge.clone()
            },
        )
    }

    fn delete_edge(&self, scope: &OrganizationScope, edge: &Edge) -> Result<(), RelationError> {
        self.append(scope, edge.tombstone())
    }

    fn edges_from_source<'a>(
        &'a self,
        scope: &OrganizationScope,
        search: &SearchByEdgeType,
    ) -> Result<EdgeStream<'a>, RelationError> {
        let (scope, search) = (scope.clone(), search.clone());
        Ok(Box::new(BatchedScan::new(move |after: Option<&LogKey>| {
            self.batch(&scope, &search, Direction::Outgoing, after)
        })))
    }

    fn edges_to_target<'a>(
        &'a self,
        scope: &OrganizationScope,
        search: &SearchByEdgeType,
    ) -> Result<EdgeStream<'a>, RelationError> {
        let (scope, search) = (scope.clone(), search.clone());
        Ok(Box::new(BatchedScan::new(move |after: Option<&LogKey>| {
            self.batch(&scope, &search, Direction::Incoming, after)
        })))
    }
}

// =============================================================================
// TESTS
// =============================================================================
