//! # redb-backed Edge Log
//!
//! A disk-backed [`EdgeStore`] using the redb embedded database.
//!
//! Every write appends one record to two tables, one keyed from the
//! source side and one from the target side, inside a single ACID
//! transaction. Keys are laid out so a byte-order scan yields the read
//! contract of [`crate::graph`]:
//!
//! ```text
//! organization (16) | node (16) | edge type (utf-8) | 0x00 | peer (16) | version (16)
//! ```
//!
//! Values are edge records in the [`formats`](crate::formats) encoding.

use crate::formats::{edge_from_bytes, edge_to_bytes};
use crate::graph::{BatchedScan, Edge, EdgeStore, EdgeStream, ScanBatch, SearchByEdgeType};
use crate::scope::OrganizationScope;
use crate::{RelationError, primitives};
use redb::{Database, ReadableDatabase, ReadableTableMetadata, TableDefinition};
use std::ops::Bound;
use std::path::Path;
use uuid::Uuid;

/// Table of encoded edge records keyed by byte layout above.
type RecordTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

/// Records keyed from the source side.
const EDGES_BY_SOURCE: RecordTable = TableDefinition::new("edges_by_source");

/// Records keyed from the target side.
const EDGES_BY_TARGET: RecordTable = TableDefinition::new("edges_by_target");

fn storage_error(e: impl std::fmt::Display) -> RelationError {
    RelationError::Storage(e.to_string())
}

/// Key prefix selecting one node's records in one organization.
fn node_prefix(scope: &OrganizationScope, node: Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(scope.organization.uuid.as_bytes());
    key.extend_from_slice(node.as_bytes());
    key
}

fn record_key(scope: &OrganizationScope, node: Uuid, edge: &Edge, peer: Uuid) -> Vec<u8> {
    let mut key = node_prefix(scope, node);
    key.extend_from_slice(edge.edge_type.as_bytes());
    key.push(0);
    key.extend_from_slice(peer.as_bytes());
    key.extend_from_slice(edge.version.as_uuid().as_bytes());
    key
}

/// A disk-backed append-only edge log.
pub struct RedbEdgeStore {
    db: Database,
}

impl std::fmt::Debug for RedbEdgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbEdgeStore").finish_non_exhaustive()
    }
}

impl RedbEdgeStore {
    /// Open or create an edge log at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RelationError> {
        let db = Database::create(path.as_ref()).map_err(storage_error)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_error)?;
            let _ = write_txn.open_table(EDGES_BY_SOURCE).map_err(storage_error)?;
            let _ = write_txn.open_table(EDGES_BY_TARGET).map_err(storage_error)?;
            write_txn.commit().map_err(storage_error)?;
        }

        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), RelationError> {
        self.db.compact().map_err(storage_error)?;
        Ok(())
    }

    /// Total number of records (live and tombstoned) across organizations.
    pub fn record_count(&self) -> Result<u64, RelationError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(EDGES_BY_SOURCE).map_err(storage_error)?;
        table.len().map_err(storage_error)
    }

    fn append(&self, scope: &OrganizationScope, record: &Edge) -> Result<(), RelationError> {
        if record.edge_type.as_bytes().contains(&0) {
            return Err(RelationError::InvalidRelationName(
                record.edge_type.escape_default().to_string(),
            ));
        }
        let bytes = edge_to_bytes(record)?;
        let source_key = record_key(scope, record.source.uuid, record, record.target.uuid);
        let target_key = record_key(scope, record.target.uuid, record, record.source.uuid);

        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut by_source = write_txn.open_table(EDGES_BY_SOURCE).map_err(storage_error)?;
            by_source
                .insert(source_key.as_slice(), bytes.as_slice())
                .map_err(storage_error)?;
        }
        {
            let mut by_target = write_txn.open_table(EDGES_BY_TARGET).map_err(storage_error)?;
            by_target
                .insert(target_key.as_slice(), bytes.as_slice())
                .map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;
        Ok(())
    }

    /// Up to one batch of `search.node`'s records, after the raw key
    /// `after` if given. Each batch runs in its own read transaction.
    fn scan(
        &self,
        table: RecordTable,
        scope: &OrganizationScope,
        search: &SearchByEdgeType,
        after: Option<&Vec<u8>>,
    ) -> Result<ScanBatch<Vec<u8>>, RelationError> {
        let prefix = node_prefix(scope, search.node.uuid);
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(table).map_err(storage_error)?;

        let lower = match after {
            Some(key) => Bound::Excluded(key.as_slice()),
            None => Bound::Included(prefix.as_slice()),
        };
        let mut batch = ScanBatch::exhausted();
        let mut scanned = 0;
        for entry in table
            .range::<&[u8]>((lower, Bound::Unbounded))
            .map_err(storage_error)?
        {
            let (key, value) = entry.map_err(storage_error)?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let record = edge_from_bytes(value.value())?;
            if record.version <= search.max_version && search.type_filter.matches(&record.edge_type)
            {
                batch.records.push(record);
            }
            scanned += 1;
            if scanned == primitives::SCAN_BATCH {
                batch.resume = Some(key.value().to_vec());
                break;
            }
        }
        Ok(batch)
    }

    fn stream<'a>(
        &'a self,
        table: RecordTable,
        scope: &OrganizationScope,
        search: &SearchByEdgeType,
    ) -> EdgeStream<'a> {
        let (scope, search) = (scope.clone(), search.clone());
        Box::new(BatchedScan::new(move |after: Option<&Vec<u8>>| {
            self.scan(table, &scope, &search, after)
        }))
    }
}

impl EdgeStore for RedbEdgeStore {
    fn write_edge(&self, scope: &OrganizationScope, edge: &Edge) -> Result<(), RelationError> {
        self.append(
            scope,
            &Edge {
                deleted: false,
                ..edge.clone()
            },
        )
    }

    fn delete_edge(&self, scope: &OrganizationScope, edge: &Edge) -> Result<(), RelationError> {
        self.append(scope, &edge.tombstone())
    }

    fn edges_from_source<'a>(
        &'a self,
        scope: &OrganizationScope,
        search: &SearchByEdgeType,
    ) -> Result<EdgeStream<'a>, RelationError> {
        Ok(self.stream(EDGES_BY_SOURCE, scope, search))
    }

    fn edges_to_target<'a>(
        &'a self,
        scope: &OrganizationScope,
        search: &SearchByEdgeType,
    ) -> Result<EdgeStream<'a>, RelationError> {
        Ok(self.stream(EDGES_BY_TARGET, scope, search))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TypeFilter;
    use crate::{EntityRef, Version};
    use tempfile::tempdir;

    fn node(entity_type: &str) -> EntityRef {
        EntityRef::new(entity_type, Uuid::now_v7())
    }

    fn read_from(store: &RedbEdgeStore, scope: &OrganizationScope, node: &EntityRef) -> Vec<Edge> {
        let search = SearchByEdgeType::new(node.clone(), TypeFilter::Any, Version::latest());
        store
            .edges_from_source(scope, &search)
            .expect("search")
            .collect::<Result<Vec<_>, _>>()
            .expect("records")
    }

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let store = RedbEdgeStore::open(temp.path().join("edges.redb")).expect("open db");
        let scope = OrganizationScope::new(Uuid::now_v7());
        let (src, dst) = (node("user"), node("device"));

        store
            .write_edge(&scope, &Edge::new(src.clone(), "owns", dst.clone(), Version::next()))
            .expect("write");

        let records = read_from(&store, &scope, &src);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, dst);
        assert_eq!(store.record_count().expect("count"), 1);
    }

    #[test]
    fn persistence() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("edges.redb");
        let scope = OrganizationScope::new(Uuid::now_v7());
        let (src, dst) = (node("user"), node("device"));

        {
            let store = RedbEdgeStore::open(&path).expect("open db");
            store
                .write_edge(&scope, &Edge::new(src.clone(), "owns", dst.clone(), Version::next()))
                .expect("write");
            store
                .delete_edge(&scope, &Edge::new(src.clone(), "owns", dst, Version::next()))
                .expect("delete");
        }

        let reopened = RedbEdgeStore::open(&path).expect("reopen db");
        let records = read_from(&reopened, &scope, &src);
        assert_eq!(records.len(), 2);
        assert!(records[1].deleted);
    }

    #[test]
    fn scan_stops_at_node_boundary() {
        let temp = tempdir().expect("temp dir");
        let store = RedbEdgeStore::open(temp.path().join("edges.redb")).expect("open db");
        let scope = OrganizationScope::new(Uuid::now_v7());
        let (a, b, c) = (node("user"), node("user"), node("device"));

        store
            .write_edge(&scope, &Edge::new(a.clone(), "owns", c.clone(), Version::next()))
            .expect("write");
        store
            .write_edge(&scope, &Edge::new(b.clone(), "owns", c.clone(), Version::next()))
            .expect("write");

        assert_eq!(read_from(&store, &scope, &a).len(), 1);
        assert_eq!(read_from(&store, &scope, &b).len(), 1);

        let search = SearchByEdgeType::new(c, TypeFilter::Exact("owns".into()), Version::latest());
        let incoming = store
            .edges_to_target(&scope, &search)
            .expect("search")
            .count();
        assert_eq!(incoming, 2);
    }

    #[test]
    fn scan_resumes_across_batches() {
        let temp = tempdir().expect("temp dir");
        let store = RedbEdgeStore::open(temp.path().join("edges.redb")).expect("open db");
        let scope = OrganizationScope::new(Uuid::now_v7());
        let src = node("user");
        let total = primitives::SCAN_BATCH + 7;

        for _ in 0..total {
            store
                .write_edge(&scope, &Edge::new(src.clone(), "owns", node("device"), Version::next()))
                .expect("write");
        }
        store
            .write_edge(&scope, &Edge::new(node("user"), "owns", node("device"), Version::next()))
            .expect("write");

        let records = read_from(&store, &scope, &src);
        assert_eq!(records.len(), total);
        let targets: std::collections::BTreeSet<Uuid> =
            records.iter().map(|r| r.target.uuid).collect();
        assert_eq!(targets.len(), total);
    }

    #[test]
    fn nul_in_edge_type_rejected() {
        let temp = tempdir().expect("temp dir");
        let store = RedbEdgeStore::open(temp.path().join("edges.redb")).expect("open db");
        let scope = OrganizationScope::new(Uuid::now_v7());

        let result = store.write_edge(
            &scope,
            &Edge::new(node("user"), "bad\0type", node("device"), Version::next()),
        );
        assert!(matches!(result, Err(RelationError::InvalidRelationName(_))));
    }
}
