//! In-process search index.
//!
//! Entries are kept per [`IndexScope`], keyed by (source, edge type,
//! target) so one source's entries for one edge type are a contiguous
//! range in target-UUID order, which for time-ordered UUIDs is creation
//! order. Cursors are decimal offsets into the filtered, sorted match list.

use super::{IndexResults, SearchIndex};
use crate::query::{NativeQuery, SortDirection};
use crate::scope::{CollectionScope, IndexScope};
use crate::{EntityRef, EntitySnapshot, RelationError, primitives};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::RwLock;
use uuid::Uuid;

/// (source, edge type, target)
type EntryKey = (Uuid, String, Uuid);

#[derive(Debug, Clone)]
struct IndexEntry {
    target: EntitySnapshot,
    target_scope: CollectionScope,
}

impl IndexEntry {
    fn matches(&self, query: &NativeQuery) -> bool {
        if let Some(entity_type) = &query.entity_type {
            if self.target.id.entity_type != *entity_type {
                return false;
            }
        }
        if let Some(collection) = &query.collection {
            if self.target_scope.name != *collection {
                return false;
            }
        }
        if query.start_time.is_some() || query.finish_time.is_some() {
            let Some(written) = self.target.version.timestamp_millis() else {
                return false;
            };
            if query.start_time.is_some_and(|start| written < start)
                || query.finish_time.is_some_and(|finish| written > finish)
            {
                return false;
            }
        }
        query
            .root_operand
            .as_ref()
            .is_none_or(|operand| operand.evaluate(&self.target))
    }
}

/// Order two optional field values: absent first, then by JSON kind.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn parse_cursor(cursor: Option<&str>) -> Result<usize, RelationError> {
    match cursor {
        None => Ok(0),
        Some(text) => text
            .parse()
            .map_err(|_| RelationError::Backend(format!("invalid cursor: {}", text))),
    }
}

/// Connection index held in process memory.
#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    entries: RwLock<BTreeMap<IndexScope, BTreeMap<EntryKey, IndexEntry>>>,
}

impl MemorySearchIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in one scope.
    pub fn entry_count(&self, scope: &IndexScope) -> Result<usize, RelationError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RelationError::Backend("search index lock poisoned".to_string()))?;
        Ok(entries.get(scope).map_or(0, BTreeMap::len))
    }
}

impl SearchIndex for MemorySearchIndex {
    fn index_connection(
        &self,
        scope: &IndexScope,
        source: &EntitySnapshot,
        edge_type: &str,
        target: &EntitySnapshot,
        target_scope: &CollectionScope,
    ) -> Result<(), RelationError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| RelationError::Backend("search index lock poisoned".to_string()))?;
        entries.entry(scope.clone()).or_default().insert(
            (source.id.uuid, edge_type.to_string(), target.id.uuid),
            IndexEntry {
                target: target.clone(),
                target_scope: target_scope.clone(),
            },
        );
        Ok(())
    }

    fn deindex_connection(
        &self,
        scope: &IndexScope,
        source: &EntityRef,
        edge_type: &str,
        target: &EntitySnapshot,
    ) -> Result<(), RelationError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| RelationError::Backend("search index lock poisoned".to_string()))?;
        if let Some(scoped) = entries.get_mut(scope) {
            scoped.remove(&(source.uuid, edge_type.to_string(), target.id.uuid));
        }
        Ok(())
    }

    fn search(
        &self,
        scope: &IndexScope,
        source: &EntitySnapshot,
        edge_type: &str,
        query: &NativeQuery,
    ) -> Result<IndexResults, RelationError> {
        let offset = parse_cursor(query.cursor.as_deref())?;
        let entries = self
            .entries
            .read()
            .map_err(|_| RelationError::Backend("search index lock poisoned".to_string()))?;
        let Some(scoped) = entries.get(scope) else {
            return Ok(IndexResults::default());
        };

        let start: EntryKey = (source.id.uuid, edge_type.to_string(), Uuid::nil());
        let mut matches: Vec<&IndexEntry> = scoped
            .range(start..)
            .take_while(|((s, t, _), _)| *s == source.id.uuid && t.as_str() == edge_type)
            .map(|(_, entry)| entry)
            .filter(|entry| entry.matches(query))
            .collect();

        for predicate in query.sort.iter().rev() {
            matches.sort_by(|a, b| {
                let order = compare_fields(
                    a.target.field(&predicate.property).as_ref(),
                    b.target.field(&predicate.property).as_ref(),
                );
                match predicate.direction {
                    SortDirection::Ascending => order,
                    SortDirection::Descending => order.reverse(),
                }
            });
        }
        if query.reversed {
            matches.reverse();
        }

        let limit = if query.limit == 0 {
            primitives::DEFAULT_QUERY_LIMIT
        } else {
            query.limit
        } as usize;
        let total = matches.len();
        let snapshots: Vec<EntitySnapshot> = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|entry| entry.target.clone())
            .collect();
        let end = offset.saturating_add(snapshots.len());

        Ok(IndexResults {
            snapshots,
            cursor: (end < total).then(|| end.to_string()),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Operand, SortPredicate};
    use crate::scope::OrganizationScope;
    use crate::{Properties, Version};
    use serde_json::json;

    struct Fixture {
        index: MemorySearchIndex,
        scope: IndexScope,
        head: EntitySnapshot,
        devices: CollectionScope,
    }

    fn fixture() -> Fixture {
        let organization = OrganizationScope::new(Uuid::now_v7());
        let app = EntityRef::new("application", Uuid::now_v7());
        let scope = IndexScope {
            application: CollectionScope::new(
                organization.organization.clone(),
                app.clone(),
                "applications",
            ),
            organization: organization.clone(),
        };
        Fixture {
            index: MemorySearchIndex::new(),
            devices: CollectionScope::new(organization.organization, app.clone(), "devices"),
            head: EntitySnapshot::new(app, Version::next(), Properties::new()),
            scope,
        }
    }

    fn device(name: &str, rank: i64) -> EntitySnapshot {
        let mut fields = Properties::new();
        fields.insert("name".into(), json!(name));
        fields.insert("rank".into(), json!(rank));
        EntitySnapshot::new(EntityRef::new("device", Uuid::now_v7()), Version::next(), fields)
    }

    fn names(results: &IndexResults) -> Vec<String> {
        results
            .snapshots
            .iter()
            .filter_map(|s| s.field("name").and_then(|v| v.as_str().map(str::to_string)))
            .collect()
    }

    fn populate(f: &Fixture, items: &[(&str, i64)]) {
        for (name, rank) in items {
            f.index
                .index_connection(&f.scope, &f.head, "devices", &device(name, *rank), &f.devices)
                .expect("index");
        }
    }

    fn query() -> NativeQuery {
        NativeQuery {
            limit: 10,
            ..NativeQuery::default()
        }
    }

    #[test]
    fn default_order_is_insertion() {
        let f = fixture();
        populate(&f, &[("a", 3), ("b", 1), ("c", 2)]);
        let found = f.index.search(&f.scope, &f.head, "devices", &query()).expect("search");
        assert_eq!(names(&found), vec!["a", "b", "c"]);
        assert_eq!(found.cursor, None);
    }

    #[test]
    fn upsert_replaces_entry() {
        let f = fixture();
        let item = device("a", 1);
        for _ in 0..2 {
            f.index
                .index_connection(&f.scope, &f.head, "devices", &item, &f.devices)
                .expect("index");
        }
        assert_eq!(f.index.entry_count(&f.scope).expect("count"), 1);
    }

    #[test]
    fn filter_and_type_restriction() {
        let f = fixture();
        populate(&f, &[("a", 1), ("b", 2)]);
        let mut q = query();
        q.root_operand = Some(Operand::equal("name", "b"));
        assert_eq!(
            names(&f.index.search(&f.scope, &f.head, "devices", &q).expect("search")),
            vec!["b"]
        );

        q.root_operand = None;
        q.entity_type = Some("user".into());
        assert!(f.index.search(&f.scope, &f.head, "devices", &q).expect("search").is_empty());
    }

    #[test]
    fn sort_and_reverse() {
        let f = fixture();
        populate(&f, &[("a", 3), ("b", 1), ("c", 2)]);
        let mut q = query();
        q.sort = vec![SortPredicate::new("rank", SortDirection::Ascending)];
        assert_eq!(
            names(&f.index.search(&f.scope, &f.head, "devices", &q).expect("search")),
            vec!["b", "c", "a"]
        );

        q.reversed = true;
        assert_eq!(
            names(&f.index.search(&f.scope, &f.head, "devices", &q).expect("search")),
            vec!["a", "c", "b"]
        );
    }

    #[test]
    fn paging_with_cursor() {
        let f = fixture();
        populate(&f, &[("a", 1), ("b", 2), ("c", 3)]);
        let mut q = query();
        q.limit = 2;

        let first = f.index.search(&f.scope, &f.head, "devices", &q).expect("search");
        assert_eq!(names(&first), vec!["a", "b"]);
        assert_eq!(first.cursor.as_deref(), Some("2"));

        q.cursor = first.cursor;
        let second = f.index.search(&f.scope, &f.head, "devices", &q).expect("search");
        assert_eq!(names(&second), vec!["c"]);
        assert_eq!(second.cursor, None);
    }

    #[test]
    fn invalid_cursor_rejected() {
        let f = fixture();
        let mut q = query();
        q.cursor = Some("not-a-number".into());
        assert!(f.index.search(&f.scope, &f.head, "devices", &q).is_err());
    }

    #[test]
    fn edge_types_are_separate() {
        let f = fixture();
        populate(&f, &[("a", 1)]);
        assert!(f.index.search(&f.scope, &f.head, "likes", &query()).expect("search").is_empty());
    }

    #[test]
    fn time_window() {
        let f = fixture();
        populate(&f, &[("a", 1)]);
        let mut q = query();
        q.finish_time = Some(0);
        assert!(f.index.search(&f.scope, &f.head, "devices", &q).expect("search").is_empty());
        q.finish_time = None;
        q.start_time = Some(0);
        assert_eq!(f.index.search(&f.scope, &f.head, "devices", &q).expect("search").snapshots.len(), 1);
    }
}
