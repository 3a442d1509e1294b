//! # Entity Collaborators
//!
//! Interfaces to the entity snapshot store and the caller-side entity
//! manager, plus in-process implementations of both.
//!
//! The relation core only ever reads snapshots. Writing them belongs to
//! the entity store's owner; [`MemoryEntityManager`] plays that role for
//! embedded use and tests.

use crate::scope::{CollectionScope, ScopeResolver};
use crate::{Entity, EntityRef, EntitySnapshot, Properties, RelationError, Version};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

// =============================================================================
// TRAITS
// =============================================================================

/// Snapshot store for entities, partitioned by collection scope.
pub trait EntityStore: Send + Sync {
    /// Latest live snapshot of an entity, or `None` if absent.
    fn load(
        &self,
        scope: &CollectionScope,
        id: &EntityRef,
    ) -> Result<Option<EntitySnapshot>, RelationError>;
}

/// Caller-side entity façade: creation and re-resolution.
pub trait EntityManager: Send + Sync {
    /// Create an entity of a type with the given properties.
    fn create(&self, entity_type: &str, properties: Properties) -> Result<Entity, RelationError>;

    /// Fetch an entity. Fails with `NotFound` when absent.
    fn get(&self, reference: &EntityRef) -> Result<Entity, RelationError>;

    /// Ensure the entity exists and return its current form.
    fn validate(&self, reference: &EntityRef) -> Result<Entity, RelationError>;
}

// =============================================================================
// IN-MEMORY ENTITY STORE
// =============================================================================

type SnapshotMap = BTreeMap<(CollectionScope, Uuid), EntitySnapshot>;

/// In-process snapshot store.
///
/// Keeps only the latest version per entity; a write carrying an older
/// version than the stored one is ignored.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    snapshots: RwLock<SnapshotMap>,
}

impl MemoryEntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot in a scope.
    pub fn write(
        &self,
        scope: &CollectionScope,
        snapshot: EntitySnapshot,
    ) -> Result<(), RelationError> {
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| RelationError::Backend("entity store lock poisoned".to_string()))?;
        let key = (scope.clone(), snapshot.id.uuid);
        match snapshots.get(&key) {
            Some(existing) if existing.version > snapshot.version => {}
            _ => {
                snapshots.insert(key, snapshot);
            }
        }
        Ok(())
    }

    /// Remove an entity from a scope. Returns whether it was present.
    pub fn remove(&self, scope: &CollectionScope, id: &EntityRef) -> Result<bool, RelationError> {
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| RelationError::Backend("entity store lock poisoned".to_string()))?;
        Ok(snapshots.remove(&(scope.clone(), id.uuid)).is_some())
    }

    /// Number of stored snapshots across all scopes.
    pub fn len(&self) -> Result<usize, RelationError> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| RelationError::Backend("entity store lock poisoned".to_string()))?;
        Ok(snapshots.len())
    }

    pub fn is_empty(&self) -> Result<bool, RelationError> {
        Ok(self.len()? == 0)
    }
}

impl EntityStore for MemoryEntityStore {
    fn load(
        &self,
        scope: &CollectionScope,
        id: &EntityRef,
    ) -> Result<Option<EntitySnapshot>, RelationError> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| RelationError::Backend("entity store lock poisoned".to_string()))?;
        Ok(snapshots
            .get(&(scope.clone(), id.uuid))
            .filter(|snapshot| snapshot.id.entity_type == id.entity_type)
            .cloned())
    }
}

// =============================================================================
// IN-MEMORY ENTITY MANAGER
// =============================================================================

/// Minimal entity manager over a [`MemoryEntityStore`].
///
/// New entities get a time-ordered UUID and version and are written to the
/// default scope of their type.
#[derive(Debug, Clone)]
pub struct MemoryEntityManager {
    store: Arc<MemoryEntityStore>,
    resolver: ScopeResolver,
}

impl MemoryEntityManager {
    #[must_use]
    pub fn new(store: Arc<MemoryEntityStore>, resolver: ScopeResolver) -> Self {
        Self { store, resolver }
    }

    /// Write an entity with a caller-chosen UUID.
    ///
    /// Used to seed well-known entities such as the application itself.
    pub fn create_with_uuid(
        &self,
        entity_type: &str,
        uuid: Uuid,
        properties: Properties,
    ) -> Result<Entity, RelationError> {
        let reference = EntityRef::new(entity_type, uuid);
        let snapshot = EntitySnapshot::new(reference, Version::next(), properties);
        self.store
            .write(&self.resolver.default_scope(entity_type), snapshot.clone())?;
        Ok(Entity::from(snapshot))
    }

    /// Replace an entity's properties, issuing a new version.
    pub fn update(
        &self,
        reference: &EntityRef,
        properties: Properties,
    ) -> Result<Entity, RelationError> {
        self.resolver.load(self.store.as_ref(), reference)?;
        let snapshot = EntitySnapshot::new(reference.clone(), Version::next(), properties);
        self.store.write(
            &self.resolver.default_scope(&reference.entity_type),
            snapshot.clone(),
        )?;
        Ok(Entity::from(snapshot))
    }

    /// Delete an entity's snapshot.
    pub fn delete(&self, reference: &EntityRef) -> Result<(), RelationError> {
        let scope = self.resolver.default_scope(&reference.entity_type);
        if self.store.remove(&scope, reference)? {
            Ok(())
        } else {
            Err(RelationError::NotFound(reference.clone()))
        }
    }
}

impl EntityManager for MemoryEntityManager {
    fn create(&self, entity_type: &str, properties: Properties) -> Result<Entity, RelationError> {
        self.create_with_uuid(entity_type, Uuid::now_v7(), properties)
    }

    fn get(&self, reference: &EntityRef) -> Result<Entity, RelationError> {
        self.resolver
            .load(self.store.as_ref(), reference)
            .map(Entity::from)
    }

    fn validate(&self, reference: &EntityRef) -> Result<Entity, RelationError> {
        self.get(reference)
    }
}

// =============================================================================
// TESTS
// =============================================================================
