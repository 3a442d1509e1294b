//! # Relation Manager
//!
//! Collections and connections of one head entity.
//!
//! A [`RelationManager`] is bound to one head entity for its lifetime. It
//! is built by a [`RelationManagerFactory`], initialized once (scope
//! resolution + head snapshot load), used for a handful of operations,
//! then dropped.
//!
//! ## Write ordering
//!
//! The edge store and the search index are separate systems with no
//! shared transaction. Adding to a collection writes the edge, then the
//! index entry; removing deindexes first, then tombstones the edge. Both
//! steps are idempotent, so a failed operation is retried as a whole.
//!
//! ## Read horizon
//!
//! Edge enumerations read as of a version token issued when the call
//! starts: every record acknowledged before the call is visible, later
//! ones are not.

use crate::config::RelationConfig;
use crate::edges::EdgeCoordinator;
use crate::entity::{EntityManager, EntityStore};
use crate::graph::EdgeStore;
use crate::index::{IndexCoordinator, SearchIndex};
use crate::query::LegacyQuery;
use crate::schema::SchemaRegistry;
use crate::scope::{ApplicationContext, CollectionScope, ScopeResolver};
use crate::{
    ConnectedEntityRef, ConnectionRef, Entity, EntityRef, EntitySnapshot, Properties,
    RelationError, Results, ResultsLevel, Version,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Owner type → owner UUID → collection names holding the head entity.
pub type Owners = BTreeMap<String, BTreeMap<Uuid, BTreeSet<String>>>;

// =============================================================================
// SERVICES AND FACTORY
// =============================================================================

/// The collaborators every relation manager works against.
#[derive(Clone)]
pub struct RelationServices {
    pub entity_store: Arc<dyn EntityStore>,
    pub edge_store: Arc<dyn EdgeStore>,
    pub search_index: Arc<dyn SearchIndex>,
    pub schema: Arc<dyn SchemaRegistry>,
    pub entity_manager: Arc<dyn EntityManager>,
}

impl fmt::Debug for RelationServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationServices").finish_non_exhaustive()
    }
}

/// Builds relation managers for one application.
#[derive(Debug, Clone)]
pub struct RelationManagerFactory {
    services: RelationServices,
    context: ApplicationContext,
    config: Arc<RelationConfig>,
}

impl RelationManagerFactory {
    /// Create a factory. Fails if the configuration is invalid.
    pub fn new(
        services: RelationServices,
        context: ApplicationContext,
        config: RelationConfig,
    ) -> Result<Self, RelationError> {
        config.validate()?;
        Ok(Self {
            services,
            context,
            config: Arc::new(config),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    #[must_use]
    pub fn context(&self) -> ApplicationContext {
        self.context
    }

    /// The scope resolver of this application.
    #[must_use]
    pub fn resolver(&self) -> ScopeResolver {
        ScopeResolver::new(
            self.context,
            &self.config.application_type,
            Arc::clone(&self.services.schema),
        )
    }

    /// Reference to the application entity.
    #[must_use]
    pub fn application_ref(&self) -> EntityRef {
        EntityRef::new(&self.config.application_type, self.context.application_id)
    }

    /// An uninitialized manager for `head`.
    #[must_use]
    pub fn manager(&self, head: EntityRef) -> RelationManager {
        RelationManager {
            factory: self.clone(),
            head,
            state: None,
        }
    }

    /// An initialized manager for `head`.
    pub fn open(&self, head: EntityRef) -> Result<RelationManager, RelationError> {
        let mut manager = self.manager(head);
        manager.init()?;
        Ok(manager)
    }
}

// =============================================================================
// RELATION MANAGER
// =============================================================================

/// Lifecycle of a [`RelationManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
}

/// Everything resolved at initialization.
#[derive(Debug)]
struct HeadState {
    resolver: ScopeResolver,
    head_scope: CollectionScope,
    snapshot: EntitySnapshot,
    edges: EdgeCoordinator,
    index: IndexCoordinator,
}

/// Relation operations of one head entity.
#[derive(Debug)]
pub struct RelationManager {
    factory: RelationManagerFactory,
    head: EntityRef,
    state: Option<HeadState>,
}

impl RelationManager {
    /// Resolve scopes and load the head snapshot.
    ///
    /// Fails with `NotFound` if the head has no snapshot, and with
    /// `IllegalState` if called twice.
    pub fn init(&mut self) -> Result<(), RelationError> {
        if self.state.is_some() {
            return Err(RelationError::IllegalState(
                "relation manager already initialized",
            ));
        }

        let services = &self.factory.services;
        let resolver = self.factory.resolver();
        let resolved = resolver.resolve_head(services.entity_store.as_ref(), &self.head)?;
        let edges = EdgeCoordinator::new(
            Arc::clone(&services.edge_store),
            resolver.organization_scope().clone(),
            self.factory.config.collection_suffix.clone(),
        );
        let index = IndexCoordinator::new(
            Arc::clone(&services.search_index),
            resolver.index_scope(),
            Arc::clone(&self.factory.config),
        );

        tracing::debug!(head = %self.head, scope = %resolved.scope, "relation manager initialized");
        self.state = Some(HeadState {
            resolver,
            head_scope: resolved.scope,
            snapshot: resolved.snapshot,
            edges,
            index,
        });
        Ok(())
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        if self.state.is_some() {
            Lifecycle::Initialized
        } else {
            Lifecycle::Uninitialized
        }
    }

    /// The head entity this manager is bound to.
    #[must_use]
    pub fn head_ref(&self) -> &EntityRef {
        &self.head
    }

    /// Head snapshot as loaded at initialization.
    pub fn head(&self) -> Result<&EntitySnapshot, RelationError> {
        Ok(&self.state()?.snapshot)
    }

    /// Scope the head snapshot lives in.
    pub fn head_scope(&self) -> Result<&CollectionScope, RelationError> {
        Ok(&self.state()?.head_scope)
    }

    /// Load the head's current snapshot. The cached one is left as is.
    pub fn reload(&self) -> Result<EntitySnapshot, RelationError> {
        let state = self.state()?;
        state
            .resolver
            .load(self.factory.services.entity_store.as_ref(), &self.head)
    }

    fn state(&self) -> Result<&HeadState, RelationError> {
        self.state
            .as_ref()
            .ok_or(RelationError::IllegalState("relation manager not initialized"))
    }

    fn services(&self) -> &RelationServices {
        &self.factory.services
    }

    /// Load an entity's snapshot from its default scope.
    fn load_member(
        &self,
        state: &HeadState,
        member: &EntityRef,
    ) -> Result<(EntitySnapshot, CollectionScope), RelationError> {
        let scope = state.resolver.default_scope(&member.entity_type);
        let snapshot = self
            .services()
            .entity_store
            .load(&scope, member)?
            .ok_or_else(|| RelationError::NotFound(member.clone()))?;
        Ok((snapshot, scope))
    }

    // =========================================================================
    // ENUMERATION
    // =========================================================================

    /// Every relationship name leaving the head entity.
    pub fn get_collection_indexes(
        &self,
        collection_name: &str,
    ) -> Result<BTreeSet<String>, RelationError> {
        let state = self.state()?;
        tracing::trace!(head = %self.head, collection_name, "listing edge types");
        state.edges.edge_types_from_source(&self.head)?.collect()
    }

    /// The collections holding the head entity, grouped by owner.
    ///
    /// The application always owns the head under its type's default
    /// collection, whether or not an edge says so.
    pub fn get_owners(&self) -> Result<Owners, RelationError> {
        let state = self.state()?;
        let mut owners = Owners::new();

        let containing = state.edges.edges_to_target(
            &self.head,
            state.edges.collection_filter(),
            Version::next(),
        )?;
        for edge in containing {
            let edge = edge?;
            if let Some(name) = state.edges.collection_name(&edge.edge_type) {
                owners
                    .entry(edge.source.entity_type.clone())
                    .or_default()
                    .entry(edge.source.uuid)
                    .or_default()
                    .insert(name.to_string());
            }
        }

        let application = state.resolver.application_ref();
        let listed = owners
            .get(&application.entity_type)
            .is_some_and(|by_uuid| by_uuid.contains_key(&application.uuid));
        if !listed {
            let default_name = self
                .services()
                .schema
                .default_collection_name(&self.head.entity_type);
            tracing::debug!(head = %self.head, collection = %default_name, "application added as implicit owner");
            owners
                .entry(application.entity_type.clone())
                .or_default()
                .entry(application.uuid)
                .or_default()
                .insert(default_name);
        }
        Ok(owners)
    }

    /// Whether `candidate` is in the head's `collection_name` collection.
    pub fn is_collection_member(
        &self,
        collection_name: &str,
        candidate: &EntityRef,
    ) -> Result<bool, RelationError> {
        let edge_type = self.state()?.edges.collection_type(collection_name);
        self.is_member(&edge_type, candidate)
    }

    /// Whether the head is connected to `candidate` by `connection_name`.
    pub fn is_connection_member(
        &self,
        connection_name: &str,
        candidate: &EntityRef,
    ) -> Result<bool, RelationError> {
        self.is_member(connection_name, candidate)
    }

    fn is_member(&self, edge_type: &str, candidate: &EntityRef) -> Result<bool, RelationError> {
        self.state()?
            .edges
            .has_live_edge(&self.head, edge_type, candidate)
    }

    /// Collections the schema declares for the head's type.
    ///
    /// `None` when the schema does not know the type.
    pub fn get_collections(&self) -> Result<Option<BTreeSet<String>>, RelationError> {
        self.state()?;
        Ok(self
            .services()
            .schema
            .collections_for(&self.head.entity_type)
            .map(|collections| collections.into_keys().collect()))
    }

    // =========================================================================
    // COLLECTION MEMBERSHIP
    // =========================================================================

    /// Add `member` to the head's `collection_name` collection.
    ///
    /// Returns the member as the entity manager sees it afterwards.
    pub fn add_to_collection(
        &self,
        collection_name: &str,
        member: &EntityRef,
    ) -> Result<Entity, RelationError> {
        let state = self.state()?;
        let services = self.services();

        if let Some(info) = services
            .schema
            .collection_for(&self.head.entity_type, collection_name)
        {
            if !info.accepts(&member.entity_type) {
                return Err(RelationError::SchemaMismatch {
                    collection: collection_name.to_string(),
                    expected: info.member_type,
                    actual: member.entity_type.clone(),
                });
            }
        }

        let (member_snapshot, member_scope) = self.load_member(state, member)?;
        let edge = state
            .edges
            .write_collection_edge(&self.head, collection_name, &member_snapshot.id)?;
        state
            .index
            .index_connection(&state.snapshot, &edge.edge_type, &member_snapshot, &member_scope)?;

        tracing::debug!(
            head = %self.head,
            member = %member,
            collection = collection_name,
            scope = %state.head_scope,
            "added to collection"
        );
        services.entity_manager.get(member)
    }

    /// Add every owner reference into the head's `collection_name`.
    ///
    /// The name is applied to each reference as a member of the head's
    /// collection, not as a collection of each owner.
    pub fn add_to_collections(
        &self,
        owners: &[EntityRef],
        collection_name: &str,
    ) -> Result<Option<Entity>, RelationError> {
        for owner in owners {
            self.add_to_collection(collection_name, owner)?;
        }
        Ok(None)
    }

    /// Create an entity and place it in the head's collection.
    ///
    /// With the application as head the entity is created directly, with
    /// the generic entity type resolved from the collection name.
    /// Otherwise returns `None` when the collection declares a different
    /// member type, and follows a declared linked collection back to the
    /// head.
    pub fn create_item_in_collection(
        &self,
        collection_name: &str,
        item_type: &str,
        properties: Properties,
    ) -> Result<Option<Entity>, RelationError> {
        self.state()?;
        let services = self.services();
        let config = &self.factory.config;

        if self.head.uuid == self.factory.context.application_id {
            let item_type = if item_type == config.generic_entity_type {
                services.schema.singularize(collection_name)
            } else {
                item_type.to_string()
            };
            return services.entity_manager.create(&item_type, properties).map(Some);
        }

        let info = services
            .schema
            .collection_for(&self.head.entity_type, collection_name);
        if let Some(info) = &info {
            if !info.accepts(item_type) {
                tracing::debug!(
                    collection = collection_name,
                    expected = %info.member_type,
                    actual = item_type,
                    "item rejected by collection type"
                );
                return Ok(None);
            }
        }

        let created = services.entity_manager.create(item_type, properties)?;
        let item = self.add_to_collection(collection_name, &created.reference)?;

        if let Some(linked) = info.and_then(|info| info.linked) {
            let item_manager = self.factory.open(item.reference.clone())?;
            item_manager.add_to_collection(&linked, &self.head)?;
        }
        Ok(Some(item))
    }

    /// Take `member` out of the head's `collection_name` collection.
    pub fn remove_from_collection(
        &self,
        collection_name: &str,
        member: &EntityRef,
    ) -> Result<(), RelationError> {
        let state = self.state()?;
        let (member_snapshot, _) = self.load_member(state, member)?;

        state.index.deindex_connection(
            &self.head,
            &state.edges.collection_type(collection_name),
            &member_snapshot,
        )?;
        state
            .edges
            .remove_collection_edge(&self.head, collection_name, &member_snapshot.id)?;

        tracing::debug!(head = %self.head, member = %member, collection = collection_name, "removed from collection");
        Ok(())
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Search the head's `collection_name` collection.
    ///
    /// The query's entity type is set to the collection's member type.
    pub fn search_collection(
        &self,
        collection_name: &str,
        query: Option<LegacyQuery>,
    ) -> Result<Results, RelationError> {
        let state = self.state()?;
        let services = self.services();
        let mut query = query.unwrap_or_default();

        services.entity_manager.validate(&self.head)?;
        let head = self.reload()?;

        query.entity_type = Some(
            match services
                .schema
                .collection_for(&head.id.entity_type, collection_name)
            {
                Some(info) => info.member_type,
                None => services.schema.singularize(collection_name),
            },
        );
        let native = state.index.translate_query(&query);

        tracing::debug!(head = %head.id, collection = collection_name, scope = %state.head_scope, "searching collection");
        let found = state.index.search_connections(
            &head,
            &state.edges.collection_type(collection_name),
            &native,
        )?;
        if found.is_empty() {
            return Ok(Results::new());
        }

        let entities = found.snapshots.into_iter().map(Entity::from).collect();
        Ok(Results::from_entities(entities).with_cursor(found.cursor))
    }

    // =========================================================================
    // CONNECTIONS
    // =========================================================================

    /// Connect the head to `target` under `connection_type`.
    ///
    /// Writes a plain-named edge, then the index entry. Fails with
    /// `InvalidRelationName` if the name ends in the collection suffix.
    pub fn create_connection(
        &self,
        connection_type: &str,
        target: &EntityRef,
    ) -> Result<ConnectionRef, RelationError> {
        let state = self.state()?;
        let services = self.services();

        services.entity_manager.validate(&self.head)?;
        let head = self.reload()?;
        let target = services.entity_manager.validate(target)?.reference;
        let (target_snapshot, target_scope) = self.load_member(state, &target)?;

        state
            .edges
            .write_connection_edge(&head.id, connection_type, &target_snapshot.id)?;
        state
            .index
            .index_connection(&head, connection_type, &target_snapshot, &target_scope)?;

        tracing::debug!(head = %head.id, connection_type, target = %target, "connection created");
        Ok(ConnectionRef::new(head.id, connection_type, target))
    }

    /// Describe a connection from the head without creating it.
    pub fn connection_ref(
        &self,
        connection_type: &str,
        target: &EntityRef,
    ) -> Result<ConnectionRef, RelationError> {
        self.state()?;
        Ok(ConnectionRef::new(
            self.head.clone(),
            connection_type,
            target.clone(),
        ))
    }

    // =========================================================================
    // UNSUPPORTED LEGACY SURFACE
    // =========================================================================

    fn unsupported<T>(&self, operation: &'static str) -> Result<T, RelationError> {
        self.state()?;
        Err(RelationError::Unsupported(operation))
    }

    pub fn create_connection_from_ref(
        &self,
        _connection: &ConnectionRef,
    ) -> Result<ConnectionRef, RelationError> {
        self.unsupported("create_connection_from_ref")
    }

    pub fn create_paired_connection(
        &self,
        _paired_type: &str,
        _paired: &EntityRef,
        _connection_type: &str,
        _target: &EntityRef,
    ) -> Result<ConnectionRef, RelationError> {
        self.unsupported("paired connections")
    }

    pub fn create_connections(
        &self,
        _hops: &[ConnectedEntityRef],
    ) -> Result<ConnectionRef, RelationError> {
        self.unsupported("paired connections")
    }

    pub fn paired_connection_ref(
        &self,
        _paired_type: &str,
        _paired: &EntityRef,
        _connection_type: &str,
        _target: &EntityRef,
    ) -> Result<ConnectionRef, RelationError> {
        self.unsupported("paired connections")
    }

    pub fn connection_refs(
        &self,
        _hops: &[ConnectedEntityRef],
    ) -> Result<ConnectionRef, RelationError> {
        self.unsupported("paired connections")
    }

    pub fn delete_connection(&self, _connection: &ConnectionRef) -> Result<(), RelationError> {
        self.unsupported("delete_connection")
    }

    pub fn get_connection_types(
        &self,
        _connected: Uuid,
    ) -> Result<BTreeSet<String>, RelationError> {
        self.unsupported("get_connection_types")
    }

    pub fn get_connection_types_filtered(
        &self,
        _filter_connection: bool,
    ) -> Result<BTreeSet<String>, RelationError> {
        self.unsupported("get_connection_types")
    }

    pub fn get_connected_entities(
        &self,
        _connection_type: &str,
        _connected_type: &str,
        _level: ResultsLevel,
    ) -> Result<Results, RelationError> {
        self.unsupported("get_connected_entities")
    }

    pub fn get_connecting_entities(
        &self,
        _connection_type: &str,
        _entity_type: &str,
        _level: ResultsLevel,
    ) -> Result<Results, RelationError> {
        self.unsupported("get_connecting_entities")
    }

    pub fn get_connecting_entities_limited(
        &self,
        _connection_type: &str,
        _entity_type: &str,
        _level: ResultsLevel,
        _count: usize,
    ) -> Result<Results, RelationError> {
        self.unsupported("get_connecting_entities")
    }

    pub fn search_connected_entities(
        &self,
        _query: &LegacyQuery,
    ) -> Result<Results, RelationError> {
        self.unsupported("search_connected_entities")
    }

    pub fn get_connection_indexes(
        &self,
        _connection_type: &str,
    ) -> Result<BTreeSet<String>, RelationError> {
        self.unsupported("get_connection_indexes")
    }

    pub fn copy_relationships(
        &self,
        _source_relation: &str,
        _destination: &EntityRef,
        _destination_relation: &str,
    ) -> Result<(), RelationError> {
        self.unsupported("copy_relationships")
    }

    pub fn get_collection_page(
        &self,
        _collection_name: &str,
        _start: Option<Uuid>,
        _count: usize,
        _level: ResultsLevel,
        _reversed: bool,
    ) -> Result<Results, RelationError> {
        self.unsupported("get_collection")
    }

    pub fn get_collection(
        &self,
        _collection_name: &str,
        _query: &LegacyQuery,
        _level: ResultsLevel,
    ) -> Result<Results, RelationError> {
        self.unsupported("get_collection")
    }
}

// =============================================================================
// TESTS
// =============================================================================
