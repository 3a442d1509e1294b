//! # Scope Resolution
//!
//! Computes the addressing tuples every other component works in.
//!
//! A tenant is an organization; an organization owns applications; an
//! application owns named collections. Entity snapshots live in a
//! [`CollectionScope`] (organization, owner, name), edges live in an
//! [`OrganizationScope`], and index entries live in an [`IndexScope`]
//! (organization + application). Scopes are immutable values built once
//! per manager and handed down, never rebuilt inline from primitives.

use crate::entity::EntityStore;
use crate::schema::SchemaRegistry;
use crate::{EntityRef, EntitySnapshot, RelationError, primitives};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The tenant a request runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationContext {
    pub organization_id: Uuid,
    pub application_id: Uuid,
}

impl ApplicationContext {
    #[must_use]
    pub const fn new(organization_id: Uuid, application_id: Uuid) -> Self {
        Self {
            organization_id,
            application_id,
        }
    }
}

/// Addressing scope of the organization-wide edge store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrganizationScope {
    pub organization: EntityRef,
}

impl OrganizationScope {
    #[must_use]
    pub fn new(organization_id: Uuid) -> Self {
        Self {
            organization: EntityRef::new(primitives::TYPE_ORGANIZATION, organization_id),
        }
    }
}

/// Where the snapshots of one logical collection live.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionScope {
    pub organization: EntityRef,
    pub owner: EntityRef,
    pub name: String,
}

impl CollectionScope {
    #[must_use]
    pub fn new(organization: EntityRef, owner: EntityRef, name: impl Into<String>) -> Self {
        Self {
            organization,
            owner,
            name: name.into(),
        }
    }
}

impl fmt::Display for CollectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organization.uuid, self.owner, self.name)
    }
}

/// Addressing scope of the search index: organization plus application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexScope {
    pub organization: OrganizationScope,
    pub application: CollectionScope,
}

// =============================================================================
// RESOLVER
// =============================================================================

/// The head entity's scope together with its loaded snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHead {
    pub scope: CollectionScope,
    pub snapshot: EntitySnapshot,
}

/// Derives every scope of one tenant.
#[derive(Clone)]
pub struct ScopeResolver {
    organization: OrganizationScope,
    application: CollectionScope,
    schema: Arc<dyn SchemaRegistry>,
}

impl fmt::Debug for ScopeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeResolver")
            .field("organization", &self.organization)
            .field("application", &self.application)
            .finish_non_exhaustive()
    }
}

impl ScopeResolver {
    /// Build the resolver for a tenant.
    ///
    /// The application scope is owned by the application entity and named
    /// after the default collection of the application type.
    pub fn new(
        context: ApplicationContext,
        application_type: &str,
        schema: Arc<dyn SchemaRegistry>,
    ) -> Self {
        let organization = OrganizationScope::new(context.organization_id);
        let application = CollectionScope::new(
            organization.organization.clone(),
            EntityRef::new(application_type, context.application_id),
            schema.default_collection_name(application_type),
        );
        Self {
            organization,
            application,
            schema,
        }
    }

    /// Scope of the organization-wide edge store.
    #[must_use]
    pub fn organization_scope(&self) -> &OrganizationScope {
        &self.organization
    }

    /// Fixed application-level scope of the tenant.
    #[must_use]
    pub fn application_scope(&self) -> &CollectionScope {
        &self.application
    }

    /// Reference to the application entity itself.
    #[must_use]
    pub fn application_ref(&self) -> &EntityRef {
        &self.application.owner
    }

    /// Scope of the search index.
    #[must_use]
    pub fn index_scope(&self) -> IndexScope {
        IndexScope {
            organization: self.organization.clone(),
            application: self.application.clone(),
        }
    }

    /// Scope of a named collection inside the application.
    #[must_use]
    pub fn collection_scope(&self, name: impl Into<String>) -> CollectionScope {
        CollectionScope::new(
            self.application.organization.clone(),
            self.application.owner.clone(),
            name,
        )
    }

    /// Default scope for an entity type: its pluralized collection.
    #[must_use]
    pub fn default_scope(&self, entity_type: &str) -> CollectionScope {
        self.collection_scope(self.schema.default_collection_name(entity_type))
    }

    /// Load an entity's current snapshot from its default scope.
    pub fn load(
        &self,
        store: &dyn EntityStore,
        reference: &EntityRef,
    ) -> Result<EntitySnapshot, RelationError> {
        let scope = self.default_scope(&reference.entity_type);
        store
            .load(&scope, reference)?
            .ok_or_else(|| RelationError::NotFound(reference.clone()))
    }

    /// Resolve the head entity's scope and load its snapshot.
    pub fn resolve_head(
        &self,
        store: &dyn EntityStore,
        head: &EntityRef,
    ) -> Result<ResolvedHead, RelationError> {
        let scope = self.default_scope(&head.entity_type);
        let snapshot = store
            .load(&scope, head)?
            .ok_or_else(|| RelationError::NotFound(head.clone()))?;
        Ok(ResolvedHead { scope, snapshot })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::MemoryEntityStore;
    use crate::schema::DefaultSchema;
    use crate::{Properties, Version};

    fn resolver() -> (ScopeResolver, ApplicationContext) {
        let context = ApplicationContext::new(Uuid::now_v7(), Uuid::now_v7());
        let resolver = ScopeResolver::new(context, "application", Arc::new(DefaultSchema::new()));
        (resolver, context)
    }

    #[test]
    fn application_scope_is_owned_by_application() {
        let (resolver, context) = resolver();
        let scope = resolver.application_scope();

        assert_eq!(scope.organization.uuid, context.organization_id);
        assert_eq!(scope.owner.uuid, context.application_id);
        assert_eq!(scope.owner.entity_type, "application");
        assert_eq!(scope.name, "applications");
    }

    #[test]
    fn default_scope_is_deterministic() {
        let (resolver, _) = resolver();
        let first = resolver.default_scope("device");
        let second = resolver.default_scope("device");

        assert_eq!(first, second);
        assert_eq!(first.name, "devices");
        assert_eq!(first.owner, *resolver.application_ref());
    }

    #[test]
    fn resolve_head_missing_is_not_found() {
        let (resolver, _) = resolver();
        let store = MemoryEntityStore::new();
        let head = EntityRef::new("user", Uuid::now_v7());

        let result = resolver.resolve_head(&store, &head);
        assert!(matches!(result, Err(RelationError::NotFound(r)) if r == head));
    }

    #[test]
    fn resolve_head_loads_snapshot() {
        let (resolver, _) = resolver();
        let store = MemoryEntityStore::new();
        let head = EntityRef::new("user", Uuid::now_v7());
        let snapshot = EntitySnapshot::new(head.clone(), Version::next(), Properties::new());
        store
            .write(&resolver.default_scope("user"), snapshot.clone())
            .expect("write");

        let resolved = resolver.resolve_head(&store, &head).expect("resolve");
        assert_eq!(resolved.snapshot, snapshot);
        assert_eq!(resolved.scope.name, "users");
    }
}
