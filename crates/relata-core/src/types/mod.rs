//! # Core Type Definitions
//!
//! This module contains the value types shared by every layer of the
//! relation core:
//! - Entity addressing (`EntityRef`, `Version`)
//! - Store-side and caller-side entity forms (`EntitySnapshot`, `Entity`)
//! - Relationship value objects (`ConnectionRef`, `ConnectedEntityRef`)
//! - Search output (`Results`, `ResultsLevel`)
//! - Error types (`RelationError`)
//!
//! ## Ordering Guarantees
//!
//! Identifiers and versions implement `Ord` so they can key `BTreeMap`s
//! and produce deterministic enumeration order. `Version` tokens are
//! time-ordered UUIDs (v7): a token issued later always compares greater.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Field map of an entity. Ordered for deterministic output.
pub type Properties = BTreeMap<String, Value>;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifies an entity: its UUID plus its type name.
///
/// The UUID is globally unique within a store; the type name selects the
/// default collection scope the entity's snapshots live in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// The entity UUID.
    pub uuid: Uuid,
    /// The entity type name (e.g. `user`, `device`).
    pub entity_type: String,
}

impl EntityRef {
    /// Create a reference from a type name and UUID.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            uuid,
            entity_type: entity_type.into(),
        }
    }

    /// The type name as a string slice.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.uuid)
    }
}

/// A time-ordered version token.
///
/// Issued for every entity write and every edge record. Tokens issued by
/// the same process are strictly increasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(Uuid);

impl Version {
    /// Issue a fresh token for the current instant.
    #[must_use]
    pub fn next() -> Self {
        Self(Uuid::now_v7())
    }

    /// The greatest possible token. Reading "as of" it sees every record.
    #[must_use]
    pub const fn latest() -> Self {
        Self(Uuid::from_bytes([0xFF; 16]))
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Issue instant in milliseconds since the Unix epoch.
    ///
    /// `None` for tokens that carry no timestamp (e.g. [`Version::latest`]).
    #[must_use]
    pub fn timestamp_millis(&self) -> Option<u64> {
        let (secs, nanos) = self.0.get_timestamp()?.to_unix();
        Some(secs * 1000 + u64::from(nanos / 1_000_000))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// A point-in-time read of an entity from the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Identity of the entity.
    pub id: EntityRef,
    /// Version of this read.
    pub version: Version,
    /// Field values at this version.
    pub fields: Properties,
}

impl EntitySnapshot {
    /// Create a snapshot.
    #[must_use]
    pub fn new(id: EntityRef, version: Version, fields: Properties) -> Self {
        Self {
            id,
            version,
            fields,
        }
    }

    /// Look up a field by name.
    ///
    /// `uuid` and `type` resolve to the identity even when they are not
    /// stored as fields.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        match self.fields.get(name) {
            Some(value) => Some(value.clone()),
            None => match name {
                crate::primitives::PROPERTY_UUID => Some(Value::String(self.id.uuid.to_string())),
                crate::primitives::PROPERTY_TYPE => Some(Value::String(self.id.entity_type.clone())),
                _ => None,
            },
        }
    }
}

/// The caller-side representation of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identity of the entity.
    pub reference: EntityRef,
    /// Properties, always including `uuid` and `type`.
    pub properties: Properties,
}

impl Entity {
    /// Create an entity, stamping the identity properties.
    #[must_use]
    pub fn new(reference: EntityRef, mut properties: Properties) -> Self {
        properties.insert(
            crate::primitives::PROPERTY_UUID.to_string(),
            Value::String(reference.uuid.to_string()),
        );
        properties.insert(
            crate::primitives::PROPERTY_TYPE.to_string(),
            Value::String(reference.entity_type.clone()),
        );
        Self {
            reference,
            properties,
        }
    }

    /// The entity UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.reference.uuid
    }

    /// The entity type name.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.reference.entity_type
    }

    /// Look up a property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

impl From<EntitySnapshot> for Entity {
    fn from(snapshot: EntitySnapshot) -> Self {
        Self::new(snapshot.id, snapshot.fields)
    }
}

// =============================================================================
// RELATIONSHIP VALUE OBJECTS
// =============================================================================

/// Describes a connection from a source entity to a target entity.
///
/// A value object only; it is never persisted as such.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRef {
    pub source: EntityRef,
    pub connection_type: String,
    pub target: EntityRef,
}

impl ConnectionRef {
    #[must_use]
    pub fn new(source: EntityRef, connection_type: impl Into<String>, target: EntityRef) -> Self {
        Self {
            source,
            connection_type: connection_type.into(),
            target,
        }
    }
}

/// One hop of a multi-hop (paired) connection description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedEntityRef {
    pub connection_type: String,
    pub target: EntityRef,
}

// =============================================================================
// RESULTS
// =============================================================================

/// Level of detail requested from legacy enumeration calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultsLevel {
    Ids,
    Refs,
    #[default]
    CoreProperties,
    AllProperties,
}

/// A page of entities returned from a search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Results {
    /// Entities in result order.
    pub entities: Vec<Entity>,
    /// Cursor for the next page, if more results exist.
    pub cursor: Option<String>,
}

impl Results {
    /// An empty result page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a single page from entities.
    #[must_use]
    pub fn from_entities(entities: Vec<Entity>) -> Self {
        Self {
            entities,
            cursor: None,
        }
    }

    /// Attach the next-page cursor.
    #[must_use]
    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// References of every entity in the page.
    #[must_use]
    pub fn refs(&self) -> Vec<EntityRef> {
        self.entities.iter().map(|e| e.reference.clone()).collect()
    }

    /// Check whether an entity with this UUID is in the page.
    #[must_use]
    pub fn contains(&self, uuid: Uuid) -> bool {
        self.entities.iter().any(|e| e.uuid() == uuid)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the relation layer.
///
/// - No silent failures: collaborator errors propagate unchanged
/// - Rejections that legacy callers expect as values (schema mismatch on
///   item creation, negative membership) are not errors
#[derive(Debug, Error)]
pub enum RelationError {
    /// The entity has no loadable snapshot.
    #[error("Entity not found: {0}")]
    NotFound(EntityRef),

    /// The member type does not satisfy the collection's declared type.
    #[error("Collection {collection} holds {expected}, not {actual}")]
    SchemaMismatch {
        collection: String,
        expected: String,
        actual: String,
    },

    /// The operation belongs to the legacy surface and is not implemented.
    #[error("Not supported: {0}")]
    Unsupported(&'static str),

    /// The operation was invoked in the wrong lifecycle state.
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    /// The relationship name would collide with the reserved suffix.
    #[error("Invalid relation name: {0}")]
    InvalidRelationName(String),

    /// A collaborator failed or was unavailable.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The persistent edge log failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelationError {
    /// True for the explicit "not implemented" signal.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// True when the error names a missing entity.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================
