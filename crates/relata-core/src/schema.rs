//! # Schema Registry
//!
//! Collection declarations per entity type.
//!
//! The relation core never stores schema metadata itself; it asks a
//! [`SchemaRegistry`] which collections a type declares, what member type
//! each collection holds, and how type names map to default collection
//! names. [`DefaultSchema`] is an in-process registry that can be built in
//! code or declared in TOML:
//!
//! ```toml
//! [types.user.collections.devices]
//! type = "device"
//! linked = "owners"
//!
//! [types.device.collections.owners]
//! type = "user"
//! ```

use crate::{RelationError, inflection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Declaration of one named collection on an owner type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Member type every item of the collection must have.
    #[serde(rename = "type")]
    pub member_type: String,
    /// Collection on the member that receives the owner in return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked: Option<String>,
}

impl CollectionInfo {
    /// A collection of `member_type` with no reciprocal collection.
    #[must_use]
    pub fn new(member_type: impl Into<String>) -> Self {
        Self {
            member_type: member_type.into(),
            linked: None,
        }
    }

    /// Declare the reciprocal collection on the member.
    #[must_use]
    pub fn linked_to(mut self, linked: impl Into<String>) -> Self {
        self.linked = Some(linked.into());
        self
    }

    /// Check an item type against the member-type constraint.
    #[must_use]
    pub fn accepts(&self, item_type: &str) -> bool {
        self.member_type == item_type
    }
}

// =============================================================================
// SCHEMA REGISTRY TRAIT
// =============================================================================

/// Source of schema metadata for the relation core.
///
/// Implementors must be `Send + Sync`; one registry is shared by every
/// relation manager of a factory.
pub trait SchemaRegistry: Send + Sync {
    /// All collections declared on a type, or `None` if the type is unknown.
    fn collections_for(&self, entity_type: &str) -> Option<BTreeMap<String, CollectionInfo>>;

    /// One collection declared on a type.
    fn collection_for(&self, entity_type: &str, name: &str) -> Option<CollectionInfo>;

    /// Name of the collection that holds every entity of a type.
    fn default_collection_name(&self, entity_type: &str) -> String;

    /// Singular form of a collection name.
    fn singularize(&self, name: &str) -> String;
}

// =============================================================================
// DEFAULT SCHEMA
// =============================================================================

/// Collections declared on one owner type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionInfo>,
}

/// In-process schema registry.
///
/// Types are known once they declare at least one collection or are
/// registered with [`DefaultSchema::with_type`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultSchema {
    #[serde(default)]
    types: BTreeMap<String, TypeDefinition>,
}

impl DefaultSchema {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type with no collections.
    #[must_use]
    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.types.entry(entity_type.into()).or_default();
        self
    }

    /// Declare a collection on an owner type.
    #[must_use]
    pub fn with_collection(
        mut self,
        owner_type: impl Into<String>,
        name: impl Into<String>,
        info: CollectionInfo,
    ) -> Self {
        self.types
            .entry(owner_type.into())
            .or_default()
            .collections
            .insert(name.into(), info);
        self
    }

    /// Parse a TOML schema document.
    pub fn from_toml_str(document: &str) -> Result<Self, RelationError> {
        toml::from_str(document).map_err(|e| RelationError::Config(e.to_string()))
    }

    /// Read and parse a TOML schema file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelationError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)
            .map_err(|e| RelationError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&document)
    }

    /// Number of registered types.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}

impl SchemaRegistry for DefaultSchema {
    fn collections_for(&self, entity_type: &str) -> Option<BTreeMap<String, CollectionInfo>> {
        self.types
            .get(entity_type)
            .map(|definition| definition.collections.clone())
    }

    fn collection_for(&self, entity_type: &str, name: &str) -> Option<CollectionInfo> {
        self.types
            .get(entity_type)
            .and_then(|definition| definition.collections.get(name))
            .cloned()
    }

    fn default_collection_name(&self, entity_type: &str) -> String {
        inflection::pluralize(&entity_type.to_ascii_lowercase())
    }

    fn singularize(&self, name: &str) -> String {
        inflection::singularize(name)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DefaultSchema {
        DefaultSchema::new()
            .with_collection(
                "user",
                "devices",
                CollectionInfo::new("device").linked_to("owners"),
            )
            .with_collection("device", "owners", CollectionInfo::new("user"))
            .with_type("asset")
    }

    #[test]
    fn lookup_declared_collection() {
        let schema = sample();
        let info = schema.collection_for("user", "devices").expect("declared");
        assert_eq!(info.member_type, "device");
        assert_eq!(info.linked.as_deref(), Some("owners"));
        assert!(info.accepts("device"));
        assert!(!info.accepts("user"));
    }

    #[test]
    fn unknown_type_has_no_collections() {
        let schema = sample();
        assert!(schema.collections_for("widget").is_none());
        assert!(schema.collection_for("widget", "parts").is_none());
    }

    #[test]
    fn registered_type_without_collections() {
        let schema = sample();
        let collections = schema.collections_for("asset").expect("known type");
        assert!(collections.is_empty());
        assert_eq!(schema.type_count(), 3);
    }

    #[test]
    fn default_collection_name_pluralizes() {
        let schema = DefaultSchema::new();
        assert_eq!(schema.default_collection_name("device"), "devices");
        assert_eq!(schema.default_collection_name("Activity"), "activities");
        assert_eq!(schema.singularize("devices"), "device");
    }

    #[test]
    fn parses_toml_declaration() {
        let schema = DefaultSchema::from_toml_str(
            r#"
            [types.user.collections.devices]
            type = "device"
            linked = "owners"

            [types.device.collections.owners]
            type = "user"
            "#,
        )
        .expect("parse");
        assert_eq!(schema, {
            DefaultSchema::new()
                .with_collection(
                    "user",
                    "devices",
                    CollectionInfo::new("device").linked_to("owners"),
                )
                .with_collection("device", "owners", CollectionInfo::new("user"))
        });
    }

    #[test]
    fn malformed_toml_rejected() {
        let result = DefaultSchema::from_toml_str("[types.user.collections.devices]\nlinked = 3");
        assert!(matches!(result, Err(RelationError::Config(_))));
    }
}
