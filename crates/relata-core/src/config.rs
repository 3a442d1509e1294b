//! # Configuration
//!
//! Runtime knobs of the relation core, loadable from TOML.
//!
//! Every field has a default taken from [`primitives`](crate::primitives),
//! so an empty document is a valid configuration:
//!
//! ```
//! use relata_core::RelationConfig;
//!
//! let config = RelationConfig::from_toml_str("default_query_limit = 25").expect("parse");
//! assert_eq!(config.default_query_limit, 25);
//! assert_eq!(config.user_type, "user");
//! ```

use crate::{RelationError, primitives};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration shared by every relation manager built from one factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelationConfig {
    /// Suffix that marks collection edges.
    pub collection_suffix: String,
    /// Type name of the application entity.
    pub application_type: String,
    /// Type name for which email aliases are meaningful.
    pub user_type: String,
    /// Generic type name resolved from the collection name.
    pub generic_entity_type: String,
    /// Page size when a query sets none.
    pub default_query_limit: u32,
    /// Upper bound on any page size.
    pub max_query_limit: u32,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            collection_suffix: primitives::COLLECTION_SUFFIX.to_string(),
            application_type: primitives::TYPE_APPLICATION.to_string(),
            user_type: primitives::TYPE_USER.to_string(),
            generic_entity_type: primitives::TYPE_ENTITY.to_string(),
            default_query_limit: primitives::DEFAULT_QUERY_LIMIT,
            max_query_limit: primitives::MAX_QUERY_LIMIT,
        }
    }
}

impl RelationConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(document: &str) -> Result<Self, RelationError> {
        let config: Self =
            toml::from_str(document).map_err(|e| RelationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelationError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)
            .map_err(|e| RelationError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&document)
    }

    /// Check the invariants the naming convention depends on.
    pub fn validate(&self) -> Result<(), RelationError> {
        if self.collection_suffix.is_empty() {
            return Err(RelationError::Config(
                "collection_suffix must not be empty".to_string(),
            ));
        }
        if self.application_type.is_empty() || self.user_type.is_empty() {
            return Err(RelationError::Config(
                "entity type names must not be empty".to_string(),
            ));
        }
        if self.default_query_limit == 0 || self.default_query_limit > self.max_query_limit {
            return Err(RelationError::Config(format!(
                "default_query_limit {} must be in 1..={}",
                self.default_query_limit, self.max_query_limit
            )));
        }
        Ok(())
    }

    /// Clamp a requested page size into the configured bounds.
    ///
    /// Zero means "unset" and yields the default.
    #[must_use]
    pub fn effective_limit(&self, requested: u32) -> u32 {
        if requested == 0 {
            self.default_query_limit
        } else {
            requested.min(self.max_query_limit)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RelationConfig::from_toml_str("").expect("parse");
        assert_eq!(config, RelationConfig::default());
        assert_eq!(config.collection_suffix, "zzzcollectionzzz");
    }

    #[test]
    fn overrides_are_applied() {
        let config = RelationConfig::from_toml_str(
            r#"
            collection_suffix = "__coll"
            user_type = "member"
            max_query_limit = 50
            "#,
        )
        .expect("parse");
        assert_eq!(config.collection_suffix, "__coll");
        assert_eq!(config.user_type, "member");
        assert_eq!(config.effective_limit(500), 50);
        assert_eq!(config.effective_limit(0), 10);
    }

    #[test]
    fn empty_suffix_rejected() {
        let result = RelationConfig::from_toml_str(r#"collection_suffix = """#);
        assert!(matches!(result, Err(RelationError::Config(_))));
    }

    #[test]
    fn unknown_field_rejected() {
        let result = RelationConfig::from_toml_str("colection_suffix = \"x\"");
        assert!(matches!(result, Err(RelationError::Config(_))));
    }

    #[test]
    fn default_limit_above_max_rejected() {
        let result =
            RelationConfig::from_toml_str("default_query_limit = 20\nmax_query_limit = 10");
        assert!(matches!(result, Err(RelationError::Config(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "application_type = \"app\"").expect("write");

        let config = RelationConfig::load(file.path()).expect("load");
        assert_eq!(config.application_type, "app");
    }

    #[test]
    fn load_missing_file_fails() {
        let result = RelationConfig::load("/nonexistent/relata.toml");
        assert!(matches!(result, Err(RelationError::Config(_))));
    }
}
