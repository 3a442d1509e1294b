//! # Query Module
//!
//! The legacy query representation callers hand to the relation manager,
//! the native form the search index executes, and the translation between
//! them.
//!
//! - No query-language parsing: `ql` text is carried through untouched
//! - Filters are structured [`Operand`] trees
//! - A bare identifier stands in for a filter when no filter is given

use crate::{EntitySnapshot, primitives};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// A bare identifier naming one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identifier {
    Uuid(Uuid),
    Name(String),
    Email(String),
}

impl Identifier {
    /// Classify an identifier string.
    ///
    /// UUIDs first, then anything containing `@` is an email, the rest are
    /// names. Blank input is not an identifier.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(uuid) = Uuid::parse_str(text) {
            return Some(Self::Uuid(uuid));
        }
        if text.contains('@') {
            Some(Self::Email(text.to_string()))
        } else {
            Some(Self::Name(text.to_string()))
        }
    }

    #[must_use]
    pub fn is_uuid(&self) -> bool {
        matches!(self, Self::Uuid(_))
    }

    #[must_use]
    pub fn is_email(&self) -> bool {
        matches!(self, Self::Email(_))
    }

    #[must_use]
    pub fn is_name_or_email(&self) -> bool {
        matches!(self, Self::Name(_) | Self::Email(_))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(uuid) => write!(f, "{}", uuid),
            Self::Name(text) | Self::Email(text) => f.write_str(text),
        }
    }
}

// =============================================================================
// FILTERS AND SORTING
// =============================================================================

/// A structured filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// `property = value`
    Equal { property: String, value: Value },
    /// Every operand holds.
    And(Vec<Operand>),
    /// At least one operand holds.
    Or(Vec<Operand>),
    Not(Box<Operand>),
}

impl Operand {
    #[must_use]
    pub fn equal(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equal {
            property: property.into(),
            value: value.into(),
        }
    }

    /// Evaluate against a snapshot's fields.
    ///
    /// A missing field never equals anything.
    #[must_use]
    pub fn evaluate(&self, snapshot: &EntitySnapshot) -> bool {
        match self {
            Self::Equal { property, value } => {
                snapshot.field(property).is_some_and(|field| field == *value)
            }
            Self::And(operands) => operands.iter().all(|op| op.evaluate(snapshot)),
            Self::Or(operands) => operands.iter().any(|op| op.evaluate(snapshot)),
            Self::Not(operand) => !operand.evaluate(snapshot),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Order results by one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortPredicate {
    pub property: String,
    pub direction: SortDirection,
}

impl SortPredicate {
    #[must_use]
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            property: property.into(),
            direction,
        }
    }
}

// =============================================================================
// LEGACY QUERY
// =============================================================================

/// The query representation of the legacy relation API.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LegacyQuery {
    pub collection: Option<String>,
    pub connection_type: Option<String>,
    /// Opaque position of the next page.
    pub cursor: Option<String>,
    pub entity_type: Option<String>,
    /// Earliest entity version to match, in epoch milliseconds.
    pub start_time: Option<u64>,
    /// Latest entity version to match, in epoch milliseconds.
    pub finish_time: Option<u64>,
    /// Page size; 0 leaves it to the configured default.
    pub limit: u32,
    pub pad: bool,
    pub permissions: Vec<String>,
    /// Query-language text, carried through unparsed.
    pub ql: Option<String>,
    pub reversed: bool,
    pub sort: Vec<SortPredicate>,
    pub filter: Option<Operand>,
    pub identifiers: Vec<Identifier>,
}

impl LegacyQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A query naming exactly one entity by identifier.
    #[must_use]
    pub fn for_identifier(identifier: Identifier) -> Self {
        Self::new().with_identifier(identifier)
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Operand) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_identifier(mut self, identifier: Identifier) -> Self {
        self.identifiers.push(identifier);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    #[must_use]
    pub fn with_ql(mut self, ql: impl Into<String>) -> Self {
        self.ql = Some(ql.into());
        self
    }

    #[must_use]
    pub fn sort_by(mut self, property: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortPredicate::new(property, direction));
        self
    }

    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }

    /// The identifier, when the query is nothing but one identifier.
    #[must_use]
    pub fn single_identifier(&self) -> Option<&Identifier> {
        if self.filter.is_some() || !self.sort.is_empty() {
            return None;
        }
        match self.identifiers.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains_single_name_or_email_identifier(&self) -> bool {
        self.single_identifier()
            .is_some_and(Identifier::is_name_or_email)
    }

    #[must_use]
    pub fn contains_single_uuid_identifier(&self) -> bool {
        self.single_identifier().is_some_and(Identifier::is_uuid)
    }
}

// =============================================================================
// NATIVE QUERY
// =============================================================================

/// The query form the search index executes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NativeQuery {
    pub collection: Option<String>,
    pub connection_type: Option<String>,
    pub cursor: Option<String>,
    pub entity_type: Option<String>,
    pub start_time: Option<u64>,
    pub finish_time: Option<u64>,
    pub limit: u32,
    pub pad: bool,
    pub permissions: Vec<String>,
    pub ql: Option<String>,
    pub reversed: bool,
    pub sort: Vec<SortPredicate>,
    pub root_operand: Option<Operand>,
}

/// Translate a legacy query into the index's native form.
///
/// Attributes are copied field for field. Without a filter, a lone
/// identifier becomes the filter: a UUID matches `uuid`, a name or email
/// alias matches `email`. Name aliases match `email` too, whatever the
/// entity type; no per-type alias property exists.
#[must_use]
pub fn translate_query(legacy: &LegacyQuery, user_type: &str) -> NativeQuery {
    let mut native = NativeQuery {
        collection: legacy.collection.clone(),
        connection_type: legacy.connection_type.clone(),
        cursor: legacy.cursor.clone(),
        entity_type: legacy.entity_type.clone(),
        start_time: legacy.start_time,
        finish_time: legacy.finish_time,
        limit: legacy.limit,
        pad: legacy.pad,
        permissions: legacy.permissions.clone(),
        ql: legacy.ql.clone(),
        reversed: legacy.reversed,
        sort: legacy.sort.clone(),
        root_operand: legacy.filter.clone(),
    };

    if native.root_operand.is_some() {
        return native;
    }

    match legacy.single_identifier() {
        Some(Identifier::Uuid(uuid)) => {
            native.root_operand = Some(Operand::equal(primitives::PROPERTY_UUID, uuid.to_string()));
        }
        Some(identifier) => {
            let alias = identifier.to_string();
            let user_email =
                identifier.is_email() && legacy.entity_type.as_deref() == Some(user_type);
            if !user_email {
                tracing::trace!(%alias, entity_type = ?legacy.entity_type, "alias resolved against email");
            }
            native.root_operand = Some(Operand::equal(primitives::PROPERTY_EMAIL, alias));
        }
        None => {}
    }

    native
}

// =============================================================================
// TESTS
// =============================================================================
