//! # Naming Primitives
//!
//! Fixed names and limits of the relation core.
//!
//! These are the compiled-in defaults. Deployments that need other values
//! override them through [`RelationConfig`](crate::config::RelationConfig);
//! the record format constants below are never configurable.

/// Reserved suffix that marks an edge type as a collection-membership edge.
///
/// - `name + COLLECTION_SUFFIX` is the collection edge for `name`.
/// - A bare `name` is a connection edge.
///
/// The suffix is chosen so that no realistic connection name ends with it.
pub const COLLECTION_SUFFIX: &str = "zzzcollectionzzz";

/// Type name of the application entity that roots every tenant.
pub const TYPE_APPLICATION: &str = "application";

/// Type name of the organization (tenant) that owns applications.
pub const TYPE_ORGANIZATION: &str = "organization";

/// Type name of user entities, the type email aliases are meant for.
pub const TYPE_USER: &str = "user";

/// Generic type name; an item of this type created directly under the
/// application takes its type from the singular of the collection name.
pub const TYPE_ENTITY: &str = "entity";

/// Field holding an entity's UUID in query filters.
pub const PROPERTY_UUID: &str = "uuid";

/// Field holding an entity's type name.
pub const PROPERTY_TYPE: &str = "type";

/// Field holding a user's email address.
pub const PROPERTY_EMAIL: &str = "email";

/// Page size used when a query does not set a limit.
pub const DEFAULT_QUERY_LIMIT: u32 = 10;

/// Largest page a single search may return.
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Raw log records an edge store reads per batch while streaming a search.
pub const SCAN_BATCH: usize = 256;

// =============================================================================
// EDGE RECORD FORMAT
// =============================================================================

/// Magic bytes that prefix every persisted edge record.
pub const MAGIC_BYTES: &[u8; 4] = b"RELE";

/// Current edge record format version.
///
/// Increment this when making breaking changes to the record layout.
pub const FORMAT_VERSION: u8 = 1;
