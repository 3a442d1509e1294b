//! # Storage Module
//!
//! Persistent backends.
//!
//! The in-memory collaborators live next to their traits; this module
//! holds the implementations that survive a restart.

mod redb_edges;

pub use redb_edges::RedbEdgeStore;
