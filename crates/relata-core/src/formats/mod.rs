//! # Formats Module
//!
//! Byte-level encodings used by the persistent backends.

mod edge_record;

pub use edge_record::*;
