//! NoSQL backend traits
//!
//! This module provides the trait definitions data sources implement:
//! - `NoSQLBackend`: Base trait for all NoSQL backends
//! - `DocumentBackend`: Trait for document-oriented databases

mod base;
mod document;

pub use base::NoSQLBackend;
pub use document::DocumentBackend;
