//! Document store layer
//!
//! - [`aggregate`]: the [`Aggregate`] pipeline builder and its future
//! - [`repository`]: typed model entry point ([`Repository`])
//! - [`traits`]: the backend contract every data source implements
//! - [`backends`]: in-memory and MongoDB implementations
//! - [`engine`]: the in-memory pipeline evaluator

pub mod aggregate;
pub mod backends;
pub mod document;
pub mod engine;
pub mod error;
pub mod repository;
pub mod traits;
pub mod types;

pub use aggregate::{Aggregate, AggregateCallback, AggregateFuture};
pub use document::Document;
pub use error::{NoSQLError, Result};
pub use repository::{CollectionHandle, Repository};
pub use traits::{DocumentBackend, NoSQLBackend};
pub use types::{AggregateOptions, FindOptions, NoSQLBackendType, ServerVersion};
