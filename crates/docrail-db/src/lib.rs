//! # docrail-db
//!
//! Document layer for docrail.
//!
//! Models implement [`nosql::Document`] and are reached through a
//! [`nosql::Repository`]. Aggregations are assembled with the
//! [`nosql::Aggregate`] builder and complete either as a future or through a
//! callback.
//!
//! ## Features
//!
//! - `memory` (default): in-process backend and pipeline evaluator
//! - `mongodb`: MongoDB backend using the official driver
//!
//! ## Quick start
//!
//! ```rust
//! use docrail_db::prelude::*;
//! use bson::doc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let backend = std::sync::Arc::new(MemoryBackend::new());
//! backend.seed("users", vec![doc! { "age": 3 }, doc! { "age": 7 }]);
//!
//! let oldest = Aggregate::new(backend, "users")
//!     .sort(doc! { "age": -1 })
//!     .limit(1)
//!     .exec()
//!     .await?;
//! assert_eq!(oldest[0].get_i32("age").unwrap(), 7);
//! # Ok(())
//! # }
//! ```

pub mod nosql;

pub mod prelude {
	//! Commonly used types

	pub use crate::nosql::{
		Aggregate, AggregateFuture, AggregateOptions, CollectionHandle, Document, DocumentBackend,
		FindOptions, NoSQLBackend, NoSQLError, Repository, Result, ServerVersion,
	};

	#[cfg(feature = "memory")]
	pub use crate::nosql::backends::MemoryBackend;

	#[cfg(feature = "mongodb")]
	pub use crate::nosql::backends::MongoDBBackend;
}
