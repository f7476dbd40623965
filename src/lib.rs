//! # docrail
//!
//! An object-document mapper with a fluent aggregation pipeline builder.
//!
//! A model type implements [`Document`], a [`Repository`] binds it to a
//! backend, and [`Repository::aggregate`] starts an [`Aggregate`] pipeline.
//! Pipelines complete either as a future or through a callback:
//!
//! ```rust
//! use docrail::prelude::*;
//! use docrail::bson::doc;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     author: String,
//!     age: i32,
//! }
//!
//! impl Document for User {
//!     const COLLECTION_NAME: &'static str = "users";
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> docrail::nosql::Result<()> {
//! let users = Repository::<User>::new(MemoryBackend::new());
//! users.create(&[User { author: "tj".into(), age: 27 }]).await?;
//!
//! // future form
//! let result = users
//!     .aggregate()
//!     .group(doc! { "_id": null, "maxAge": { "$max": "$age" } })
//!     .project(doc! { "maxAge": 1, "_id": 0 })
//!     .await?;
//! assert_eq!(result, vec![doc! { "maxAge": 27 }]);
//!
//! // callback form
//! users
//!     .aggregate()
//!     .count("n")
//!     .exec_with(|result| {
//!         assert_eq!(result.unwrap()[0].get_i32("n").unwrap(), 1);
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `memory` (default): in-process backend driven by the pipeline evaluator
//! - `mongodb`: MongoDB backend
//! - `test`: re-exports `docrail-test` as `docrail::testing`
//! - `testcontainers`: MongoDB container fixtures (implies `test`)
//! - `full`: everything except `testcontainers`

pub use bson;

/// Settings for the document store
pub use docrail_conf as conf;

/// The document layer
pub use docrail_db::nosql;

#[cfg(feature = "test")]
pub use docrail_test as testing;

pub use docrail_db::nosql::{
	Aggregate, AggregateFuture, Document, DocumentBackend, NoSQLError, Repository,
};

pub mod prelude {
	//! Commonly used types
	pub use docrail_conf::NoSQLSettings;
	pub use docrail_db::nosql::backends::connect;
	pub use docrail_db::prelude::*;
}
