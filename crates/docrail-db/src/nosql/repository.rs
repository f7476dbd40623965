//! Model-level entry point
//!
//! A [`Repository`] binds a backend to one [`Document`] type and its
//! collection. Aggregations start here:
//!
//! ```rust
//! use bson::doc;
//! use docrail_db::nosql::backends::MemoryBackend;
//! use docrail_db::nosql::document::Document;
//! use docrail_db::nosql::repository::Repository;
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
//! # async fn main() -> docrail_db::nosql::error::Result<()> {
//! let users = Repository::<User>::new(MemoryBackend::new());
//! users
//!     .create(&[
//!         User { author: "tj".into(), age: 31 },
//!         User { author: "nathan".into(), age: 44 },
//!     ])
//!     .await?;
//!
//! let result = users
//!     .aggregate()
//!     .group(doc! { "_id": null, "maxAge": { "$max": "$age" } })
//!     .project(doc! { "maxAge": 1, "_id": 0 })
//!     .await?;
//! assert_eq!(result, vec![doc! { "maxAge": 44 }]);
//! # Ok(())
//! # }
//! ```

use bson::{Bson, Document as BsonDocument, doc};
use std::marker::PhantomData;
use std::sync::Arc;

use super::aggregate::Aggregate;
use super::document::Document;
use super::error::{NoSQLError, Result};
use super::traits::{DocumentBackend, NoSQLBackend};
use super::types::FindOptions;

/// Typed access to the collection of `D`
pub struct Repository<D: Document> {
	backend: Arc<dyn DocumentBackend>,
	_document: PhantomData<fn() -> D>,
}

impl<D: Document> Clone for Repository<D> {
	fn clone(&self) -> Self {
		Self {
			backend: Arc::clone(&self.backend),
			_document: PhantomData,
		}
	}
}

impl<D: Document> std::fmt::Debug for Repository<D> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Repository")
			.field("collection", &D::COLLECTION_NAME)
			.field("backend", &self.backend.backend_type())
			.finish()
	}
}

impl<D: Document> Repository<D> {
	pub fn new(backend: impl DocumentBackend + 'static) -> Self {
		Self::from_arc(Arc::new(backend))
	}

	/// Shares an existing backend handle
	pub fn from_arc(backend: Arc<dyn DocumentBackend>) -> Self {
		Self {
			backend,
			_document: PhantomData,
		}
	}

	pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
		&self.backend
	}

	pub fn collection_name(&self) -> &'static str {
		D::COLLECTION_NAME
	}

	/// Validates and inserts `documents`, returning their ids
	///
	/// Nothing is written when any document fails validation.
	pub async fn create(&self, documents: &[D]) -> Result<Vec<String>> {
		if documents.is_empty() {
			return Ok(Vec::new());
		}

		let mut prepared = Vec::with_capacity(documents.len());
		for document in documents {
			document.validate()?;
			prepared.push(document.to_bson_document()?);
		}

		let ids = self.backend.insert_many(D::COLLECTION_NAME, prepared).await?;
		tracing::debug!(collection = D::COLLECTION_NAME, created = ids.len(), "created documents");
		Ok(ids)
	}

	pub async fn find(&self, filter: BsonDocument, options: FindOptions) -> Result<Vec<D>> {
		self.backend
			.find_many(D::COLLECTION_NAME, filter, options)
			.await?
			.into_iter()
			.map(D::from_bson_document)
			.collect()
	}

	/// Counts documents matching `filter`
	pub async fn count(&self, filter: BsonDocument) -> Result<u64> {
		count_documents(self.backend.as_ref(), D::COLLECTION_NAME, filter).await
	}

	pub async fn delete_many(&self, filter: BsonDocument) -> Result<u64> {
		self.backend.delete_many(D::COLLECTION_NAME, filter).await
	}

	/// Starts an empty aggregation over this collection
	pub fn aggregate(&self) -> Aggregate {
		Aggregate::new(Arc::clone(&self.backend), D::COLLECTION_NAME)
	}

	/// Starts an aggregation seeded with `pipeline`
	pub fn aggregate_with(&self, pipeline: Vec<BsonDocument>) -> Result<Aggregate> {
		Aggregate::with_pipeline(Arc::clone(&self.backend), D::COLLECTION_NAME, pipeline)
	}

	/// Starts an aggregation from a dynamically shaped value
	///
	/// See [`Aggregate::from_bson`] for the accepted shapes.
	pub fn aggregate_value(&self, pipeline: Bson) -> Result<Aggregate> {
		Aggregate::from_bson(Arc::clone(&self.backend), D::COLLECTION_NAME, pipeline)
	}

	/// Untyped handle on another collection of the same backend
	pub fn collection(&self, name: &str) -> CollectionHandle {
		CollectionHandle {
			backend: Arc::clone(&self.backend),
			name: name.to_string(),
		}
	}
}

/// Untyped access to a named collection
#[derive(Clone)]
pub struct CollectionHandle {
	backend: Arc<dyn DocumentBackend>,
	name: String,
}

impl CollectionHandle {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Every document in the collection, in storage order
	pub async fn find_all(&self) -> Result<Vec<BsonDocument>> {
		self.backend
			.find_many(&self.name, BsonDocument::new(), FindOptions::new())
			.await
	}

	pub async fn count(&self) -> Result<u64> {
		count_documents(self.backend.as_ref(), &self.name, BsonDocument::new()).await
	}

	pub async fn drop(&self) -> Result<()> {
		self.backend.drop_collection(&self.name).await
	}
}

impl std::fmt::Debug for CollectionHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CollectionHandle")
			.field("name", &self.name)
			.finish_non_exhaustive()
	}
}

async fn count_documents(
	backend: &dyn DocumentBackend,
	collection: &str,
	filter: BsonDocument,
) -> Result<u64> {
	let mut pipeline = Vec::with_capacity(2);
	if !filter.is_empty() {
		pipeline.push(doc! { "$match": filter });
	}
	pipeline.push(doc! { "$count": "n" });

	let result = backend.aggregate(collection, pipeline).await?;
	let Some(first) = result.first() else {
		return Ok(0);
	};
	match first.get("n") {
		Some(Bson::Int32(n)) => Ok(*n as u64),
		Some(Bson::Int64(n)) => Ok(*n as u64),
		other => Err(NoSQLError::DatabaseError(format!(
			"unexpected $count result: {:?}",
			other
		))),
	}
}
