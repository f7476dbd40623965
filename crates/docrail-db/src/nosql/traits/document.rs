//! Document-oriented database trait
//!
//! This module defines the trait for document-oriented stores like MongoDB
//! and the in-memory backend.

use async_trait::async_trait;
use bson::Document;

use super::super::error::Result;
use super::super::traits::NoSQLBackend;
use super::super::types::{AggregateOptions, FindOptions};

/// Trait for document-oriented NoSQL databases
///
/// This trait provides methods for working with document databases,
/// which store data as semi-structured documents (typically JSON-like).
///
/// # Example
///
/// ```rust,ignore
/// use docrail_db::nosql::traits::DocumentBackend;
/// use bson::doc;
///
/// async fn find_user(db: &dyn DocumentBackend, email: &str) -> Result<Option<Document>> {
///     db.find_one("users", doc! { "email": email }).await
/// }
/// ```
#[async_trait]
pub trait DocumentBackend: NoSQLBackend {
	/// Finds a single document matching the filter
	///
	/// # Arguments
	///
	/// * `collection` - The name of the collection to search
	/// * `filter` - The filter criteria as a document
	///
	/// # Returns
	///
	/// Returns `Some(Document)` if a matching document is found, `None` otherwise.
	async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>>;

	/// Finds multiple documents matching the filter
	///
	/// # Arguments
	///
	/// * `collection` - The name of the collection to search
	/// * `filter` - The filter criteria as a document
	/// * `options` - Query options (limit, skip, sort, projection)
	///
	/// # Example
	///
	/// ```rust,ignore
	/// let options = FindOptions::new().limit(10).sort(doc! { "created_at": -1 });
	/// let users = db.find_many("users", doc! { "active": true }, options).await?;
	/// ```
	async fn find_many(
		&self,
		collection: &str,
		filter: Document,
		options: FindOptions,
	) -> Result<Vec<Document>>;

	/// Inserts a single document into the collection
	///
	/// # Returns
	///
	/// Returns the ID of the inserted document as a string.
	async fn insert_one(&self, collection: &str, document: Document) -> Result<String>;

	/// Inserts multiple documents into the collection
	///
	/// # Returns
	///
	/// Returns the IDs of the inserted documents, in input order.
	///
	/// # Example
	///
	/// ```rust,ignore
	/// let ids = db.insert_many("users", vec![
	///     doc! { "name": "Alice" },
	///     doc! { "name": "Bob" }
	/// ]).await?;
	/// ```
	async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<String>>;

	/// Deletes every document matching the filter
	///
	/// # Returns
	///
	/// Returns the number of documents deleted.
	async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64>;

	/// Drops a collection; dropping a missing collection is not an error
	async fn drop_collection(&self, collection: &str) -> Result<()>;

	/// Executes an aggregation pipeline
	///
	/// Stages run in the order given. Errors reported by the store are
	/// returned unchanged.
	///
	/// # Example
	///
	/// ```rust,ignore
	/// let results = db.aggregate("orders", vec![
	///     doc! { "$match": { "status": "completed" } },
	///     doc! { "$group": {
	///         "_id": "$customer_id",
	///         "total": { "$sum": "$amount" }
	///     }}
	/// ]).await?;
	/// ```
	async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>>;

	/// Executes an aggregation pipeline with command options
	///
	/// Backends that cannot honor the options fall back to [`aggregate`](Self::aggregate).
	async fn aggregate_with_options(
		&self,
		collection: &str,
		pipeline: Vec<Document>,
		options: AggregateOptions,
	) -> Result<Vec<Document>> {
		let _ = options;
		self.aggregate(collection, pipeline).await
	}
}
