//! MongoDB connection and backend implementation
//!
//! # Example
//!
//! ```rust,no_run
//! use docrail_db::nosql::backends::mongodb::MongoDBBackend;
//! use docrail_db::nosql::traits::DocumentBackend;
//! use bson::doc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = MongoDBBackend::connect("mongodb://localhost:27017")
//!     .await?
//!     .with_database("myapp");
//!
//! let oldest = backend
//!     .aggregate("users", vec![
//!         doc! { "$group": { "_id": null, "maxAge": { "$max": "$age" } } },
//!     ])
//!     .await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bson::{Document, doc};
use docrail_conf::NoSQLSettings;
use futures::stream::TryStreamExt;
use mongodb::{Client, Database};
use std::sync::Arc;
use std::time::Duration;

use super::super::id_to_string;
use crate::nosql::error::{NoSQLError, Result};
use crate::nosql::traits::{DocumentBackend, NoSQLBackend};
use crate::nosql::types::{AggregateOptions, FindOptions, NoSQLBackendType, ServerVersion};

/// MongoDB backend implementation
///
/// Cloning is cheap; clones share the driver's connection pool.
#[derive(Clone)]
pub struct MongoDBBackend {
	client: Arc<Client>,
	database_name: String,
}

/// Builder for configuring MongoDB connections
///
/// ```rust,no_run
/// use docrail_db::nosql::backends::mongodb::MongoDBBackendBuilder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MongoDBBackendBuilder::new()
///     .url("mongodb://localhost:27017")
///     .database("mydb")
///     .max_pool_size(100)
///     .min_pool_size(10)
///     .max_idle_time_secs(300)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MongoDBBackendBuilder {
	url: String,
	database: String,
	max_pool_size: Option<u32>,
	min_pool_size: Option<u32>,
	max_idle_time_secs: Option<u64>,
}

impl Default for MongoDBBackendBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl MongoDBBackendBuilder {
	pub fn new() -> Self {
		Self {
			url: "mongodb://localhost:27017".to_string(),
			database: "test".to_string(),
			max_pool_size: None,
			min_pool_size: None,
			max_idle_time_secs: None,
		}
	}

	/// Copies connection settings from [`NoSQLSettings`]
	pub fn from_settings(settings: &NoSQLSettings) -> Self {
		Self {
			url: settings.url.clone(),
			database: settings.database.clone(),
			max_pool_size: settings.max_pool_size,
			min_pool_size: settings.min_pool_size,
			max_idle_time_secs: settings.max_idle_time_secs,
		}
	}

	/// Set the MongoDB connection URL
	pub fn url(mut self, url: impl Into<String>) -> Self {
		self.url = url.into();
		self
	}

	/// Set the database name
	pub fn database(mut self, database: impl Into<String>) -> Self {
		self.database = database.into();
		self
	}

	pub fn max_pool_size(mut self, size: u32) -> Self {
		self.max_pool_size = Some(size);
		self
	}

	pub fn min_pool_size(mut self, size: u32) -> Self {
		self.min_pool_size = Some(size);
		self
	}

	/// Set the maximum idle time for pooled connections in seconds
	pub fn max_idle_time_secs(mut self, secs: u64) -> Self {
		self.max_idle_time_secs = Some(secs);
		self
	}

	/// Build the MongoDB backend
	///
	/// Parses the URL and configures the pool. The driver connects lazily, so
	/// an unreachable server surfaces on the first operation.
	pub async fn build(self) -> Result<MongoDBBackend> {
		use mongodb::options::ClientOptions;

		let mut options = ClientOptions::parse(&self.url)
			.await
			.map_err(|e| NoSQLError::ConnectionError(e.to_string()))?;

		if let Some(max_size) = self.max_pool_size {
			options.max_pool_size = Some(max_size);
		}
		if let Some(min_size) = self.min_pool_size {
			options.min_pool_size = Some(min_size);
		}
		if let Some(idle_time) = self.max_idle_time_secs {
			options.max_idle_time = Some(Duration::from_secs(idle_time));
		}

		let client = Client::with_options(options)
			.map_err(|e| NoSQLError::ConnectionError(e.to_string()))?;
		tracing::debug!(database = %self.database, "mongodb client configured");

		Ok(MongoDBBackend {
			client: Arc::new(client),
			database_name: self.database,
		})
	}
}

impl MongoDBBackend {
	/// Connect to MongoDB using a connection string, using the `test`
	/// database
	pub async fn connect(url: &str) -> Result<Self> {
		let client = Client::with_uri_str(url)
			.await
			.map_err(|e| NoSQLError::ConnectionError(e.to_string()))?;

		Ok(Self {
			client: Arc::new(client),
			database_name: "test".to_string(),
		})
	}

	/// Connect using [`NoSQLSettings`]
	pub async fn from_settings(settings: &NoSQLSettings) -> Result<Self> {
		MongoDBBackendBuilder::from_settings(settings).build().await
	}

	pub fn builder() -> MongoDBBackendBuilder {
		MongoDBBackendBuilder::new()
	}

	/// Set the database name to use
	pub fn with_database(mut self, database_name: &str) -> Self {
		self.database_name = database_name.to_string();
		self
	}

	/// Get the MongoDB database instance
	pub fn database(&self) -> Database {
		self.client.database(&self.database_name)
	}

	pub fn database_name(&self) -> &str {
		&self.database_name
	}
}

impl std::fmt::Debug for MongoDBBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MongoDBBackend")
			.field("database_name", &self.database_name)
			.finish_non_exhaustive()
	}
}

fn to_driver_options(options: AggregateOptions) -> mongodb::options::AggregateOptions {
	let mut driver = mongodb::options::AggregateOptions::default();
	driver.allow_disk_use = options.allow_disk_use;
	driver.batch_size = options.batch_size;
	driver.max_time = options.max_time;
	driver.comment = options.comment;
	driver
}

#[async_trait]
impl NoSQLBackend for MongoDBBackend {
	fn backend_type(&self) -> NoSQLBackendType {
		NoSQLBackendType::MongoDB
	}

	async fn health_check(&self) -> Result<()> {
		self.database()
			.run_command(doc! { "ping": 1 })
			.await
			.map_err(|e| NoSQLError::ConnectionError(format!("Health check failed: {}", e)))?;
		Ok(())
	}

	async fn server_version(&self) -> Result<ServerVersion> {
		let info = self
			.database()
			.run_command(doc! { "buildInfo": 1 })
			.await
			.map_err(|e| NoSQLError::ConnectionError(format!("buildInfo failed: {}", e)))?;
		let version = info.get_str("version").map_err(|e| {
			NoSQLError::DatabaseError(format!("buildInfo returned no version: {}", e))
		})?;
		tracing::trace!(version, "mongodb server version");
		version.parse()
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}
}

#[async_trait]
impl DocumentBackend for MongoDBBackend {
	async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
		let coll = self.database().collection::<Document>(collection);

		coll.find_one(filter)
			.await
			.map_err(|e| NoSQLError::ExecutionError(e.to_string()))
	}

	async fn find_many(
		&self,
		collection: &str,
		filter: Document,
		options: FindOptions,
	) -> Result<Vec<Document>> {
		let coll = self.database().collection::<Document>(collection);

		let mut mongo_options = mongodb::options::FindOptions::default();
		mongo_options.limit = options.limit;
		mongo_options.skip = options.skip;
		mongo_options.sort = options.sort;
		mongo_options.projection = options.projection;
		mongo_options.batch_size = options.batch_size;

		let cursor = coll
			.find(filter)
			.with_options(mongo_options)
			.await
			.map_err(|e| NoSQLError::ExecutionError(e.to_string()))?;

		cursor
			.try_collect()
			.await
			.map_err(|e| NoSQLError::ExecutionError(e.to_string()))
	}

	async fn insert_one(&self, collection: &str, document: Document) -> Result<String> {
		let coll = self.database().collection::<Document>(collection);

		let result = coll
			.insert_one(document)
			.await
			.map_err(|e| NoSQLError::ExecutionError(e.to_string()))?;

		Ok(id_to_string(result.inserted_id))
	}

	async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<String>> {
		let coll = self.database().collection::<Document>(collection);

		let result = coll
			.insert_many(documents)
			.await
			.map_err(|e| NoSQLError::ExecutionError(e.to_string()))?;

		// inserted_ids is keyed by input position
		let mut ids: Vec<_> = result.inserted_ids.into_iter().collect();
		ids.sort_by_key(|(index, _)| *index);
		Ok(ids.into_iter().map(|(_, id)| id_to_string(id)).collect())
	}

	async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
		let coll = self.database().collection::<Document>(collection);

		let result = coll
			.delete_many(filter)
			.await
			.map_err(|e| NoSQLError::ExecutionError(e.to_string()))?;

		Ok(result.deleted_count)
	}

	async fn drop_collection(&self, collection: &str) -> Result<()> {
		self.database()
			.collection::<Document>(collection)
			.drop()
			.await
			.map_err(|e| NoSQLError::ExecutionError(e.to_string()))
	}

	async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
		self.aggregate_with_options(collection, pipeline, AggregateOptions::default())
			.await
	}

	async fn aggregate_with_options(
		&self,
		collection: &str,
		pipeline: Vec<Document>,
		options: AggregateOptions,
	) -> Result<Vec<Document>> {
		let coll = self.database().collection::<Document>(collection);
		tracing::trace!(collection, stages = pipeline.len(), "mongodb aggregate");

		let cursor = coll
			.aggregate(pipeline)
			.with_options(to_driver_options(options))
			.await
			.map_err(|e| NoSQLError::ExecutionError(e.to_string()))?;

		cursor
			.try_collect()
			.await
			.map_err(|e| NoSQLError::ExecutionError(e.to_string()))
	}
}
