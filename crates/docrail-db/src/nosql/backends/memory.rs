//! In-memory document backend
//!
//! Keeps collections in process and answers queries and aggregations with
//! the pipeline evaluator in [`crate::nosql::engine`]. Useful for tests and
//! for running pipelines without a database server.
//!
//! # Example
//!
//! ```rust
//! use docrail_db::nosql::backends::MemoryBackend;
//! use docrail_db::nosql::traits::DocumentBackend;
//! use bson::doc;
//!
//! # #[tokio::main]
//! # async fn main() -> docrail_db::nosql::error::Result<()> {
//! let backend = MemoryBackend::new();
//! backend.insert_one("users", doc! { "name": "Alice", "age": 30 }).await?;
//!
//! let adults = backend
//!     .aggregate("users", vec![doc! { "$match": { "age": { "$gte": 18 } } }])
//!     .await?;
//! assert_eq!(adults.len(), 1);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use docrail_conf::NoSQLSettings;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::id_to_string;
use crate::nosql::engine::{PipelineEvaluator, matches};
use crate::nosql::error::{NoSQLError, Result};
use crate::nosql::traits::{DocumentBackend, NoSQLBackend};
use crate::nosql::types::{FindOptions, NoSQLBackendType, ServerVersion};

type Collections = HashMap<String, Vec<Document>>;

/// Document backend holding collections in memory
///
/// Clones share the same store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
	collections: Arc<RwLock<Collections>>,
	server_version: ServerVersion,
}

impl std::fmt::Debug for MemoryBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryBackend")
			.field("collections", &self.collection_names())
			.field("server_version", &self.server_version)
			.finish()
	}
}

impl MemoryBackend {
	/// Creates an empty backend reporting the default server version
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a backend from settings
	///
	/// Only `server_version` is read; connection settings do not apply.
	pub fn from_settings(settings: &NoSQLSettings) -> Result<Self> {
		let backend = Self::new();
		match settings.server_version.as_deref() {
			Some(version) => Ok(backend.with_server_version(version.parse()?)),
			None => Ok(backend),
		}
	}

	/// Sets the version reported by [`NoSQLBackend::server_version`]
	///
	/// Versions below 2.6 reject `$out` like such servers do.
	pub fn with_server_version(mut self, version: ServerVersion) -> Self {
		self.server_version = version;
		self
	}

	/// Inserts documents synchronously, returning their ids
	///
	/// Intended for test setup outside an async context.
	pub fn seed(&self, collection: &str, documents: Vec<Document>) -> Vec<String> {
		let mut collections = self.collections.write();
		let target = collections.entry(collection.to_string()).or_default();
		documents
			.into_iter()
			.map(|document| {
				let (document, id) = with_id(document);
				target.push(document);
				id
			})
			.collect()
	}

	/// Names of the collections currently holding documents, sorted
	pub fn collection_names(&self) -> Vec<String> {
		let mut names: Vec<String> = self
			.collections
			.read()
			.iter()
			.filter(|(_, docs)| !docs.is_empty())
			.map(|(name, _)| name.clone())
			.collect();
		names.sort();
		names
	}

	fn run(&self, collection: &str, pipeline: &[Document]) -> Result<(Vec<Document>, Option<String>)> {
		let collections = self.collections.read();
		let input = collections.get(collection).cloned().unwrap_or_default();
		let evaluation = PipelineEvaluator::new(&*collections).evaluate(input, pipeline)?;
		Ok((evaluation.documents, evaluation.output))
	}
}

/// Assigns an ObjectId `_id` when the document has none
fn with_id(mut document: Document) -> (Document, String) {
	let id = match document.get("_id") {
		Some(id) => id.clone(),
		None => {
			let id = Bson::ObjectId(ObjectId::new());
			let mut stored = Document::new();
			stored.insert("_id", id.clone());
			stored.extend(document);
			document = stored;
			id
		}
	};
	(document, id_to_string(id))
}

fn check_duplicate<'a>(
	mut existing: impl Iterator<Item = &'a Document>,
	document: &Document,
	collection: &str,
) -> Result<()> {
	let Some(id) = document.get("_id") else {
		return Ok(());
	};
	if existing.any(|d| d.get("_id") == Some(id)) {
		return Err(NoSQLError::ExecutionError(format!(
			"E11000 duplicate key error collection: {} dup key: {{ _id: {} }}",
			collection, id
		)));
	}
	Ok(())
}

#[async_trait]
impl NoSQLBackend for MemoryBackend {
	fn backend_type(&self) -> NoSQLBackendType {
		NoSQLBackendType::Memory
	}

	async fn health_check(&self) -> Result<()> {
		Ok(())
	}

	async fn server_version(&self) -> Result<ServerVersion> {
		Ok(self.server_version)
	}

	fn as_any(&self) -> &dyn std::any::Any {
		self
	}
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
	async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
		let found = self
			.find_many(collection, filter, FindOptions::new().limit(1))
			.await?;
		Ok(found.into_iter().next())
	}

	async fn find_many(
		&self,
		collection: &str,
		filter: Document,
		options: FindOptions,
	) -> Result<Vec<Document>> {
		let pipeline = options.to_pipeline(filter);
		let (documents, _) = self.run(collection, &pipeline)?;
		tracing::trace!(collection, found = documents.len(), "find_many");
		Ok(documents)
	}

	async fn insert_one(&self, collection: &str, document: Document) -> Result<String> {
		let mut ids = self.insert_many(collection, vec![document]).await?;
		ids.pop()
			.ok_or_else(|| NoSQLError::ExecutionError("insert returned no id".to_string()))
	}

	async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<String>> {
		let mut collections = self.collections.write();
		let target = collections.entry(collection.to_string()).or_default();

		let prepared: Vec<(Document, String)> = documents.into_iter().map(with_id).collect();
		for (index, (document, _)) in prepared.iter().enumerate() {
			let earlier = prepared[..index].iter().map(|(d, _)| d);
			check_duplicate(target.iter().chain(earlier), document, collection)?;
		}

		let ids = prepared
			.into_iter()
			.map(|(document, id)| {
				target.push(document);
				id
			})
			.collect::<Vec<_>>();
		tracing::debug!(collection, inserted = ids.len(), "inserted documents");
		Ok(ids)
	}

	async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
		let mut collections = self.collections.write();
		let Some(documents) = collections.get_mut(collection) else {
			return Ok(0);
		};

		let mut keep = Vec::with_capacity(documents.len());
		for document in documents.iter() {
			keep.push(!matches(&filter, document)?);
		}
		let before = documents.len();
		let mut flags = keep.into_iter();
		documents.retain(|_| flags.next().unwrap_or(true));

		let deleted = (before - documents.len()) as u64;
		tracing::debug!(collection, deleted, "deleted documents");
		Ok(deleted)
	}

	async fn drop_collection(&self, collection: &str) -> Result<()> {
		self.collections.write().remove(collection);
		tracing::debug!(collection, "dropped collection");
		Ok(())
	}

	async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
		if !self.server_version.supports_out() && pipeline.iter().any(|s| s.contains_key("$out")) {
			return Err(NoSQLError::UnsupportedFeature(format!(
				"$out requires server version 2.6 or newer, this server reports {}",
				self.server_version
			)));
		}

		let (documents, output) = self.run(collection, &pipeline)?;

		let Some(target) = output else {
			return Ok(documents);
		};
		let documents: Vec<Document> = documents.into_iter().map(|d| with_id(d).0).collect();
		for (index, document) in documents.iter().enumerate() {
			check_duplicate(documents[..index].iter(), document, &target)?;
		}
		tracing::debug!(collection, target = %target, written = documents.len(), "$out replaced collection");
		self.collections.write().insert(target, documents);
		Ok(Vec::new())
	}
}
