//! Aggregation pipeline builder
//!
//! [`Aggregate`] accumulates pipeline stages and runs them against a
//! [`DocumentBackend`] in one round trip. Completion is delivered either as a
//! future ([`Aggregate::exec`], or `.await` on the builder itself) or through a
//! callback ([`Aggregate::exec_with`]). Both forms share one execution path.
//!
//! # Example
//!
//! ```rust
//! use bson::doc;
//! use docrail_db::nosql::aggregate::Aggregate;
//! use docrail_db::nosql::backends::MemoryBackend;
//! use docrail_db::nosql::traits::DocumentBackend;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> docrail_db::nosql::error::Result<()> {
//! let backend = Arc::new(MemoryBackend::new());
//! backend.insert_many("users", vec![doc! { "age": 31 }, doc! { "age": 44 }]).await?;
//!
//! let result = Aggregate::new(backend, "users")
//!     .group(doc! { "_id": null, "maxAge": { "$max": "$age" } })
//!     .project(doc! { "_id": 0, "maxAge": 1 })
//!     .await?;
//!
//! assert_eq!(result, vec![doc! { "maxAge": 44 }]);
//! # Ok(())
//! # }
//! ```

mod future;

pub use future::{AggregateCallback, AggregateFuture};

use bson::{Bson, Document, doc};
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::Instrument;

use super::error::{NoSQLError, Result};
use super::traits::DocumentBackend;
use super::types::AggregateOptions;

/// Returns the operator of a pipeline stage
///
/// A stage is a document with exactly one key, and that key starts with `$`.
pub(crate) fn stage_name(stage: &Document) -> Result<&str> {
	let mut keys = stage.keys();
	match (keys.next(), keys.next()) {
		(Some(name), None) if name.starts_with('$') => Ok(name.as_str()),
		_ => Err(NoSQLError::InvalidArgument(format!(
			"A pipeline stage specification object must contain exactly one field \
			 whose name starts with '$', got {}",
			stage
		))),
	}
}

fn field_path(value: Bson) -> Bson {
	match value {
		Bson::String(s) if !s.starts_with('$') => Bson::String(format!("${}", s)),
		other => other,
	}
}

/// Aggregation pipeline builder bound to one collection
///
/// Stage methods consume and return the builder, so a pipeline reads as a
/// chain. Nothing runs until [`exec`](Self::exec), [`exec_with`](Self::exec_with)
/// or `.await`.
pub struct Aggregate {
	backend: Arc<dyn DocumentBackend>,
	collection: String,
	pipeline: Vec<Document>,
	options: AggregateOptions,
}

impl Aggregate {
	/// Creates a builder with an empty pipeline
	pub fn new(backend: Arc<dyn DocumentBackend>, collection: impl Into<String>) -> Self {
		Self {
			backend,
			collection: collection.into(),
			pipeline: Vec::new(),
			options: AggregateOptions::default(),
		}
	}

	/// Creates a builder seeded with `pipeline`
	///
	/// Fails with [`NoSQLError::InvalidArgument`] when an element is not a
	/// single-operator stage document.
	pub fn with_pipeline(
		backend: Arc<dyn DocumentBackend>,
		collection: impl Into<String>,
		pipeline: Vec<Document>,
	) -> Result<Self> {
		for stage in &pipeline {
			stage_name(stage)?;
		}
		let mut aggregate = Self::new(backend, collection);
		aggregate.pipeline = pipeline;
		Ok(aggregate)
	}

	/// Creates a builder from a dynamically shaped value
	///
	/// `Bson::Null` gives an empty pipeline and an array of stage documents
	/// seeds one. A lone document is rejected rather than guessed at: it could
	/// be a single stage or a mistaken spread of several.
	///
	/// ```rust
	/// use bson::{Bson, doc};
	/// use docrail_db::nosql::aggregate::Aggregate;
	/// use docrail_db::nosql::backends::MemoryBackend;
	/// use std::sync::Arc;
	///
	/// let backend = Arc::new(MemoryBackend::new());
	/// let err = Aggregate::from_bson(backend, "users", Bson::Document(doc! {})).unwrap_err();
	/// assert!(err.to_string().contains("disallows passing a spread"));
	/// ```
	pub fn from_bson(
		backend: Arc<dyn DocumentBackend>,
		collection: impl Into<String>,
		value: Bson,
	) -> Result<Self> {
		match value {
			Bson::Null => Ok(Self::new(backend, collection)),
			Bson::Array(items) => {
				let pipeline = items
					.into_iter()
					.map(|item| match item {
						Bson::Document(stage) => Ok(stage),
						other => Err(NoSQLError::InvalidArgument(format!(
							"Arguments must be aggregate pipeline operators, got {:?}",
							other.element_type()
						))),
					})
					.collect::<Result<Vec<_>>>()?;
				Self::with_pipeline(backend, collection, pipeline)
			}
			Bson::Document(_) => Err(NoSQLError::InvalidArgument(
				"Aggregate disallows passing a spread of stages; pass an array of stages instead"
					.to_string(),
			)),
			other => Err(NoSQLError::InvalidArgument(format!(
				"Aggregate pipeline must be an array of stages, got {:?}",
				other.element_type()
			))),
		}
	}

	fn push(mut self, name: &str, spec: impl Into<Bson>) -> Self {
		let mut stage = Document::new();
		stage.insert(name, spec.into());
		self.pipeline.push(stage);
		self
	}

	/// Appends a raw stage after checking its shape
	pub fn append(mut self, stage: Document) -> Result<Self> {
		stage_name(&stage)?;
		self.pipeline.push(stage);
		Ok(self)
	}

	/// Appends `$addFields`
	pub fn add_fields(self, fields: Document) -> Self {
		self.push("$addFields", fields)
	}

	/// Appends `$count`, writing the number of documents to `field`
	pub fn count(self, field: &str) -> Self {
		self.push("$count", field)
	}

	/// Appends `$facet`
	pub fn facet(self, facets: Document) -> Self {
		self.push("$facet", facets)
	}

	/// Appends `$match`
	///
	/// ```rust
	/// use bson::doc;
	/// use docrail_db::nosql::aggregate::Aggregate;
	/// use docrail_db::nosql::backends::MemoryBackend;
	/// use std::sync::Arc;
	///
	/// let aggregate = Aggregate::new(Arc::new(MemoryBackend::new()), "users")
	///     .filter(doc! { "age": { "$gte": 18 } });
	/// assert_eq!(aggregate.pipeline(), &[doc! { "$match": { "age": { "$gte": 18 } } }]);
	/// ```
	pub fn filter(self, filter: Document) -> Self {
		self.push("$match", filter)
	}

	/// Appends `$group`
	pub fn group(self, group: Document) -> Self {
		self.push("$group", group)
	}

	pub fn limit(self, limit: i64) -> Self {
		self.push("$limit", limit)
	}

	/// Appends `$lookup`
	pub fn lookup(self, lookup: Document) -> Self {
		self.push("$lookup", lookup)
	}

	/// Appends `$out`, redirecting the pipeline output into `collection`
	///
	/// The target collection is replaced by the documents reaching this stage
	/// and the execution itself yields no documents. It must be the last
	/// stage. Servers older than 2.6 do not support it; see
	/// [`ServerVersion::supports_out`](crate::nosql::types::ServerVersion::supports_out).
	pub fn out(self, collection: &str) -> Self {
		self.push("$out", collection)
	}

	/// Appends `$project`
	pub fn project(self, projection: Document) -> Self {
		self.push("$project", projection)
	}

	/// Appends `$replaceRoot`; a bare field name is read as a field path
	pub fn replace_root(self, new_root: impl Into<Bson>) -> Self {
		self.push("$replaceRoot", doc! { "newRoot": field_path(new_root.into()) })
	}

	/// Appends `$sample` with the given size
	pub fn sample(self, size: i64) -> Self {
		self.push("$sample", doc! { "size": size })
	}

	pub fn skip(self, skip: i64) -> Self {
		self.push("$skip", skip)
	}

	/// Appends `$sort`
	pub fn sort(self, sort: Document) -> Self {
		self.push("$sort", sort)
	}

	/// Appends `$sortByCount`; a bare field name is read as a field path
	pub fn sort_by_count(self, expr: impl Into<Bson>) -> Self {
		self.push("$sortByCount", field_path(expr.into()))
	}

	/// Appends `$unionWith`, optionally running `pipeline` over the other
	/// collection first
	pub fn union_with(self, collection: &str, pipeline: Option<Vec<Document>>) -> Self {
		match pipeline {
			None => self.push("$unionWith", collection),
			Some(pipeline) => self.push(
				"$unionWith",
				doc! { "coll": collection, "pipeline": pipeline },
			),
		}
	}

	/// Appends `$unset` for the given fields
	pub fn unset(self, fields: &[&str]) -> Self {
		let fields: Vec<Bson> = fields.iter().map(|f| Bson::from(*f)).collect();
		self.push("$unset", fields)
	}

	/// Appends `$unwind`; a bare field name is read as a field path
	pub fn unwind(self, path: &str) -> Self {
		self.push("$unwind", field_path(Bson::from(path)))
	}

	/// Appends `$unwind` with options such as `preserveNullAndEmptyArrays`
	pub fn unwind_with(self, options: Document) -> Self {
		self.push("$unwind", options)
	}

	/// Lets the data source spill to disk for large stages
	pub fn allow_disk_use(mut self, allow: bool) -> Self {
		self.options.allow_disk_use = Some(allow);
		self
	}

	pub fn batch_size(mut self, size: u32) -> Self {
		self.options.batch_size = Some(size);
		self
	}

	/// Server-side time limit, forwarded to the data source
	pub fn max_time(mut self, max_time: Duration) -> Self {
		self.options.max_time = Some(max_time);
		self
	}

	pub fn comment(mut self, comment: impl Into<Bson>) -> Self {
		self.options.comment = Some(comment.into());
		self
	}

	/// The stages appended so far, in execution order
	pub fn pipeline(&self) -> &[Document] {
		&self.pipeline
	}

	pub fn collection_name(&self) -> &str {
		&self.collection
	}

	pub fn options(&self) -> &AggregateOptions {
		&self.options
	}

	pub fn len(&self) -> usize {
		self.pipeline.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pipeline.is_empty()
	}

	/// Starts the aggregation and returns its pending result
	pub fn exec(self) -> AggregateFuture {
		self.execute(None)
	}

	/// Starts the aggregation, reporting completion to `callback`
	///
	/// The callback runs before the returned future resolves. The future can
	/// be dropped; the aggregation and the callback still run.
	///
	/// Outside a Tokio runtime nothing is spawned: the callback is called with
	/// the error synchronously, before `exec_with` returns. Do not hold a lock
	/// the callback also takes across this call.
	///
	/// ```rust
	/// use bson::doc;
	/// use docrail_db::nosql::aggregate::Aggregate;
	/// use docrail_db::nosql::backends::MemoryBackend;
	/// use std::sync::Arc;
	///
	/// # #[tokio::main]
	/// # async fn main() {
	/// let (tx, rx) = tokio::sync::oneshot::channel();
	/// let _ = Aggregate::new(Arc::new(MemoryBackend::new()), "users")
	///     .count("total")
	///     .exec_with(move |result| {
	///         let _ = tx.send(result.map(|docs| docs.len()).is_ok());
	///     });
	/// assert!(rx.await.unwrap());
	/// # }
	/// ```
	pub fn exec_with<F>(self, callback: F) -> AggregateFuture
	where
		F: FnOnce(std::result::Result<&[Document], &NoSQLError>) + Send + 'static,
	{
		self.execute(Some(Box::new(callback)))
	}

	fn execute(self, callback: Option<AggregateCallback>) -> AggregateFuture {
		let span = tracing::debug_span!(
			"aggregate",
			collection = %self.collection,
			stages = self.pipeline.len()
		);

		let handle = match Handle::try_current() {
			Ok(handle) => handle,
			Err(err) => {
				let error = NoSQLError::ExecutionError(format!(
					"aggregate must be executed within a Tokio runtime: {}",
					err
				));
				span.in_scope(|| tracing::warn!(error = %error, "aggregate not started"));
				if let Some(callback) = callback {
					callback(Err(&error));
				}
				return AggregateFuture::ready(Err(error));
			}
		};

		let Self {
			backend,
			collection,
			pipeline,
			options,
		} = self;

		let task = async move {
			tracing::debug!("aggregate submitted");
			let result = if options.is_default() {
				backend.aggregate(&collection, pipeline).await
			} else {
				backend
					.aggregate_with_options(&collection, pipeline, options)
					.await
			};

			match &result {
				Ok(documents) => tracing::debug!(results = documents.len(), "aggregate completed"),
				Err(error) => tracing::warn!(error = %error, "aggregate failed"),
			}

			if let Some(callback) = callback {
				callback(result.as_deref());
			}
			result
		}
		.instrument(span);

		AggregateFuture::spawned(handle.spawn(task))
	}
}

impl IntoFuture for Aggregate {
	type Output = Result<Vec<Document>>;
	type IntoFuture = AggregateFuture;

	fn into_future(self) -> Self::IntoFuture {
		self.exec()
	}
}

impl fmt::Debug for Aggregate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Aggregate")
			.field("collection", &self.collection)
			.field("pipeline", &self.pipeline)
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}
