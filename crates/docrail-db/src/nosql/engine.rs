//! In-memory aggregation engine
//!
//! Evaluates aggregation pipelines over documents held in process. The
//! memory backend uses it for `aggregate` and `find`, which lets pipelines
//! built with [`Aggregate`](crate::nosql::aggregate::Aggregate) run without a
//! database server.
//!
//! Supported stages: `$match`, `$project`, `$addFields`/`$set`, `$unset`,
//! `$group`, `$sort`, `$limit`, `$skip`, `$unwind`, `$count`, `$sortByCount`,
//! `$replaceRoot`/`$replaceWith`, `$sample`, `$lookup`, `$unionWith`,
//! `$facet` and a trailing `$out`.

mod accumulator;
mod expr;
mod filter;
mod stages;
mod value;

use bson::{Bson, Document};
use std::collections::HashMap;

use super::aggregate::stage_name;
use super::error::{NoSQLError, Result};
use value::set_path;

pub(crate) use filter::matches;

/// Read access to named collections for stages that reach outside the
/// current pipeline (`$lookup`, `$unionWith`)
pub trait CollectionSource {
	/// Returns a snapshot of the collection; unknown collections are empty
	fn documents(&self, collection: &str) -> Vec<Document>;
}

impl CollectionSource for HashMap<String, Vec<Document>> {
	fn documents(&self, collection: &str) -> Vec<Document> {
		self.get(collection).cloned().unwrap_or_default()
	}
}

/// Outcome of evaluating a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
	/// Documents emitted by the last stage
	pub documents: Vec<Document>,
	/// Target collection of a trailing `$out` stage
	pub output: Option<String>,
}

/// Runs pipelines against an input document set
pub struct PipelineEvaluator<'a> {
	source: &'a dyn CollectionSource,
}

impl<'a> PipelineEvaluator<'a> {
	pub fn new(source: &'a dyn CollectionSource) -> Self {
		Self { source }
	}

	/// Evaluates `pipeline` over `input`
	///
	/// When the pipeline ends in `$out`, the documents that reached it are
	/// returned in [`Evaluation::documents`] and the target collection in
	/// [`Evaluation::output`]. Writing them is up to the caller.
	///
	/// # Examples
	///
	/// ```
	/// use bson::doc;
	/// use docrail_db::nosql::engine::PipelineEvaluator;
	/// use std::collections::HashMap;
	///
	/// let collections = HashMap::new();
	/// let input = vec![doc! { "age": 3 }, doc! { "age": 9 }];
	/// let result = PipelineEvaluator::new(&collections)
	///     .evaluate(input, &[doc! { "$group": { "_id": null, "max": { "$max": "$age" } } }])
	///     .unwrap();
	/// assert_eq!(result.documents, vec![doc! { "_id": null, "max": 9 }]);
	/// ```
	pub fn evaluate(&self, input: Vec<Document>, pipeline: &[Document]) -> Result<Evaluation> {
		let (documents, output) = self.run(input, pipeline, None)?;
		Ok(Evaluation { documents, output })
	}

	/// `enclosing` names the stage a nested pipeline runs under
	fn run(
		&self,
		mut docs: Vec<Document>,
		pipeline: &[Document],
		enclosing: Option<&str>,
	) -> Result<(Vec<Document>, Option<String>)> {
		let mut output = None;

		for (index, stage) in pipeline.iter().enumerate() {
			let name = stage_name(stage)?;
			let spec = stage.get(name).unwrap_or(&Bson::Null);
			tracing::trace!(stage = name, input = docs.len(), "evaluating stage");

			docs = match name {
				"$match" => stages::match_stage(docs, spec)?,
				"$project" => stages::project(docs, spec)?,
				"$addFields" | "$set" => stages::add_fields(name, docs, spec)?,
				"$unset" => stages::unset(docs, spec)?,
				"$group" => stages::group(docs, spec)?,
				"$sort" => stages::sort(docs, spec)?,
				"$limit" => stages::limit(docs, spec)?,
				"$skip" => stages::skip(docs, spec)?,
				"$unwind" => stages::unwind(docs, spec)?,
				"$count" => stages::count(docs, spec)?,
				"$sortByCount" => stages::sort_by_count(docs, spec)?,
				"$replaceRoot" | "$replaceWith" => stages::replace_root(name, docs, spec)?,
				"$sample" => stages::sample(docs, spec)?,
				"$lookup" => self.lookup(docs, spec)?,
				"$unionWith" => self.union_with(docs, spec)?,
				"$facet" => {
					if let Some(outer) = enclosing {
						return Err(NoSQLError::ExecutionError(format!(
							"$facet is not allowed to be used within a {} stage",
							outer
						)));
					}
					self.facet(docs, spec)?
				}
				"$out" => {
					if let Some(outer) = enclosing {
						return Err(NoSQLError::ExecutionError(format!(
							"$out is not allowed to be used within a {} stage",
							outer
						)));
					}
					if index + 1 != pipeline.len() {
						return Err(NoSQLError::ExecutionError(
							"$out can only be the final stage in the pipeline".to_string(),
						));
					}
					output = Some(out_target(spec)?);
					docs
				}
				other => {
					return Err(NoSQLError::ExecutionError(format!(
						"Unrecognized pipeline stage name: '{}'",
						other
					)));
				}
			};
		}

		Ok((docs, output))
	}

	fn lookup(&self, docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
		let Bson::Document(options) = spec else {
			return Err(NoSQLError::ExecutionError(
				"the $lookup specification must be an object".to_string(),
			));
		};
		let from = string_option(options, "$lookup", "from")?;
		let foreign = self.source.documents(from);

		let Some(pipeline) = options.get("pipeline") else {
			return stages::lookup(docs, spec, &foreign);
		};
		if options.contains_key("localField") || options.contains_key("let") {
			return Err(NoSQLError::UnsupportedFeature(
				"correlated $lookup pipelines are not supported in memory".to_string(),
			));
		}

		let pipeline = pipeline_of("$lookup", pipeline)?;
		let as_field = string_option(options, "$lookup", "as")?;
		let (joined, _) = self.run(foreign, &pipeline, Some("$lookup"))?;
		let joined: Vec<Bson> = joined.into_iter().map(Bson::Document).collect();

		Ok(docs
			.into_iter()
			.map(|mut doc| {
				set_path(&mut doc, as_field, Bson::Array(joined.clone()));
				doc
			})
			.collect())
	}

	fn union_with(&self, mut docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
		let (collection, pipeline) = match spec {
			Bson::String(name) => (name.as_str(), Vec::new()),
			Bson::Document(options) => {
				let collection = string_option(options, "$unionWith", "coll")?;
				let pipeline = match options.get("pipeline") {
					Some(p) => pipeline_of("$unionWith", p)?,
					None => Vec::new(),
				};
				(collection, pipeline)
			}
			_ => {
				return Err(NoSQLError::ExecutionError(
					"the $unionWith stage takes a collection name or an object".to_string(),
				));
			}
		};

		let (extra, _) = self.run(
			self.source.documents(collection),
			&pipeline,
			Some("$unionWith"),
		)?;
		docs.extend(extra);
		Ok(docs)
	}

	fn facet(&self, docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
		let Bson::Document(facets) = spec else {
			return Err(NoSQLError::ExecutionError(
				"the $facet specification must be an object".to_string(),
			));
		};
		if facets.is_empty() {
			return Err(NoSQLError::ExecutionError(
				"the $facet specification must be a non-empty object".to_string(),
			));
		}

		let mut out = Document::new();
		for (name, pipeline) in facets {
			let pipeline = pipeline_of("$facet", pipeline)?;
			let (result, _) = self.run(docs.clone(), &pipeline, Some("$facet"))?;
			out.insert(
				name.clone(),
				Bson::Array(result.into_iter().map(Bson::Document).collect()),
			);
		}
		Ok(vec![out])
	}
}

fn string_option<'a>(options: &'a Document, stage: &str, key: &str) -> Result<&'a str> {
	match options.get(key) {
		Some(Bson::String(s)) => Ok(s.as_str()),
		_ => Err(NoSQLError::ExecutionError(format!(
			"{} argument '{}' must be a string",
			stage, key
		))),
	}
}

fn pipeline_of(stage: &str, value: &Bson) -> Result<Vec<Document>> {
	let Bson::Array(items) = value else {
		return Err(NoSQLError::ExecutionError(format!(
			"{} requires a pipeline array",
			stage
		)));
	};
	items
		.iter()
		.map(|item| match item {
			Bson::Document(d) => Ok(d.clone()),
			_ => Err(NoSQLError::ExecutionError(format!(
				"{} pipeline stages must be objects",
				stage
			))),
		})
		.collect()
}

fn out_target(spec: &Bson) -> Result<String> {
	match spec {
		Bson::String(name) if !name.is_empty() => Ok(name.clone()),
		Bson::Document(options) => Ok(string_option(options, "$out", "coll")?.to_string()),
		_ => Err(NoSQLError::ExecutionError(
			"$out requires a collection name".to_string(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bson::doc;
	use rstest::{fixture, rstest};

	#[fixture]
	fn collections() -> HashMap<String, Vec<Document>> {
		let mut map = HashMap::new();
		map.insert(
			"users".to_string(),
			vec![
				doc! { "name": "guillermo", "age": 20, "team": "core" },
				doc! { "name": "nathan", "age": 35, "team": "core" },
				doc! { "name": "tj", "age": 28, "team": "web" },
			],
		);
		map.insert(
			"teams".to_string(),
			vec![
				doc! { "slug": "core", "label": "Core" },
				doc! { "slug": "web", "label": "Web" },
			],
		);
		map
	}

	fn run(
		collections: &HashMap<String, Vec<Document>>,
		pipeline: &[Document],
	) -> Result<Evaluation> {
		PipelineEvaluator::new(collections).evaluate(collections.documents("users"), pipeline)
	}

	#[rstest]
	fn test_max_age_pipeline(collections: HashMap<String, Vec<Document>>) {
		// Arrange
		let pipeline = vec![
			doc! { "$group": { "_id": null, "maxAge": { "$max": "$age" } } },
			doc! { "$project": { "_id": 0, "maxAge": 1 } },
		];

		// Act
		let result = run(&collections, &pipeline).unwrap();

		// Assert
		assert_eq!(result.documents, vec![doc! { "maxAge": 35 }]);
		assert_eq!(result.output, None);
	}

	#[rstest]
	fn test_out_must_be_last(collections: HashMap<String, Vec<Document>>) {
		let pipeline = vec![doc! { "$out": "copy" }, doc! { "$limit": 1 }];
		let err = run(&collections, &pipeline).unwrap_err();
		assert!(err.to_string().contains("final stage"));
	}

	#[rstest]
	fn test_out_reports_target(collections: HashMap<String, Vec<Document>>) {
		let pipeline = vec![doc! { "$match": { "team": "core" } }, doc! { "$out": "core_users" }];
		let result = run(&collections, &pipeline).unwrap();
		assert_eq!(result.output.as_deref(), Some("core_users"));
		assert_eq!(result.documents.len(), 2);
	}

	#[rstest]
	fn test_unknown_stage(collections: HashMap<String, Vec<Document>>) {
		let err = run(&collections, &[doc! { "$teleport": {} }]).unwrap_err();
		assert!(err.to_string().contains("Unrecognized pipeline stage name: '$teleport'"));
	}

	#[rstest]
	fn test_malformed_stage_is_invalid_argument(collections: HashMap<String, Vec<Document>>) {
		let err = run(&collections, &[doc! { "$match": {}, "$limit": 1 }]).unwrap_err();
		assert!(err.is_invalid_argument());
	}

	#[rstest]
	fn test_lookup_equality(collections: HashMap<String, Vec<Document>>) {
		let pipeline = vec![
			doc! { "$lookup": { "from": "teams", "localField": "team", "foreignField": "slug", "as": "team_info" } },
			doc! { "$unwind": "$team_info" },
			doc! { "$project": { "_id": 0, "name": 1, "label": "$team_info.label" } },
		];
		let result = run(&collections, &pipeline).unwrap();
		assert_eq!(result.documents[2], doc! { "name": "tj", "label": "Web" });
	}

	#[rstest]
	fn test_lookup_pipeline_form(collections: HashMap<String, Vec<Document>>) {
		let pipeline = vec![
			doc! { "$limit": 1 },
			doc! { "$lookup": { "from": "teams", "pipeline": [ { "$count": "n" } ], "as": "stats" } },
		];
		let result = run(&collections, &pipeline).unwrap();
		assert_eq!(
			result.documents[0].get("stats"),
			Some(&Bson::Array(vec![Bson::Document(doc! { "n": 2 })]))
		);
	}

	#[rstest]
	fn test_union_with(collections: HashMap<String, Vec<Document>>) {
		let pipeline = vec![doc! {
			"$unionWith": { "coll": "teams", "pipeline": [ { "$project": { "name": "$label" } } ] }
		}];
		let result = run(&collections, &pipeline).unwrap();
		assert_eq!(result.documents.len(), 5);
		assert_eq!(result.documents[4], doc! { "name": "Web" });
	}

	#[rstest]
	fn test_facet(collections: HashMap<String, Vec<Document>>) {
		let pipeline = vec![doc! {
			"$facet": {
				"total": [ { "$count": "n" } ],
				"youngest": [ { "$sort": { "age": 1 } }, { "$limit": 1 }, { "$project": { "_id": 0, "name": 1 } } ],
			}
		}];
		let result = run(&collections, &pipeline).unwrap();
		assert_eq!(
			result.documents,
			vec![doc! { "total": [ { "n": 3 } ], "youngest": [ { "name": "guillermo" } ] }]
		);
	}

	#[rstest]
	fn test_out_rejected_inside_facet(collections: HashMap<String, Vec<Document>>) {
		let pipeline = vec![doc! { "$facet": { "copy": [ { "$out": "elsewhere" } ] } }];
		let err = run(&collections, &pipeline).unwrap_err();
		assert!(err.to_string().contains("$out is not allowed"));
	}

	#[rstest]
	fn test_unknown_collection_is_empty(collections: HashMap<String, Vec<Document>>) {
		let result = run(&collections, &[doc! { "$unionWith": "ghosts" }]).unwrap();
		assert_eq!(result.documents.len(), 3);
	}
}
