//! Stage implementations for the in-memory evaluator
//!
//! Each function consumes the documents produced by the previous stage and
//! returns the documents for the next one.

use bson::{Bson, Document, doc};
use indexmap::IndexMap;
use rand::seq::SliceRandom;

use super::accumulator::{Accumulator, count as count_value};
use super::expr::{evaluate, evaluate_or_null};
use super::filter;
use super::value::{
	as_integer, bson_eq, compare_bson, group_key, is_truthy, path_candidates, remove_path,
	resolve_path, set_path,
};
use crate::nosql::error::{NoSQLError, Result};

fn stage_error(message: impl Into<String>) -> NoSQLError {
	NoSQLError::ExecutionError(message.into())
}

fn spec_document<'a>(stage: &str, spec: &'a Bson) -> Result<&'a Document> {
	match spec {
		Bson::Document(d) => Ok(d),
		other => Err(stage_error(format!(
			"the {} stage specification must be an object, not {:?}",
			stage,
			other.element_type()
		))),
	}
}

pub(crate) fn match_stage(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let filter = spec_document("$match", spec)?;
	let mut out = Vec::with_capacity(docs.len());
	for doc in docs {
		if filter::matches(filter, &doc)? {
			out.push(doc);
		}
	}
	Ok(out)
}

enum Projection {
	Include,
	Exclude,
	Computed(Bson),
}

pub(crate) fn project(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let spec = spec_document("$project", spec)?;
	if spec.is_empty() {
		return Err(stage_error(
			"Invalid $project :: caused by :: projection specification must have at least one field",
		));
	}

	let mut fields: Vec<(&str, Projection)> = Vec::with_capacity(spec.len());
	for (key, value) in spec {
		let projection = match value {
			Bson::Boolean(b) => {
				if *b {
					Projection::Include
				} else {
					Projection::Exclude
				}
			}
			Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
				if is_truthy(value) {
					Projection::Include
				} else {
					Projection::Exclude
				}
			}
			expr => Projection::Computed(expr.clone()),
		};
		fields.push((key.as_str(), projection));
	}

	let id_projection = fields.iter().find(|(k, _)| *k == "_id").map(|(_, p)| p);
	let only_id = fields.iter().all(|(k, _)| *k == "_id");
	let inclusion = if only_id {
		!matches!(id_projection, Some(Projection::Exclude))
	} else {
		fields
			.iter()
			.any(|(k, p)| *k != "_id" && !matches!(p, Projection::Exclude))
	};
	let exclusion_field = fields
		.iter()
		.find(|(k, p)| *k != "_id" && matches!(p, Projection::Exclude));

	if inclusion && let Some((field, _)) = exclusion_field {
		return Err(stage_error(format!(
			"Invalid $project :: caused by :: Cannot do exclusion on field {} in inclusion projection",
			field
		)));
	}

	docs.into_iter()
		.map(|doc| {
			if !inclusion {
				let mut out = doc;
				for (field, _) in fields.iter().filter(|(_, p)| matches!(p, Projection::Exclude)) {
					remove_path(&mut out, field);
				}
				return Ok(out);
			}

			let mut out = Document::new();
			match id_projection {
				Some(Projection::Exclude) => {}
				Some(Projection::Computed(expr)) => {
					if let Some(value) = evaluate(expr, &doc)? {
						out.insert("_id", value);
					}
				}
				_ => {
					if let Some(id) = doc.get("_id") {
						out.insert("_id", id.clone());
					}
				}
			}

			for (field, projection) in fields.iter().filter(|(k, _)| *k != "_id") {
				let value = match projection {
					Projection::Include => resolve_path(&doc, field),
					Projection::Computed(expr) => evaluate(expr, &doc)?,
					Projection::Exclude => None,
				};
				if let Some(value) = value {
					set_path(&mut out, field, value);
				}
			}
			Ok(out)
		})
		.collect()
}

pub(crate) fn add_fields(stage: &str, docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let spec = spec_document(stage, spec)?;
	docs.into_iter()
		.map(|doc| {
			let mut out = doc.clone();
			for (field, expr) in spec {
				match evaluate(expr, &doc)? {
					Some(value) => set_path(&mut out, field, value),
					None => remove_path(&mut out, field),
				}
			}
			Ok(out)
		})
		.collect()
}

pub(crate) fn unset(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let fields: Vec<String> = match spec {
		Bson::String(s) => vec![s.clone()],
		Bson::Array(items) if !items.is_empty() => items
			.iter()
			.map(|item| match item {
				Bson::String(s) => Ok(s.clone()),
				_ => Err(stage_error("$unset specification must be a string or an array of strings")),
			})
			.collect::<Result<_>>()?,
		_ => {
			return Err(stage_error(
				"$unset specification must be a string or an array of strings",
			));
		}
	};

	Ok(docs
		.into_iter()
		.map(|mut doc| {
			for field in &fields {
				remove_path(&mut doc, field);
			}
			doc
		})
		.collect())
}

pub(crate) fn group(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let spec = spec_document("$group", spec)?;
	let id_expr = spec
		.get("_id")
		.ok_or_else(|| stage_error("a group specification must include an _id"))?;

	let mut accumulators = Vec::new();
	for (field, acc) in spec {
		if field == "_id" {
			continue;
		}
		if field.contains('.') {
			return Err(stage_error(format!(
				"The field name '{}' cannot contain '.'",
				field
			)));
		}
		accumulators.push((field.as_str(), Accumulator::parse(field, acc)?));
	}

	let mut groups: IndexMap<String, (Bson, Vec<&Document>)> = IndexMap::new();
	for doc in &docs {
		let id = evaluate_or_null(id_expr, doc)?;
		groups
			.entry(group_key(&id))
			.or_insert_with(|| (id, Vec::new()))
			.1
			.push(doc);
	}

	let mut out = Vec::with_capacity(groups.len());
	for (_, (id, members)) in groups {
		let mut result = doc! { "_id": id };
		for (field, acc) in &accumulators {
			result.insert(*field, acc.compute(&members)?);
		}
		out.push(result);
	}
	Ok(out)
}

pub(crate) fn sort(mut docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let spec = spec_document("$sort", spec)?;
	if spec.is_empty() {
		return Err(stage_error("$sort stage must have at least one sort key"));
	}

	let mut keys = Vec::with_capacity(spec.len());
	for (field, direction) in spec {
		let descending = match as_integer(direction) {
			Some(1) => false,
			Some(-1) => true,
			_ => {
				return Err(stage_error(
					"$sort key ordering must be 1 (for ascending) or -1 (for descending)",
				));
			}
		};
		keys.push((field.as_str(), descending));
	}

	docs.sort_by(|a, b| {
		for (field, descending) in &keys {
			let va = resolve_path(a, field).unwrap_or(Bson::Null);
			let vb = resolve_path(b, field).unwrap_or(Bson::Null);
			let ord = compare_bson(&va, &vb);
			let ord = if *descending { ord.reverse() } else { ord };
			if ord.is_ne() {
				return ord;
			}
		}
		std::cmp::Ordering::Equal
	});

	Ok(docs)
}

pub(crate) fn limit(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	match as_integer(spec) {
		Some(n) if n > 0 => Ok(docs.into_iter().take(n as usize).collect()),
		_ => Err(stage_error("the limit must be positive")),
	}
}

pub(crate) fn skip(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	match as_integer(spec) {
		Some(n) if n >= 0 => Ok(docs.into_iter().skip(n as usize).collect()),
		_ => Err(stage_error("invalid argument to $skip stage: value must be a non-negative integer")),
	}
}

pub(crate) fn unwind(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let (path, index_field, preserve) = match spec {
		Bson::String(path) => (path.as_str(), None, false),
		Bson::Document(options) => {
			let path = match options.get("path") {
				Some(Bson::String(path)) => path.as_str(),
				_ => return Err(stage_error("no path specified to $unwind stage")),
			};
			let index_field = match options.get("includeArrayIndex") {
				None => None,
				Some(Bson::String(name)) if !name.starts_with('$') => Some(name.as_str()),
				Some(_) => {
					return Err(stage_error(
						"includeArrayIndex option to $unwind stage must be a field name",
					));
				}
			};
			let preserve = match options.get("preserveNullAndEmptyArrays") {
				None => false,
				Some(Bson::Boolean(b)) => *b,
				Some(_) => {
					return Err(stage_error(
						"expected a boolean for the preserveNullAndEmptyArrays option to $unwind stage",
					));
				}
			};
			(path, index_field, preserve)
		}
		_ => {
			return Err(stage_error(
				"expected either a string or an object as specification for $unwind stage",
			));
		}
	};

	let Some(field) = path.strip_prefix('$') else {
		return Err(stage_error(format!(
			"path option to $unwind stage should be prefixed with a '$': {}",
			path
		)));
	};

	let mut out = Vec::with_capacity(docs.len());
	for doc in docs {
		match resolve_path(&doc, field) {
			Some(Bson::Array(items)) if !items.is_empty() => {
				for (index, item) in items.into_iter().enumerate() {
					let mut unwound = doc.clone();
					set_path(&mut unwound, field, item);
					if let Some(name) = index_field {
						set_path(&mut unwound, name, Bson::Int64(index as i64));
					}
					out.push(unwound);
				}
			}
			Some(Bson::Array(_)) | Some(Bson::Null) | None => {
				if preserve {
					let mut kept = doc;
					if matches!(resolve_path(&kept, field), Some(Bson::Array(_))) {
						remove_path(&mut kept, field);
					}
					if let Some(name) = index_field {
						set_path(&mut kept, name, Bson::Null);
					}
					out.push(kept);
				}
			}
			Some(_) => {
				let mut kept = doc;
				if let Some(name) = index_field {
					set_path(&mut kept, name, Bson::Null);
				}
				out.push(kept);
			}
		}
	}
	Ok(out)
}

pub(crate) fn count(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let Bson::String(field) = spec else {
		return Err(stage_error("the count field must be a non-empty string"));
	};
	if field.is_empty() {
		return Err(stage_error("the count field must be a non-empty string"));
	}
	if field.starts_with('$') {
		return Err(stage_error("the count field cannot be a $-prefixed path"));
	}
	if field.contains('.') {
		return Err(stage_error("the count field cannot contain '.'"));
	}

	if docs.is_empty() {
		return Ok(Vec::new());
	}
	let mut out = Document::new();
	out.insert(field.clone(), count_value(docs.len()));
	Ok(vec![out])
}

pub(crate) fn sort_by_count(docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let valid = match spec {
		Bson::String(s) => s.starts_with('$'),
		Bson::Document(d) => d.keys().next().is_some_and(|k| k.starts_with('$')),
		_ => false,
	};
	if !valid {
		return Err(stage_error(
			"the sortByCount field must be defined as a $-prefixed path or an expression",
		));
	}

	let grouped = group(docs, &Bson::Document(doc! { "_id": spec.clone(), "count": { "$sum": 1 } }))?;
	sort(grouped, &Bson::Document(doc! { "count": -1 }))
}

pub(crate) fn replace_root(stage: &str, docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let new_root = if stage == "$replaceRoot" {
		spec_document(stage, spec)?
			.get("newRoot")
			.ok_or_else(|| stage_error("no newRoot specified for the $replaceRoot stage"))?
	} else {
		spec
	};

	docs.into_iter()
		.map(|doc| match evaluate_or_null(new_root, &doc)? {
			Bson::Document(root) => Ok(root),
			other => Err(stage_error(format!(
				"'newRoot' expression must evaluate to an object, but resulting value was: {}",
				other
			))),
		})
		.collect()
}

pub(crate) fn sample(mut docs: Vec<Document>, spec: &Bson) -> Result<Vec<Document>> {
	let size = spec_document("$sample", spec)?
		.get("size")
		.and_then(as_integer)
		.filter(|n| *n >= 0)
		.ok_or_else(|| stage_error("size argument to $sample must be a non-negative number"))?;

	docs.shuffle(&mut rand::thread_rng());
	docs.truncate(size as usize);
	Ok(docs)
}

/// Equality-form `$lookup` against another collection
pub(crate) fn lookup(docs: Vec<Document>, spec: &Bson, foreign: &[Document]) -> Result<Vec<Document>> {
	let spec = spec_document("$lookup", spec)?;
	let field = |name: &str| match spec.get(name) {
		Some(Bson::String(s)) => Ok(s.clone()),
		_ => Err(stage_error(format!(
			"$lookup argument '{}' must be a string",
			name
		))),
	};
	let local_field = field("localField")?;
	let foreign_field = field("foreignField")?;
	let as_field = field("as")?;

	let keyed = |doc: &Document, path: &str| {
		let values = path_candidates(doc, path);
		if values.is_empty() { vec![Bson::Null] } else { values }
	};

	Ok(docs
		.into_iter()
		.map(|mut doc| {
			let local = keyed(&doc, &local_field);
			let joined: Vec<Bson> = foreign
				.iter()
				.filter(|f| {
					let remote = keyed(*f, &foreign_field);
					local.iter().any(|l| remote.iter().any(|r| bson_eq(l, r)))
				})
				.map(|f| Bson::Document(f.clone()))
				.collect();
			set_path(&mut doc, &as_field, Bson::Array(joined));
			doc
		})
		.collect())
}
