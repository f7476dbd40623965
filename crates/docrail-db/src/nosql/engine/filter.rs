//! Query filter matching for `$match` and `find`

use bson::{Bson, Document};
use std::cmp::Ordering;

use super::expr::evaluate_or_null;
use super::value::{bson_eq, compare_bson, is_truthy, path_candidates, same_type_bracket};
use crate::nosql::error::{NoSQLError, Result};

/// Tests a document against a query filter
pub(crate) fn matches(filter: &Document, doc: &Document) -> Result<bool> {
	for (key, condition) in filter {
		let ok = match key.as_str() {
			"$and" => logical(key, condition)?
				.iter()
				.try_fold(true, |acc, f| Ok::<_, NoSQLError>(acc && matches(f, doc)?))?,
			"$or" => {
				let mut any = false;
				for f in logical(key, condition)? {
					if matches(f, doc)? {
						any = true;
						break;
					}
				}
				any
			}
			"$nor" => {
				let mut none = true;
				for f in logical(key, condition)? {
					if matches(f, doc)? {
						none = false;
						break;
					}
				}
				none
			}
			"$expr" => is_truthy(&evaluate_or_null(condition, doc)?),
			op if op.starts_with('$') => {
				return Err(NoSQLError::ExecutionError(format!(
					"unknown top level operator: {}",
					op
				)));
			}
			path => field_matches(path, condition, doc)?,
		};

		if !ok {
			return Ok(false);
		}
	}

	Ok(true)
}

fn logical<'a>(op: &str, condition: &'a Bson) -> Result<Vec<&'a Document>> {
	let Bson::Array(items) = condition else {
		return Err(NoSQLError::ExecutionError(format!(
			"{} must be an array",
			op
		)));
	};
	if items.is_empty() {
		return Err(NoSQLError::ExecutionError(format!(
			"{} argument must be a non-empty array",
			op
		)));
	}
	items
		.iter()
		.map(|item| match item {
			Bson::Document(d) => Ok(d),
			_ => Err(NoSQLError::ExecutionError(format!(
				"{} argument's entries must be objects",
				op
			))),
		})
		.collect()
}

fn field_matches(path: &str, condition: &Bson, doc: &Document) -> Result<bool> {
	let candidates = path_candidates(doc, path);

	match condition {
		Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
			for (op, operand) in ops {
				if !operator_matches(op, operand, &candidates)? {
					return Ok(false);
				}
			}
			Ok(true)
		}
		value => Ok(equals_any(value, &candidates)),
	}
}

/// Equality with missing-as-null semantics
fn equals_any(value: &Bson, candidates: &[Bson]) -> bool {
	if candidates.is_empty() {
		return matches!(value, Bson::Null);
	}
	candidates.iter().any(|c| bson_eq(c, value))
}

fn operator_matches(op: &str, operand: &Bson, candidates: &[Bson]) -> Result<bool> {
	let compare = |accept: fn(Ordering) -> bool| {
		candidates
			.iter()
			.any(|c| same_type_bracket(c, operand) && accept(compare_bson(c, operand)))
	};

	match op {
		"$eq" => Ok(equals_any(operand, candidates)),
		"$ne" => Ok(!equals_any(operand, candidates)),
		"$gt" => Ok(compare(|o| o == Ordering::Greater)),
		"$gte" => Ok(compare(|o| o != Ordering::Less)),
		"$lt" => Ok(compare(|o| o == Ordering::Less)),
		"$lte" => Ok(compare(|o| o != Ordering::Greater)),
		"$in" | "$nin" => {
			let Bson::Array(options) = operand else {
				return Err(NoSQLError::ExecutionError(format!("{} needs an array", op)));
			};
			let found = options.iter().any(|o| equals_any(o, candidates));
			Ok(if op == "$in" { found } else { !found })
		}
		"$exists" => Ok(is_truthy(operand) != candidates.is_empty()),
		other => Err(NoSQLError::ExecutionError(format!(
			"unknown operator: {}",
			other
		))),
	}
}
