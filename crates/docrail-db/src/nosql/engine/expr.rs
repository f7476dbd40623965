//! Aggregation expression evaluation
//!
//! `evaluate` returns `Ok(None)` for a missing field so callers can tell a
//! missing value from an explicit null.

use bson::{Bson, Document};
use std::cmp::Ordering;

use super::value::{NumericFold, as_f64, compare_bson, resolve_path};
use crate::nosql::error::{NoSQLError, Result};

pub(crate) fn evaluate(expr: &Bson, root: &Document) -> Result<Option<Bson>> {
	match expr {
		Bson::String(s) if s.starts_with("$$") => variable(&s[2..], root),
		Bson::String(s) if s.starts_with('$') => Ok(resolve_path(root, &s[1..])),
		Bson::Document(spec) => {
			if let Some((op, arg)) = operator(spec) {
				return apply(op, arg, root).map(Some);
			}
			let mut out = Document::new();
			for (key, value) in spec {
				if let Some(v) = evaluate(value, root)? {
					out.insert(key.clone(), v);
				}
			}
			Ok(Some(Bson::Document(out)))
		}
		Bson::Array(items) => {
			let mut out = Vec::with_capacity(items.len());
			for item in items {
				out.push(evaluate(item, root)?.unwrap_or(Bson::Null));
			}
			Ok(Some(Bson::Array(out)))
		}
		literal => Ok(Some(literal.clone())),
	}
}

/// Evaluates an expression, mapping a missing field to null
pub(crate) fn evaluate_or_null(expr: &Bson, root: &Document) -> Result<Bson> {
	Ok(evaluate(expr, root)?.unwrap_or(Bson::Null))
}

fn variable(name: &str, root: &Document) -> Result<Option<Bson>> {
	let (var, path) = match name.split_once('.') {
		Some((var, path)) => (var, Some(path)),
		None => (name, None),
	};

	match var {
		"ROOT" | "CURRENT" => Ok(match path {
			Some(path) => resolve_path(root, path),
			None => Some(Bson::Document(root.clone())),
		}),
		other => Err(NoSQLError::ExecutionError(format!(
			"Use of undefined variable: {}",
			other
		))),
	}
}

/// Returns the operator and argument when `spec` is a single `$`-prefixed key
fn operator(spec: &Document) -> Option<(&str, &Bson)> {
	if spec.len() != 1 {
		return None;
	}
	let (key, value) = spec.iter().next()?;
	key.starts_with('$').then_some((key.as_str(), value))
}

fn operands<'a>(arg: &'a Bson) -> Vec<&'a Bson> {
	match arg {
		Bson::Array(items) => items.iter().collect(),
		single => vec![single],
	}
}

fn evaluate_operands(op: &str, arg: &Bson, root: &Document, arity: Option<usize>) -> Result<Vec<Bson>> {
	let args = operands(arg);
	if let Some(expected) = arity
		&& args.len() != expected
	{
		return Err(NoSQLError::ExecutionError(format!(
			"Expression {} takes exactly {} arguments. {} were passed in.",
			op,
			expected,
			args.len()
		)));
	}
	args.into_iter()
		.map(|a| evaluate_or_null(a, root))
		.collect()
}

fn apply(op: &str, arg: &Bson, root: &Document) -> Result<Bson> {
	match op {
		"$literal" => Ok(arg.clone()),
		"$add" => fold_numbers(op, evaluate_operands(op, arg, root, None)?, NumericFold::sum()),
		"$multiply" => fold_numbers(
			op,
			evaluate_operands(op, arg, root, None)?,
			NumericFold::product(),
		),
		"$subtract" => {
			let args = evaluate_operands(op, arg, root, Some(2))?;
			if args.iter().any(is_nullish) {
				return Ok(Bson::Null);
			}
			let mut fold = NumericFold::sum();
			fold.push(&args[0]);
			let negated = negate(&args[1]).ok_or_else(|| non_numeric(op, &args[1]))?;
			if !fold.push(&negated) || as_f64(&args[0]).is_none() {
				return Err(non_numeric(op, &args[0]));
			}
			Ok(fold.finish())
		}
		"$divide" => {
			let args = evaluate_operands(op, arg, root, Some(2))?;
			if args.iter().any(is_nullish) {
				return Ok(Bson::Null);
			}
			let dividend = as_f64(&args[0]).ok_or_else(|| non_numeric(op, &args[0]))?;
			let divisor = as_f64(&args[1]).ok_or_else(|| non_numeric(op, &args[1]))?;
			if divisor == 0.0 {
				return Err(NoSQLError::ExecutionError("can't $divide by zero".to_string()));
			}
			Ok(Bson::Double(dividend / divisor))
		}
		"$concat" => {
			let args = evaluate_operands(op, arg, root, None)?;
			let mut out = String::new();
			for value in &args {
				match value {
					Bson::Null | Bson::Undefined => return Ok(Bson::Null),
					Bson::String(s) => out.push_str(s),
					other => {
						return Err(NoSQLError::ExecutionError(format!(
							"$concat only supports strings, not {}",
							other
						)));
					}
				}
			}
			Ok(Bson::String(out))
		}
		"$toUpper" | "$toLower" => {
			let args = evaluate_operands(op, arg, root, Some(1))?;
			let text = match &args[0] {
				Bson::Null | Bson::Undefined => String::new(),
				Bson::String(s) => s.clone(),
				other => other.to_string(),
			};
			Ok(Bson::String(if op == "$toUpper" {
				text.to_uppercase()
			} else {
				text.to_lowercase()
			}))
		}
		"$size" => {
			let args = evaluate_operands(op, arg, root, Some(1))?;
			match &args[0] {
				Bson::Array(items) => Ok(Bson::Int32(items.len() as i32)),
				other => Err(NoSQLError::ExecutionError(format!(
					"The argument to $size must be an array. Type of argument: {:?}",
					other.element_type()
				))),
			}
		}
		"$ifNull" => {
			let args = evaluate_operands(op, arg, root, Some(2))?;
			Ok(if is_nullish(&args[0]) {
				args[1].clone()
			} else {
				args[0].clone()
			})
		}
		"$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
			let args = evaluate_operands(op, arg, root, Some(2))?;
			let ord = compare_bson(&args[0], &args[1]);
			Ok(Bson::Boolean(match op {
				"$eq" => ord == Ordering::Equal,
				"$ne" => ord != Ordering::Equal,
				"$gt" => ord == Ordering::Greater,
				"$gte" => ord != Ordering::Less,
				"$lt" => ord == Ordering::Less,
				_ => ord != Ordering::Greater,
			}))
		}
		other => Err(NoSQLError::ExecutionError(format!(
			"Unrecognized expression '{}'",
			other
		))),
	}
}

fn fold_numbers(op: &str, args: Vec<Bson>, mut fold: NumericFold) -> Result<Bson> {
	if args.iter().any(is_nullish) {
		return Ok(Bson::Null);
	}
	for value in &args {
		if !fold.push(value) {
			return Err(non_numeric(op, value));
		}
	}
	Ok(fold.finish())
}

fn negate(value: &Bson) -> Option<Bson> {
	match value {
		Bson::Int32(n) => Some(n.checked_neg().map_or(Bson::Int64(-(*n as i64)), Bson::Int32)),
		Bson::Int64(n) => Some(n.checked_neg().map_or(Bson::Double(-(*n as f64)), Bson::Int64)),
		Bson::Double(n) => Some(Bson::Double(-n)),
		_ => None,
	}
}

fn is_nullish(value: &Bson) -> bool {
	matches!(value, Bson::Null | Bson::Undefined)
}

fn non_numeric(op: &str, value: &Bson) -> NoSQLError {
	NoSQLError::ExecutionError(format!(
		"{} only supports numeric types, not {:?}",
		op,
		value.element_type()
	))
}
