//! `$group` accumulators

use bson::{Bson, Document};
use std::cmp::Ordering;

use super::expr::evaluate;
use super::value::{NumericFold, as_f64, bson_eq, compare_bson};
use crate::nosql::error::{NoSQLError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
	Sum,
	Avg,
	Min,
	Max,
	First,
	Last,
	Push,
	AddToSet,
	Count,
}

/// One output field of a `$group` stage
#[derive(Debug, Clone)]
pub(crate) struct Accumulator {
	op: Op,
	expr: Bson,
}

impl Accumulator {
	/// Parses `{ "$max": "$age" }` style specifications
	pub(crate) fn parse(field: &str, spec: &Bson) -> Result<Self> {
		let Bson::Document(spec) = spec else {
			return Err(NoSQLError::ExecutionError(format!(
				"The field '{}' must be an accumulator object",
				field
			)));
		};
		if spec.len() != 1 {
			return Err(NoSQLError::ExecutionError(format!(
				"The field '{}' must specify one accumulator",
				field
			)));
		}
		let Some((name, expr)) = spec.iter().next() else {
			return Err(NoSQLError::ExecutionError(format!(
				"The field '{}' must specify one accumulator",
				field
			)));
		};

		let op = match name.as_str() {
			"$sum" => Op::Sum,
			"$avg" => Op::Avg,
			"$min" => Op::Min,
			"$max" => Op::Max,
			"$first" => Op::First,
			"$last" => Op::Last,
			"$push" => Op::Push,
			"$addToSet" => Op::AddToSet,
			"$count" => Op::Count,
			other => {
				return Err(NoSQLError::ExecutionError(format!(
					"unknown group operator '{}'",
					other
				)));
			}
		};

		if op == Op::Count && !matches!(expr, Bson::Document(d) if d.is_empty()) {
			return Err(NoSQLError::ExecutionError(
				"$count takes no arguments, i.e. $count:{}".to_string(),
			));
		}

		Ok(Self {
			op,
			expr: expr.clone(),
		})
	}

	/// Computes the accumulated value over one group's documents
	pub(crate) fn compute(&self, docs: &[&Document]) -> Result<Bson> {
		if self.op == Op::Count {
			return Ok(count(docs.len()));
		}

		let mut values = Vec::with_capacity(docs.len());
		for doc in docs {
			values.push(evaluate(&self.expr, doc)?);
		}

		Ok(match self.op {
			Op::Sum => {
				let mut fold = NumericFold::sum();
				for value in values.iter().flatten() {
					fold.push(value);
				}
				fold.finish()
			}
			Op::Avg => {
				let numbers: Vec<f64> = values.iter().flatten().filter_map(as_f64).collect();
				if numbers.is_empty() {
					Bson::Null
				} else {
					Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
				}
			}
			Op::Min => extremum(&values, Ordering::Less),
			Op::Max => extremum(&values, Ordering::Greater),
			Op::First => values.first().cloned().flatten().unwrap_or(Bson::Null),
			Op::Last => values.last().cloned().flatten().unwrap_or(Bson::Null),
			Op::Push => Bson::Array(values.into_iter().flatten().collect()),
			Op::AddToSet => {
				let mut set: Vec<Bson> = Vec::new();
				for value in values.into_iter().flatten() {
					if !set.iter().any(|seen| bson_eq(seen, &value)) {
						set.push(value);
					}
				}
				Bson::Array(set)
			}
			Op::Count => unreachable!("handled above"),
		})
	}
}

/// Picks the winning value, skipping missing and null values
///
/// The winner keeps its own BSON type, so `$max` over Int32 ages yields an
/// Int32.
fn extremum(values: &[Option<Bson>], wanted: Ordering) -> Bson {
	let mut best: Option<&Bson> = None;
	for value in values.iter().flatten() {
		if matches!(value, Bson::Null | Bson::Undefined) {
			continue;
		}
		best = match best {
			Some(current) if compare_bson(value, current) != wanted => Some(current),
			_ => Some(value),
		};
	}
	best.cloned().unwrap_or(Bson::Null)
}

pub(crate) fn count(n: usize) -> Bson {
	match i32::try_from(n) {
		Ok(n) => Bson::Int32(n),
		Err(_) => Bson::Int64(n as i64),
	}
}
