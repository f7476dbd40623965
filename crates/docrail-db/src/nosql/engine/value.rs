//! BSON value helpers: dotted paths, type-ordered comparison and numeric folding

use bson::{Bson, Document};
use std::cmp::Ordering;

/// Resolves a dotted path against a document
///
/// Arrays met along the way are mapped over their document elements, the way
/// `"$items.name"` yields every item's name. Returns `None` for a missing
/// field.
pub(crate) fn resolve_path(doc: &Document, path: &str) -> Option<Bson> {
	let mut parts = path.split('.');
	let first = parts.next()?;
	let rest: Vec<&str> = parts.collect();
	resolve_parts(doc.get(first)?, &rest)
}

fn resolve_parts(value: &Bson, parts: &[&str]) -> Option<Bson> {
	let Some((head, tail)) = parts.split_first() else {
		return Some(value.clone());
	};

	match value {
		Bson::Document(inner) => resolve_parts(inner.get(*head)?, tail),
		Bson::Array(items) => {
			let mapped: Vec<Bson> = items
				.iter()
				.filter_map(|item| match item {
					Bson::Document(_) | Bson::Array(_) => resolve_parts(item, parts),
					_ => None,
				})
				.collect();
			Some(Bson::Array(mapped))
		}
		_ => None,
	}
}

/// Collects every value a query predicate on `path` should be tested against
///
/// A field holding an array contributes the array itself and each element,
/// so `{ tags: "a" }` matches `{ tags: ["a", "b"] }`.
pub(crate) fn path_candidates(doc: &Document, path: &str) -> Vec<Bson> {
	let parts: Vec<&str> = path.split('.').collect();
	let mut out = Vec::new();
	collect_candidates(&Bson::Document(doc.clone()), &parts, &mut out);
	out
}

fn collect_candidates(value: &Bson, parts: &[&str], out: &mut Vec<Bson>) {
	let Some((head, tail)) = parts.split_first() else {
		if let Bson::Array(items) = value {
			out.push(value.clone());
			out.extend(items.iter().cloned());
		} else {
			out.push(value.clone());
		}
		return;
	};

	match value {
		Bson::Document(inner) => {
			if let Some(next) = inner.get(*head) {
				collect_candidates(next, tail, out);
			}
		}
		Bson::Array(items) => {
			if let Ok(index) = head.parse::<usize>() {
				if let Some(next) = items.get(index) {
					collect_candidates(next, tail, out);
				}
			} else {
				for item in items {
					if let Bson::Document(_) = item {
						collect_candidates(item, parts, out);
					}
				}
			}
		}
		_ => {}
	}
}

/// Sets a dotted path, creating intermediate documents as needed
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) {
	match path.split_once('.') {
		None => {
			doc.insert(path, value);
		}
		Some((head, rest)) => {
			if !matches!(doc.get(head), Some(Bson::Document(_))) {
				doc.insert(head, Document::new());
			}
			if let Some(Bson::Document(inner)) = doc.get_mut(head) {
				set_path(inner, rest, value);
			}
		}
	}
}

/// Removes a dotted path if present
pub(crate) fn remove_path(doc: &mut Document, path: &str) {
	match path.split_once('.') {
		None => {
			doc.remove(path);
		}
		Some((head, rest)) => {
			if let Some(Bson::Document(inner)) = doc.get_mut(head) {
				remove_path(inner, rest);
			}
		}
	}
}

/// Canonical BSON type order used for sorting and comparison
fn type_rank(value: &Bson) -> u8 {
	match value {
		Bson::MinKey => 1,
		Bson::Null | Bson::Undefined => 2,
		Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 3,
		Bson::String(_) | Bson::Symbol(_) => 4,
		Bson::Document(_) => 5,
		Bson::Array(_) => 6,
		Bson::Binary(_) => 7,
		Bson::ObjectId(_) => 8,
		Bson::Boolean(_) => 9,
		Bson::DateTime(_) => 10,
		Bson::Timestamp(_) => 11,
		Bson::RegularExpression(_) => 12,
		Bson::MaxKey => 13,
		_ => 14,
	}
}

/// Whether two values belong to the same comparison bracket
pub(crate) fn same_type_bracket(a: &Bson, b: &Bson) -> bool {
	type_rank(a) == type_rank(b)
}

/// Total order over BSON values
pub(crate) fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
	let rank = type_rank(a).cmp(&type_rank(b));
	if rank != Ordering::Equal {
		return rank;
	}

	match (a, b) {
		(Bson::String(x) | Bson::Symbol(x), Bson::String(y) | Bson::Symbol(y)) => x.cmp(y),
		(Bson::Document(x), Bson::Document(y)) => {
			for ((kx, vx), (ky, vy)) in x.iter().zip(y.iter()) {
				let ord = compare_bson(vx, vy).then_with(|| kx.cmp(ky));
				if ord != Ordering::Equal {
					return ord;
				}
			}
			x.len().cmp(&y.len())
		}
		(Bson::Array(x), Bson::Array(y)) => {
			for (vx, vy) in x.iter().zip(y.iter()) {
				let ord = compare_bson(vx, vy);
				if ord != Ordering::Equal {
					return ord;
				}
			}
			x.len().cmp(&y.len())
		}
		(Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
		(Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
		(Bson::DateTime(x), Bson::DateTime(y)) => {
			x.timestamp_millis().cmp(&y.timestamp_millis())
		}
		(Bson::Timestamp(x), Bson::Timestamp(y)) => {
			(x.time, x.increment).cmp(&(y.time, y.increment))
		}
		_ => match (as_f64(a), as_f64(b)) {
			(Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
			_ => Ordering::Equal,
		},
	}
}

/// Equality under BSON comparison rules (`1 == 1.0`)
pub(crate) fn bson_eq(a: &Bson, b: &Bson) -> bool {
	compare_bson(a, b) == Ordering::Equal
}

pub(crate) fn as_f64(value: &Bson) -> Option<f64> {
	match value {
		Bson::Int32(n) => Some(*n as f64),
		Bson::Int64(n) => Some(*n as f64),
		Bson::Double(n) => Some(*n),
		_ => None,
	}
}

/// Reads an integral value (doubles with no fractional part included)
pub(crate) fn as_integer(value: &Bson) -> Option<i64> {
	match value {
		Bson::Int32(n) => Some(*n as i64),
		Bson::Int64(n) => Some(*n),
		Bson::Double(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
		_ => None,
	}
}

/// Truthiness as aggregation expressions see it
pub(crate) fn is_truthy(value: &Bson) -> bool {
	match value {
		Bson::Null | Bson::Undefined => false,
		Bson::Boolean(b) => *b,
		other => as_f64(other).is_none_or(|n| n != 0.0),
	}
}

/// Stable key for grouping values that compare equal
pub(crate) fn group_key(value: &Bson) -> String {
	match value {
		Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
			format!("n:{}", as_f64(value).unwrap_or_default())
		}
		Bson::Null | Bson::Undefined => "null".to_string(),
		Bson::Document(doc) => {
			let fields: Vec<String> = doc
				.iter()
				.map(|(k, v)| format!("{}={}", k, group_key(v)))
				.collect();
			format!("d:{{{}}}", fields.join(","))
		}
		Bson::Array(items) => {
			let items: Vec<String> = items.iter().map(group_key).collect();
			format!("a:[{}]", items.join(","))
		}
		other => format!("{}:{}", type_rank(other), other),
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Width {
	Int32,
	Int64,
	Double,
}

/// Folds numbers while tracking the widest BSON numeric type seen
///
/// Int32 sums that overflow widen to Int64, and Int64 overflow widens to
/// Double.
pub(crate) struct NumericFold {
	int: i64,
	float: f64,
	width: Width,
	product: bool,
}

impl NumericFold {
	pub(crate) fn sum() -> Self {
		Self {
			int: 0,
			float: 0.0,
			width: Width::Int32,
			product: false,
		}
	}

	pub(crate) fn product() -> Self {
		Self {
			int: 1,
			float: 1.0,
			width: Width::Int32,
			product: true,
		}
	}

	/// Adds a value; returns `false` when the value is not numeric
	pub(crate) fn push(&mut self, value: &Bson) -> bool {
		let (as_int, width) = match value {
			Bson::Int32(n) => (Some(*n as i64), Width::Int32),
			Bson::Int64(n) => (Some(*n), Width::Int64),
			Bson::Double(_) => (None, Width::Double),
			_ => return false,
		};
		let as_float = as_f64(value).unwrap_or_default();

		self.width = self.width.max(width);
		if self.product {
			self.float *= as_float;
		} else {
			self.float += as_float;
		}

		if self.width != Width::Double
			&& let Some(n) = as_int
		{
			let next = if self.product {
				self.int.checked_mul(n)
			} else {
				self.int.checked_add(n)
			};
			match next {
				Some(v) => self.int = v,
				None => self.width = Width::Double,
			}
		}

		true
	}

	pub(crate) fn finish(self) -> Bson {
		match self.width {
			Width::Double => Bson::Double(self.float),
			Width::Int32 => match i32::try_from(self.int) {
				Ok(n) => Bson::Int32(n),
				Err(_) => Bson::Int64(self.int),
			},
			Width::Int64 => Bson::Int64(self.int),
		}
	}
}
