//! Shared value types for document backends

use bson::{Bson, Document, doc};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::{NoSQLError, Result};

/// Identifies the concrete store behind a backend trait object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSQLBackendType {
	/// Process-local store
	Memory,
	/// MongoDB server
	MongoDB,
}

impl fmt::Display for NoSQLBackendType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NoSQLBackendType::Memory => write!(f, "memory"),
			NoSQLBackendType::MongoDB => write!(f, "mongodb"),
		}
	}
}

/// Options for `find_many`
///
/// # Example
///
/// ```rust
/// use docrail_db::nosql::types::FindOptions;
/// use bson::doc;
///
/// let options = FindOptions::new().limit(10).sort(doc! { "created_at": -1 });
/// assert_eq!(options.limit, Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
	pub limit: Option<i64>,
	pub skip: Option<u64>,
	pub sort: Option<Document>,
	pub projection: Option<Document>,
	pub batch_size: Option<u32>,
}

impl FindOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn limit(mut self, limit: i64) -> Self {
		self.limit = Some(limit);
		self
	}

	pub fn skip(mut self, skip: u64) -> Self {
		self.skip = Some(skip);
		self
	}

	pub fn sort(mut self, sort: Document) -> Self {
		self.sort = Some(sort);
		self
	}

	pub fn projection(mut self, projection: Document) -> Self {
		self.projection = Some(projection);
		self
	}

	pub fn batch_size(mut self, batch_size: u32) -> Self {
		self.batch_size = Some(batch_size);
		self
	}

	/// Translate a filter plus these options into an equivalent pipeline
	///
	/// Stage order is match, sort, skip, limit, project, which matches how
	/// a find command applies its options.
	///
	/// # Example
	///
	/// ```rust
	/// use docrail_db::nosql::types::FindOptions;
	/// use bson::doc;
	///
	/// let pipeline = FindOptions::new()
	///     .sort(doc! { "name": 1 })
	///     .limit(5)
	///     .to_pipeline(doc! { "active": true });
	/// assert_eq!(pipeline.len(), 3);
	/// assert!(pipeline[0].contains_key("$match"));
	/// ```
	pub fn to_pipeline(&self, filter: Document) -> Vec<Document> {
		let mut pipeline = Vec::new();

		if !filter.is_empty() {
			pipeline.push(doc! { "$match": filter });
		}

		if let Some(ref sort) = self.sort {
			pipeline.push(doc! { "$sort": sort.clone() });
		}

		if let Some(skip) = self.skip {
			pipeline.push(doc! { "$skip": skip as i64 });
		}

		// A zero limit means no limit, and a negative one is taken by magnitude
		if let Some(limit) = self.limit
			&& limit != 0
		{
			pipeline.push(doc! { "$limit": limit.checked_abs().unwrap_or(i64::MAX) });
		}

		if let Some(ref projection) = self.projection {
			pipeline.push(doc! { "$project": projection.clone() });
		}

		pipeline
	}
}

/// Options forwarded with an aggregation pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
	/// Let the server spill large sorts and groups to disk
	pub allow_disk_use: Option<bool>,
	/// Cursor batch size
	pub batch_size: Option<u32>,
	/// Server-side execution time limit
	pub max_time: Option<Duration>,
	/// Comment attached to the command for profiling
	pub comment: Option<Bson>,
}

impl AggregateOptions {
	/// Whether every option is unset
	pub fn is_default(&self) -> bool {
		self == &Self::default()
	}
}

/// Server version triple used for capability checks
///
/// # Example
///
/// ```rust
/// use docrail_db::nosql::types::ServerVersion;
///
/// let version: ServerVersion = "2.4.9".parse().unwrap();
/// assert!(!version.supports_out());
/// assert!(ServerVersion::new(2, 6, 0).supports_out());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerVersion {
	pub major: u32,
	pub minor: u32,
	pub patch: u32,
}

impl ServerVersion {
	pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
		Self {
			major,
			minor,
			patch,
		}
	}

	/// Whether the `$out` stage is available (introduced in 2.6)
	pub fn supports_out(&self) -> bool {
		*self >= ServerVersion::new(2, 6, 0)
	}
}

impl Default for ServerVersion {
	fn default() -> Self {
		ServerVersion::new(7, 0, 0)
	}
}

impl PartialOrd for ServerVersion {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ServerVersion {
	fn cmp(&self, other: &Self) -> Ordering {
		(self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
	}
}

impl fmt::Display for ServerVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
	}
}

impl FromStr for ServerVersion {
	type Err = NoSQLError;

	fn from_str(s: &str) -> Result<Self> {
		let mut parts = [0u32; 3];
		let mut count = 0;

		for (index, part) in s.trim().split('.').enumerate() {
			if index >= 3 {
				// Pre-release and build suffixes ("7.0.2-rc1", "4.4.0.1") are ignored
				break;
			}
			let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
			parts[index] = digits
				.parse()
				.map_err(|_| NoSQLError::InvalidArgument(format!("Invalid server version: {}", s)))?;
			count += 1;
		}

		if count < 2 {
			return Err(NoSQLError::InvalidArgument(format!(
				"Invalid server version: {}",
				s
			)));
		}

		Ok(ServerVersion::new(parts[0], parts[1], parts[2]))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_find_options_pipeline_order() {
		let options = FindOptions::new()
			.sort(doc! { "name": 1 })
			.skip(10)
			.limit(5)
			.projection(doc! { "name": 1 });

		let pipeline = options.to_pipeline(doc! { "age": { "$gte": 18 } });

		assert_eq!(pipeline.len(), 5);
		assert!(pipeline[0].contains_key("$match"));
		assert!(pipeline[1].contains_key("$sort"));
		assert!(pipeline[2].contains_key("$skip"));
		assert!(pipeline[3].contains_key("$limit"));
		assert!(pipeline[4].contains_key("$project"));
	}

	#[rstest]
	fn test_find_options_empty_filter_has_no_match() {
		let pipeline = FindOptions::new().to_pipeline(Document::new());
		assert!(pipeline.is_empty());
	}

	#[rstest]
	#[case(0, None)]
	#[case(5, Some(5))]
	#[case(-3, Some(3))]
	fn test_find_options_limit_stage(#[case] limit: i64, #[case] expected: Option<i64>) {
		let pipeline = FindOptions::new().limit(limit).to_pipeline(Document::new());

		let stage = pipeline.iter().find_map(|stage| stage.get_i64("$limit").ok());
		assert_eq!(stage, expected);
		assert_eq!(pipeline.len(), usize::from(expected.is_some()));
	}

	#[rstest]
	#[case("7.0.2", ServerVersion::new(7, 0, 2))]
	#[case("2.6", ServerVersion::new(2, 6, 0))]
	#[case("4.4.0-rc1", ServerVersion::new(4, 4, 0))]
	#[case("3.6.8.1", ServerVersion::new(3, 6, 8))]
	fn test_server_version_parse(#[case] input: &str, #[case] expected: ServerVersion) {
		assert_eq!(input.parse::<ServerVersion>().unwrap(), expected);
	}

	#[rstest]
	#[case("")]
	#[case("seven")]
	#[case("7")]
	fn test_server_version_parse_rejects(#[case] input: &str) {
		let err = input.parse::<ServerVersion>().unwrap_err();
		assert!(err.is_invalid_argument());
	}

	#[rstest]
	#[case(ServerVersion::new(2, 4, 14), false)]
	#[case(ServerVersion::new(2, 6, 0), true)]
	#[case(ServerVersion::new(3, 0, 0), true)]
	fn test_supports_out(#[case] version: ServerVersion, #[case] expected: bool) {
		assert_eq!(version.supports_out(), expected);
	}
}
