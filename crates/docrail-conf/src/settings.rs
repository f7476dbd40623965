//! Document store settings
//!
//! This module provides [`NoSQLSettings`], the configuration consumed by the
//! backend factory in `docrail-db`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Prefix used by [`NoSQLSettings::load`] when reading environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "DOCRAIL_NOSQL_";

/// Result type for settings operations
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

/// Errors raised while loading or validating settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	/// The settings file could not be read
	#[error("Failed to read settings file {path}: {source}")]
	Io {
		path: String,
		#[source]
		source: std::io::Error,
	},

	/// The TOML document could not be parsed
	#[error("Failed to parse settings: {0}")]
	Parse(#[from] toml::de::Error),

	/// An environment variable held a value of the wrong shape
	#[error("Invalid value for {key}: {value}")]
	InvalidEnv { key: String, value: String },

	/// The settings are internally inconsistent
	#[error("Invalid settings: {0}")]
	Invalid(String),
}

/// Which document store implementation to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoSQLEngine {
	/// Process-local store, used for tests and prototyping
	#[default]
	Memory,
	/// MongoDB server reached through the official driver
	#[serde(rename = "mongodb")]
	MongoDB,
}

impl fmt::Display for NoSQLEngine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NoSQLEngine::Memory => write!(f, "memory"),
			NoSQLEngine::MongoDB => write!(f, "mongodb"),
		}
	}
}

impl FromStr for NoSQLEngine {
	type Err = SettingsError;

	fn from_str(s: &str) -> SettingsResult<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"memory" => Ok(NoSQLEngine::Memory),
			"mongodb" | "mongo" => Ok(NoSQLEngine::MongoDB),
			other => Err(SettingsError::InvalidEnv {
				key: "engine".to_string(),
				value: other.to_string(),
			}),
		}
	}
}

/// Settings for a document store connection
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoSQLSettings {
	/// Store implementation
	pub engine: NoSQLEngine,

	/// Connection string (ignored by the memory engine)
	pub url: String,

	/// Database name
	pub database: String,

	/// Maximum number of pooled connections
	pub max_pool_size: Option<u32>,

	/// Minimum number of pooled connections
	pub min_pool_size: Option<u32>,

	/// Seconds a pooled connection may stay idle
	pub max_idle_time_secs: Option<u64>,

	/// Server version reported by the memory engine (e.g. `"2.4.0"`)
	pub server_version: Option<String>,
}

impl Default for NoSQLSettings {
	fn default() -> Self {
		Self {
			engine: NoSQLEngine::default(),
			url: "mongodb://localhost:27017".to_string(),
			database: "test".to_string(),
			max_pool_size: None,
			min_pool_size: None,
			max_idle_time_secs: None,
			server_version: None,
		}
	}
}

impl NoSQLSettings {
	/// Parse settings from a TOML string
	///
	/// # Example
	///
	/// ```rust
	/// use docrail_conf::NoSQLSettings;
	///
	/// let settings = NoSQLSettings::from_toml_str("database = \"reports\"").unwrap();
	/// assert_eq!(settings.database, "reports");
	/// assert_eq!(settings.url, "mongodb://localhost:27017");
	/// ```
	pub fn from_toml_str(source: &str) -> SettingsResult<Self> {
		Ok(toml::from_str(source)?)
	}

	/// Read settings from a TOML file
	pub fn from_file(path: impl AsRef<Path>) -> SettingsResult<Self> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
			path: path.display().to_string(),
			source,
		})?;
		Self::from_toml_str(&source)
	}

	/// Override fields from process environment variables named `<prefix><FIELD>`
	pub fn apply_env(self, prefix: &str) -> SettingsResult<Self> {
		self.apply_env_from(prefix, |key| std::env::var(key).ok())
	}

	/// Override fields using an arbitrary variable lookup
	///
	/// # Example
	///
	/// ```rust
	/// use docrail_conf::NoSQLSettings;
	///
	/// let settings = NoSQLSettings::default()
	///     .apply_env_from("APP_", |key| (key == "APP_DATABASE").then(|| "analytics".to_string()))
	///     .unwrap();
	/// assert_eq!(settings.database, "analytics");
	/// ```
	pub fn apply_env_from<F>(mut self, prefix: &str, lookup: F) -> SettingsResult<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |field: &str| {
			let key = format!("{}{}", prefix, field);
			lookup(&key).map(|value| (key, value))
		};

		if let Some((_, value)) = var("ENGINE") {
			self.engine = value.parse()?;
		}
		if let Some((_, value)) = var("URL") {
			self.url = value;
		}
		if let Some((_, value)) = var("DATABASE") {
			self.database = value;
		}
		if let Some((key, value)) = var("MAX_POOL_SIZE") {
			self.max_pool_size = Some(parse_number(&key, &value)?);
		}
		if let Some((key, value)) = var("MIN_POOL_SIZE") {
			self.min_pool_size = Some(parse_number(&key, &value)?);
		}
		if let Some((key, value)) = var("MAX_IDLE_TIME_SECS") {
			self.max_idle_time_secs = Some(parse_number(&key, &value)?);
		}
		if let Some((_, value)) = var("SERVER_VERSION") {
			self.server_version = Some(value);
		}

		Ok(self)
	}

	/// Load settings: defaults, then `path` if given, then `DOCRAIL_NOSQL_*` variables
	///
	/// The result is validated before it is returned.
	pub fn load(path: Option<&Path>) -> SettingsResult<Self> {
		let settings = match path {
			Some(path) => {
				tracing::debug!(path = %path.display(), "loading nosql settings file");
				Self::from_file(path)?
			}
			None => Self::default(),
		};

		let settings = settings.apply_env(DEFAULT_ENV_PREFIX)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Check the settings for internal consistency
	pub fn validate(&self) -> SettingsResult<()> {
		if self.database.trim().is_empty() {
			return Err(SettingsError::Invalid(
				"database name must not be empty".to_string(),
			));
		}

		if let (Some(min), Some(max)) = (self.min_pool_size, self.max_pool_size)
			&& min > max
		{
			return Err(SettingsError::Invalid(format!(
				"min_pool_size ({}) exceeds max_pool_size ({})",
				min, max
			)));
		}

		if self.engine == NoSQLEngine::MongoDB
			&& !(self.url.starts_with("mongodb://") || self.url.starts_with("mongodb+srv://"))
		{
			return Err(SettingsError::Invalid(format!(
				"url must use the mongodb:// or mongodb+srv:// scheme, got {}",
				self.url
			)));
		}

		Ok(())
	}
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> SettingsResult<T> {
	value.trim().parse().map_err(|_| SettingsError::InvalidEnv {
		key: key.to_string(),
		value: value.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serial_test::serial;
	use std::collections::HashMap;
	use std::io::Write;

	fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key| vars.get(key).cloned()
	}

	#[rstest]
	fn test_defaults() {
		let settings = NoSQLSettings::default();
		assert_eq!(settings.engine, NoSQLEngine::Memory);
		assert_eq!(settings.url, "mongodb://localhost:27017");
		assert_eq!(settings.database, "test");
		assert!(settings.validate().is_ok());
	}

	#[rstest]
	fn test_partial_toml_keeps_defaults() {
		let settings = NoSQLSettings::from_toml_str(
			r#"
			engine = "mongodb"
			max_pool_size = 20
			"#,
		)
		.unwrap();

		assert_eq!(settings.engine, NoSQLEngine::MongoDB);
		assert_eq!(settings.max_pool_size, Some(20));
		assert_eq!(settings.database, "test");
	}

	#[rstest]
	fn test_unknown_engine_is_parse_error() {
		let result = NoSQLSettings::from_toml_str("engine = \"cassandra\"");
		assert!(matches!(result, Err(SettingsError::Parse(_))));
	}

	#[rstest]
	fn test_from_file() {
		// Arrange
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "database = \"from_file\"").unwrap();
		writeln!(file, "server_version = \"2.4.0\"").unwrap();

		// Act
		let settings = NoSQLSettings::from_file(file.path()).unwrap();

		// Assert
		assert_eq!(settings.database, "from_file");
		assert_eq!(settings.server_version.as_deref(), Some("2.4.0"));
	}

	#[rstest]
	fn test_missing_file_reports_path() {
		let err = NoSQLSettings::from_file("/nonexistent/docrail.toml").unwrap_err();
		assert!(matches!(err, SettingsError::Io { .. }));
		assert!(err.to_string().contains("/nonexistent/docrail.toml"));
	}

	#[rstest]
	fn test_env_overrides() {
		let lookup = lookup_from(&[
			("T_ENGINE", "mongodb"),
			("T_URL", "mongodb://db.internal:27017"),
			("T_MAX_POOL_SIZE", "64"),
			("T_MIN_POOL_SIZE", "4"),
			("T_MAX_IDLE_TIME_SECS", "300"),
		]);

		let settings = NoSQLSettings::default()
			.apply_env_from("T_", lookup)
			.unwrap();

		assert_eq!(settings.engine, NoSQLEngine::MongoDB);
		assert_eq!(settings.url, "mongodb://db.internal:27017");
		assert_eq!(settings.max_pool_size, Some(64));
		assert_eq!(settings.min_pool_size, Some(4));
		assert_eq!(settings.max_idle_time_secs, Some(300));
	}

	#[rstest]
	#[case("T_MAX_POOL_SIZE", "lots")]
	#[case("T_MAX_IDLE_TIME_SECS", "-1")]
	#[case("T_ENGINE", "couchdb")]
	fn test_invalid_env_value(#[case] key: &str, #[case] value: &str) {
		let result = NoSQLSettings::default().apply_env_from("T_", lookup_from(&[(key, value)]));
		assert!(matches!(result, Err(SettingsError::InvalidEnv { .. })));
	}

	#[rstest]
	fn test_validate_rejects_inverted_pool_bounds() {
		let settings = NoSQLSettings {
			max_pool_size: Some(5),
			min_pool_size: Some(10),
			..Default::default()
		};
		let err = settings.validate().unwrap_err();
		assert!(err.to_string().contains("min_pool_size"));
	}

	#[rstest]
	fn test_validate_rejects_empty_database() {
		let settings = NoSQLSettings {
			database: "  ".to_string(),
			..Default::default()
		};
		assert!(settings.validate().is_err());
	}

	#[rstest]
	#[case("postgres://localhost/db", false)]
	#[case("mongodb://localhost:27017", true)]
	#[case("mongodb+srv://cluster.example.com", true)]
	fn test_validate_mongodb_url_scheme(#[case] url: &str, #[case] valid: bool) {
		let settings = NoSQLSettings {
			engine: NoSQLEngine::MongoDB,
			url: url.to_string(),
			..Default::default()
		};
		assert_eq!(settings.validate().is_ok(), valid);
	}

	#[rstest]
	#[serial(docrail_env)]
	fn test_load_reads_process_environment() {
		// Arrange
		unsafe {
			std::env::set_var("DOCRAIL_NOSQL_DATABASE", "env_db");
		}

		// Act
		let settings = NoSQLSettings::load(None);

		// Cleanup before asserting so a failure does not leak state
		unsafe {
			std::env::remove_var("DOCRAIL_NOSQL_DATABASE");
		}

		// Assert
		assert_eq!(settings.unwrap().database, "env_db");
	}
}
