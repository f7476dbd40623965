//! NoSQL database error types
//!
//! This module provides a unified error type for all document store operations.
//!
//! Construction mistakes (a malformed pipeline handed to the builder) are
//! reported synchronously as [`NoSQLError::InvalidArgument`]. Everything the
//! data source reports comes back through the asynchronous completion path.

/// Result type for NoSQL operations
pub type Result<T> = std::result::Result<T, NoSQLError>;

/// Unified error type for NoSQL operations
#[derive(Debug, thiserror::Error)]
pub enum NoSQLError {
	/// Connection error
	#[error("Connection error: {0}")]
	ConnectionError(String),

	/// Query/operation execution error
	#[error("Execution error: {0}")]
	ExecutionError(String),

	/// Document/data not found
	#[error("Not found: {0}")]
	NotFound(String),

	/// Serialization/deserialization error
	#[error("Serialization error: {0}")]
	SerializationError(String),

	/// Malformed input passed by the caller, detected before any I/O
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// Invalid operation for the current backend
	#[error("Invalid operation: {0}")]
	InvalidOperation(String),

	/// Configuration error
	#[error("Configuration error: {0}")]
	ConfigError(String),

	/// Timeout error
	#[error("Timeout: {0}")]
	Timeout(String),

	/// Authentication error
	#[error("Authentication error: {0}")]
	AuthenticationError(String),

	/// Permission denied error
	#[error("Permission denied: {0}")]
	PermissionDenied(String),

	/// Database-specific error (contains the original error message)
	#[error("Database error: {0}")]
	DatabaseError(String),

	/// Feature not supported by this backend
	#[error("Unsupported feature: {0}")]
	UnsupportedFeature(String),
}

impl NoSQLError {
	/// Whether this error was raised locally, before reaching the data source
	pub fn is_invalid_argument(&self) -> bool {
		matches!(self, NoSQLError::InvalidArgument(_))
	}
}

// Convenience conversion implementations for common error types
impl From<serde_json::Error> for NoSQLError {
	fn from(err: serde_json::Error) -> Self {
		NoSQLError::SerializationError(err.to_string())
	}
}

// In bson v3.x, both ser::Error and de::Error are type aliases for bson::error::Error
impl From<bson::error::Error> for NoSQLError {
	fn from(err: bson::error::Error) -> Self {
		NoSQLError::SerializationError(err.to_string())
	}
}

impl From<docrail_conf::SettingsError> for NoSQLError {
	fn from(err: docrail_conf::SettingsError) -> Self {
		NoSQLError::ConfigError(err.to_string())
	}
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for NoSQLError {
	fn from(err: mongodb::error::Error) -> Self {
		use mongodb::error::ErrorKind;

		match *err.kind {
			ErrorKind::Authentication { .. } => NoSQLError::AuthenticationError(err.to_string()),
			ErrorKind::InvalidArgument { .. } => NoSQLError::InvalidOperation(err.to_string()),
			ErrorKind::Io(_) => NoSQLError::ConnectionError(err.to_string()),
			_ => NoSQLError::DatabaseError(err.to_string()),
		}
	}
}
