//! Core `Document` trait definition.

use bson::Document as BsonDocument;
use serde::{Serialize, de::DeserializeOwned};

use super::error::Result;

/// A typed document stored in one collection.
///
/// ## Example
///
/// ```rust
/// use docrail_db::nosql::document::Document;
/// use docrail_db::nosql::error::{NoSQLError, Result};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     name: String,
///     age: u32,
/// }
///
/// impl Document for User {
///     const COLLECTION_NAME: &'static str = "users";
///
///     fn validate(&self) -> Result<()> {
///         if self.name.is_empty() {
///             return Err(NoSQLError::InvalidArgument("name is required".into()));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
	/// Collection name in the data source.
	const COLLECTION_NAME: &'static str;

	/// Validate this document at the application layer.
	///
	/// Runs before the document is written.
	fn validate(&self) -> Result<()> {
		Ok(())
	}

	/// Serialize into a BSON document.
	fn to_bson_document(&self) -> Result<BsonDocument> {
		Ok(bson::serialize_to_document(self)?)
	}

	/// Deserialize from a BSON document read from the data source.
	fn from_bson_document(document: BsonDocument) -> Result<Self> {
		Ok(bson::deserialize_from_document(document)?)
	}
}
