//! Document backend implementations
//!
//! - [`MemoryBackend`]: collections held in process, pipelines evaluated by
//!   the in-memory engine (feature `memory`, on by default)
//! - `MongoDBBackend`: the MongoDB driver (feature `mongodb`)
//!
//! [`connect`] picks one from [`NoSQLSettings`].

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongodb;

#[cfg(feature = "memory")]
pub use memory::MemoryBackend;
#[cfg(feature = "mongodb")]
pub use mongodb::{MongoDBBackend, MongoDBBackendBuilder};

use bson::Bson;
use docrail_conf::{NoSQLEngine, NoSQLSettings};
use std::sync::Arc;

use super::error::Result;
use super::traits::DocumentBackend;

/// Renders an inserted `_id` the way ids are reported to callers
#[cfg_attr(not(any(feature = "memory", feature = "mongodb")), allow(dead_code))]
pub(crate) fn id_to_string(id: Bson) -> String {
	match id {
		Bson::ObjectId(oid) => oid.to_hex(),
		Bson::String(s) => s,
		other => other.to_string(),
	}
}

/// Opens the backend selected by `settings.engine`
///
/// # Example
///
/// ```rust
/// use docrail_conf::NoSQLSettings;
/// use docrail_db::nosql::backends::connect;
/// use docrail_db::nosql::traits::NoSQLBackend;
/// use docrail_db::nosql::types::NoSQLBackendType;
///
/// # #[tokio::main]
/// # async fn main() -> docrail_db::nosql::error::Result<()> {
/// let backend = connect(&NoSQLSettings::default()).await?;
/// assert_eq!(backend.backend_type(), NoSQLBackendType::Memory);
/// # Ok(())
/// # }
/// ```
pub async fn connect(settings: &NoSQLSettings) -> Result<Arc<dyn DocumentBackend>> {
	settings.validate()?;
	tracing::debug!(engine = %settings.engine, database = %settings.database, "connecting document backend");

	match settings.engine {
		NoSQLEngine::Memory => {
			#[cfg(feature = "memory")]
			{
				Ok(Arc::new(MemoryBackend::from_settings(settings)?))
			}
			#[cfg(not(feature = "memory"))]
			{
				Err(super::error::NoSQLError::ConfigError(
					"the memory engine requires the `memory` feature".to_string(),
				))
			}
		}
		NoSQLEngine::MongoDB => {
			#[cfg(feature = "mongodb")]
			{
				Ok(Arc::new(MongoDBBackend::from_settings(settings).await?))
			}
			#[cfg(not(feature = "mongodb"))]
			{
				Err(super::error::NoSQLError::ConfigError(
					"the mongodb engine requires the `mongodb` feature".to_string(),
				))
			}
		}
	}
}
