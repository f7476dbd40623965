//! Base trait shared by every NoSQL backend

use async_trait::async_trait;

use super::super::error::Result;
use super::super::types::{NoSQLBackendType, ServerVersion};

/// Base trait for all NoSQL backends
///
/// Provides identification, connectivity checks and capability discovery.
/// Capability checks are left to callers: nothing in the pipeline builder
/// consults [`NoSQLBackend::server_version`] on its own.
#[async_trait]
pub trait NoSQLBackend: Send + Sync {
	/// Returns which store this backend talks to
	fn backend_type(&self) -> NoSQLBackendType;

	/// Verifies the backend is reachable
	async fn health_check(&self) -> Result<()>;

	/// Reports the server version, used to decide whether optional stages
	/// such as `$out` are available
	async fn server_version(&self) -> Result<ServerVersion>;

	/// Allows downcasting to the concrete backend
	fn as_any(&self) -> &dyn std::any::Any;
}
