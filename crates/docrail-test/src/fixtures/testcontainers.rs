//! MongoDB container fixtures

use docrail_conf::{NoSQLEngine, NoSQLSettings};
use docrail_db::nosql::backends::MongoDBBackend;
use rstest::*;
use std::sync::Arc;
use testcontainers::{ImageExt, core::WaitFor, runners::AsyncRunner};

// Public re-exports for fixtures.rs
pub use testcontainers::{ContainerAsync, GenericImage};

use super::memory::unique_collection_name;

async fn try_start_mongodb_container()
-> Result<(ContainerAsync<GenericImage>, String, u16), Box<dyn std::error::Error>> {
	use testcontainers::core::IntoContainerPort;

	let mongo = GenericImage::new("mongo", "7.0")
		.with_exposed_port(27017.tcp())
		.with_wait_for(WaitFor::message_on_stdout("Waiting for connections"))
		.with_startup_timeout(std::time::Duration::from_secs(60))
		.start()
		.await?;

	let port = mongo.get_host_port_ipv4(27017).await?;
	let connection_string = format!("mongodb://127.0.0.1:{}", port);

	Ok((mongo, connection_string, port))
}

/// Fixture providing a MongoDB container
///
/// Starts a MongoDB 7.0 container, retrying a few times on slow Docker hosts.
/// Returns the container handle (keep it alive for the test), the connection
/// string and the mapped port.
#[fixture]
pub async fn mongodb_container() -> (ContainerAsync<GenericImage>, String, u16) {
	const MAX_RETRIES: u32 = 3;
	const RETRY_DELAY_MS: u64 = 2000;

	let mut last_error = None;

	for attempt in 0..MAX_RETRIES {
		match try_start_mongodb_container().await {
			Ok(result) => return result,
			Err(e) => {
				tracing::warn!(
					attempt = attempt + 1,
					max = MAX_RETRIES,
					error = %e,
					"MongoDB container start failed"
				);
				last_error = Some(e.to_string());

				if attempt < MAX_RETRIES - 1 {
					tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
				}
			}
		}
	}

	panic!(
		"Failed to start MongoDB container after {} attempts: {:?}",
		MAX_RETRIES, last_error
	);
}

/// Fixture providing a MongoDB backend on a fresh database
///
/// # Examples
///
/// ```ignore
/// use docrail_test::fixtures::mongodb_backend;
/// use rstest::*;
///
/// #[rstest]
/// #[tokio::test]
/// async fn test_with_mongo(
///     #[future] mongodb_backend: (ContainerAsync<GenericImage>, Arc<MongoDBBackend>),
/// ) {
///     let (_container, backend) = mongodb_backend.await;
/// }
/// ```
#[fixture]
pub async fn mongodb_backend(
	#[future] mongodb_container: (ContainerAsync<GenericImage>, String, u16),
) -> (ContainerAsync<GenericImage>, Arc<MongoDBBackend>) {
	let (container, url, _port) = mongodb_container.await;

	let settings = NoSQLSettings {
		engine: NoSQLEngine::MongoDB,
		url,
		database: unique_collection_name("docrail_test"),
		..Default::default()
	};
	let backend = MongoDBBackend::from_settings(&settings)
		.await
		.expect("Failed to configure MongoDB backend");

	(container, Arc::new(backend))
}
